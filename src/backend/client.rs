//! HTTP client for the backend registration service.

use crate::backend::models::{EventsRequest, RegistrationRequest, RegistrationResponse};
use crate::registration::params::{DeviceInfo, RegistrationParams};
use crate::{PushError, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};

/// The backend registration service as seen by the engine. The engine
/// relies on the client's own timeout; it applies none of its own.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Register the device; returns the backend-assigned device id.
    async fn register_device(
        &self,
        params: &RegistrationParams,
        device: &DeviceInfo,
        token: &str,
    ) -> Result<String>;

    /// Update an existing registration in place.
    async fn update_device(
        &self,
        device_id: &str,
        params: &RegistrationParams,
        device: &DeviceInfo,
        token: &str,
    ) -> Result<()>;

    /// Remove the device registration. A backend 404 counts as success
    /// (already unregistered).
    async fn unregister_device(&self, device_id: &str, params: &RegistrationParams) -> Result<()>;

    /// Deliver one batch of events.
    async fn send_events(&self, params: &RegistrationParams, request: &EventsRequest)
        -> Result<()>;
}

/// reqwest-backed [`BackendClient`].
pub struct HttpBackendClient {
    client: reqwest::Client,
}

impl HttpBackendClient {
    /// Create a client with a 30-second request timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PushError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(params: &RegistrationParams, path: &str) -> String {
        format!("{}{}", params.service_url.trim_end_matches('/'), path)
    }

    /// Issue one request with basic auth and the caller's extra headers;
    /// returns the body bytes of a 2xx response.
    async fn send(
        &self,
        method: Method,
        params: &RegistrationParams,
        path: &str,
        body: Option<Vec<u8>>,
        not_found_ok: bool,
    ) -> Result<Vec<u8>> {
        let mut builder = self
            .client
            .request(method, Self::url(params, path))
            .basic_auth(&params.platform_uuid, Some(&params.platform_secret))
            .header("Content-Type", "application/json");

        for (name, value) in &params.request_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PushError::Network(e.to_string()))?;

        let status = response.status();
        if Self::accepts(status, not_found_ok) {
            return response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| PushError::Network(e.to_string()));
        }

        let message = response.text().await.unwrap_or_else(|_| "unknown".to_string());
        Err(Self::failure(status, message))
    }

    /// Whether a response status counts as success for this request. 404 is
    /// accepted only on unregister (already unregistered).
    fn accepts(status: StatusCode, not_found_ok: bool) -> bool {
        status.is_success() || (not_found_ok && status == StatusCode::NOT_FOUND)
    }

    /// Map a rejected status onto the error taxonomy: 5xx is a transport
    /// failure, everything else a backend failure.
    fn failure(status: StatusCode, message: String) -> PushError {
        if status.is_server_error() {
            PushError::Network(format!("backend {status}: {message}"))
        } else {
            PushError::Backend {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Extract the assigned device id from a 2xx registration body.
    fn parse_registration(body: &[u8]) -> Result<String> {
        let parsed: RegistrationResponse =
            serde_json::from_slice(body).map_err(|e| PushError::Backend {
                status: 200,
                message: format!("invalid registration response: {e}"),
            })?;
        Ok(parsed.device_uuid)
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| PushError::Validation(e.to_string()))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn register_device(
        &self,
        params: &RegistrationParams,
        device: &DeviceInfo,
        token: &str,
    ) -> Result<String> {
        let body = Self::encode(&RegistrationRequest::new(params, device, token))?;
        let response = self
            .send(Method::POST, params, "/v1/registration", Some(body), false)
            .await?;
        Self::parse_registration(&response)
    }

    async fn update_device(
        &self,
        device_id: &str,
        params: &RegistrationParams,
        device: &DeviceInfo,
        token: &str,
    ) -> Result<()> {
        let body = Self::encode(&RegistrationRequest::new(params, device, token))?;
        let path = format!("/v1/registration/{device_id}");
        self.send(Method::PUT, params, &path, Some(body), false)
            .await?;
        Ok(())
    }

    async fn unregister_device(&self, device_id: &str, params: &RegistrationParams) -> Result<()> {
        let path = format!("/v1/registration/{device_id}");
        self.send(Method::DELETE, params, &path, None, true).await?;
        Ok(())
    }

    async fn send_events(
        &self,
        params: &RegistrationParams,
        request: &EventsRequest,
    ) -> Result<()> {
        let body = Self::encode(request)?;
        self.send(Method::POST, params, "/v1/events", Some(body), false)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_trims_trailing_slash() {
        let params = RegistrationParams::new("u", "s", "https://push.example.com/");
        assert_eq!(
            HttpBackendClient::url(&params, "/v1/registration"),
            "https://push.example.com/v1/registration"
        );
    }

    #[test]
    fn not_found_succeeds_only_on_unregister() {
        assert!(HttpBackendClient::accepts(StatusCode::NOT_FOUND, true));
        assert!(!HttpBackendClient::accepts(StatusCode::NOT_FOUND, false));
        assert!(HttpBackendClient::accepts(StatusCode::OK, false));
        assert!(HttpBackendClient::accepts(StatusCode::NO_CONTENT, true));
    }

    #[test]
    fn server_errors_are_network_failures() {
        for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::BAD_GATEWAY] {
            let err = HttpBackendClient::failure(status, "boom".to_string());
            assert!(matches!(err, PushError::Network(_)), "{status}: {err}");
        }
    }

    #[test]
    fn client_errors_are_backend_failures() {
        let err = HttpBackendClient::failure(StatusCode::FORBIDDEN, "no".to_string());
        assert!(matches!(err, PushError::Backend { status: 403, .. }));

        // 404 off the unregister path is an ordinary backend failure.
        let err = HttpBackendClient::failure(StatusCode::NOT_FOUND, "gone".to_string());
        assert!(matches!(err, PushError::Backend { status: 404, .. }));
    }

    #[test]
    fn malformed_registration_body_is_a_backend_error() {
        let err = HttpBackendClient::parse_registration(b"not json").unwrap_err();
        assert!(matches!(err, PushError::Backend { status: 200, .. }));

        let id = HttpBackendClient::parse_registration(br#"{"device_uuid":"dev-1"}"#).unwrap();
        assert_eq!(id, "dev-1");
    }
}
