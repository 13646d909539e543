//! Wire format for the backend registration and events APIs.

use crate::outbox::event::Event;
use crate::registration::params::{DeviceInfo, RegistrationParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /v1/registration` and `PUT /v1/registration/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub platform_uuid: String,
    pub secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_user_id: Option<String>,
    pub device_model: String,
    pub os: String,
    pub os_version: String,
    pub registration_token: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

impl RegistrationRequest {
    /// Assemble a request from the desired parameters, device facts and a
    /// provider token.
    pub fn new(params: &RegistrationParams, device: &DeviceInfo, token: &str) -> Self {
        Self {
            platform_uuid: params.platform_uuid.clone(),
            secret: params.platform_secret.clone(),
            device_alias: params.device_alias.clone(),
            custom_user_id: params.custom_user_id.clone(),
            device_model: device.device_model.clone(),
            os: device.os.clone(),
            os_version: device.os_version.clone(),
            registration_token: token.to_string(),
            tags: params.tags.iter().cloned().collect(),
        }
    }
}

/// Body of a successful registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub device_uuid: String,
}

/// A single event as carried in the events batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_type: String,
    pub occurred_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<BTreeMap<String, String>>,
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.event_type.clone(),
            occurred_at: event.occurred_at,
            payload: event.payload.clone(),
        }
    }
}

/// Body of `POST /v1/events`. The whole eligible set travels as one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsRequest {
    pub events: Vec<WireEvent>,
    /// Backend device id; empty when the device was never registered.
    pub device_id: String,
}
