//! Registration reconciliation: decides, per attempt, which of the token
//! provider and the backend actually need to be called, and persists every
//! durable outcome at the moment it becomes true.

use crate::backend::client::BackendClient;
use crate::outbox;
use crate::outbox::event::{types, EventDraft};
use crate::provider::PushTokenProvider;
use crate::registration::params::{DeviceInfo, RegistrationParams};
use crate::store::DeviceStore;
use crate::Result;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Durable outcome of a successful registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub backend_device_id: String,
    pub push_token: String,
}

/// Reconcile the device registration with the desired `params`.
///
/// Fast path: when the cached token is still valid for this app build and
/// the desired fields match the stored ones, this returns without any
/// network call. A cached token with no backend id (a previous attempt
/// died between the provider and the backend) retries only the backend
/// call rather than re-minting a token.
pub async fn register(
    store: &dyn DeviceStore,
    client: &dyn BackendClient,
    provider: &dyn PushTokenProvider,
    device: &DeviceInfo,
    sender_ids: &[String],
    params: RegistrationParams,
) -> Result<RegistrationInfo> {
    let mut state = store.load_registration_state()?;

    let cached_token = if state.needs_new_token(device.app_version) {
        None
    } else {
        state.push_token.clone()
    };

    let token = match cached_token {
        Some(token) => token,
        None => {
            let token = provider.obtain_token(sender_ids).await?;
            // Persist the token before touching the backend so a backend
            // failure does not waste it.
            state.push_token = Some(token.clone());
            state.registered_app_version = Some(device.app_version);
            store.save_registration_state(&state)?;
            info!("obtained new push token");

            let device_id = client.register_device(&params, device, &token).await?;
            state.backend_device_id = Some(device_id.clone());
            state.params = params;
            store.save_registration_state(&state)?;
            info!(device_id = %device_id, "device registered");
            return Ok(RegistrationInfo {
                backend_device_id: device_id,
                push_token: token,
            });
        }
    };

    match state.backend_device_id.clone() {
        Some(device_id) if state.params.same_desired_fields(&params) => {
            debug!(device_id = %device_id, "registration unchanged, fast path");
            Ok(RegistrationInfo {
                backend_device_id: device_id,
                push_token: token,
            })
        }
        Some(device_id) => {
            client
                .update_device(&device_id, &params, device, &token)
                .await?;
            state.params = params;
            store.save_registration_state(&state)?;
            info!(device_id = %device_id, "registration updated");
            Ok(RegistrationInfo {
                backend_device_id: device_id,
                push_token: token,
            })
        }
        None => {
            // Token cached by an earlier attempt whose backend call failed.
            let device_id = client.register_device(&params, device, &token).await?;
            state.backend_device_id = Some(device_id.clone());
            state.params = params;
            store.save_registration_state(&state)?;
            info!(device_id = %device_id, "device registered with cached token");
            Ok(RegistrationInfo {
                backend_device_id: device_id,
                push_token: token,
            })
        }
    }
}

/// Tear down the registration. The backend and provider steps are
/// independent: a backend failure still attempts token release, and each
/// cleared remote identity is persisted as soon as it is cleared.
///
/// The combined outcome follows whichever step had a remote identity to
/// clear: with a backend id present the backend call decides; otherwise
/// token release decides; with nothing held this is a successful no-op.
pub async fn unregister(
    store: &dyn DeviceStore,
    client: &dyn BackendClient,
    provider: &dyn PushTokenProvider,
) -> Result<()> {
    let mut state = store.load_registration_state()?;

    let mut backend_failure = None;
    let had_backend_id = state.backend_device_id.is_some();

    if let Some(device_id) = state.backend_device_id.clone() {
        match client.unregister_device(&device_id, &state.params).await {
            Ok(()) => {
                state.clear_backend_registration();
                store.save_registration_state(&state)?;

                // Record the unregistration for a later send cycle. This
                // bypasses the analytics gate: the receipt matters even
                // though the cleared params disable analytics.
                let mut payload = BTreeMap::new();
                payload.insert("device_id".to_string(), device_id.clone());
                outbox::save_event(
                    store,
                    &EventDraft::now(types::PUSH_UNREGISTERED, Some(payload)),
                )?;
                info!(device_id = %device_id, "device unregistered from backend");
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "backend unregister failed");
                backend_failure = Some(e);
            }
        }
    }

    let mut token_failure = None;
    if state.push_token.is_some() {
        match provider.release_token().await {
            Ok(()) => {
                state.clear_token();
                store.save_registration_state(&state)?;
                info!("push token released");
            }
            Err(e) => {
                warn!(error = %e, "token release failed");
                token_failure = Some(e);
            }
        }
    }

    if had_backend_id {
        match backend_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    } else {
        match token_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
