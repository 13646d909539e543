//! Persisted registration record.

use crate::registration::params::RegistrationParams;
use serde::{Deserialize, Serialize};

/// The durable outcome of past registration attempts. A singleton record,
/// created empty on first use and mutated only by the reconciliation
/// engine under the single-worker serialization guarantee.
///
/// Invariant: `backend_device_id` is only ever set while a `push_token`
/// was present at the time it was obtained. The token may since have been
/// invalidated, but a backend id without an associated token is never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationState {
    /// Parameters in effect at the last successful registration or update.
    pub params: RegistrationParams,
    /// Last token obtained from the push-token provider.
    pub push_token: Option<String>,
    /// Id assigned by the backend on successful registration.
    pub backend_device_id: Option<String>,
    /// App build number at the time `push_token` was obtained.
    pub registered_app_version: Option<i64>,
}

impl RegistrationState {
    /// Whether a fresh provider token is needed for the given app build.
    pub fn needs_new_token(&self, current_app_version: i64) -> bool {
        self.push_token.is_none() || self.registered_app_version != Some(current_app_version)
    }

    /// Drop the backend identity and the desired parameters it was
    /// registered with. Called after a successful backend unregister.
    pub fn clear_backend_registration(&mut self) {
        self.backend_device_id = None;
        self.params = RegistrationParams::default();
    }

    /// Drop the provider token. Called after a successful token release.
    pub fn clear_token(&mut self) {
        self.push_token = None;
        self.registered_app_version = None;
    }
}
