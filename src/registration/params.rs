//! Caller-supplied registration parameters and device identity.

use crate::{PushError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Desired registration parameters for this device.
///
/// Tags are normalized (lowercased, deduplicated) on the way in via
/// [`RegistrationParams::set_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationParams {
    pub platform_uuid: String,
    pub platform_secret: String,
    pub service_url: String,
    pub device_alias: Option<String>,
    pub custom_user_id: Option<String>,
    pub tags: BTreeSet<String>,
    pub geofences_enabled: bool,
    /// Analytics are off until a registration carrying `true` succeeds;
    /// with analytics off, `log_event` is a documented no-op.
    pub analytics_enabled: bool,
    /// Extra headers attached to every backend request.
    pub request_headers: BTreeMap<String, String>,
}

impl RegistrationParams {
    /// Create parameters with the three mandatory fields set and analytics
    /// enabled.
    pub fn new(
        platform_uuid: impl Into<String>,
        platform_secret: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            platform_uuid: platform_uuid.into(),
            platform_secret: platform_secret.into(),
            service_url: service_url.into(),
            analytics_enabled: true,
            ..Self::default()
        }
    }

    /// Replace the tag set, lowercasing and deduplicating.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
    }

    /// Check the mandatory fields. Registration fails on this before any
    /// I/O happens and without mutating any state.
    pub fn validate(&self) -> Result<()> {
        if self.platform_uuid.trim().is_empty() {
            return Err(PushError::Validation("platform_uuid is required".to_string()));
        }
        if self.platform_secret.trim().is_empty() {
            return Err(PushError::Validation("platform_secret is required".to_string()));
        }
        if self.service_url.trim().is_empty() {
            return Err(PushError::Validation("service_url is required".to_string()));
        }
        Ok(())
    }

    /// Whether the fields a backend update can change (alias, tags, custom
    /// user id, geofence/analytics flags) match `other`. Used for the
    /// no-network fast path.
    pub fn same_desired_fields(&self, other: &Self) -> bool {
        self.device_alias == other.device_alias
            && self.custom_user_id == other.custom_user_id
            && self.tags == other.tags
            && self.geofences_enabled == other.geofences_enabled
            && self.analytics_enabled == other.analytics_enabled
    }
}

/// Immutable facts about the host device, supplied at service construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_model: String,
    pub os: String,
    pub os_version: String,
    /// Monotonic application build number; a change forces a token refresh.
    pub app_version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegistrationParams {
        RegistrationParams::new("uuid-1", "secret-1", "https://push.example.com")
    }

    #[test]
    fn new_enables_analytics() {
        assert!(valid().analytics_enabled);
    }

    #[test]
    fn validate_accepts_complete_params() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        for field in ["platform_uuid", "platform_secret", "service_url"] {
            let mut params = valid();
            match field {
                "platform_uuid" => params.platform_uuid.clear(),
                "platform_secret" => params.platform_secret.clear(),
                _ => params.service_url = "  ".to_string(),
            }
            let err = params.validate().unwrap_err();
            assert!(matches!(err, PushError::Validation(_)), "{field}: {err}");
        }
    }

    #[test]
    fn tags_are_lowercased_and_deduplicated() {
        let mut params = valid();
        params.set_tags(["Sports", "sports", "NEWS", " weather ", ""]);
        let tags: Vec<&str> = params.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, ["news", "sports", "weather"]);
    }

    #[test]
    fn same_desired_fields_ignores_credentials() {
        let a = valid();
        let mut b = valid();
        b.platform_secret = "rotated".to_string();
        assert!(a.same_desired_fields(&b));

        b.device_alias = Some("kitchen-tablet".to_string());
        assert!(!a.same_desired_fields(&b));
    }
}
