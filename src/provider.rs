//! Push-token provider seam.

use crate::Result;
use async_trait::async_trait;

/// The platform token provider (GCM/FCM or equivalent). Token acquisition
/// itself is out of scope; the engine only consumes this contract.
#[async_trait]
pub trait PushTokenProvider: Send + Sync {
    /// Obtain a registration token for the given sender ids. May fail on
    /// transient provider errors; the engine surfaces that as attempt
    /// failure without touching persisted state.
    async fn obtain_token(&self, sender_ids: &[String]) -> Result<String>;

    /// Release the current token so the device stops receiving pushes.
    async fn release_token(&self) -> Result<()>;
}
