//! Push Notification Client Engine
//!
//! This library provides the client-side core of a push-notification SDK:
//! reconciling a device's registration with a push-token provider and a
//! backend registration service, and reliably delivering locally-generated
//! analytics events to that backend despite intermittent connectivity.
//!
//! The public entry point is [`PushService`], an explicitly constructed
//! context object. Every mutating call is serialized through a single
//! background worker, so registration state never needs locking.

pub mod backend;
pub mod outbox;
pub mod provider;
pub mod registration;
pub mod scheduler;
pub mod service;
pub mod store;

mod worker;

pub use backend::client::{BackendClient, HttpBackendClient};
pub use backend::models::{EventsRequest, RegistrationRequest, RegistrationResponse};
pub use outbox::event::{Event, EventDraft, EventStatus};
pub use provider::PushTokenProvider;
pub use registration::engine::RegistrationInfo;
pub use registration::params::{DeviceInfo, RegistrationParams};
pub use registration::state::RegistrationState;
pub use service::{PushService, RegistrationStatus, ServiceConfig};
pub use store::sqlite::SqliteStore;
pub use store::{DeviceStore, StoreError};

use thiserror::Error;

/// Result type for push engine operations
pub type Result<T> = std::result::Result<T, PushError>;

/// General error type for push engine operations
#[derive(Error, Debug)]
pub enum PushError {
    /// Bad caller input. Fails synchronously before any I/O; no state is
    /// mutated and nothing is retried.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Connectivity failure, timeout, or a 5xx from the backend. Surfaced
    /// as attempt failure; retried only via the next externally-triggered
    /// attempt or scheduled send cycle.
    #[error("Network error: {0}")]
    Network(String),

    /// A non-2xx backend response that is not a transport problem (4xx
    /// other than 404-on-unregister, malformed body). Handled identically
    /// to a network error at this layer.
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// The push-token provider refused or failed to mint/release a token.
    #[error("Token provider error: {0}")]
    TokenProvider(String),

    /// Row store read/write failure. Fatal; propagated, never swallowed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The worker was torn down while this command was in flight.
    /// Distinguishable from an ordinary attempt failure.
    #[error("Operation interrupted: worker shut down")]
    Interrupted,
}
