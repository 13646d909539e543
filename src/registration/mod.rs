//! Registration reconciliation: desired parameters, persisted state, and
//! the engine that reconciles both against the token provider and backend.

pub mod engine;
pub mod params;
pub mod state;

pub use engine::RegistrationInfo;
pub use params::{DeviceInfo, RegistrationParams};
pub use state::RegistrationState;
