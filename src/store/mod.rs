//! Durable local storage for registration state and outbox events.
//!
//! The engine reaches storage only through the [`DeviceStore`] trait so it
//! never assumes SQL semantics beyond "predicate query" and "batch
//! update/delete". The bundled implementation is [`sqlite::SqliteStore`].

pub mod sqlite;

use crate::outbox::event::{Event, EventDraft, EventStatus};
use crate::registration::state::RegistrationState;
use thiserror::Error;

/// Error type for row-store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Abstract row store consumed by the registration engine and the outbox.
///
/// Implementations must survive process restarts. The store is borrowed
/// across await points inside the worker task, so it must be shareable
/// between threads even though there is only ever one writer; the bundled
/// SQLite implementation serializes access with a mutex.
pub trait DeviceStore: Send + Sync {
    /// Load the singleton registration record, or its empty default if the
    /// store has never held one.
    fn load_registration_state(&self) -> Result<RegistrationState, StoreError>;

    /// Persist the singleton registration record (upsert).
    fn save_registration_state(&self, state: &RegistrationState) -> Result<(), StoreError>;

    /// Insert a new event at status [`EventStatus::NotPosted`] and return
    /// its store-assigned id.
    fn insert_event(&self, draft: &EventDraft) -> Result<i64, StoreError>;

    /// Total number of events currently held.
    fn event_count(&self) -> Result<u64, StoreError>;

    /// All events currently at the given status, in insertion order.
    fn events_with_status(&self, status: EventStatus) -> Result<Vec<Event>, StoreError>;

    /// Set the status of every listed event in one batched update. Ids not
    /// present in the store are ignored.
    fn set_events_status(&self, ids: &[i64], status: EventStatus) -> Result<(), StoreError>;

    /// Delete the listed events. Deleting an id that does not exist is a
    /// no-op and leaves every other row untouched.
    fn delete_events(&self, ids: &[i64]) -> Result<(), StoreError>;

    /// Remove every event.
    fn clear_events(&self) -> Result<(), StoreError>;

    /// Flip rows left at [`EventStatus::Posting`] by a crashed process back
    /// to [`EventStatus::PostingError`] so the next cycle picks them up.
    /// Never called by the engine itself; hosts may run it at boot.
    fn requeue_in_flight_events(&self) -> Result<u64, StoreError>;
}
