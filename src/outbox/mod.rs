//! Durable event outbox: event lifecycle and the batch send cycle.

pub mod event;

use crate::backend::client::BackendClient;
use crate::backend::models::{EventsRequest, WireEvent};
use crate::outbox::event::{Event, EventDraft, EventStatus};
use crate::store::DeviceStore;
use crate::Result;
use tracing::{debug, info, warn};

/// Insert an event at `not_posted` and return its store-assigned id.
/// Never touches the network; the only failure mode is storage failure,
/// which is fatal to the caller.
pub fn save_event(store: &dyn DeviceStore, draft: &EventDraft) -> Result<i64> {
    let id = store.insert_event(draft)?;
    debug!(event_id = id, event_type = %draft.event_type, "event queued");
    Ok(id)
}

/// Number of events currently held, regardless of status.
pub fn event_count(store: &dyn DeviceStore) -> Result<u64> {
    Ok(store.event_count()?)
}

/// Events currently at the given status.
pub fn events_with_status(store: &dyn DeviceStore, status: EventStatus) -> Result<Vec<Event>> {
    Ok(store.events_with_status(status)?)
}

/// Run one send cycle: select every `not_posted`/`posting_error` row, mark
/// the whole set `posting`, deliver it as a single batch, then delete the
/// batched ids on success or revert them to `posting_error` on failure.
///
/// The entire eligible set travels in one request; there is no size cap
/// and no per-row retry count, so a failed batch retries the same rows in
/// full on the next cycle. Rows inserted while the call is in flight are
/// untouched because the commit/revert operates on the captured id set.
///
/// Returns the number of events delivered.
pub async fn run_send_cycle(store: &dyn DeviceStore, client: &dyn BackendClient) -> Result<u64> {
    let mut batch = store.events_with_status(EventStatus::NotPosted)?;
    batch.extend(store.events_with_status(EventStatus::PostingError)?);
    if batch.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = batch.iter().map(|e| e.event_id).collect();

    // Atomicity boundary: rows are in flight from here until commit/revert.
    store.set_events_status(&ids, EventStatus::Posting)?;

    let state = store.load_registration_state()?;
    let request = EventsRequest {
        events: batch.iter().map(WireEvent::from).collect(),
        device_id: state.backend_device_id.clone().unwrap_or_default(),
    };

    match client.send_events(&state.params, &request).await {
        Ok(()) => {
            store.delete_events(&ids)?;
            info!(count = ids.len(), "event batch delivered");
            Ok(ids.len() as u64)
        }
        Err(e) => {
            store.set_events_status(&ids, EventStatus::PostingError)?;
            warn!(count = ids.len(), error = %e, "event batch failed, will retry");
            Err(e)
        }
    }
}
