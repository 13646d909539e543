//! Outbox event model: row shape, delivery status, well-known type tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known event type tags. Callers may also pass arbitrary tags.
pub mod types {
    pub const NOTIFICATION_RECEIVED: &str = "notification_received";
    pub const NOTIFICATION_OPENED: &str = "notification_opened";
    pub const PUSH_UNREGISTERED: &str = "push_unregistered";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Delivery status of an outbox event.
///
/// `Posted` never reaches storage: a delivered event is physically removed
/// from the store, so at rest a row only ever holds `NotPosted`, `Posting`
/// or `PostingError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    NotPosted,
    Posting,
    Posted,
    PostingError,
}

impl EventStatus {
    /// Convert the status to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPosted => "not_posted",
            Self::Posting => "posting",
            Self::Posted => "posted",
            Self::PostingError => "posting_error",
        }
    }

    /// Parse a status from its string representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "posting" => Self::Posting,
            "posted" => Self::Posted,
            "posting_error" => Self::PostingError,
            _ => Self::NotPosted,
        }
    }
}

/// A locally-generated analytics/receipt event awaiting delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned, unique, immutable.
    pub event_id: i64,
    /// String tag, e.g. `notification_received`.
    pub event_type: String,
    /// Unix timestamp of the moment the event occurred.
    pub occurred_at: i64,
    /// Optional string-to-string payload.
    pub payload: Option<BTreeMap<String, String>>,
    pub status: EventStatus,
}

/// A new event as handed to the store; the id and the initial
/// `not_posted` status are assigned on insert.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: String,
    pub occurred_at: i64,
    pub payload: Option<BTreeMap<String, String>>,
}

impl EventDraft {
    /// Create a draft stamped with the current time.
    pub fn now(event_type: impl Into<String>, payload: Option<BTreeMap<String, String>>) -> Self {
        Self {
            event_type: event_type.into(),
            occurred_at: chrono::Utc::now().timestamp(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            EventStatus::NotPosted,
            EventStatus::Posting,
            EventStatus::Posted,
            EventStatus::PostingError,
        ] {
            assert_eq!(EventStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_parses_as_not_posted() {
        assert_eq!(EventStatus::parse("bogus"), EventStatus::NotPosted);
    }

    #[test]
    fn draft_now_stamps_timestamp() {
        let before = chrono::Utc::now().timestamp();
        let draft = EventDraft::now(types::HEARTBEAT, None);
        let after = chrono::Utc::now().timestamp();

        assert_eq!(draft.event_type, "heartbeat");
        assert!(draft.occurred_at >= before && draft.occurred_at <= after);
    }
}
