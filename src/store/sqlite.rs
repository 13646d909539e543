//! SQLite-backed row store.

use crate::outbox::event::{Event, EventDraft, EventStatus};
use crate::registration::params::RegistrationParams;
use crate::registration::state::RegistrationState;
use crate::store::{DeviceStore, StoreError};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite store holding the registration singleton and the event outbox.
///
/// `rusqlite::Connection` is not `Sync`, so the connection sits behind a
/// mutex; the single worker means the lock is never contended.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create a new in-memory store for testing.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS registration_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                platform_uuid TEXT NOT NULL DEFAULT '',
                platform_secret TEXT NOT NULL DEFAULT '',
                service_url TEXT NOT NULL DEFAULT '',
                device_alias TEXT,
                custom_user_id TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                geofences_enabled INTEGER NOT NULL DEFAULT 0,
                analytics_enabled INTEGER NOT NULL DEFAULT 0,
                request_headers TEXT NOT NULL DEFAULT '{}',
                push_token TEXT,
                backend_device_id TEXT,
                registered_app_version INTEGER
            );

            CREATE TABLE IF NOT EXISTS events (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                payload TEXT,
                status TEXT NOT NULL DEFAULT 'not_posted'
            );

            CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);",
        )?;
        Ok(())
    }

    /// Lock the underlying connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Comma-separated `?` placeholder list for an id set.
fn placeholders(n: usize) -> String {
    let mut sql = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            sql.push(',');
        }
        sql.push('?');
    }
    sql
}

impl DeviceStore for SqliteStore {
    fn load_registration_state(&self) -> Result<RegistrationState, StoreError> {
        let result = self.conn().query_row(
            "SELECT platform_uuid, platform_secret, service_url, device_alias,
                    custom_user_id, tags, geofences_enabled, analytics_enabled,
                    request_headers, push_token, backend_device_id,
                    registered_app_version
             FROM registration_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<i64>>(11)?,
                ))
            },
        );

        match result {
            Ok((
                platform_uuid,
                platform_secret,
                service_url,
                device_alias,
                custom_user_id,
                tags,
                geofences_enabled,
                analytics_enabled,
                request_headers,
                push_token,
                backend_device_id,
                registered_app_version,
            )) => {
                let tags: BTreeSet<String> = decode_json(&tags)?;
                let request_headers: BTreeMap<String, String> = decode_json(&request_headers)?;
                Ok(RegistrationState {
                    params: RegistrationParams {
                        platform_uuid,
                        platform_secret,
                        service_url,
                        device_alias,
                        custom_user_id,
                        tags,
                        geofences_enabled,
                        analytics_enabled,
                        request_headers,
                    },
                    push_token,
                    backend_device_id,
                    registered_app_version,
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(RegistrationState::default()),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    fn save_registration_state(&self, state: &RegistrationState) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO registration_state (id, platform_uuid, platform_secret,
                service_url, device_alias, custom_user_id, tags,
                geofences_enabled, analytics_enabled, request_headers,
                push_token, backend_device_id, registered_app_version)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                platform_uuid = excluded.platform_uuid,
                platform_secret = excluded.platform_secret,
                service_url = excluded.service_url,
                device_alias = excluded.device_alias,
                custom_user_id = excluded.custom_user_id,
                tags = excluded.tags,
                geofences_enabled = excluded.geofences_enabled,
                analytics_enabled = excluded.analytics_enabled,
                request_headers = excluded.request_headers,
                push_token = excluded.push_token,
                backend_device_id = excluded.backend_device_id,
                registered_app_version = excluded.registered_app_version",
            params![
                state.params.platform_uuid,
                state.params.platform_secret,
                state.params.service_url,
                state.params.device_alias,
                state.params.custom_user_id,
                encode_json(&state.params.tags)?,
                state.params.geofences_enabled,
                state.params.analytics_enabled,
                encode_json(&state.params.request_headers)?,
                state.push_token,
                state.backend_device_id,
                state.registered_app_version,
            ],
        )?;
        Ok(())
    }

    fn insert_event(&self, draft: &EventDraft) -> Result<i64, StoreError> {
        let payload = draft.payload.as_ref().map(encode_json).transpose()?;
        // Same lock across insert and rowid read.
        let conn = self.conn();
        conn.execute(
            "INSERT INTO events (event_type, occurred_at, payload, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                draft.event_type,
                draft.occurred_at,
                payload,
                EventStatus::NotPosted.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn event_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn events_with_status(&self, status: EventStatus) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT event_id, event_type, occurred_at, payload, status
             FROM events WHERE status = ?1 ORDER BY event_id",
        )?;

        let rows = stmt.query_map([status.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (event_id, event_type, occurred_at, payload, status) = row?;
            let payload = payload.as_deref().map(decode_json).transpose()?;
            events.push(Event {
                event_id,
                event_type,
                occurred_at,
                payload,
                status: EventStatus::parse(&status),
            });
        }
        Ok(events)
    }

    fn set_events_status(&self, ids: &[i64], status: EventStatus) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE events SET status = '{}' WHERE event_id IN ({})",
            status.as_str(),
            placeholders(ids.len())
        );
        self.conn().execute(&sql, rusqlite::params_from_iter(ids))?;
        Ok(())
    }

    fn delete_events(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM events WHERE event_id IN ({})",
            placeholders(ids.len())
        );
        self.conn().execute(&sql, rusqlite::params_from_iter(ids))?;
        Ok(())
    }

    fn clear_events(&self) -> Result<(), StoreError> {
        self.conn().execute("DELETE FROM events", [])?;
        Ok(())
    }

    fn requeue_in_flight_events(&self) -> Result<u64, StoreError> {
        let changed = self.conn().execute(
            "UPDATE events SET status = 'posting_error' WHERE status = 'posting'",
            [],
        )?;
        Ok(changed as u64)
    }
}
