use crate::error::{Result, StoreError};
use crate::AlarmStore;
use almon_common::types::{AlarmEvent, AlarmStatus, ApiCredential, Contact, Severity};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alarm_events (
    id TEXT PRIMARY KEY,
    alarm_id TEXT NOT NULL,
    description TEXT NOT NULL,
    source TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL,
    raw_data TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alarm_events_time ON alarm_events(event_time);
CREATE INDEX IF NOT EXISTS idx_alarm_events_id_status ON alarm_events(alarm_id, status);

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone_number TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS api_credentials (
    id TEXT PRIMARY KEY,
    api_type TEXT NOT NULL UNIQUE,
    api_url TEXT NOT NULL DEFAULT '',
    username TEXT NOT NULL,
    api_key TEXT NOT NULL,
    api_secret TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cursor_override (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    reset_to INTEGER NOT NULL,
    armed_at INTEGER NOT NULL
);
";

pub struct SqliteAlarmStore {
    conn: Mutex<Connection>,
}

impl SqliteAlarmStore {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema idempotently.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "Opened alarm store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Administrative operations (outside the AlarmStore trait) ----

    /// Marks every alarm event CLEARED. Returns the number of rows updated.
    pub fn clear_all_alarms(&self) -> Result<usize> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE alarm_events SET status = ?1",
            rusqlite::params![AlarmStatus::Cleared.to_string()],
        )?;
        Ok(updated)
    }

    /// Deletes every synthetic (`SYSTEM-` prefixed) alarm row. Returns the
    /// number of rows removed.
    pub fn delete_system_alarms(&self) -> Result<usize> {
        let conn = self.lock_conn();
        let deleted = conn.execute("DELETE FROM alarm_events WHERE alarm_id LIKE 'SYSTEM-%'", [])?;
        Ok(deleted)
    }

    /// Returns the most recent alarm events, newest first.
    pub fn recent_alarms(&self, limit: usize) -> Result<Vec<AlarmEvent>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, alarm_id, description, source, event_time, severity, status, raw_data, created_at
             FROM alarm_events ORDER BY event_time DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_event)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Inserts or updates the credentials row for `cred.api_type`.
    pub fn upsert_credentials(&self, cred: &ApiCredential) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO api_credentials (id, api_type, api_url, username, api_key, api_secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(api_type) DO UPDATE SET
                 api_url = excluded.api_url,
                 username = excluded.username,
                 api_key = excluded.api_key,
                 api_secret = excluded.api_secret,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                &cred.id,
                &cred.api_type,
                &cred.api_url,
                &cred.username,
                &cred.api_key,
                &cred.api_secret,
                cred.created_at.timestamp_millis(),
                cred.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Adds a contact. Fails on a duplicate phone number.
    pub fn add_contact(&self, contact: &Contact) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO contacts (id, name, phone_number, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &contact.id,
                &contact.name,
                &contact.phone_number,
                contact.active,
                contact.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Returns every contact, active or not.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, phone_number, active, created_at FROM contacts ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], row_to_contact)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Toggles a contact's active flag. Returns true if the contact exists.
    pub fn set_contact_active(&self, id: &str, active: bool) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE contacts SET active = ?1 WHERE id = ?2",
            rusqlite::params![active, id],
        )?;
        Ok(updated > 0)
    }
}

impl AlarmStore for SqliteAlarmStore {
    fn insert_alarm_event(&self, event: &AlarmEvent) -> Result<()> {
        let conn = self.lock_conn();
        insert_event(&conn, event)
    }

    fn insert_alarm_events(&self, events: &[AlarmEvent]) -> Result<()> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        for event in events {
            insert_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn max_event_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock_conn();
        let max_ms: Option<i64> =
            conn.query_row("SELECT MAX(event_time) FROM alarm_events", [], |row| {
                row.get(0)
            })?;
        Ok(max_ms.and_then(DateTime::from_timestamp_millis))
    }

    fn recent_active_system_alarm(
        &self,
        alarm_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlarmEvent>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, alarm_id, description, source, event_time, severity, status, raw_data, created_at
             FROM alarm_events
             WHERE alarm_id = ?1 AND status = ?2 AND event_time >= ?3
             ORDER BY event_time ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![
                alarm_id,
                AlarmStatus::Active.to_string(),
                since.timestamp_millis()
            ],
            row_to_event,
        )?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn clear_active_alarms(&self, alarm_id: &str) -> Result<usize> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE alarm_events SET status = ?1 WHERE alarm_id = ?2 AND status = ?3",
            rusqlite::params![
                AlarmStatus::Cleared.to_string(),
                alarm_id,
                AlarmStatus::Active.to_string()
            ],
        )?;
        Ok(updated)
    }

    fn active_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, phone_number, active, created_at FROM contacts
             WHERE active = 1 ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], row_to_contact)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn get_credentials(&self, api_type: &str) -> Result<Option<ApiCredential>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, api_type, api_url, username, api_key, api_secret, created_at, updated_at
             FROM api_credentials WHERE api_type = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![api_type], |row| {
            let created_ms: i64 = row.get(6)?;
            let updated_ms: i64 = row.get(7)?;
            Ok(ApiCredential {
                id: row.get(0)?,
                api_type: row.get(1)?,
                api_url: row.get(2)?,
                username: row.get(3)?,
                api_key: row.get(4)?,
                api_secret: row.get(5)?,
                created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
                updated_at: DateTime::from_timestamp_millis(updated_ms).unwrap_or_default(),
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn take_cursor_override(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let reset_ms: Option<i64> = tx
            .query_row("SELECT reset_to FROM cursor_override WHERE id = 1", [], |row| {
                row.get(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if reset_ms.is_some() {
            tx.execute("DELETE FROM cursor_override WHERE id = 1", [])?;
        }
        tx.commit()?;
        Ok(reset_ms.and_then(DateTime::from_timestamp_millis))
    }

    fn set_cursor_override(&self, reset_to: DateTime<Utc>) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO cursor_override (id, reset_to, armed_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET reset_to = excluded.reset_to, armed_at = excluded.armed_at",
            rusqlite::params![reset_to.timestamp_millis(), Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

fn insert_event(conn: &Connection, event: &AlarmEvent) -> Result<()> {
    let raw_json = match &event.raw_data {
        Some(value) => Some(serde_json::to_string(value).map_err(StoreError::from)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO alarm_events (id, alarm_id, description, source, event_time, severity, status, raw_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            &event.id,
            &event.alarm_id,
            &event.description,
            &event.source,
            event.event_time.timestamp_millis(),
            event.severity.to_string(),
            event.status.to_string(),
            raw_json,
            event.created_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmEvent> {
    let event_ms: i64 = row.get(4)?;
    let severity_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let raw_json: Option<String> = row.get(7)?;
    let created_ms: i64 = row.get(8)?;
    Ok(AlarmEvent {
        id: row.get(0)?,
        alarm_id: row.get(1)?,
        description: row.get(2)?,
        source: row.get(3)?,
        event_time: DateTime::from_timestamp_millis(event_ms).unwrap_or_default(),
        severity: severity_str.parse().unwrap_or(Severity::Medium),
        status: status_str.parse().unwrap_or(AlarmStatus::Active),
        raw_data: raw_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    })
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let created_ms: i64 = row.get(4)?;
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
        active: row.get(3)?,
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    })
}
