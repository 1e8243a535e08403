//! Persistence layer for alarm events, contacts, credentials, and the
//! one-shot cursor override.
//!
//! The default implementation ([`sqlite::SqliteAlarmStore`]) is a single
//! SQLite database in WAL mode. The poll cycle only ever sees the
//! [`AlarmStore`] trait, so tests run against in-memory fakes.

pub mod error;
pub mod sqlite;


use chrono::{DateTime, Utc};

use almon_common::types::{AlarmEvent, ApiCredential, Contact};
use error::Result;

/// Persistence backend consumed by the poll cycle.
///
/// Implementations must be safe to share across threads (`Send + Sync`):
/// the scheduler task and the administrative CLI touch the same database.
pub trait AlarmStore: Send + Sync {
    /// Appends a single alarm event.
    fn insert_alarm_event(&self, event: &AlarmEvent) -> Result<()>;

    /// Appends a batch of alarm events in one transaction. Either all rows
    /// land or none do.
    fn insert_alarm_events(&self, events: &[AlarmEvent]) -> Result<()>;

    /// Returns the maximum `event_time` across all stored events, or `None`
    /// when the store is empty.
    fn max_event_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Returns the most recent ACTIVE event with the given `alarm_id` whose
    /// `event_time` is at or after `since`, if any.
    fn recent_active_system_alarm(
        &self,
        alarm_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AlarmEvent>>;

    /// Transitions every ACTIVE event with the given `alarm_id` to CLEARED
    /// in one commit. Returns the number of rows updated.
    fn clear_active_alarms(&self, alarm_id: &str) -> Result<usize>;

    /// Returns the active contact roster.
    fn active_contacts(&self) -> Result<Vec<Contact>>;

    /// Returns the stored credentials for the given `api_type`, if any.
    fn get_credentials(&self, api_type: &str) -> Result<Option<ApiCredential>>;

    /// Consumes the one-shot cursor override: returns it and deletes it in
    /// the same transaction, so a second call observes nothing.
    fn take_cursor_override(&self) -> Result<Option<DateTime<Utc>>>;

    /// Arms the one-shot cursor override, replacing any previous value.
    fn set_cursor_override(&self, reset_to: DateTime<Utc>) -> Result<()>;
}
