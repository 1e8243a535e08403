use almon_storage::error::Result;
use almon_storage::AlarmStore;
use chrono::{DateTime, Utc};

/// Determines the watermark for the next event fetch.
///
/// A one-shot override (armed by the administrative clear) wins and is
/// consumed atomically, so the following cycle falls back to the derived
/// cursor. Without an override the cursor is the maximum `event_time` seen
/// so far; `None` means fetch all available history.
pub fn resolve_cursor(store: &dyn AlarmStore) -> Result<Option<DateTime<Utc>>> {
    if let Some(reset_to) = store.take_cursor_override()? {
        tracing::info!(cursor = %reset_to, "Using reset cursor for this cycle");
        return Ok(Some(reset_to));
    }
    store.max_event_time()
}
