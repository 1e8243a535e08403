use almon_common::types::AlarmEvent;
use chrono::{DateTime, Duration, Utc};

/// Notification throttle for repeated detections of the same synthetic
/// condition.
///
/// Every detection is persisted regardless; the gate only decides whether
/// to notify. Given the record just inserted and the earliest ACTIVE record
/// with the same alarm id inside the window, it notifies exactly when that
/// earliest record *is* the new one — identity comparison on the primary
/// key, so the first occurrence always notifies even though the new record
/// itself matches the window query.
#[derive(Debug, Clone, Copy)]
pub struct CooldownGate {
    window: Duration,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// The earliest `event_time` still inside the cooldown window.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    pub fn should_notify(
        &self,
        just_created: &AlarmEvent,
        earliest_active_in_window: Option<&AlarmEvent>,
    ) -> bool {
        match earliest_active_in_window {
            None => true,
            Some(existing) => existing.id == just_created.id,
        }
    }
}
