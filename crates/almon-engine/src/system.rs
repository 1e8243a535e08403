use crate::cooldown::CooldownGate;
use almon_common::id;
use almon_common::types::{AlarmEvent, AlarmStatus, Severity};
use almon_storage::error::Result;
use almon_storage::AlarmStore;
use chrono::{Duration, Utc};

/// Synthetic alarm id raised when the connectivity probe fails.
pub const SOURCE_OFFLINE_ALARM_ID: &str = "SYSTEM-EDS-OFFLINE";
/// Synthetic alarm id raised when a cycle fails after a successful probe.
pub const SOURCE_ERROR_ALARM_ID: &str = "SYSTEM-EDS-ERROR";
/// `source` field of every synthetic alarm record.
pub const SYSTEM_SOURCE: &str = "Alarm Monitor System";

/// Bound on the failure description persisted with an error alarm.
const MAX_STORED_REASON_CHARS: usize = 100;
/// Tighter bound applied to the SMS body.
const MAX_NOTIFIED_REASON_CHARS: usize = 50;

/// Why a synthetic alarm is being raised.
pub enum SystemReason<'a> {
    SourceOffline,
    SourceError(&'a str),
}

impl SystemReason<'_> {
    pub fn alarm_id(&self) -> &'static str {
        match self {
            SystemReason::SourceOffline => SOURCE_OFFLINE_ALARM_ID,
            SystemReason::SourceError(_) => SOURCE_ERROR_ALARM_ID,
        }
    }

    fn description(&self) -> String {
        match self {
            SystemReason::SourceOffline => "EDS API Connection Failed".to_string(),
            SystemReason::SourceError(reason) => {
                format!("EDS API Error: {}", truncate_chars(reason, MAX_STORED_REASON_CHARS))
            }
        }
    }

    /// Message body dispatched when the cooldown gate allows it.
    pub fn notification(&self) -> String {
        match self {
            SystemReason::SourceOffline => {
                "ALARM: EDS API is offline - Monitoring System - HIGH".to_string()
            }
            SystemReason::SourceError(reason) => format!(
                "ALARM: EDS API Error - {}... - HIGH",
                truncate_chars(reason, MAX_NOTIFIED_REASON_CHARS)
            ),
        }
    }
}

/// Manages the synthetic alarms representing pipeline health.
pub struct SystemAlarms {
    gate: CooldownGate,
}

impl SystemAlarms {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            gate: CooldownGate::new(cooldown),
        }
    }

    /// Records a new occurrence of `reason` and decides whether it should be
    /// notified. The record is persisted even when the notification is
    /// suppressed, keeping the audit trail complete.
    pub fn raise(
        &self,
        store: &dyn AlarmStore,
        reason: &SystemReason<'_>,
    ) -> Result<(AlarmEvent, bool)> {
        let now = Utc::now();
        let description = reason.description();
        let record = AlarmEvent {
            id: id::next_id(),
            alarm_id: reason.alarm_id().to_string(),
            description: description.clone(),
            source: SYSTEM_SOURCE.to_string(),
            event_time: now,
            severity: Severity::High,
            status: AlarmStatus::Active,
            raw_data: Some(serde_json::json!({
                "message": description,
                "type": "system",
            })),
            created_at: now,
        };
        store.insert_alarm_event(&record)?;

        let earliest = store
            .recent_active_system_alarm(reason.alarm_id(), self.gate.window_start(now))?;
        let notify = self.gate.should_notify(&record, earliest.as_ref());
        Ok((record, notify))
    }

    /// On a successful probe, transitions every ACTIVE offline alarm to
    /// CLEARED in one commit. Recovery never notifies.
    pub fn reconcile_recovery(&self, store: &dyn AlarmStore) -> Result<usize> {
        store.clear_active_alarms(SOURCE_OFFLINE_ALARM_ID)
    }
}

/// Returns at most `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
