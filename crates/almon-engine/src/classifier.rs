use almon_common::id;
use almon_common::types::{AlarmEvent, AlarmStatus, RawEvent, Severity};
use chrono::{DateTime, Utc};

/// Maps a raw upstream event to a normalized alarm record, or discards it.
///
/// An event is alarm-worthy when its type contains `"alarm"`
/// (case-insensitive) or its priority is HIGH/CRITICAL. Everything else is
/// dropped without side effects. Unrecognized priority and status values
/// fall back to MEDIUM / ACTIVE; a missing timestamp maps to the epoch so a
/// later real event always supersedes it in the cursor.
pub fn classify(raw: &RawEvent, now: DateTime<Utc>) -> Option<AlarmEvent> {
    let priority = raw.priority.parse::<Severity>();
    let alarm_typed = raw.event_type.to_lowercase().contains("alarm");
    let high_priority = matches!(priority, Ok(Severity::High | Severity::Critical));
    if !alarm_typed && !high_priority {
        return None;
    }

    let description = if raw.description.is_empty() {
        "Unknown alarm".to_string()
    } else {
        raw.description.clone()
    };
    let source = if raw.source.is_empty() {
        "Unknown".to_string()
    } else {
        raw.source.clone()
    };

    Some(AlarmEvent {
        id: id::next_id(),
        alarm_id: raw.id.clone(),
        description,
        source,
        event_time: DateTime::from_timestamp(raw.timestamp, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        severity: priority.unwrap_or(Severity::Medium),
        status: raw.status.parse().unwrap_or(AlarmStatus::Active),
        raw_data: Some(raw.raw.clone()),
        created_at: now,
    })
}
