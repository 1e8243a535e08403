use crate::classifier::classify;
use crate::cooldown::CooldownGate;
use crate::cursor::resolve_cursor;
use crate::cycle::{CycleOutcome, PollCycle};
use crate::system::{truncate_chars, SOURCE_ERROR_ALARM_ID, SOURCE_OFFLINE_ALARM_ID, SYSTEM_SOURCE};
use almon_common::types::{
    api_types, AlarmEvent, AlarmStatus, ApiCredential, Contact, RawEvent, Severity,
};
use almon_notify::error::SendError;
use almon_notify::SmsSender;
use almon_source::{SourceClient, SourceError};
use almon_storage::error::Result as StoreResult;
use almon_storage::AlarmStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ---- In-memory fakes ----

#[derive(Default)]
struct FakeStore {
    events: Mutex<Vec<AlarmEvent>>,
    contacts: Mutex<Vec<Contact>>,
    creds: Mutex<HashMap<String, ApiCredential>>,
    cursor_override: Mutex<Option<DateTime<Utc>>>,
}

impl FakeStore {
    fn events(&self) -> Vec<AlarmEvent> {
        self.events.lock().unwrap().clone()
    }

    fn events_with_id(&self, alarm_id: &str) -> Vec<AlarmEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.alarm_id == alarm_id)
            .collect()
    }

    /// Shift every stored event into the past, to step over cooldown
    /// windows without sleeping.
    fn age_events(&self, by: Duration) {
        let mut events = self.events.lock().unwrap();
        for event in events.iter_mut() {
            event.event_time -= by;
            event.created_at -= by;
        }
    }
}

impl AlarmStore for FakeStore {
    fn insert_alarm_event(&self, event: &AlarmEvent) -> StoreResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn insert_alarm_events(&self, events: &[AlarmEvent]) -> StoreResult<()> {
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    fn max_event_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.events.lock().unwrap().iter().map(|e| e.event_time).max())
    }

    fn recent_active_system_alarm(
        &self,
        alarm_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<AlarmEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.alarm_id == alarm_id
                    && e.status == AlarmStatus::Active
                    && e.event_time >= since
            })
            .min_by_key(|e| e.event_time)
            .cloned())
    }

    fn clear_active_alarms(&self, alarm_id: &str) -> StoreResult<usize> {
        let mut events = self.events.lock().unwrap();
        let mut cleared = 0;
        for event in events.iter_mut() {
            if event.alarm_id == alarm_id && event.status == AlarmStatus::Active {
                event.status = AlarmStatus::Cleared;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn active_contacts(&self) -> StoreResult<Vec<Contact>> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect())
    }

    fn get_credentials(&self, api_type: &str) -> StoreResult<Option<ApiCredential>> {
        Ok(self.creds.lock().unwrap().get(api_type).cloned())
    }

    fn take_cursor_override(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.cursor_override.lock().unwrap().take())
    }

    fn set_cursor_override(&self, reset_to: DateTime<Utc>) -> StoreResult<()> {
        *self.cursor_override.lock().unwrap() = Some(reset_to);
        Ok(())
    }
}

enum FetchPlan {
    Events(Vec<Value>),
    Fail(String),
}

struct FakeSource {
    probe_ok: Mutex<bool>,
    fetch: Mutex<FetchPlan>,
}

impl FakeSource {
    fn new(probe_ok: bool, events: Vec<Value>) -> Self {
        Self {
            probe_ok: Mutex::new(probe_ok),
            fetch: Mutex::new(FetchPlan::Events(events)),
        }
    }

    fn failing_fetch(message: &str) -> Self {
        Self {
            probe_ok: Mutex::new(true),
            fetch: Mutex::new(FetchPlan::Fail(message.to_string())),
        }
    }

    fn set_probe_ok(&self, ok: bool) {
        *self.probe_ok.lock().unwrap() = ok;
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn probe(&self, _creds: &ApiCredential) -> bool {
        *self.probe_ok.lock().unwrap()
    }

    async fn fetch_events(
        &self,
        _creds: &ApiCredential,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        match &*self.fetch.lock().unwrap() {
            FetchPlan::Events(values) => Ok(values
                .iter()
                .cloned()
                .map(RawEvent::from_value)
                .collect()),
            FetchPlan::Fail(message) => Err(SourceError::Transport(message.clone())),
        }
    }
}

#[derive(Default)]
struct FakeSender {
    attempts: Mutex<Vec<(String, String)>>,
    failing_numbers: Vec<String>,
}

impl FakeSender {
    fn failing_for(numbers: &[&str]) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            failing_numbers: numbers.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsSender for FakeSender {
    async fn send(
        &self,
        _creds: &ApiCredential,
        to: &str,
        body: &str,
    ) -> Result<String, SendError> {
        self.attempts
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        if self.failing_numbers.iter().any(|n| n == to) {
            return Err(SendError::Api {
                status: 500,
                body: "gateway exploded".to_string(),
            });
        }
        Ok(format!("msg-{}", self.attempts.lock().unwrap().len()))
    }

    async fn check_connection(&self, _creds: &ApiCredential) -> bool {
        true
    }
}

// ---- Builders ----

fn cred(api_type: &str) -> ApiCredential {
    let now = Utc::now();
    ApiCredential {
        id: almon_common::id::next_id(),
        api_type: api_type.to_string(),
        api_url: "https://api.example.com".to_string(),
        username: "monitor".to_string(),
        api_key: "s3cret".to_string(),
        api_secret: Some("+15550009999".to_string()),
        created_at: now,
        updated_at: now,
    }
}

fn contact(name: &str, phone: &str) -> Contact {
    Contact {
        id: almon_common::id::next_id(),
        name: name.to_string(),
        phone_number: phone.to_string(),
        active: true,
        created_at: Utc::now(),
    }
}

fn seeded_store(contact_count: usize) -> Arc<FakeStore> {
    almon_common::id::init(1, 1);
    let store = Arc::new(FakeStore::default());
    {
        let mut creds = store.creds.lock().unwrap();
        creds.insert(api_types::EDS.to_string(), cred(api_types::EDS));
        creds.insert(api_types::SMS.to_string(), cred(api_types::SMS));
    }
    {
        let mut contacts = store.contacts.lock().unwrap();
        for i in 0..contact_count {
            contacts.push(contact(&format!("contact-{i}"), &format!("+1555000{i:04}")));
        }
    }
    store
}

fn cycle_with(
    store: Arc<FakeStore>,
    source: Arc<FakeSource>,
    sender: Arc<FakeSender>,
) -> PollCycle {
    PollCycle::new(store, source, sender, 3600)
}

fn stored_event(alarm_id: &str, severity: Severity, secs_ago: i64) -> AlarmEvent {
    let ts = Utc::now() - Duration::seconds(secs_ago);
    AlarmEvent {
        id: almon_common::id::next_id(),
        alarm_id: alarm_id.to_string(),
        description: "stored".to_string(),
        source: "plant-a".to_string(),
        event_time: ts,
        severity,
        status: AlarmStatus::Active,
        raw_data: None,
        created_at: ts,
    }
}

// ---- Cursor ----

#[test]
fn cursor_override_consumed_exactly_once() {
    let store = seeded_store(0);
    let reset_to = Utc::now() - Duration::hours(24);
    store.set_cursor_override(reset_to).unwrap();
    store
        .insert_alarm_event(&stored_event("ALM-1", Severity::High, 60))
        .unwrap();

    let first = resolve_cursor(store.as_ref()).unwrap().unwrap();
    assert_eq!(first, reset_to);

    // Second resolution falls back to the derived watermark
    let second = resolve_cursor(store.as_ref()).unwrap().unwrap();
    assert!(second > reset_to);
    assert_eq!(second, store.max_event_time().unwrap().unwrap());
}

#[test]
fn empty_store_resolves_no_cursor() {
    let store = seeded_store(0);
    assert!(resolve_cursor(store.as_ref()).unwrap().is_none());
}

// ---- Classifier ----

#[test]
fn classifier_discards_low_priority_non_alarms() {
    let raw = RawEvent::from_value(json!({
        "id": "EV-1", "type": "info", "priority": "LOW",
        "description": "routine", "source": "plant-a", "timestamp": 1700000000
    }));
    assert!(classify(&raw, Utc::now()).is_none());
}

#[test]
fn classifier_accepts_critical_priority_regardless_of_type() {
    let raw = RawEvent::from_value(json!({
        "id": "EV-2", "type": "heartbeat", "priority": "CRITICAL",
        "description": "pump stalled", "source": "plant-a", "timestamp": 1700000000
    }));
    let event = classify(&raw, Utc::now()).expect("critical priority is alarm-worthy");
    assert_eq!(event.severity, Severity::Critical);
    assert_eq!(event.alarm_id, "EV-2");
}

#[test]
fn classifier_accepts_alarm_type_with_defaults() {
    let raw = RawEvent::from_value(json!({"id": "EV-3", "type": "Alarm.Breaker"}));
    let event = classify(&raw, Utc::now()).expect("alarm type is alarm-worthy");
    assert_eq!(event.severity, Severity::Medium);
    assert_eq!(event.status, AlarmStatus::Active);
    assert_eq!(event.description, "Unknown alarm");
    assert_eq!(event.source, "Unknown");
    assert_eq!(event.event_time, DateTime::<Utc>::UNIX_EPOCH);
}

#[test]
fn classifier_normalizes_unrecognized_values() {
    let raw = RawEvent::from_value(json!({
        "id": "EV-4", "type": "alarm", "priority": "URGENT", "status": "weird"
    }));
    let event = classify(&raw, Utc::now()).unwrap();
    assert_eq!(event.severity, Severity::Medium);
    assert_eq!(event.status, AlarmStatus::Active);
}

#[test]
fn classifier_keeps_raw_payload() {
    let payload = json!({"id": "EV-5", "type": "alarm", "cabinet": "B2"});
    let raw = RawEvent::from_value(payload.clone());
    let event = classify(&raw, Utc::now()).unwrap();
    assert_eq!(event.raw_data.unwrap(), payload);
}

// ---- Cooldown gate ----

#[test]
fn gate_notifies_on_first_occurrence() {
    let gate = CooldownGate::new(Duration::hours(1));
    let record = stored_event(SOURCE_OFFLINE_ALARM_ID, Severity::High, 0);
    // The window query sees the record itself — identity match still notifies
    assert!(gate.should_notify(&record, Some(&record)));
    assert!(gate.should_notify(&record, None));
}

#[test]
fn gate_suppresses_when_an_older_record_owns_the_window() {
    let gate = CooldownGate::new(Duration::hours(1));
    let older = stored_event(SOURCE_OFFLINE_ALARM_ID, Severity::High, 600);
    let record = stored_event(SOURCE_OFFLINE_ALARM_ID, Severity::High, 0);
    assert!(!gate.should_notify(&record, Some(&older)));
}

// ---- Poll cycle: offline handling ----

#[tokio::test]
async fn offline_detections_within_window_notify_once() {
    let store = seeded_store(2);
    let source = Arc::new(FakeSource::new(false, vec![]));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source.clone(), sender.clone());

    for _ in 0..3 {
        let outcome = cycle.run().await;
        assert!(matches!(outcome, CycleOutcome::SourceOffline));
    }

    // One notification (fanned out to both contacts), three audit records
    assert_eq!(sender.attempts().len(), 2);
    assert_eq!(store.events_with_id(SOURCE_OFFLINE_ALARM_ID).len(), 3);
    let body = &sender.attempts()[0].1;
    assert_eq!(body, "ALARM: EDS API is offline - Monitoring System - HIGH");
}

#[tokio::test]
async fn offline_detection_after_window_notifies_again() {
    let store = seeded_store(1);
    let source = Arc::new(FakeSource::new(false, vec![]));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source.clone(), sender.clone());

    cycle.run().await;
    assert_eq!(sender.attempts().len(), 1);

    // 61 minutes later the window has lapsed
    store.age_events(Duration::minutes(61));
    cycle.run().await;
    assert_eq!(sender.attempts().len(), 2);
}

#[tokio::test]
async fn recovery_clears_offline_alarms_without_notifying() {
    let store = seeded_store(2);
    let source = Arc::new(FakeSource::new(false, vec![]));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source.clone(), sender.clone());

    cycle.run().await;
    cycle.run().await;
    let notified_while_down = sender.attempts().len();

    source.set_probe_ok(true);
    let outcome = cycle.run().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Completed { ingested: 0, notified: 0 }
    ));

    for event in store.events_with_id(SOURCE_OFFLINE_ALARM_ID) {
        assert_eq!(event.status, AlarmStatus::Cleared);
    }
    assert_eq!(sender.attempts().len(), notified_while_down);
}

#[tokio::test]
async fn offline_records_carry_system_fields() {
    let store = seeded_store(1);
    let source = Arc::new(FakeSource::new(false, vec![]));
    let sender = Arc::new(FakeSender::default());
    cycle_with(store.clone(), source, sender).run().await;

    let record = store.events_with_id(SOURCE_OFFLINE_ALARM_ID).remove(0);
    assert_eq!(record.source, SYSTEM_SOURCE);
    assert_eq!(record.severity, Severity::High);
    assert_eq!(record.status, AlarmStatus::Active);
    let raw = record.raw_data.unwrap();
    assert_eq!(raw["type"], "system");
}

// ---- Poll cycle: ingestion and dispatch ----

#[tokio::test]
async fn high_severity_events_dispatch_once_each() {
    let store = seeded_store(2);
    let events = vec![
        json!({"id": "A", "type": "alarm", "priority": "LOW",
               "description": "door ajar", "source": "plant-a", "timestamp": 1700000100}),
        json!({"id": "B", "type": "alarm", "priority": "HIGH",
               "description": "overheat", "source": "plant-a", "timestamp": 1700000200}),
        json!({"id": "C", "type": "trip", "priority": "CRITICAL",
               "description": "breaker trip", "source": "plant-b", "timestamp": 1700000300}),
    ];
    let source = Arc::new(FakeSource::new(true, events));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source, sender.clone());

    let outcome = cycle.run().await;
    match outcome {
        CycleOutcome::Completed { ingested, notified } => {
            assert_eq!(ingested, 3);
            assert_eq!(notified, 2);
        }
        other => panic!("unexpected outcome: {other}"),
    }

    // 2 qualifying events x 2 contacts
    let attempts = sender.attempts();
    assert_eq!(attempts.len(), 4);
    assert!(attempts
        .iter()
        .any(|(_, body)| body == "ALARM: overheat - plant-a - HIGH"));
    assert!(attempts
        .iter()
        .any(|(_, body)| body == "ALARM: breaker trip - plant-b - CRITICAL"));
    assert_eq!(store.events().len(), 3);
}

#[tokio::test]
async fn contact_failure_does_not_stop_the_roster() {
    let store = seeded_store(3);
    let events = vec![json!({"id": "B", "type": "alarm", "priority": "HIGH",
                             "description": "overheat", "source": "plant-a",
                             "timestamp": 1700000200})];
    let source = Arc::new(FakeSource::new(true, events));
    // First roster number fails
    let sender = Arc::new(FakeSender::failing_for(&["+15550000000"]));
    let cycle = cycle_with(store, source, sender.clone());

    let outcome = cycle.run().await;
    assert!(matches!(outcome, CycleOutcome::Completed { notified: 1, .. }));
    // All three contacts were attempted despite the failure
    assert_eq!(sender.attempts().len(), 3);
}

#[tokio::test]
async fn no_new_events_completes_quietly() {
    let store = seeded_store(1);
    let source = Arc::new(FakeSource::new(true, vec![]));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source, sender.clone());

    let outcome = cycle.run().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Completed { ingested: 0, notified: 0 }
    ));
    assert!(sender.attempts().is_empty());
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn missing_credentials_skip_the_cycle() {
    almon_common::id::init(1, 1);
    let store = Arc::new(FakeStore::default());
    let source = Arc::new(FakeSource::new(true, vec![]));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source, sender.clone());

    let outcome = cycle.run().await;
    assert!(matches!(outcome, CycleOutcome::Skipped(_)));
    assert!(store.events().is_empty());
    assert!(sender.attempts().is_empty());
}

// ---- Poll cycle: error branch ----

#[tokio::test]
async fn fetch_failure_raises_truncated_error_alarm() {
    let store = seeded_store(1);
    let long_reason = "x".repeat(400);
    let source = Arc::new(FakeSource::failing_fetch(&long_reason));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source, sender.clone());

    let outcome = cycle.run().await;
    assert!(matches!(outcome, CycleOutcome::SourceError(_)));

    let record = store.events_with_id(SOURCE_ERROR_ALARM_ID).remove(0);
    assert!(record.description.starts_with("EDS API Error: "));
    let stored_reason = record.description.trim_start_matches("EDS API Error: ");
    assert_eq!(stored_reason.chars().count(), 100);

    let attempts = sender.attempts();
    assert_eq!(attempts.len(), 1);
    let body = &attempts[0].1;
    assert!(body.starts_with("ALARM: EDS API Error - "));
    assert!(body.ends_with("... - HIGH"));
}

#[tokio::test]
async fn repeated_errors_within_window_notify_once() {
    let store = seeded_store(1);
    let source = Arc::new(FakeSource::failing_fetch("decode blew up"));
    let sender = Arc::new(FakeSender::default());
    let cycle = cycle_with(store.clone(), source, sender.clone());

    cycle.run().await;
    cycle.run().await;

    assert_eq!(sender.attempts().len(), 1);
    assert_eq!(store.events_with_id(SOURCE_ERROR_ALARM_ID).len(), 2);
}

// ---- Helpers ----

#[test]
fn truncate_chars_respects_char_boundaries() {
    assert_eq!(truncate_chars("hello", 10), "hello");
    assert_eq!(truncate_chars("hello", 3), "hel");
    // Multi-byte characters count as one each and never get split
    assert_eq!(truncate_chars("αβγδε", 3), "αβγ");
    assert_eq!(truncate_chars("", 5), "");
}
