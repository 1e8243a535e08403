use crate::classifier::classify;
use crate::cursor::resolve_cursor;
use crate::dispatch::Dispatcher;
use crate::system::{SystemAlarms, SystemReason};
use almon_common::types::{api_types, AlarmEvent, ApiCredential, Contact, Severity};
use almon_notify::SmsSender;
use almon_source::{SourceClient, SourceError};
use almon_storage::error::StoreError;
use almon_storage::AlarmStore;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// How one poll cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Events were fetched; `ingested` persisted, `notified` of them
    /// qualified for a dispatch.
    Completed { ingested: usize, notified: usize },
    /// Preconditions were missing; nothing was attempted.
    Skipped(&'static str),
    /// The connectivity probe failed; no fetch was attempted this tick.
    SourceOffline,
    /// The cycle failed after a successful probe.
    SourceError(String),
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Completed { ingested, notified } => {
                write!(f, "completed: {ingested} ingested, {notified} notified")
            }
            CycleOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            CycleOutcome::SourceOffline => write!(f, "source offline"),
            CycleOutcome::SourceError(reason) => write!(f, "source error: {reason}"),
        }
    }
}

/// Failure inside the guarded portion of a cycle (steps after credential
/// loading). Converted into a SOURCE-ERROR synthetic alarm at the cycle
/// boundary; never propagated to the scheduler.
#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One scheduler tick's worth of work: cursor → probe → fetch → classify →
/// persist → notify, with synthetic-alarm bookkeeping on the failure paths.
///
/// Holds no state across ticks; everything is recovered from the store.
pub struct PollCycle {
    store: Arc<dyn AlarmStore>,
    source: Arc<dyn SourceClient>,
    dispatcher: Dispatcher,
    system: SystemAlarms,
}

impl PollCycle {
    pub fn new(
        store: Arc<dyn AlarmStore>,
        source: Arc<dyn SourceClient>,
        sender: Arc<dyn SmsSender>,
        cooldown_secs: u64,
    ) -> Self {
        Self {
            store,
            source,
            dispatcher: Dispatcher::new(sender),
            system: SystemAlarms::new(Duration::seconds(cooldown_secs as i64)),
        }
    }

    pub async fn run(&self) -> CycleOutcome {
        let eds_creds = match self.store.get_credentials(api_types::EDS) {
            Ok(Some(creds)) => creds,
            Ok(None) => {
                tracing::warn!("No EDS credentials configured");
                return CycleOutcome::Skipped("missing eds credentials");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load EDS credentials");
                return CycleOutcome::Skipped("store unavailable");
            }
        };
        let sms_creds = match self.store.get_credentials(api_types::SMS) {
            Ok(Some(creds)) => creds,
            Ok(None) => {
                tracing::warn!("No SMS credentials configured");
                return CycleOutcome::Skipped("missing sms credentials");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load SMS credentials");
                return CycleOutcome::Skipped("store unavailable");
            }
        };
        let contacts = match self.store.active_contacts() {
            Ok(contacts) if !contacts.is_empty() => contacts,
            Ok(_) => {
                tracing::warn!("No active contacts on the notification roster");
                return CycleOutcome::Skipped("no active contacts");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load contact roster");
                return CycleOutcome::Skipped("store unavailable");
            }
        };

        match self.run_guarded(&eds_creds, &sms_creds, &contacts).await {
            Ok(outcome) => outcome,
            Err(err) => self.record_source_error(&sms_creds, &contacts, &err).await,
        }
    }

    async fn run_guarded(
        &self,
        eds_creds: &ApiCredential,
        sms_creds: &ApiCredential,
        contacts: &[Contact],
    ) -> Result<CycleOutcome, CycleError> {
        let cursor = resolve_cursor(self.store.as_ref())?;

        if !self.source.probe(eds_creds).await {
            return Ok(self.record_source_offline(sms_creds, contacts).await);
        }

        let recovered = self.system.reconcile_recovery(self.store.as_ref())?;
        if recovered > 0 {
            tracing::info!(recovered, "Connection to EDS restored, cleared offline alarms");
        }

        let raw_events = self.source.fetch_events(eds_creds, cursor).await?;
        let now = Utc::now();
        let accepted: Vec<AlarmEvent> = raw_events
            .iter()
            .filter_map(|raw| classify(raw, now))
            .collect();

        if accepted.is_empty() {
            tracing::info!("No new alarms found");
            return Ok(CycleOutcome::Completed {
                ingested: 0,
                notified: 0,
            });
        }

        // Commit first; dispatch only for durably recorded events.
        self.store.insert_alarm_events(&accepted)?;
        tracing::info!(count = accepted.len(), "Persisted new alarm events");

        let mut notified = 0;
        for event in &accepted {
            if event.severity >= Severity::High {
                let message = format!(
                    "ALARM: {} - {} - {}",
                    event.description, event.source, event.severity
                );
                self.dispatcher.dispatch(sms_creds, contacts, &message).await;
                notified += 1;
            }
        }

        Ok(CycleOutcome::Completed {
            ingested: accepted.len(),
            notified,
        })
    }

    async fn record_source_offline(
        &self,
        sms_creds: &ApiCredential,
        contacts: &[Contact],
    ) -> CycleOutcome {
        tracing::error!("EDS connectivity probe failed");
        let reason = SystemReason::SourceOffline;
        match self.system.raise(self.store.as_ref(), &reason) {
            Ok((_, true)) => {
                self.dispatcher
                    .dispatch(sms_creds, contacts, &reason.notification())
                    .await;
            }
            Ok((record, false)) => {
                tracing::info!(
                    alarm_id = %record.alarm_id,
                    "Notification suppressed, condition already active within cooldown"
                );
            }
            Err(e) => {
                // Recording the failure failed too; stop here rather than
                // raising an alarm about the alarm.
                tracing::error!(error = %e, "Failed to record system alarm");
            }
        }
        CycleOutcome::SourceOffline
    }

    async fn record_source_error(
        &self,
        sms_creds: &ApiCredential,
        contacts: &[Contact],
        err: &CycleError,
    ) -> CycleOutcome {
        let detail = err.to_string();
        tracing::error!(error = %detail, "Poll cycle failed");
        let reason = SystemReason::SourceError(&detail);
        match self.system.raise(self.store.as_ref(), &reason) {
            Ok((_, true)) => {
                self.dispatcher
                    .dispatch(sms_creds, contacts, &reason.notification())
                    .await;
            }
            Ok((record, false)) => {
                tracing::info!(
                    alarm_id = %record.alarm_id,
                    "Notification suppressed, condition already active within cooldown"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record system alarm");
            }
        }
        CycleOutcome::SourceError(detail)
    }
}
