use almon_common::types::api_types;
use almon_engine::PollCycle;
use almon_notify::SmsSender;
use almon_source::SourceClient;
use almon_storage::sqlite::SqliteAlarmStore;
use almon_storage::AlarmStore;
use anyhow::Result;
use chrono::{Duration, Utc};

/// Marks every stored alarm CLEARED, removes the synthetic `SYSTEM-` rows,
/// and arms the cursor override to 24 hours back so the next fetch re-scans
/// recent history. Runs one immediate poll cycle before returning.
pub async fn clear_alarms(store: &SqliteAlarmStore, cycle: &PollCycle) -> Result<()> {
    let cleared = store.clear_all_alarms()?;
    let deleted = store.delete_system_alarms()?;

    let reset_to = Utc::now() - Duration::hours(24);
    store.set_cursor_override(reset_to)?;
    tracing::info!(
        cleared,
        deleted,
        reset_to = %reset_to,
        "All alarms cleared, cursor reset to check all alarms"
    );

    tracing::info!("Running immediate alarm check after clear");
    let outcome = cycle.run().await;
    tracing::info!(outcome = %outcome, "Post-clear poll cycle finished");
    Ok(())
}

/// Probes both collaborators with the stored credentials and prints their
/// connectivity plus the most recent alarm events.
#[allow(clippy::print_stdout)]
pub async fn status(
    store: &SqliteAlarmStore,
    source: &dyn SourceClient,
    sender: &dyn SmsSender,
) -> Result<()> {
    let eds_status = match store.get_credentials(api_types::EDS)? {
        Some(creds) => {
            if source.probe(&creds).await {
                "connected"
            } else {
                "failed"
            }
        }
        None => "not configured",
    };
    let sms_status = match store.get_credentials(api_types::SMS)? {
        Some(creds) => {
            if sender.check_connection(&creds).await {
                "connected"
            } else {
                "failed"
            }
        }
        None => "not configured",
    };

    println!("EDS source:  {eds_status}");
    println!("SMS gateway: {sms_status}");

    let recent = store.recent_alarms(10)?;
    if recent.is_empty() {
        println!("No alarm events stored.");
        return Ok(());
    }

    println!();
    println!("Most recent alarms:");
    for event in recent {
        let severity = event.severity.to_string();
        let status = event.status.to_string();
        println!(
            "  {}  {:<8}  {:<12}  {} ({})",
            event.event_time.format("%Y-%m-%d %H:%M:%S"),
            severity,
            status,
            event.description,
            event.source
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use almon_common::types::{AlarmEvent, AlarmStatus, Severity};
    use almon_engine::PollCycle;
    use almon_notify::gateway::SmsGatewayClient;
    use almon_source::client::EdsClient;
    use std::sync::Arc;

    fn stored_event(alarm_id: &str) -> AlarmEvent {
        let now = Utc::now();
        AlarmEvent {
            id: almon_common::id::next_id(),
            alarm_id: alarm_id.to_string(),
            description: "tripped".to_string(),
            source: "plant-a".to_string(),
            event_time: now,
            severity: Severity::High,
            status: AlarmStatus::Active,
            raw_data: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn clear_alarms_resets_state_and_arms_the_cursor() {
        almon_common::id::init(1, 1);
        let store = Arc::new(SqliteAlarmStore::open_in_memory().unwrap());
        store.insert_alarm_event(&stored_event("ALM-1")).unwrap();
        store
            .insert_alarm_event(&stored_event("SYSTEM-EDS-OFFLINE"))
            .unwrap();

        // No credentials are stored, so the post-clear cycle is a no-op.
        let cycle = PollCycle::new(
            store.clone(),
            Arc::new(EdsClient::new(2, 5)),
            Arc::new(SmsGatewayClient::new()),
            3600,
        );
        clear_alarms(store.as_ref(), &cycle).await.unwrap();

        let remaining = store.recent_alarms(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].alarm_id, "ALM-1");
        assert_eq!(remaining[0].status, AlarmStatus::Cleared);

        let override_ts = store
            .take_cursor_override()
            .unwrap()
            .expect("clear should arm the cursor override");
        let age = Utc::now() - override_ts;
        assert!(age >= Duration::hours(24) - Duration::minutes(1));
        assert!(age <= Duration::hours(24) + Duration::minutes(1));
    }
}
