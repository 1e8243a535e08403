use almon_engine::PollCycle;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Recurring driver for the poll cycle.
///
/// A fixed-interval tick fires the cycle; ticks are awaited serially on one
/// task so at most one cycle runs at a time. A tick that fires late but
/// inside the misfire grace period still runs; one later than that is
/// skipped with a warning and the schedule resumes from the late fire.
pub struct PollScheduler {
    cycle: PollCycle,
    interval: Duration,
    misfire_grace: Duration,
}

impl PollScheduler {
    pub fn new(cycle: PollCycle, interval_secs: u64, misfire_grace_secs: u64) -> Self {
        Self {
            cycle,
            interval: Duration::from_secs(interval_secs),
            misfire_grace: Duration::from_secs(misfire_grace_secs),
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            misfire_grace_secs = self.misfire_grace.as_secs(),
            "Alarm poll scheduler started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        let mut due = Instant::now();
        loop {
            let fired = tick.tick().await;
            let lateness = fired.saturating_duration_since(due);
            due = fired + self.interval;

            if !within_misfire_grace(lateness, self.misfire_grace) {
                tracing::warn!(
                    late_secs = lateness.as_secs(),
                    "Tick fired beyond the misfire grace period, skipping this cycle"
                );
                continue;
            }

            let outcome = self.cycle.run().await;
            tracing::info!(outcome = %outcome, "Poll cycle finished");
        }
    }
}

/// Whether a tick that fired `lateness` past its schedule should still run.
pub fn within_misfire_grace(lateness: Duration, grace: Duration) -> bool {
    lateness <= grace
}
