//! The poll cycle's decision logic: classify raw upstream events, resolve
//! the ingestion cursor, reconcile synthetic pipeline-health alarms with
//! cooldown-based notification throttling, and fan qualifying alarms out to
//! the contact roster.
//!
//! Everything here works against the [`almon_storage::AlarmStore`],
//! [`almon_source::SourceClient`], and [`almon_notify::SmsSender`] traits,
//! so the whole cycle is unit-testable with in-memory fakes.

pub mod classifier;
pub mod cooldown;
pub mod cursor;
pub mod cycle;
pub mod dispatch;
pub mod system;

#[cfg(test)]
mod tests;

pub use cycle::{CycleOutcome, PollCycle};
