//! Upstream alarm source access.
//!
//! The poll cycle consumes the [`SourceClient`] trait; [`client::EdsClient`]
//! is the HTTP implementation (session login, connectivity ping, filtered
//! event read).

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use almon_common::types::{ApiCredential, RawEvent};

/// Errors raised while talking to the alarm source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Login rejected or no session granted.
    #[error("EDS: authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout, or a non-success HTTP status.
    #[error("EDS: transport error: {0}")]
    Transport(String),

    /// The response body was not the expected JSON shape.
    #[error("EDS: malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Transport(e.to_string())
    }
}

/// Access to the upstream alarm source.
///
/// `probe` is a cheap connectivity check run at the top of every poll cycle;
/// `fetch_events` returns raw events at or after `since` (all available
/// history when `since` is `None`).
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn probe(&self, creds: &ApiCredential) -> bool;

    async fn fetch_events(
        &self,
        creds: &ApiCredential,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, SourceError>;
}
