use crate::{SourceClient, SourceError};
use almon_common::types::{ApiCredential, RawEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the EDS event API.
///
/// Every operation runs its own login → call → logout sequence; the session
/// token is never held across poll cycles, so a cycle always observes fresh
/// credentials.
pub struct EdsClient {
    client: reqwest::Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<Value>,
}

impl EdsClient {
    pub fn new(probe_timeout_secs: u64, fetch_timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            probe_timeout: Duration::from_secs(probe_timeout_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
        }
    }

    async fn login(&self, creds: &ApiCredential) -> Result<String, SourceError> {
        let base = normalize_base_url(&creds.api_url);
        let payload = serde_json::json!({
            "username": creds.username,
            "password": creds.api_key,
            "type": "alarm-monitor",
        });

        let resp = self
            .client
            .post(format!("{base}/api/v1/login"))
            .timeout(self.probe_timeout)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Auth(format!(
                "login failed with status {status}"
            )));
        }

        let body = resp.text().await?;
        let login: LoginResponse = serde_json::from_str(&body)?;
        login
            .session_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SourceError::Auth("login returned no session id".to_string()))
    }

    async fn logout(&self, base: &str, session_id: &str) {
        let result = self
            .client
            .post(format!("{base}/api/v1/logout"))
            .timeout(self.probe_timeout)
            .bearer_auth(session_id)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "EDS logout failed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "EDS logout request failed");
            }
        }
    }
}

#[async_trait]
impl SourceClient for EdsClient {
    async fn probe(&self, creds: &ApiCredential) -> bool {
        let base = normalize_base_url(&creds.api_url);
        let session_id = match self.login(creds).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "EDS connectivity probe failed at login");
                return false;
            }
        };

        let ping = self
            .client
            .get(format!("{base}/api/v1/ping"))
            .timeout(self.probe_timeout)
            .bearer_auth(&session_id)
            .send()
            .await;

        let ok = match ping {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!(error = %e, "EDS connectivity probe failed at ping");
                false
            }
        };

        self.logout(&base, &session_id).await;
        ok
    }

    async fn fetch_events(
        &self,
        creds: &ApiCredential,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let base = normalize_base_url(&creds.api_url);
        let session_id = self.login(creds).await?;

        let mut filters = Vec::new();
        if let Some(ts) = since {
            let unix = ts.timestamp();
            tracing::info!(since = %ts, unix, "Fetching alarm events since cursor");
            filters.push(serde_json::json!({"ts": {"from": unix}}));
        } else {
            tracing::info!("No cursor, fetching all available events");
        }
        let payload = serde_json::json!({ "filters": filters });

        let resp = self
            .client
            .post(format!("{base}/api/v1/events/read"))
            .timeout(self.fetch_timeout)
            .bearer_auth(&session_id)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            self.logout(&base, &session_id).await;
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(SourceError::Auth(format!(
                    "events read rejected with status {status}"
                )));
            }
            return Err(SourceError::Transport(format!(
                "events read failed with status {status}"
            )));
        }

        let body = resp.text().await?;
        let parsed: Result<EventsResponse, _> = serde_json::from_str(&body);
        self.logout(&base, &session_id).await;

        let events = parsed?.events;
        tracing::info!(count = events.len(), "Received events from EDS");
        Ok(events.into_iter().map(RawEvent::from_value).collect())
    }
}

/// Prepend `https://` when the stored URL carries no scheme, and strip any
/// trailing slash so path joins stay predictable.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
