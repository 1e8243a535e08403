use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alarm severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use almon_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "HIGH");
/// assert!(Severity::Critical > Severity::Medium);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle status of a stored alarm event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmStatus {
    Active,
    Cleared,
    Acknowledged,
}

impl std::fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmStatus::Active => write!(f, "ACTIVE"),
            AlarmStatus::Cleared => write!(f, "CLEARED"),
            AlarmStatus::Acknowledged => write!(f, "ACKNOWLEDGED"),
        }
    }
}

impl std::str::FromStr for AlarmStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(AlarmStatus::Active),
            "CLEARED" => Ok(AlarmStatus::Cleared),
            "ACKNOWLEDGED" => Ok(AlarmStatus::Acknowledged),
            _ => Err(format!("unknown alarm status: {s}")),
        }
    }
}

/// A persisted alarm event, either ingested from the upstream source or
/// synthesized by the monitor itself when the pipeline degrades.
///
/// `event_time` is the upstream-reported occurrence time; `created_at` is
/// when this row was written. The two differ under upstream clock skew or
/// delayed ingestion, and the cursor is derived from `event_time` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: String,
    /// Upstream alarm identifier, or a `SYSTEM-` prefixed synthetic code.
    pub alarm_id: String,
    pub description: String,
    pub source: String,
    pub event_time: DateTime<Utc>,
    pub severity: Severity,
    pub status: AlarmStatus,
    /// Raw upstream payload, kept for diagnostics only.
    pub raw_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// A phone contact on the notification roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Stored credentials for an external API (`"eds"` or `"sms"`).
///
/// For the alarm source, `username`/`api_key` are the login pair. For the
/// SMS gateway, `username` is the account id, `api_key` the auth token, and
/// `api_secret` the sending phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: String,
    pub api_type: String,
    pub api_url: String,
    pub username: String,
    pub api_key: String,
    pub api_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Well-known `api_type` values.
pub mod api_types {
    pub const EDS: &str = "eds";
    pub const SMS: &str = "sms";
}

/// An event as returned by the upstream source, before classification.
///
/// Field extraction is lenient: anything missing or of the wrong JSON type
/// becomes the empty string / zero, and the full payload is retained in
/// `raw` for the audit trail.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub id: String,
    pub event_type: String,
    pub priority: String,
    pub status: String,
    pub description: String,
    pub source: String,
    /// Upstream occurrence time as unix epoch seconds; 0 when absent.
    pub timestamp: i64,
    pub raw: Value,
}

impl RawEvent {
    pub fn from_value(value: Value) -> Self {
        let field = |key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: field("id"),
            event_type: field("type"),
            priority: field("priority"),
            status: field("status"),
            description: field("description"),
            source: field("source"),
            timestamp: value.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
            raw: value,
        }
    }
}
