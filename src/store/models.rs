//! Row types for the persisted series.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How a reachability probe was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Ping,
    Http,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Ping => write!(f, "ping"),
            ProbeMethod::Http => write!(f, "http"),
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Connected,
    Disconnected,
}

/// One reachability check against one target. Written once, never modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub timestamp: DateTime<Utc>,
    pub status: ProbeStatus,
    pub target: String,
    /// Round-trip time in milliseconds, present only when connected.
    pub response_time_ms: Option<f64>,
    pub method: ProbeMethod,
}

impl ProbeResult {
    pub fn is_connected(&self) -> bool {
        self.status == ProbeStatus::Connected
    }
}

/// Kind of a persisted event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Disconnect,
}

/// A completed outage interval, recorded at the moment connectivity returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectEvent {
    /// When the outage began.
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub duration_seconds: f64,
    pub details: String,
}

impl DisconnectEvent {
    pub fn new(start: DateTime<Utc>, duration_seconds: f64, details: String) -> Self {
        Self {
            timestamp: start,
            event_type: EventType::Disconnect,
            duration_seconds,
            details,
        }
    }
}

/// Outcome of one speed-test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeedTestStatus {
    Success,
    Failed { reason: String },
}

impl SpeedTestStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SpeedTestStatus::Success)
    }

    fn from_field(s: &str) -> Self {
        if s == "success" {
            return SpeedTestStatus::Success;
        }
        let reason = s.strip_prefix("failed: ").unwrap_or(s).to_string();
        SpeedTestStatus::Failed { reason }
    }
}

impl fmt::Display for SpeedTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedTestStatus::Success => write!(f, "success"),
            SpeedTestStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

impl Serialize for SpeedTestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpeedTestStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SpeedTestStatus::from_field(&s))
    }
}

/// One speed-test measurement. Measurement fields are present only on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestRecord {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub ping_ms: Option<f64>,
    pub server: Option<String>,
    pub status: SpeedTestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speedtest_status_round_trips() {
        assert_eq!(SpeedTestStatus::Success.to_string(), "success");
        assert_eq!(
            SpeedTestStatus::from_field("success"),
            SpeedTestStatus::Success
        );

        let failed = SpeedTestStatus::Failed {
            reason: "speedtest: tool not found".to_string(),
        };
        assert_eq!(failed.to_string(), "failed: speedtest: tool not found");
        assert_eq!(SpeedTestStatus::from_field(&failed.to_string()), failed);
    }

    #[test]
    fn unknown_status_field_becomes_failed() {
        match SpeedTestStatus::from_field("garbage") {
            SpeedTestStatus::Failed { reason } => assert_eq!(reason, "garbage"),
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
