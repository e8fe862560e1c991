use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Scan state as reported by the server. Unknown states are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    New,
    Ready,
    Preparing,
    Scanning,
    Running,
    Pausing,
    Paused,
    Cleanup,
    Aborted,
    Done,
    #[serde(untagged)]
    Other(String),
}

impl ScanStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ScanStatus::New => "new",
            ScanStatus::Ready => "ready",
            ScanStatus::Preparing => "preparing",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Running => "running",
            ScanStatus::Pausing => "pausing",
            ScanStatus::Paused => "paused",
            ScanStatus::Cleanup => "cleanup",
            ScanStatus::Aborted => "aborted",
            ScanStatus::Done => "done",
            ScanStatus::Other(s) => s,
        }
    }

    /// True once the server will not move the scan any further.
    pub fn is_finished(&self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Aborted)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-fetched server state of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanSnapshot {
    fn statistic(&self, key: &str) -> Option<&Value> {
        self.statistics.as_ref()?.as_object()?.get(key)
    }

    /// `statistics.runtime`, or `None` when it is missing or malformed.
    pub fn runtime(&self) -> Option<Duration> {
        self.statistic("runtime").and_then(|v| parse_runtime(v).ok())
    }

    pub fn current_page(&self) -> Option<&str> {
        self.statistic("current_page").and_then(Value::as_str)
    }

    /// Issues may come as a list or as a bare count.
    pub fn issue_count(&self) -> Option<usize> {
        match self.issues.as_ref()? {
            Value::Array(items) => Some(items.len()),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        }
    }
}

/// Parses a runtime given as `"HH:MM:SS"` (hours unbounded) or as seconds,
/// either numeric or a numeric string.
pub fn parse_runtime(value: &Value) -> Result<Duration, CoreError> {
    let invalid = || CoreError::InvalidRuntime(value.to_string());
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if !s.contains(':') {
                return s
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(invalid);
            }
            let parts: Vec<&str> = s.split(':').collect();
            let [h, m, sec] = parts.as_slice() else { return Err(invalid()) };
            let h: u64 = h.parse().map_err(|_| invalid())?;
            let m: u64 = m.parse().map_err(|_| invalid())?;
            let sec: u64 = sec.parse().map_err(|_| invalid())?;
            if m >= 60 || sec >= 60 {
                return Err(invalid());
            }
            h.checked_mul(3600)
                .and_then(|secs| secs.checked_add(m * 60 + sec))
                .map(Duration::from_secs)
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}
