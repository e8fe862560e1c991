//! Shared types for talking to an Arachni REST server: scan ids, creation
//! options, server-reported snapshots and report formats.

mod error;
mod options;
mod report;
mod snapshot;

pub use error::CoreError;
pub use options::ScanOptions;
pub use report::ReportFormat;
pub use snapshot::{parse_runtime, ScanSnapshot, ScanStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Identifier the server assigns to a scan on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(String);

impl ScanId {
    pub fn new(id: impl Into<String>) -> Self {
        ScanId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// False for ids that cannot name a single URL path segment: empty, or a
    /// dot segment that URL normalization would swallow (`.`, `..`, `%2e`).
    pub fn is_addressable(&self) -> bool {
        let decoded = self.0.to_ascii_lowercase().replace("%2e", ".");
        !matches!(decoded.as_str(), "" | "." | "..")
    }

    /// Accepts the id as the server sent it: a non-empty string or a number.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(ScanId(s.clone())),
            serde_json::Value::Number(n) => Some(ScanId(n.to_string())),
            _ => None,
        }
    }
}

impl From<&str> for ScanId {
    fn from(s: &str) -> Self {
        ScanId(s.to_string())
    }
}

impl From<String> for ScanId {
    fn from(s: String) -> Self {
        ScanId(s)
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn scan_id_from_string_or_number() {
        assert_eq!(ScanId::from_json(&json!("a1b2")), Some(ScanId::from("a1b2")));
        assert_eq!(ScanId::from_json(&json!(42)), Some(ScanId::from("42")));
        assert_eq!(ScanId::from_json(&json!("  ")), None);
        assert_eq!(ScanId::from_json(&json!(null)), None);
        assert_eq!(ScanId::from_json(&json!({"id": "x"})), None);
    }

    #[test]
    fn dot_segments_are_not_addressable() {
        for bad in ["", ".", "..", "%2e", "%2E%2e", ".%2E"] {
            assert!(!ScanId::from(bad).is_addressable(), "{bad:?}");
        }
        for good in ["abc", "...", "a.b", "7"] {
            assert!(ScanId::from(good).is_addressable(), "{good:?}");
        }
    }

    #[test]
    fn scan_id_serializes_as_plain_string() {
        let s = serde_json::to_string(&ScanId::new("abc")).unwrap();
        assert_eq!(s, "\"abc\"");
    }
}
