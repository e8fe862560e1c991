use arachni_core::ScanId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Remote call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Start,
    Refresh,
    Create,
    Fetch,
    Pause,
    Resume,
    Delete,
    Report,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Start => "start",
            Operation::Refresh => "refresh",
            Operation::Create => "create",
            Operation::Fetch => "fetch",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Delete => "delete",
            Operation::Report => "report",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn scan_label(id: &Option<ScanId>) -> String {
    match id {
        Some(id) => format!(" for scan {}", id),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// A field the call needs was not set. Caller bug; nothing was sent.
    #[error("{operation}: {field} cannot be None")]
    Precondition { operation: Operation, field: &'static str },

    /// The id cannot name a single scan in a URL path (empty, `.` or `..`).
    #[error("{operation}: {id:?} is not a usable scan id")]
    InvalidId { operation: Operation, id: ScanId },

    /// The server answered with something other than 200.
    #[error("{operation} failed{} with HTTP {status}: {body}", scan_label(.id))]
    Request { operation: Operation, id: Option<ScanId>, status: u16, body: String },

    /// 200, but the body was not what the endpoint promises.
    #[error("malformed {operation} response: {reason}: {body}")]
    MalformedResponse { operation: Operation, reason: String, body: String },

    /// The request never completed: connect, DNS, timeout, or a failed
    /// status on the collection listing.
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("cannot write report to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Scan id the failure refers to, when there is one.
    pub fn scan_id(&self) -> Option<&ScanId> {
        match self {
            ClientError::Request { id, .. } => id.as_ref(),
            ClientError::InvalidId { id, .. } => Some(id),
            _ => None,
        }
    }
}
