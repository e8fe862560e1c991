use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown report format: {0}")]
    UnknownReportFormat(String),
    #[error("invalid runtime value: {0}")]
    InvalidRuntime(String),
}
