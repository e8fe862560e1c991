//! Client for the Arachni REST API.
//!
//! [`Client`] maps each endpoint under `http://{host}:{port}/scans` to one
//! async call. [`Scan`] wraps a single remote scan, caches the last fetched
//! snapshot and guards its lifecycle calls. One client is meant to be shared
//! by any number of scans through an `Arc`.
//!
//! A `Scan` is not synchronised: its mutating calls take `&mut self`, so
//! sharing one across tasks needs a lock around it.

mod client;
mod error;
mod scan;

pub use arachni_core::{ReportFormat, ScanId, ScanOptions, ScanSnapshot, ScanStatus};
pub use client::{Client, ClientConfig, Credentials, DEFAULT_HOSTNAME, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use error::{ClientError, Operation};
pub use scan::Scan;
