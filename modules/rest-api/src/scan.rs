use crate::client::Client;
use crate::error::{ClientError, Operation};
use arachni_core::{ReportFormat, ScanId, ScanOptions, ScanSnapshot, ScanStatus};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Local handle on a remote scan.
///
/// A scan without an id has not been created on the server yet. The
/// snapshot is whatever the last [`Scan::refresh`] (or the listing that
/// produced this value) returned; accessors never go to the network.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    id: Option<ScanId>,
    options: Option<ScanOptions>,
    snapshot: Option<ScanSnapshot>,
    client: Option<Arc<Client>>,
}

impl Scan {
    /// A scan that will be created from `options` on [`Scan::start`].
    pub fn new(options: ScanOptions) -> Self {
        Scan { options: Some(options), ..Scan::default() }
    }

    /// Handle on a scan that already exists on the server.
    pub fn attach(id: ScanId, client: Arc<Client>) -> Self {
        Scan { id: Some(id), client: Some(client), ..Scan::default() }
    }

    pub(crate) fn from_listing(id: ScanId, snapshot: ScanSnapshot, client: Arc<Client>) -> Self {
        Scan { id: Some(id), options: None, snapshot: Some(snapshot), client: Some(client) }
    }

    pub fn with_client(mut self, client: Arc<Client>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn id(&self) -> Option<&ScanId> {
        self.id.as_ref()
    }

    pub fn options(&self) -> Option<&ScanOptions> {
        self.options.as_ref()
    }

    pub fn snapshot(&self) -> Option<&ScanSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.as_ref()
    }

    /// Target URL from the creation options.
    pub fn url(&self) -> Option<&str> {
        self.options.as_ref()?.url.as_deref()
    }

    pub fn status(&self) -> Option<&ScanStatus> {
        self.snapshot.as_ref()?.status.as_ref()
    }

    pub fn runtime(&self) -> Option<Duration> {
        self.snapshot.as_ref()?.runtime()
    }

    fn require_client(&self, operation: Operation) -> Result<Arc<Client>, ClientError> {
        self.client
            .clone()
            .ok_or(ClientError::Precondition { operation, field: "client" })
    }

    fn require_id(&self, operation: Operation) -> Result<ScanId, ClientError> {
        self.id
            .clone()
            .ok_or(ClientError::Precondition { operation, field: "id" })
    }

    /// Replaces the cached snapshot with the server's current state.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let client = self.require_client(Operation::Refresh)?;
        let id = self.require_id(Operation::Refresh)?;
        self.snapshot = Some(client.fetch_scan(&id).await?);
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), ClientError> {
        let client = self.require_client(Operation::Pause)?;
        let id = self.require_id(Operation::Pause)?;
        client.pause_scan(&id).await
    }

    /// Resumes the scan, or creates it when it has no id yet.
    pub async fn resume(&mut self) -> Result<(), ClientError> {
        let client = self.require_client(Operation::Resume)?;
        match self.id.clone() {
            Some(id) => client.resume_scan(&id).await,
            None => self.create(Operation::Resume, &client).await,
        }
    }

    /// Creates the scan on the server. A scan that already has an id is
    /// resumed instead; it is never created twice.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        let client = self.require_client(Operation::Start)?;
        match self.id.clone() {
            Some(id) => {
                debug!(scan_id = %id, "scan exists, resuming");
                client.resume_scan(&id).await
            }
            None => self.create(Operation::Start, &client).await,
        }
    }

    async fn create(&mut self, operation: Operation, client: &Client) -> Result<(), ClientError> {
        let options = self
            .options
            .as_ref()
            .ok_or(ClientError::Precondition { operation, field: "options" })?;
        if options.url.is_none() {
            return Err(ClientError::Precondition { operation, field: "options.url" });
        }
        self.id = Some(client.create_scan(options).await?);
        Ok(())
    }

    /// Deletes the remote scan and detaches this handle from it.
    pub async fn delete(&mut self) -> Result<(), ClientError> {
        let client = self.require_client(Operation::Delete)?;
        let id = self.require_id(Operation::Delete)?;
        client.delete_scan(&id).await?;
        self.id = None;
        Ok(())
    }

    /// Downloads the report and writes it to disk, returning the path used.
    ///
    /// Unknown or missing formats fetch the server default and are saved
    /// with a `.json` extension. Without a destination the file is
    /// `{id}{ext}` in the working directory; a directory destination gets
    /// that file name inside it; any other destination is the file itself.
    /// A destination ending in a path separator always names a directory
    /// and is created when missing.
    pub async fn download_report(
        &self,
        format: Option<&str>,
        destination: Option<&Path>,
    ) -> Result<PathBuf, ClientError> {
        let client = self.require_client(Operation::Report)?;
        let id = self.require_id(Operation::Report)?;
        let extension = ReportFormat::extension_for(format);
        let data = client
            .fetch_report(&id, format.and_then(ReportFormat::from_name))
            .await?;
        if let Some(dir) = destination.filter(|d| names_directory(d) && !d.is_dir()) {
            fs::create_dir_all(dir)
                .map_err(|source| ClientError::Io { path: dir.to_path_buf(), source })?;
        }
        let path = report_path(&id, extension, destination);
        write_report(&path, &data)?;
        info!(scan_id = %id, path = %path.display(), bytes = data.len(), "report saved");
        Ok(path)
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_ref().map(ScanId::as_str).unwrap_or("-");
        let status = self.status().map(ScanStatus::as_str).unwrap_or("-");
        write!(f, "{} : {}", id, status)
    }
}

fn report_path(id: &ScanId, extension: &str, destination: Option<&Path>) -> PathBuf {
    let name = format!("{}{}", id.as_str().replace(['/', '\\'], "_"), extension);
    match destination {
        None => PathBuf::from(name),
        Some(dir) if dir.is_dir() || names_directory(dir) => dir.join(name),
        Some(file) => file.to_path_buf(),
    }
}

fn names_directory(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .ends_with(|c: char| std::path::is_separator(c))
}

fn write_report(path: &Path, data: &[u8]) -> Result<(), ClientError> {
    let io_err = |source| ClientError::Io { path: path.to_path_buf(), source };
    let mut w = BufWriter::new(File::create(path).map_err(io_err)?);
    w.write_all(data).map_err(io_err)?;
    w.flush().map_err(io_err)?;
    Ok(())
}
