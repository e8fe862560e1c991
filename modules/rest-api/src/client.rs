use crate::error::{ClientError, Operation};
use crate::scan::Scan;
use arachni_core::{ReportFormat, ScanId, ScanOptions, ScanSnapshot};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7331;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Basic credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where the scanner lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub hostname: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    /// Upper bound for a single request, connect included.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self { hostname: hostname.into(), port, ..Self::default() }
    }

    /// Credentials are only kept when both halves are present.
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.credentials = match (username, password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One HTTP session against an Arachni REST server.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    base: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let host = config.hostname.trim();
        if host.is_empty() {
            return Err(ClientError::Config("hostname cannot be empty".into()));
        }
        if config.port == 0 {
            return Err(ClientError::Config("port cannot be 0".into()));
        }
        // Bare IPv6 literals need brackets inside a URL.
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, config.port)
        } else {
            format!("{}:{}", host, config.port)
        };
        let base = Url::parse(&format!("http://{}/", authority))
            .map_err(|e| ClientError::Config(format!("invalid server address {}: {}", authority, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("arachni-client/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        debug!(base = %base, auth = config.credentials.is_some(), "client ready");
        Ok(Client { config, base, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL extended by path segments; each segment is escaped.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `/scans/{id}/{tail..}`, refusing ids that would not stay one segment.
    fn scan_endpoint(&self, operation: Operation, id: &ScanId, tail: &[&str]) -> Result<Url, ClientError> {
        if !id.is_addressable() {
            return Err(ClientError::InvalidId { operation, id: id.clone() });
        }
        let mut segments = vec!["scans", id.as_str()];
        segments.extend_from_slice(tail);
        Ok(self.endpoint(&segments))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.config.credentials {
            Some(c) => req.basic_auth(&c.username, Some(&c.password)),
            None => req,
        }
    }

    async fn send(&self, operation: Operation, req: RequestBuilder) -> Result<Response, ClientError> {
        req.send().await.map_err(|source| ClientError::Transport { operation, source })
    }

    /// Anything but 200 becomes a `Request` error carrying the body.
    async fn expect_ok(
        operation: Operation,
        id: Option<&ScanId>,
        resp: Response,
    ) -> Result<Response, ClientError> {
        if resp.status() == StatusCode::OK {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        warn!(%operation, scan_id = ?id.map(ScanId::as_str), status, "request rejected");
        Err(ClientError::Request { operation, id: id.cloned(), status, body })
    }

    async fn body(operation: Operation, resp: Response) -> Result<Vec<u8>, ClientError> {
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| ClientError::Transport { operation, source })
    }

    /// Status-only call on a scan item (pause, resume, delete).
    async fn command(&self, operation: Operation, method: Method, id: &ScanId, url: Url) -> Result<(), ClientError> {
        let resp = self.send(operation, self.request(method, url)).await?;
        Self::expect_ok(operation, Some(id), resp).await?;
        Ok(())
    }

    /// Lists every scan on the server and fetches each one's state.
    ///
    /// The listing is an array of ids; a map keyed by id is accepted too and
    /// keeps the server's key order.
    pub async fn list_scans(self: &Arc<Self>) -> Result<Vec<Scan>, ClientError> {
        let op = Operation::List;
        let resp = self.send(op, self.request(Method::GET, self.endpoint(&["scans"]))).await?;
        let resp = resp
            .error_for_status()
            .map_err(|source| ClientError::Transport { operation: op, source })?;
        let body = Self::body(op, resp).await?;
        let ids = parse_scan_ids(&body)?;
        debug!(count = ids.len(), "listed scans");

        let mut scans = Vec::with_capacity(ids.len());
        for id in ids {
            let snapshot = self.fetch_scan(&id).await?;
            scans.push(Scan::from_listing(id, snapshot, Arc::clone(self)));
        }
        Ok(scans)
    }

    /// Submits `options` and returns the id the server assigned.
    pub async fn create_scan(&self, options: &ScanOptions) -> Result<ScanId, ClientError> {
        let op = Operation::Create;
        let req = self.request(Method::POST, self.endpoint(&["scans"])).json(options);
        let resp = Self::expect_ok(op, None, self.send(op, req).await?).await?;
        let body = Self::body(op, resp).await?;
        let malformed = |reason: &str| ClientError::MalformedResponse {
            operation: op,
            reason: reason.to_string(),
            body: String::from_utf8_lossy(&body).into_owned(),
        };
        let value: Value = serde_json::from_slice(&body).map_err(|_| malformed("body is not JSON"))?;
        let id = value
            .get("id")
            .and_then(ScanId::from_json)
            .ok_or_else(|| malformed("no usable id"))?;
        info!(scan_id = %id, url = ?options.url, "scan created");
        Ok(id)
    }

    pub async fn fetch_scan(&self, id: &ScanId) -> Result<ScanSnapshot, ClientError> {
        let op = Operation::Fetch;
        let req = self.request(Method::GET, self.scan_endpoint(op, id, &[])?);
        let resp = Self::expect_ok(op, Some(id), self.send(op, req).await?).await?;
        let body = Self::body(op, resp).await?;
        let snapshot: ScanSnapshot =
            serde_json::from_slice(&body).map_err(|e| ClientError::MalformedResponse {
                operation: op,
                reason: e.to_string(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })?;
        debug!(scan_id = %id, status = ?snapshot.status, "fetched scan");
        Ok(snapshot)
    }

    pub async fn pause_scan(&self, id: &ScanId) -> Result<(), ClientError> {
        let url = self.scan_endpoint(Operation::Pause, id, &["pause"])?;
        self.command(Operation::Pause, Method::PUT, id, url).await?;
        info!(scan_id = %id, "scan paused");
        Ok(())
    }

    pub async fn resume_scan(&self, id: &ScanId) -> Result<(), ClientError> {
        let url = self.scan_endpoint(Operation::Resume, id, &["resume"])?;
        self.command(Operation::Resume, Method::PUT, id, url).await?;
        info!(scan_id = %id, "scan resumed");
        Ok(())
    }

    pub async fn delete_scan(&self, id: &ScanId) -> Result<(), ClientError> {
        let url = self.scan_endpoint(Operation::Delete, id, &[])?;
        self.command(Operation::Delete, Method::DELETE, id, url).await?;
        info!(scan_id = %id, "scan deleted");
        Ok(())
    }

    /// Raw report bytes. `None` requests the server's default rendering.
    pub async fn fetch_report(&self, id: &ScanId, format: Option<ReportFormat>) -> Result<Vec<u8>, ClientError> {
        let op = Operation::Report;
        let leaf = match format {
            Some(f) => format!("report.{}", f.name()),
            None => "report".to_string(),
        };
        let req = self.request(Method::GET, self.scan_endpoint(op, id, &[leaf.as_str()])?);
        let resp = Self::expect_ok(op, Some(id), self.send(op, req).await?).await?;
        let bytes = Self::body(op, resp).await?;
        debug!(scan_id = %id, format = ?format.map(ReportFormat::name), bytes = bytes.len(), "fetched report");
        Ok(bytes)
    }
}

fn parse_scan_ids(body: &[u8]) -> Result<Vec<ScanId>, ClientError> {
    let malformed = |reason: &str| ClientError::MalformedResponse {
        operation: Operation::List,
        reason: reason.to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
    };
    let value: Value = serde_json::from_slice(body).map_err(|_| malformed("body is not JSON"))?;
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| ScanId::from_json(v).ok_or_else(|| malformed("listing holds a non-id entry")))
            .collect(),
        Value::Object(map) => Ok(map.keys().map(|k| ScanId::new(k.as_str())).collect()),
        _ => Err(malformed("expected a list of scan ids")),
    }
}
