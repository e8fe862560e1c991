use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rest_api::{Client, ClientConfig, Scan, ScanId, ScanOptions, ScanStatus};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

const DEFAULT_WAIT_INTERVAL_MS: u64 = 5000;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "arachni-client", version, about = "Command-line client for the Arachni REST API")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./arachni.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Scanner host (default: 127.0.0.1)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Scanner REST port (default: 7331)
    #[arg(long, global = true)]
    port: Option<u16>,
    /// HTTP Basic username; only used together with --password
    #[arg(long, global = true)]
    username: Option<String>,
    /// HTTP Basic password; only used together with --username
    #[arg(long, global = true)]
    password: Option<String>,
    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Output format: text, json, or jsonl
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    /// Log more (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// List all scans on the server with their current state
    List,
    /// Create and start a scan
    Start {
        /// Target URL (may also come from --options-file)
        url: Option<String>,
        /// Extra scanner option as KEY=VALUE; VALUE is parsed as JSON when possible
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
        /// YAML or JSON file with scanner options
        #[arg(long, value_name = "FILE")]
        options_file: Option<PathBuf>,
    },
    /// Show the state of a scan
    Status { id: String },
    /// Pause a running scan
    Pause { id: String },
    /// Resume a paused scan
    Resume { id: String },
    /// Delete a scan from the server
    Delete { id: String },
    /// Download a scan report (json, xml, yaml, html.zip)
    Report {
        id: String,
        /// Report format; unknown values fall back to the server default (json)
        #[arg(long)]
        format: Option<String>,
        /// Output file or directory (default: ./{id}{ext})
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Poll a scan until it is done or aborted
    Wait {
        id: String,
        /// Delay between polls in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Give up after this many polls; 0 polls forever
        #[arg(long)]
        max_polls: Option<u32>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Flags win over the config file, the file over built-in defaults.
fn client_config(cli: &Cli, cfg: &config::Config) -> ClientConfig {
    let server = &cfg.server;
    let mut cc = ClientConfig::default();
    if let Some(h) = cli.host.clone().or_else(|| server.hostname.clone()) { cc.hostname = h; }
    if let Some(p) = cli.port.or(server.port) { cc.port = p; }
    if let Some(ms) = cli.timeout_ms.or(server.timeout_ms) { cc = cc.with_timeout(Duration::from_millis(ms)); }
    cc.with_credentials(
        cli.username.clone().or_else(|| server.username.clone()),
        cli.password.clone().or_else(|| server.password.clone()),
    )
}

/// `KEY=VALUE` pairs; values that parse as JSON keep their type.
fn parse_option(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid --option {:?}: expected KEY=VALUE", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid --option {:?}: empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_options(url: Option<String>, options: &[String], options_file: Option<&Path>) -> Result<ScanOptions> {
    let mut opts = match options_file {
        Some(p) => {
            let s = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            serde_yaml::from_str::<ScanOptions>(&s).with_context(|| format!("parsing {}", p.display()))?
        }
        None => ScanOptions::default(),
    };
    for raw in options {
        let (k, v) = parse_option(raw)?;
        opts = opts.with_option(k, v);
    }
    if let Some(u) = url { opts.url = Some(u); }
    Ok(opts)
}

fn scan_json(scan: &Scan) -> serde_json::Value {
    let snap = scan.snapshot();
    serde_json::json!({
        "id": scan.id(),
        "status": scan.status().map(ScanStatus::as_str),
        "runtime_secs": scan.runtime().map(|d| d.as_secs()),
        "issues": snap.and_then(|s| s.issue_count()),
        "current_page": snap.and_then(|s| s.current_page()),
    })
}

fn scan_text(scan: &Scan) -> String {
    let mut line = scan.to_string();
    if let Some(rt) = scan.runtime() { line.push_str(&format!(" ({}s)", rt.as_secs())); }
    if let Some(n) = scan.snapshot().and_then(|s| s.issue_count()) { line.push_str(&format!(" issues={}", n)); }
    line
}

fn emit(format: OutputFormat, text: &str, obj: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(obj)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(obj)?),
    }
    Ok(())
}

/// An explicit `--out` is used as given. A configured `report.dir` always
/// names a directory and is created when missing.
fn report_destination(out: Option<PathBuf>, dir: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if out.is_some() {
        return Ok(out);
    }
    if let Some(d) = &dir {
        std::fs::create_dir_all(d).with_context(|| format!("creating report dir {}", d.display()))?;
    }
    Ok(dir)
}

/// Size and hex SHA-256 of a written report.
fn file_digest(path: &Path) -> Result<(usize, String)> {
    let data = std::fs::read(path).with_context(|| format!("reading back {}", path.display()))?;
    Ok((data.len(), hex::encode(Sha256::digest(&data))))
}

/// Refreshes `scan` every `interval` until it is done or aborted and
/// returns the number of polls. `max_polls == 0` means no limit.
async fn wait_for<F>(scan: &mut Scan, interval: Duration, max_polls: u32, mut on_poll: F) -> Result<u32>
where
    F: FnMut(&Scan) -> Result<()>,
{
    let mut polls = 0u32;
    loop {
        scan.refresh().await?;
        polls += 1;
        on_poll(scan)?;
        if scan.status().map_or(false, ScanStatus::is_finished) {
            return Ok(polls);
        }
        if max_polls != 0 && polls >= max_polls {
            let id = scan.id().map(ScanId::as_str).unwrap_or("-");
            let status = scan.status().map(ScanStatus::as_str).unwrap_or("unknown");
            bail!("scan {} still {} after {} polls", id, status, polls);
        }
        tokio::time::sleep(interval).await;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let loaded_cfg = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    if let Commands::Version = cli.command {
        println!("arachni-client {} (core {})", env!("CARGO_PKG_VERSION"), arachni_core::version());
        return Ok(());
    }

    let client = Arc::new(Client::new(client_config(&cli, &loaded_cfg))?);
    debug!(base = %client.base_url(), "using scanner");
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, loaded_cfg, client))
}

async fn run(cli: Cli, cfg: config::Config, client: Arc<Client>) -> Result<()> {
    let out = cli.output;
    match cli.command {
        Commands::Version => {}
        Commands::List => {
            let scans = client.list_scans().await?;
            match out {
                OutputFormat::Text => {
                    for s in &scans { println!("{}", scan_text(s)); }
                }
                OutputFormat::Json => {
                    let all: Vec<_> = scans.iter().map(scan_json).collect();
                    println!("{}", serde_json::to_string_pretty(&all)?);
                }
                OutputFormat::Jsonl => {
                    for s in &scans { println!("{}", serde_json::to_string(&scan_json(s))?); }
                }
            }
        }
        Commands::Start { url, options, options_file } => {
            let opts = build_options(url, &options, options_file.as_deref())?;
            let mut scan = Scan::new(opts).with_client(client);
            scan.start().await?;
            let id = scan.id().map(ScanId::as_str).unwrap_or_default();
            emit(out, &format!("started {} for {}", id, scan.url().unwrap_or_default()),
                &serde_json::json!({ "id": id, "url": scan.url(), "at": now_rfc3339() }))?;
        }
        Commands::Status { id } => {
            let mut scan = Scan::attach(ScanId::new(id), client);
            scan.refresh().await?;
            emit(out, &scan_text(&scan), &scan_json(&scan))?;
        }
        Commands::Pause { id } => {
            let mut scan = Scan::attach(ScanId::new(id.clone()), client);
            scan.pause().await?;
            emit(out, &format!("paused {}", id), &serde_json::json!({ "id": id, "action": "pause", "at": now_rfc3339() }))?;
        }
        Commands::Resume { id } => {
            let mut scan = Scan::attach(ScanId::new(id.clone()), client);
            scan.resume().await?;
            emit(out, &format!("resumed {}", id), &serde_json::json!({ "id": id, "action": "resume", "at": now_rfc3339() }))?;
        }
        Commands::Delete { id } => {
            let mut scan = Scan::attach(ScanId::new(id.clone()), client);
            scan.delete().await?;
            emit(out, &format!("deleted {}", id), &serde_json::json!({ "id": id, "action": "delete", "at": now_rfc3339() }))?;
        }
        Commands::Report { id, format, out: dest } => {
            let format = format.or(cfg.report.format);
            let dest = report_destination(dest, cfg.report.dir)?;
            let scan = Scan::attach(ScanId::new(id.clone()), client);
            let path = scan.download_report(format.as_deref(), dest.as_deref()).await?;
            let (bytes, sha256) = file_digest(&path)?;
            emit(out, &format!("{} -> {} ({} bytes, sha256 {})", id, path.display(), bytes, sha256),
                &serde_json::json!({
                    "id": id,
                    "path": path.to_string_lossy(),
                    "bytes": bytes,
                    "sha256": sha256,
                    "at": now_rfc3339(),
                }))?;
        }
        Commands::Wait { id, interval_ms, max_polls } => {
            let interval = Duration::from_millis(
                interval_ms.or(cfg.wait.interval_ms).unwrap_or(DEFAULT_WAIT_INTERVAL_MS),
            );
            let max_polls = max_polls.or(cfg.wait.max_polls).unwrap_or(0);
            let mut scan = Scan::attach(ScanId::new(id), client);
            // json output streams one object per poll as well
            let per_poll = if out == OutputFormat::Json { OutputFormat::Jsonl } else { out };
            wait_for(&mut scan, interval, max_polls, |s| {
                let mut obj = scan_json(s);
                obj["at"] = serde_json::Value::String(now_rfc3339());
                emit(per_poll, &scan_text(s), &obj)
            })
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn option_values_keep_json_types() {
        assert_eq!(parse_option("checks=[\"xss*\"]").unwrap(), ("checks".into(), json!(["xss*"])));
        assert_eq!(parse_option("scope={\"page_limit\": 5}").unwrap().1, json!({"page_limit": 5}));
        assert_eq!(parse_option("no_fingerprinting=true").unwrap().1, json!(true));
        assert_eq!(parse_option("name=nightly run").unwrap().1, json!("nightly run"));
        assert_eq!(parse_option("url=http://a.test/?x=1").unwrap().1, json!("http://a.test/?x=1"));
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=1").is_err());
    }

    #[test]
    fn positional_url_overrides_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("opts.yaml");
        std::fs::write(&p, "url: http://file.test\nchecks: [sqli]\n").unwrap();
        let opts = build_options(Some("http://cli.test".into()), &["audit={\"links\":true}".into()], Some(&p)).unwrap();
        assert_eq!(opts.url.as_deref(), Some("http://cli.test"));
        assert_eq!(opts.extra["checks"], json!(["sqli"]));
        assert_eq!(opts.extra["audit"], json!({"links": true}));
    }

    #[test]
    fn flags_override_config_file() {
        let cli = Cli::parse_from(["arachni-client", "--port", "9000", "--username", "u", "list"]);
        let cfg = config::parse_config("server:\n  hostname: cfg.host\n  port: 1234\n  password: p\n  timeout_ms: 1500\n").unwrap();
        let cc = client_config(&cli, &cfg);
        assert_eq!(cc.hostname, "cfg.host");
        assert_eq!(cc.port, 9000);
        assert_eq!(cc.timeout, Duration::from_millis(1500));
        assert_eq!(cc.credentials.map(|c| (c.username, c.password)), Some(("u".into(), "p".into())));
    }

    #[test]
    fn defaults_without_config() {
        let cli = Cli::parse_from(["arachni-client", "status", "abc"]);
        let cc = client_config(&cli, &config::Config::default());
        assert_eq!(cc.hostname, rest_api::DEFAULT_HOSTNAME);
        assert_eq!(cc.port, rest_api::DEFAULT_PORT);
        assert!(cc.credentials.is_none());
    }

    fn client_for(server: &mockito::ServerGuard) -> Arc<Client> {
        let addr = server.socket_address();
        Arc::new(Client::new(ClientConfig::new(addr.ip().to_string(), addr.port())).unwrap())
    }

    /// Serves `running` for the first `running_for` fetches, then `last`.
    async fn status_sequence(server: &mut mockito::ServerGuard, running_for: usize, last: &'static str) -> mockito::Mock {
        let hits = Arc::new(AtomicUsize::new(0));
        server
            .mock("GET", "/scans/w1")
            .with_status(200)
            .with_body_from_request(move |_| {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let status = if n < running_for { "running" } else { last };
                format!(r#"{{"status": "{}"}}"#, status).into()
            })
            .create_async()
            .await
    }

    #[tokio::test]
    async fn wait_stops_when_done() {
        let mut server = mockito::Server::new_async().await;
        let _m = status_sequence(&mut server, 2, "done").await;
        let mut scan = Scan::attach(ScanId::from("w1"), client_for(&server));
        let mut seen = Vec::new();
        let polls = wait_for(&mut scan, Duration::from_millis(1), 10, |s| {
            seen.push(s.status().map(ScanStatus::as_str).unwrap_or("-").to_string());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(polls, 3);
        assert_eq!(seen, ["running", "running", "done"]);
    }

    #[tokio::test]
    async fn wait_stops_when_aborted() {
        let mut server = mockito::Server::new_async().await;
        let _m = status_sequence(&mut server, 1, "aborted").await;
        let mut scan = Scan::attach(ScanId::from("w1"), client_for(&server));
        let polls = wait_for(&mut scan, Duration::from_millis(1), 5, |_| Ok(())).await.unwrap();
        assert_eq!(polls, 2);
        assert_eq!(scan.status(), Some(&ScanStatus::Aborted));
    }

    #[tokio::test]
    async fn wait_gives_up_after_max_polls() {
        let mut server = mockito::Server::new_async().await;
        let _m = status_sequence(&mut server, usize::MAX, "done").await;
        let mut scan = Scan::attach(ScanId::from("w1"), client_for(&server));
        let mut calls = 0;
        let err = wait_for(&mut scan, Duration::from_millis(1), 3, |_| {
            calls += 1;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.to_string(), "scan w1 still running after 3 polls");
    }

    #[tokio::test]
    async fn zero_max_polls_waits_until_finished() {
        let mut server = mockito::Server::new_async().await;
        let _m = status_sequence(&mut server, 12, "done").await;
        let mut scan = Scan::attach(ScanId::from("w1"), client_for(&server));
        let polls = wait_for(&mut scan, Duration::from_millis(1), 0, |_| Ok(())).await.unwrap();
        assert_eq!(polls, 13);
    }

    #[tokio::test]
    async fn wait_surfaces_fetch_errors() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/scans/w1").with_status(404).create_async().await;
        let mut scan = Scan::attach(ScanId::from("w1"), client_for(&server));
        let err = wait_for(&mut scan, Duration::from_millis(1), 0, |_| Ok(())).await.unwrap_err();
        assert!(err.downcast_ref::<rest_api::ClientError>().is_some());
    }

    #[test]
    fn digest_of_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("r.json");
        std::fs::write(&p, "abc").unwrap();
        let (bytes, sha256) = file_digest(&p).unwrap();
        assert_eq!(bytes, 3);
        assert_eq!(sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert!(file_digest(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn out_flag_wins_over_report_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join("reports");
        let out = dir.path().join("one.xml");
        assert_eq!(report_destination(Some(out.clone()), Some(cfg_dir.clone())).unwrap(), Some(out));
        assert!(!cfg_dir.exists());
        assert_eq!(report_destination(None, None).unwrap(), None);
    }

    #[tokio::test]
    async fn missing_report_dir_is_created() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/scans/abc/report.xml")
            .with_status(200)
            .with_body("<report/>")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::parse_config(&format!("report:\n  dir: {}\n", dir.path().join("reports").display())).unwrap();
        let dest = report_destination(None, cfg.report.dir).unwrap();
        let scan = Scan::attach(ScanId::from("abc"), client_for(&server));
        let path = scan.download_report(Some("xml"), dest.as_deref()).await.unwrap();
        assert_eq!(path, dir.path().join("reports").join("abc.xml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<report/>");
    }

    #[test]
    fn scan_json_for_uncreated_scan() {
        let scan = Scan::new(ScanOptions::for_url("http://example.test"));
        assert_eq!(
            scan_json(&scan),
            json!({"id": null, "status": null, "runtime_secs": null, "issues": null, "current_page": null})
        );
        assert_eq!(scan_text(&scan), "- : -");
    }
}
