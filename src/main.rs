//! CLI binary (§10.6): load configuration, build a [`Resolver`], wire up
//! state snapshot load/autosave, SIGHUP config reload and SIGINT/SIGTERM
//! graceful shutdown, an optional Prometheus `/metrics` endpoint, and either
//! a one-shot report/query or an interactive stdin query loop. A real
//! UDP/TCP listening front end is out of scope (§1); this is the harness a
//! front end would sit behind.

use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use wardendns::config::{Config, RawConfig};
use wardendns::config_reload::{self, ConfigReloader};
use wardendns::error::WardenError;
use wardendns::graceful_shutdown::GracefulShutdown;
use wardendns::metrics::{self, WardenMetrics};
use wardendns::question::{Question, RdClass, RdType};
use wardendns::report;
use wardendns::resolver::Resolver;
use wardendns::snapshot;

/// wardendns: adaptive-selection recursive DNS forwarder core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file. Falls back to built-in defaults overlaid
    /// with `WARDEN_*` environment variables if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured ranking algorithm (bind, bmod, ar1).
    #[arg(long)]
    algorithm: Option<String>,

    /// Tracing filter directive, e.g. "info" or "wardendns=debug".
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured state snapshot path.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Override the configured autosave interval, in seconds.
    #[arg(long)]
    autosave_secs: Option<u64>,

    /// Print the current server-ranking report as plain rows and exit.
    #[arg(long)]
    report: bool,

    /// Print the current server-ranking report as a table and exit.
    #[arg(long)]
    report_table: bool,

    /// Bind address for the Prometheus `/metrics` endpoint, e.g. 127.0.0.1:9100.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Run a single query against `qname` and print the response, then exit.
    #[arg(long)]
    qname: Option<String>,

    /// Record type for --qname (A, AAAA, TXT, MX, NS, PTR, ...).
    #[arg(long, default_value = "A")]
    rdtype: String,
}

fn load_config(args: &Args) -> wardendns::error::Result<Config> {
    let mut raw = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            RawConfig::from_toml_str(&text)?
        }
        None => RawConfig::default(),
    }
    .overlay_env();

    if let Some(algorithm) = &args.algorithm {
        raw.algorithm = Some(algorithm.clone());
    }
    if let Some(state_file) = &args.state_file {
        raw.state_file = Some(state_file.to_string_lossy().into_owned());
    }
    if let Some(secs) = args.autosave_secs {
        raw.autosave_secs = Some(secs);
    }

    Ok(Config::from_raw(raw)?)
}

fn parse_rdtype(s: &str) -> RdType {
    match s.to_ascii_uppercase().as_str() {
        "A" => RdType::A,
        "AAAA" => RdType::Aaaa,
        "ANY" => RdType::Any,
        "CNAME" => RdType::Cname,
        "HTTPS" => RdType::Https,
        "LOC" => RdType::Loc,
        "MX" => RdType::Mx,
        "NS" => RdType::Ns,
        "PTR" => RdType::Ptr,
        "SOA" => RdType::Soa,
        "SRV" => RdType::Srv,
        "SVCB" => RdType::Svcb,
        "TXT" => RdType::Txt,
        _ => RdType::A,
    }
}

fn run_query(resolver: &Resolver, metrics: Option<&WardenMetrics>, qname: &str, rdtype: &str) {
    let q = Question::new(qname, parse_rdtype(rdtype), RdClass::In, 0x0100);
    match resolver.query(q) {
        Ok(resp) => {
            if let Some(metrics) = metrics {
                metrics.observe_response(&resp);
            }
            println!(
                "{} {} {} via {} ({:.4}s){}",
                resp.q.qname(),
                resp.q.rdtype,
                resp.code,
                resp.server,
                resp.rtime,
                resp.failed.as_ref().map(|f| format!(", retried {} server(s)", f.len())).unwrap_or_default(),
            );
            for rr in &resp.rrset {
                println!("  {rr}");
            }
        }
        Err(WardenError::NoCandidates { qname }) => {
            eprintln!("no candidate servers for {qname:?}");
        }
        Err(e) => eprintln!("query failed: {e}"),
    }
}

async fn autosave_loop(resolver: Arc<parking_lot::RwLock<Arc<Resolver>>>, path: PathBuf, interval_secs: u64) {
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        let current = resolver.read().clone();
        if let Err(e) = snapshot::save(&current, &path) {
            warn!(error = %e, "autosave failed");
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let resolver = Arc::new(Resolver::new(config));

    if let Some(path) = resolver.config().state_file.clone() {
        snapshot::load(&resolver, &path);
    }

    if args.report || args.report_table {
        let report = report::build(&resolver);
        if args.report_table {
            print!("{}", report::render_table(&report));
        } else {
            for (tag, rows) in &report.groups {
                println!("== {tag} ==");
                for row in rows {
                    println!("  {}: {:?}", row.server, row.fields);
                }
            }
        }
        return std::process::ExitCode::SUCCESS;
    }

    let metrics = match args.metrics_addr {
        Some(addr) => match WardenMetrics::new() {
            Ok(m) => {
                let m = Arc::new(m);
                let serve_metrics = m.clone();
                tokio::spawn(async move {
                    if let Err(e) = metrics::serve(serve_metrics, addr).await {
                        error!(error = %e, "metrics endpoint exited");
                    }
                });
                Some(m)
            }
            Err(e) => {
                error!(error = %e, "failed to initialize metrics registry");
                None
            }
        },
        None => None,
    };

    let mut reloader = ConfigReloader::new(resolver.clone(), args.config.clone());
    if let Some(rx) = reloader.take_change_receiver() {
        tokio::spawn(config_reload::handle_config_changes(rx));
    }
    if let Err(e) = reloader.start_watching().await {
        warn!(error = %e, "failed to start configuration watcher");
    }
    // Everything below reads through this handle rather than the `resolver`
    // captured above, so a SIGHUP/file-triggered reload actually changes
    // what queries, autosaves, and the final snapshot observe (§5:
    // "subsequent queries use the new one").
    let resolver_handle = reloader.resolver_handle();

    if let (Some(path), Some(secs)) = (
        resolver.config().state_file.clone(),
        resolver.config().autosave_secs,
    ) {
        tokio::spawn(autosave_loop(resolver_handle.clone(), path, secs));
    }

    if let Some(qname) = &args.qname {
        let current = resolver_handle.read().clone();
        run_query(&current, metrics.as_deref(), qname, &args.rdtype);
        let shutdown = GracefulShutdown::new(current);
        let _ = shutdown.shutdown().await;
        return std::process::ExitCode::SUCCESS;
    }

    info!(algorithm = ?resolver.algorithm_kind(), "wardendns started, reading queries from stdin");

    let query_resolver = resolver_handle.clone();
    let query_metrics = metrics.clone();
    let stdin_task = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let qname = match parts.next() {
                Some(q) => q,
                None => continue,
            };
            let rdtype = parts.next().unwrap_or("A");
            let current = query_resolver.read().clone();
            run_query(&current, query_metrics.as_deref(), qname, rdtype);
        }
    });

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received");
        }
        _ = stdin_task => {
            info!("stdin closed");
        }
    }

    let shutdown = GracefulShutdown::new(resolver_handle.read().clone());
    if let Err(e) = shutdown.shutdown().await {
        error!(error = %e, "error during graceful shutdown");
    }

    std::process::ExitCode::SUCCESS
}
