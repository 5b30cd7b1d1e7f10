//! Danmu - Douyin live-room event capture.
//!
//! Runs a local MITM proxy. Point a browser (with the Danmu CA trusted) at it
//! and open a live room; chat, gift and room events are printed to stdout as
//! `DY_DATA::<json>` lines. Logs go to stderr and a rolling file.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use danmu_proxy::{ProxyConfig, ProxyServer};
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Danmu - capture Douyin live-room chat and gifts through a local proxy
#[derive(Parser, Debug)]
#[command(name = "danmu", version, about)]
struct Args {
    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (e.g. 127.0.0.1:8081)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Port to listen on, keeping the configured address
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the MITM CA certificate and key
    #[arg(long)]
    ca_dir: Option<PathBuf>,

    /// Verify upstream TLS certificates against the system roots
    #[arg(long)]
    secure_upstream: bool,

    /// Host pattern to intercept (repeatable; replaces the defaults)
    #[arg(long = "allow-host", value_name = "PATTERN")]
    allow_hosts: Vec<String>,

    /// Never buffer responses larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    stream_large_bodies: Option<u64>,

    /// Print the CA certificate (PEM) to stdout and exit
    #[arg(long)]
    print_ca: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to stderr only
    #[arg(long)]
    no_log_file: bool,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "danmu", "Danmu").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging. stdout carries events, so logs never go there.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("danmu={},warn", log_level)));

    let file_appender = logs_dir()
        .filter(|_| !args.no_log_file)
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .and_then(|dir| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("danmu")
                .filename_suffix("log")
                .build(&dir)
                .ok()
                .map(|appender| (dir, appender))
        });

    if let Some((log_dir, appender)) = file_appender {
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        tracing::info!("Logging to {:?}", log_dir);
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if !args.no_log_file {
        tracing::warn!("File logging unavailable, using stderr only");
    }
    None
}

/// Loads the config file (if any) and applies command-line overrides.
fn build_config(args: &Args) -> anyhow::Result<ProxyConfig> {
    let mut config = match &args.config {
        Some(path) => ProxyConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProxyConfig::default(),
    };

    if let Some(addr) = args.listen {
        config = config.with_addr(addr);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(dir) = &args.ca_dir {
        config = config.with_ca_dir(dir);
    }
    if args.secure_upstream {
        config = config.with_insecure_upstream(false);
    }
    if !args.allow_hosts.is_empty() {
        config = config.with_allowed_hosts(args.allow_hosts.iter().cloned());
    }
    if let Some(bytes) = args.stream_large_bodies {
        config = config.with_stream_large_bodies(bytes);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let config = build_config(&args)?;

    if args.print_ca {
        let ca_manager = config.ca_manager()?;
        ca_manager.ensure_ca()?;
        print!("{}", ca_manager.read_cert_pem()?);
        return Ok(());
    }

    tracing::info!("Danmu v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Config: {:?}", config);

    let server = ProxyServer::new(config).context("setting up proxy")?;
    tracing::info!(
        "Set your browser proxy to {} and trust {:?}",
        server.addr(),
        server.ca_cert_path()
    );

    let handle = server.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");
    handle.stop().await;

    Ok(())
}
