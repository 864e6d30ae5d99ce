//! Shelf scanner - RFID shelf presence monitoring
//!
//! Reads a multi-antenna RFID reader, debounces detections into per-antenna
//! presence and writes every settled change as a JSON line.
//!
//! Module structure:
//! - `domain/` - Core types (tags, antennas, change events)
//! - `io/` - External interfaces (serial reader, replay, egress, HTTP)
//! - `services/` - Scan logic (parser, tag filter, scanner)
//! - `infra/` - Infrastructure (config, errors, metrics)

use anyhow::Context;
use clap::Parser;
use shelf_scanner::domain::ScanEvent;
use shelf_scanner::infra::{Config, Metrics, ScannerSettings};
use shelf_scanner::io::{
    start_http_server, ChangeEgress, HttpContext, ReplayTransport, SerialTransport, Transport,
};
use shelf_scanner::services::Scanner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Shelf scanner - RFID presence detection per antenna
#[derive(Parser, Debug)]
#[command(name = "shelf-scanner", version = VERSION, about)]
struct Args {
    /// Path to TOML configuration file (defaults to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Replay a capture file instead of reading the serial reader
    #[arg(long)]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-cycle visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(version = %VERSION, "shelf-scanner starting");

    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()))?;
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        antennas = %config.antenna_count(),
        scan_duration_ms = %config.scan_duration_ms(),
        window_size = %config.window_size(),
        filter_method = %config.filter_method(),
        auto_resume = %config.auto_resume(),
        egress_file = %config.egress_file(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let settings = config
        .scanner_settings()
        .with_context(|| format!("Invalid scanner settings in {}", config.config_file()))?;
    let metrics = Arc::new(Metrics::new());

    match args.replay {
        Some(path) => {
            let transport = ReplayTransport::from_file(&path)?.paced(true);
            run(&config, settings, transport, metrics).await
        }
        None => {
            let transport = SerialTransport::new(&config);
            run(&config, settings, transport, metrics).await
        }
    }
}

async fn run<T: Transport + 'static>(
    config: &Config,
    settings: ScannerSettings,
    transport: T,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let (scanner, handle, mut events) = Scanner::new(settings, transport, metrics.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start HTTP server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let ctx = HttpContext {
            metrics: metrics.clone(),
            scanner: handle.clone(),
            site_id: config.site_id().to_string(),
        };
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(http_port, ctx, http_shutdown).await {
                error!(error = %e, "http_server_error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Stop the scan loop on Ctrl+C; the event stream then closes
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        signal_handle.stop();
    });

    let scan_task = tokio::spawn(scanner.run());
    let egress = ChangeEgress::new(config.egress_file());
    let mut failure = None;

    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Changed(change) => {
                for (antenna, delta) in &change.antennas {
                    info!(
                        cycle = %change.cycle,
                        antenna = %antenna,
                        count = %delta.count,
                        added = ?delta.added,
                        removed = ?delta.removed,
                        "antenna_presence_changed"
                    );
                }
                egress.write_change(&change);
                if config.auto_resume() {
                    handle.start();
                }
            }
            ScanEvent::TransportFailed { error } => {
                error!(error = %error, "scanner_transport_failed");
                failure = Some(error);
            }
        }
    }

    scan_task.await.context("scan task panicked")?;
    let _ = shutdown_tx.send(true);
    metrics.report().log();
    info!("shelf-scanner shutdown complete");

    match failure {
        Some(error) => Err(anyhow::anyhow!("reader transport failed: {error}")),
        None => Ok(()),
    }
}
