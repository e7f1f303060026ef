//! Parking bay controller
//!
//! Runs the single-gate parking bay: entry sensor and gate, per-slot
//! presence sensors, identifier assignment, ticketing and fee notification.
//!
//! Module structure:
//! - `domain/` - Core types (SlotId, Timestamp, ClosedTicket, StatusSnapshot)
//! - `io/` - External interfaces (sensor bridge, display, notifiers, status server)
//! - `services/` - Business logic (Bay core, BayController, notification worker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use parking_bay::domain::{StatusSnapshot, Timestamp};
use parking_bay::infra::{Config, HardwareMode, Metrics};
use parking_bay::io::display::show_startup_error;
use parking_bay::io::{
    build_notifier, start_status_server, BayHardware, Display, LogDisplay, SensorBridge, SimBay,
    StatusContext,
};
use parking_bay::services::{create_notify_worker, BayController};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parking bay controller service
#[derive(Parser, Debug)]
#[command(name = "parking-bay", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/bay.toml")]
    config: String,
}

/// Build the hardware and display collaborators for the configured mode
fn open_hardware(config: &Config) -> anyhow::Result<(Box<dyn BayHardware>, Box<dyn Display>)> {
    match config.hardware_mode() {
        HardwareMode::Serial => {
            let bridge = SensorBridge::open(config)?;
            let display = bridge.display();
            Ok((Box::new(bridge), Box::new(display)))
        }
        HardwareMode::Sim => {
            warn!("hardware_mode_sim_no_traffic");
            let sim = SimBay::new(config.slot_count());
            Ok((Box::new(sim.hardware()), Box::new(LogDisplay::new())))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "parking-bay starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        slots = %config.slot_count(),
        price_per_minute_cents = %config.price_per_minute_cents(),
        entry_threshold_cm = %config.entry_threshold_cm(),
        debounce_ms = %config.debounce_ms(),
        exit_grace_ms = %config.exit_grace_ms(),
        no_car_grace_ms = %config.no_car_grace_ms(),
        hardware_mode = ?config.hardware_mode(),
        notify_mode = ?config.notify_mode(),
        status_port = %config.status_port(),
        "config_loaded"
    );

    let (hardware, mut display) = match open_hardware(&config) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %format!("{e:#}"), "hardware_init_failed");
            show_startup_error(&mut LogDisplay::new()).await;
            return Err(e);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Notification worker drains the queue until the controller drops its sender
    let notifier = match build_notifier(&config) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!(error = %format!("{e:#}"), "notifier_init_failed");
            show_startup_error(display.as_mut()).await;
            return Err(e.context("Failed to build notifier"));
        }
    };
    let (notify, notify_worker) =
        create_notify_worker(notifier, metrics.clone(), config.notify_queue_len());
    let notify_handle = tokio::spawn(notify_worker.run());

    let (snapshot_tx, snapshot_rx) =
        watch::channel(Arc::new(StatusSnapshot::starting(config.slot_count())));

    let ctx = StatusContext {
        snapshot_rx,
        metrics: metrics.clone(),
        site: config.site_id().to_string(),
    };
    start_status_server(&config, IpAddr::from([0, 0, 0, 0]), ctx, shutdown_rx.clone()).await;

    // Periodic metrics log line
    let metrics_log_secs = config.metrics_log_secs();
    if metrics_log_secs > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_log_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.summary().log();
            }
        });
    }

    let mut controller =
        BayController::new(config, hardware, display, notify, metrics.clone(), snapshot_tx);
    controller.startup(Timestamp::now()).await;

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;

    // Closing the queue lets the worker flush what is already enqueued
    drop(controller);
    if tokio::time::timeout(Duration::from_secs(5), notify_handle).await.is_err() {
        warn!("notify_worker_flush_timeout");
    }

    metrics.summary().log();
    info!("parking-bay shutdown complete");
    Ok(())
}
