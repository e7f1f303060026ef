//! Parking bay simulator
//!
//! Runs the real controller against simulated sensors and drives a
//! deterministic stream of cars through it: car k arrives at k x gap,
//! waits for the gate, parks in the lowest free bay, stays dwell + k
//! seconds and leaves.
//!
//! Usage:
//!   bay-sim --cars 5 --arrival-gap-secs 4 --dwell-secs 10

use clap::Parser;
use parking_bay::domain::{SlotIndex, StatusSnapshot, Timestamp};
use parking_bay::infra::{Config, HardwareMode, Metrics};
use parking_bay::io::display::show_startup_error;
use parking_bay::io::{build_notifier, start_status_server, LogDisplay, SimBay, StatusContext};
use parking_bay::services::{create_notify_worker, BayController};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Distance reported while a car waits at the entry
const CAR_AT_ENTRY_CM: f64 = 8.0;
/// How long a car waits for the gate before driving off
const GATE_WAIT: Duration = Duration::from_secs(3);
/// Time to drive from the gate into a bay
const DRIVE_IN: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "bay-sim", version, about = "Drive simulated traffic through the bay")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/sim.toml")]
    config: String,

    /// Number of cars to send
    #[arg(long, default_value_t = 5)]
    cars: u32,

    /// Seconds between consecutive arrivals
    #[arg(long, default_value_t = 4)]
    arrival_gap_secs: u64,

    /// Base stay in seconds; car k stays this plus k seconds
    #[arg(long, default_value_t = 10)]
    dwell_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Parked,
    TurnedAway,
    NoFreeBay,
}

/// Drive one car through the entry, a bay and back out
async fn drive_car(
    car: u32,
    sim: SimBay,
    bays: Arc<Mutex<Vec<bool>>>,
    start: Instant,
    args: Arc<Args>,
) -> Outcome {
    let arrival = start + Duration::from_secs(u64::from(car) * args.arrival_gap_secs);
    tokio::time::sleep_until(arrival).await;

    info!(car = %car, "car_at_entry");
    sim.set_distance(Some(CAR_AT_ENTRY_CM));

    let deadline = Instant::now() + GATE_WAIT;
    while !sim.gate_open() {
        if Instant::now() >= deadline {
            sim.set_distance(None);
            info!(car = %car, "car_turned_away");
            return Outcome::TurnedAway;
        }
        sleep(Duration::from_millis(50)).await;
    }

    sleep(DRIVE_IN).await;
    sim.set_distance(None);

    let bay = {
        let mut bays = bays.lock();
        let free = bays.iter().position(|taken| !taken);
        if let Some(i) = free {
            bays[i] = true;
        }
        free
    };
    let Some(bay) = bay else {
        warn!(car = %car, "car_found_no_free_bay");
        return Outcome::NoFreeBay;
    };

    let index = SlotIndex(bay);
    let dwell = Duration::from_secs(args.dwell_secs + u64::from(car));
    sim.set_presence(index, true);
    info!(car = %car, slot = %index, dwell_secs = %dwell.as_secs(), "car_parked");

    sleep(dwell).await;

    sim.set_presence(index, false);
    bays.lock()[bay] = false;
    info!(car = %car, slot = %index, "car_left");
    Outcome::Parked
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Arc::new(Args::parse());
    let config = Config::load_from_path(&args.config).with_hardware_mode(HardwareMode::Sim);

    info!(
        config_file = %config.config_file(),
        slots = %config.slot_count(),
        cars = %args.cars,
        arrival_gap_secs = %args.arrival_gap_secs,
        dwell_secs = %args.dwell_secs,
        "bay_sim_starting"
    );

    let sim = SimBay::new(config.slot_count());
    let metrics = Arc::new(Metrics::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut display = LogDisplay::new();
    let notifier = match build_notifier(&config) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!(error = %format!("{e:#}"), "notifier_init_failed");
            show_startup_error(&mut display).await;
            return Err(e);
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
    start_status_server(&config, IpAddr::from([127, 0, 0, 1]), ctx, shutdown_rx.clone()).await;

    // Time for the last departure to debounce and clear the exit grace
    let settle = Duration::from_millis(
        config.debounce_ms() + config.exit_grace_ms() + config.no_car_grace_ms() + 500,
    );
    let slot_count = config.slot_count();

    let mut controller = BayController::new(
        config,
        Box::new(sim.hardware()),
        Box::new(display),
        notify,
        metrics.clone(),
        snapshot_tx,
    );
    controller.startup(Timestamp::now()).await;
    let controller_handle = tokio::spawn(async move {
        controller.run(shutdown_rx).await;
    });

    let bays = Arc::new(Mutex::new(vec![false; slot_count]));
    let start = Instant::now();
    let cars: Vec<_> = (0..args.cars)
        .map(|car| {
            tokio::spawn(drive_car(car, sim.clone(), bays.clone(), start, args.clone()))
        })
        .collect();

    let mut parked = 0u32;
    let mut turned_away = 0u32;
    let mut no_free_bay = 0u32;
    for car in cars {
        match car.await? {
            Outcome::Parked => parked += 1,
            Outcome::TurnedAway => turned_away += 1,
            Outcome::NoFreeBay => no_free_bay += 1,
        }
    }

    sleep(settle).await;
    let _ = shutdown_tx.send(true);
    controller_handle.await?;
    if tokio::time::timeout(Duration::from_secs(5), notify_handle).await.is_err() {
        warn!("notify_worker_flush_timeout");
    }

    let summary = metrics.summary();
    summary.log();
    info!(
        parked = %parked,
        turned_away = %turned_away,
        no_free_bay = %no_free_bay,
        tickets_closed = %summary.tickets_closed,
        revenue_cents = %summary.revenue_cents,
        "bay_sim_complete"
    );
    Ok(())
}
