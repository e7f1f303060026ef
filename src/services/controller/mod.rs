//! Control loop for the bay
//!
//! The BayController owns the `Bay` core and every collaborator handle. Each
//! tick it:
//! - reads the entry distance sensor when the check interval has elapsed
//! - samples every slot's presence sensor
//! - executes the effects the core returns (gate, display, notifications)
//! - publishes a fresh status snapshot
//!
//! Nothing else mutates bay state, so no locking is needed.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::status::StatusSnapshot;
use crate::domain::types::{SlotIndex, Timestamp};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::display::{starting_lines, Display};
use crate::io::hardware::BayHardware;
use crate::services::bay::Bay;
use crate::services::notify_worker::NotifySender;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

pub struct BayController {
    /// Slots, identifier pool, ledger and gate state
    pub(crate) bay: Bay,
    pub(crate) hardware: Box<dyn BayHardware>,
    pub(crate) display: Box<dyn Display>,
    pub(crate) notify: NotifySender,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) snapshot_tx: watch::Sender<Arc<StatusSnapshot>>,
    pub(crate) config: Config,
    pub(crate) tick: u64,
    pub(crate) last_entry_check: Option<Timestamp>,
    /// Fault episode flags, so a dead sensor warns once rather than every tick
    pub(crate) entry_faulted: bool,
    pub(crate) slot_faulted: Vec<bool>,
}

impl BayController {
    pub fn new(
        config: Config,
        hardware: Box<dyn BayHardware>,
        display: Box<dyn Display>,
        notify: NotifySender,
        metrics: Arc<Metrics>,
        snapshot_tx: watch::Sender<Arc<StatusSnapshot>>,
    ) -> Self {
        let bay = Bay::new(&config);
        let slot_faulted = vec![false; bay.slot_count()];
        Self {
            bay,
            hardware,
            display,
            notify,
            metrics,
            snapshot_tx,
            config,
            tick: 0,
            last_entry_check: None,
            entry_faulted: false,
            slot_faulted,
        }
    }

    /// Show the startup banner and take the baseline presence samples
    pub async fn startup(&mut self, now: Timestamp) {
        let (line1, line2) = starting_lines();
        self.show(&line1, &line2).await;

        for i in 0..self.bay.slot_count() {
            self.sample_slot(SlotIndex(i), now).await;
        }
        self.bay.log_baseline();

        self.refresh_display().await;
        self.publish(now);
    }

    /// One pass of the loop at `now`
    pub async fn tick(&mut self, now: Timestamp) {
        let tick_start = Instant::now();

        let entry_due = self.last_entry_check.map_or(true, |last| {
            now.millis_since(&last) >= self.config.entry_check_interval_ms()
        });
        if entry_due {
            self.last_entry_check = Some(now);
            self.check_entry(now).await;
        }

        for i in 0..self.bay.slot_count() {
            self.sample_slot(SlotIndex(i), now).await;
        }

        self.tick += 1;
        self.publish(now);
        self.metrics.record_tick(tick_start.elapsed().as_micros() as u64);
    }

    /// Run until the shutdown signal flips to true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut tick_interval = interval(Duration::from_millis(self.config.tick_ms()));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            slots = self.bay.slot_count(),
            tick_ms = self.config.tick_ms(),
            entry_check_interval_ms = self.config.entry_check_interval_ms(),
            "controller_started"
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.tick(Timestamp::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Leave the gate closed on the way out
    async fn shutdown(&mut self) {
        if self.bay.gate().is_open() {
            self.actuate_gate(false).await;
        }
        info!(ticks = self.tick, "controller_stopped");
    }

    pub fn snapshot_receiver(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn publish(&self, now: Timestamp) {
        let registry = self.bay.registry();
        self.metrics.set_occupancy(registry.occupied_count(), registry.pool().free_count());
        let snapshot = self.bay.snapshot(self.tick, now, self.config.currency());
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}
