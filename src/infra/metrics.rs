//! Lock-free metrics collection
//!
//! Counters are written by the control loop and the notification worker and
//! read by the status server. All atomics use Relaxed ordering: these are
//! statistics only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Tick duration bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const TICK_BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const TICK_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_us: u64) -> usize {
    TICK_BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

pub struct Metrics {
    ticks_total: AtomicU64,
    tick_duration_sum_us: AtomicU64,
    tick_duration_max_us: AtomicU64,
    tick_buckets: [AtomicU64; TICK_NUM_BUCKETS],
    gate_opens: AtomicU64,
    gate_closes_grace: AtomicU64,
    gate_closes_full: AtomicU64,
    full_rejections: AtomicU64,
    gate_open: AtomicU64,
    assignments: AtomicU64,
    refused_assignments: AtomicU64,
    tickets_closed: AtomicU64,
    revenue_cents: AtomicU64,
    sensor_faults: AtomicU64,
    actuator_faults: AtomicU64,
    display_failures: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    notifications_dropped: AtomicU64,
    occupied_slots: AtomicU64,
    free_ids: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub tick_avg_us: u64,
    pub tick_max_us: u64,
    pub tick_buckets: [u64; TICK_NUM_BUCKETS],
    pub gate_opens: u64,
    pub gate_closes_grace: u64,
    pub gate_closes_full: u64,
    pub full_rejections: u64,
    pub gate_open: bool,
    pub assignments: u64,
    pub refused_assignments: u64,
    pub tickets_closed: u64,
    pub revenue_cents: u64,
    pub sensor_faults: u64,
    pub actuator_faults: u64,
    pub display_failures: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notifications_dropped: u64,
    pub occupied_slots: u64,
    pub free_ids: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            tick_duration_sum_us: AtomicU64::new(0),
            tick_duration_max_us: AtomicU64::new(0),
            tick_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            gate_opens: AtomicU64::new(0),
            gate_closes_grace: AtomicU64::new(0),
            gate_closes_full: AtomicU64::new(0),
            full_rejections: AtomicU64::new(0),
            gate_open: AtomicU64::new(0),
            assignments: AtomicU64::new(0),
            refused_assignments: AtomicU64::new(0),
            tickets_closed: AtomicU64::new(0),
            revenue_cents: AtomicU64::new(0),
            sensor_faults: AtomicU64::new(0),
            actuator_faults: AtomicU64::new(0),
            display_failures: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            occupied_slots: AtomicU64::new(0),
            free_ids: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_tick(&self, duration_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.tick_duration_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        update_atomic_max(&self.tick_duration_max_us, duration_us);
        self.tick_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gate_opened(&self) {
        self.gate_opens.fetch_add(1, Ordering::Relaxed);
        self.gate_open.store(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gate_closed(&self, forced_full: bool) {
        if forced_full {
            self.gate_closes_full.fetch_add(1, Ordering::Relaxed);
        } else {
            self.gate_closes_grace.fetch_add(1, Ordering::Relaxed);
        }
        self.gate_open.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_assignment(&self) {
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_refused_assignment(&self) {
        self.refused_assignments.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_closed(&self, fee_cents: u64) {
        self.tickets_closed.fetch_add(1, Ordering::Relaxed);
        self.revenue_cents.fetch_add(fee_cents, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sensor_fault(&self) {
        self.sensor_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_actuator_fault(&self) {
        self.actuator_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_display_failure(&self) {
        self.display_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Occupancy gauges, set once per tick
    #[inline]
    pub fn set_occupancy(&self, occupied: usize, free_ids: usize) {
        self.occupied_slots.store(occupied as u64, Ordering::Relaxed);
        self.free_ids.store(free_ids as u64, Ordering::Relaxed);
    }

    /// Read all counters without resetting them
    pub fn summary(&self) -> MetricsSummary {
        let ticks_total = self.ticks_total.load(Ordering::Relaxed);
        let sum = self.tick_duration_sum_us.load(Ordering::Relaxed);
        let mut tick_buckets = [0u64; TICK_NUM_BUCKETS];
        for (i, bucket) in self.tick_buckets.iter().enumerate() {
            tick_buckets[i] = bucket.load(Ordering::Relaxed);
        }

        MetricsSummary {
            ticks_total,
            tick_avg_us: if ticks_total > 0 { sum / ticks_total } else { 0 },
            tick_max_us: self.tick_duration_max_us.load(Ordering::Relaxed),
            tick_buckets,
            gate_opens: self.gate_opens.load(Ordering::Relaxed),
            gate_closes_grace: self.gate_closes_grace.load(Ordering::Relaxed),
            gate_closes_full: self.gate_closes_full.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            gate_open: self.gate_open.load(Ordering::Relaxed) == 1,
            assignments: self.assignments.load(Ordering::Relaxed),
            refused_assignments: self.refused_assignments.load(Ordering::Relaxed),
            tickets_closed: self.tickets_closed.load(Ordering::Relaxed),
            revenue_cents: self.revenue_cents.load(Ordering::Relaxed),
            sensor_faults: self.sensor_faults.load(Ordering::Relaxed),
            actuator_faults: self.actuator_faults.load(Ordering::Relaxed),
            display_failures: self.display_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            occupied_slots: self.occupied_slots.load(Ordering::Relaxed),
            free_ids: self.free_ids.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSummary {
    /// Periodic one-line report
    pub fn log(&self) {
        info!(
            ticks = %self.ticks_total,
            tick_avg_us = %self.tick_avg_us,
            tick_max_us = %self.tick_max_us,
            occupied = %self.occupied_slots,
            free_ids = %self.free_ids,
            gate_open = %self.gate_open,
            tickets_closed = %self.tickets_closed,
            revenue_cents = %self.revenue_cents,
            sensor_faults = %self.sensor_faults,
            notify_dropped = %self.notifications_dropped,
            "metrics"
        );
    }
}
