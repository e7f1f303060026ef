//! Entry gate state machine (CLOSED -> OPEN -> CLOSED)
//!
//! Driven by the entry distance sensor and identifier-pool availability only;
//! per-slot occupancy is handled elsewhere.
//!
//! Two independent close triggers:
//! - no vehicle seen continuously for the grace window while open
//! - a vehicle arriving while no identifier is free (immediate)

use crate::domain::types::Timestamp;
use smallvec::SmallVec;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Entry sensor reported no vehicle for the whole grace window
    NoCarGrace,
    /// Arrival while every identifier is in use
    BayFull,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::NoCarGrace => "no_car_grace",
            CloseReason::BayFull => "bay_full",
        }
    }
}

/// Transitions produced by one distance evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    Opened,
    Closed(CloseReason),
    /// A vehicle is waiting but the bay is full
    RejectedFull,
}

pub type GateEvents = SmallVec<[GateEvent; 2]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateState {
    pub open: bool,
    pub opened_at: Option<Timestamp>,
    pub no_car_since: Option<Timestamp>,
}

pub struct EntryGateController {
    threshold_cm: f64,
    no_car_grace_ms: u64,
    state: GateState,
}

impl EntryGateController {
    pub fn new(threshold_cm: f64, no_car_grace_ms: u64) -> Self {
        Self { threshold_cm, no_car_grace_ms, state: GateState::default() }
    }

    #[inline]
    pub fn state(&self) -> &GateState {
        &self.state
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.open
    }

    /// Whether a reading counts as a vehicle at the entry.
    ///
    /// `None` (sensor fault) and non-finite or negative values never count.
    #[inline]
    pub fn vehicle_present(&self, reading_cm: Option<f64>) -> bool {
        matches!(reading_cm, Some(cm) if cm.is_finite() && cm >= 0.0 && cm < self.threshold_cm)
    }

    /// Evaluate one distance reading.
    pub fn on_distance(
        &mut self,
        reading_cm: Option<f64>,
        has_free_id: bool,
        now: Timestamp,
    ) -> GateEvents {
        let mut events = GateEvents::new();
        let arriving = self.vehicle_present(reading_cm);

        if arriving && has_free_id && !self.state.open {
            self.state.open = true;
            self.state.opened_at = Some(now);
            self.state.no_car_since = None;
            info!(distance_cm = ?reading_cm, "gate_open_decided");
            events.push(GateEvent::Opened);
        } else if arriving && !has_free_id {
            events.push(GateEvent::RejectedFull);
            if self.state.open {
                self.close();
                info!(distance_cm = ?reading_cm, "gate_force_closed_full");
                events.push(GateEvent::Closed(CloseReason::BayFull));
            }
            return events;
        }

        if self.state.open && self.no_car_window_elapsed(arriving, now) {
            let open_ms = self.state.opened_at.map(|at| now.millis_since(&at)).unwrap_or(0);
            self.close();
            info!(open_ms = %open_ms, "gate_close_decided");
            events.push(GateEvent::Closed(CloseReason::NoCarGrace));
        }

        events
    }

    /// Track the no-car window; true once it has held for the full grace period
    fn no_car_window_elapsed(&mut self, arriving: bool, now: Timestamp) -> bool {
        if arriving {
            if self.state.no_car_since.take().is_some() {
                debug!("gate_no_car_window_reset");
            }
            return false;
        }
        match self.state.no_car_since {
            None => {
                self.state.no_car_since = Some(now);
                false
            }
            Some(since) => now.millis_since(&since) >= self.no_car_grace_ms,
        }
    }

    fn close(&mut self) {
        self.state.open = false;
        self.state.opened_at = None;
        self.state.no_car_since = None;
    }
}
