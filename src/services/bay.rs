//! Per-tick bay core
//!
//! `Bay` owns every piece of mutable bay state (slots, identifier pool,
//! ledger, gate) and turns sensor readings into state transitions plus a list
//! of effects. It never touches hardware; the controller executes the effects
//! after each call.

use crate::domain::status::{ClosedTicketStatus, SlotStatus, StatusSnapshot};
use crate::domain::ticket::ClosedTicket;
use crate::domain::types::{format_clock, SlotId, SlotIndex, Timestamp};
use crate::infra::config::Config;
use crate::io::display::occupancy_lines;
use crate::services::entry_gate::{CloseReason, EntryGateController, GateEvent};
use crate::services::slot_registry::SlotRegistry;
use crate::services::ticket_ledger::TicketLedger;
use smallvec::SmallVec;
use tracing::{debug, info};

/// Side effects requested by a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenGate,
    CloseGate(CloseReason),
    /// Arrival rejected because every identifier is in use
    ShowFull,
    RefreshDisplay,
    Assigned { slot: SlotIndex, id: SlotId },
    /// First refusal of the current stay
    AssignRefused { slot: SlotIndex },
    Notify(ClosedTicket),
}

pub type Effects = SmallVec<[Effect; 4]>;

pub struct Bay {
    registry: SlotRegistry,
    ledger: TicketLedger,
    gate: EntryGateController,
    exit_grace_ms: u64,
}

impl Bay {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: SlotRegistry::new(config.slot_count(), config.debounce_ms()),
            ledger: TicketLedger::new(config.price_per_minute_cents(), config.history_len()),
            gate: EntryGateController::new(config.entry_threshold_cm(), config.no_car_grace_ms()),
            exit_grace_ms: config.exit_grace_ms(),
        }
    }

    #[inline]
    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    #[inline]
    pub fn ledger(&self) -> &TicketLedger {
        &self.ledger
    }

    #[inline]
    pub fn gate(&self) -> &EntryGateController {
        &self.gate
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.registry.len()
    }

    /// Evaluate one entry distance reading. `None` is a sensor fault and
    /// counts as no vehicle.
    pub fn check_entry(&mut self, reading_cm: Option<f64>, now: Timestamp) -> Effects {
        let events = self.gate.on_distance(reading_cm, self.registry.has_free_id(), now);
        events
            .into_iter()
            .map(|event| match event {
                GateEvent::Opened => Effect::OpenGate,
                GateEvent::Closed(reason) => Effect::CloseGate(reason),
                GateEvent::RejectedFull => Effect::ShowFull,
            })
            .collect()
    }

    /// Feed one raw presence reading for a slot. `None` is a sensor fault and
    /// counts as no presence.
    pub fn sample_slot(
        &mut self,
        index: SlotIndex,
        reading: Option<bool>,
        now: Timestamp,
    ) -> Effects {
        let mut effects = Effects::new();
        let Some(outcome) = self.registry.sample_presence(index, reading.unwrap_or(false), now)
        else {
            return effects;
        };
        if outcome.changed {
            debug!(slot = %index, present = %outcome.stable, "slot_presence_changed");
        }
        let Some(slot) = self.registry.slot(index) else {
            return effects;
        };
        let occupied = slot.occupied;

        match (outcome.stable, occupied) {
            (true, true) => self.registry.cancel_vacate(index),
            (true, false) => {
                // Level-triggered: retried every tick while present and vacant
                let was_refused = self.registry.is_refused(index);
                match self.registry.try_assign(index, now) {
                    Some(id) => {
                        effects.push(Effect::Assigned { slot: index, id });
                        effects.push(Effect::RefreshDisplay);
                    }
                    None if !was_refused && self.registry.is_refused(index) => {
                        effects.push(Effect::AssignRefused { slot: index });
                    }
                    None => {}
                }
            }
            (false, true) => {
                self.registry.begin_vacate(index, now);
                let grace_elapsed = self
                    .registry
                    .vacating_ms(index, now)
                    .is_some_and(|ms| ms >= self.exit_grace_ms);
                if grace_elapsed {
                    if let Some(vacated) = self.registry.finalize_vacate(index, now) {
                        let ticket = self.ledger.close(&vacated);
                        effects.push(Effect::Notify(ticket));
                        effects.push(Effect::RefreshDisplay);
                    }
                }
            }
            (false, false) => self.registry.clear_refusal(index),
        }

        effects
    }

    /// Lines for the occupancy summary on the display
    pub fn display_lines(&self) -> (String, String) {
        let free: Vec<String> = self.registry.free_slots().map(|i| i.label()).collect();
        occupancy_lines(&free, self.registry.len())
    }

    /// Consistent copy of the whole bay for read-only consumers
    pub fn snapshot(&self, tick: u64, now: Timestamp, currency: &str) -> StatusSnapshot {
        let slots: Vec<SlotStatus> = self
            .registry
            .slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotStatus {
                slot: SlotIndex(i).label(),
                occupied: slot.occupied,
                id: slot.assigned_id,
                time_in: slot.time_in.map(|t| format_clock(t.epoch_ms)),
                elapsed_ms: slot.time_in.map(|t| now.millis_since(&t)),
                vacating: slot.vacating_since.is_some(),
            })
            .collect();

        let total = self.registry.len();
        let occupied = self.registry.occupied_count();
        StatusSnapshot {
            tick,
            generated_at: format_clock(now.epoch_ms),
            total,
            free: total - occupied,
            occupied,
            full: !self.registry.has_free_id(),
            gate_open: self.gate.is_open(),
            slots,
            closed: self
                .ledger
                .history()
                .map(|t| ClosedTicketStatus::from_ticket(t, currency))
                .collect(),
        }
    }

    /// Log the startup summary once the baseline samples are in
    pub fn log_baseline(&self) {
        info!(
            slots = self.registry.len(),
            occupied = self.registry.occupied_count(),
            "bay_baseline_established"
        );
    }
}
