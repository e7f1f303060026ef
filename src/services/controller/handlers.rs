//! Sensor reads and effect execution for the BayController
//!
//! Every collaborator failure is logged, counted and contained here; nothing
//! in this file returns an error to the loop.

use super::BayController;
use crate::domain::types::{SlotIndex, Timestamp};
use crate::io::display::rejected_lines;
use crate::io::notifier::TicketNotice;
use crate::services::bay::{Effect, Effects};
use crate::services::entry_gate::CloseReason;
use tokio::time::{sleep, Duration};
use tracing::{error, info, trace, warn};

impl BayController {
    /// Read the entry sensor and run the gate state machine
    pub(crate) async fn check_entry(&mut self, now: Timestamp) {
        let reading = self.read_distance().await;
        let effects = self.bay.check_entry(reading, now);
        self.execute(effects).await;
    }

    /// Read one slot's presence sensor and run the slot transitions
    pub(crate) async fn sample_slot(&mut self, index: SlotIndex, now: Timestamp) {
        let reading = self.read_presence(index).await;
        let effects = self.bay.sample_slot(index, reading, now);
        self.execute(effects).await;
    }

    /// Distance in cm, or None when nothing was detected or the sensor failed
    async fn read_distance(&mut self) -> Option<f64> {
        match self.hardware.read_distance_cm().await {
            Ok(cm) => {
                if self.entry_faulted {
                    self.entry_faulted = false;
                    info!("entry_sensor_recovered");
                }
                trace!(distance_cm = %cm, "entry_distance");
                Some(cm)
            }
            // No echo: nothing in front of the sensor
            Err(e) if e.is_timeout() => {
                trace!("entry_no_echo");
                None
            }
            Err(e) => {
                self.metrics.record_sensor_fault();
                if !self.entry_faulted {
                    self.entry_faulted = true;
                    warn!(error = %e, "entry_sensor_fault");
                }
                None
            }
        }
    }

    async fn read_presence(&mut self, index: SlotIndex) -> Option<bool> {
        let result = self.hardware.read_presence(index).await;
        let faulted = &mut self.slot_faulted[index.0];
        match result {
            Ok(present) => {
                if *faulted {
                    *faulted = false;
                    info!(slot = %index, "slot_sensor_recovered");
                }
                Some(present)
            }
            Err(e) => {
                self.metrics.record_sensor_fault();
                if !*faulted {
                    *faulted = true;
                    warn!(slot = %index, error = %e, "slot_sensor_fault");
                }
                None
            }
        }
    }

    pub(crate) async fn execute(&mut self, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::OpenGate => {
                    self.metrics.record_gate_opened();
                    info!("gate_opened");
                    self.actuate_gate(true).await;
                }
                Effect::CloseGate(reason) => {
                    self.metrics.record_gate_closed(reason == CloseReason::BayFull);
                    info!(reason = reason.as_str(), "gate_closed");
                    self.actuate_gate(false).await;
                }
                Effect::ShowFull => {
                    self.metrics.record_full_rejection();
                    info!("arrival_rejected_full");
                    let (line1, line2) = rejected_lines();
                    self.show(&line1, &line2).await;
                }
                Effect::RefreshDisplay => self.refresh_display().await,
                Effect::Assigned { slot, id } => {
                    self.metrics.record_assignment();
                    trace!(slot = %slot, id = %id, "assignment_effect");
                }
                Effect::AssignRefused { slot } => {
                    self.metrics.record_refused_assignment();
                    trace!(slot = %slot, "assignment_refused_effect");
                }
                Effect::Notify(ticket) => {
                    self.metrics.record_ticket_closed(ticket.fee_cents);
                    let notice =
                        TicketNotice::new(self.config.site_id(), ticket, self.config.currency());
                    self.notify.dispatch(notice);
                }
            }
        }
    }

    /// Drive the servo, wait for it to travel, then refresh the display
    pub(crate) async fn actuate_gate(&mut self, open: bool) {
        if let Err(e) = self.hardware.set_gate(open).await {
            self.metrics.record_actuator_fault();
            error!(open = %open, error = %e, "gate_actuation_failed");
        }

        let actuation_ms = self.config.gate_actuation_ms();
        if actuation_ms > 0 {
            sleep(Duration::from_millis(actuation_ms)).await;
        }
        self.refresh_display().await;
    }

    pub(crate) async fn refresh_display(&mut self) {
        let (line1, line2) = self.bay.display_lines();
        self.show(&line1, &line2).await;
    }

    pub(crate) async fn show(&mut self, line1: &str, line2: &str) {
        if let Err(e) = self.display.show(line1, line2).await {
            self.metrics.record_display_failure();
            warn!(error = %e, "display_update_failed");
        }
    }
}
