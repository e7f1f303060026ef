//! Read-only status snapshot published once per tick
//!
//! The status server and display renderers only ever see a whole snapshot,
//! never the live state the control loop is mutating.

use crate::domain::ticket::{format_money, ClosedTicket};
use crate::domain::types::{format_clock, format_hms, SlotId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    /// Operator-facing label ("S1")
    pub slot: String,
    pub occupied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SlotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Vehicle left the bay and the exit grace window is running
    pub vacating: bool,
}

impl SlotStatus {
    pub fn elapsed_hms(&self) -> Option<String> {
        self.elapsed_ms.map(format_hms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTicketStatus {
    pub ticket_ref: String,
    pub id: SlotId,
    pub slot: String,
    pub duration: String,
    pub duration_ms: u64,
    pub billed_minutes: u64,
    pub fee_cents: u64,
    pub fee: String,
    pub time_in: String,
    pub time_out: String,
}

impl ClosedTicketStatus {
    pub fn from_ticket(ticket: &ClosedTicket, currency: &str) -> Self {
        Self {
            ticket_ref: ticket.ticket_ref.clone(),
            id: ticket.id,
            slot: ticket.slot_index.label(),
            duration: ticket.duration_hms(),
            duration_ms: ticket.duration_ms,
            billed_minutes: ticket.billed_minutes,
            fee_cents: ticket.fee_cents,
            fee: format_money(ticket.fee_cents, currency),
            time_in: ticket.time_in_clock(),
            time_out: ticket.time_out_clock(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Monotonic tick counter of the loop that produced this snapshot
    pub tick: u64,
    pub generated_at: String,
    pub total: usize,
    pub free: usize,
    pub occupied: usize,
    pub full: bool,
    pub gate_open: bool,
    pub slots: Vec<SlotStatus>,
    /// Closed tickets, oldest first
    pub closed: Vec<ClosedTicketStatus>,
}

impl StatusSnapshot {
    /// Snapshot served before the first tick completes
    pub fn starting(total: usize) -> Self {
        Self {
            tick: 0,
            generated_at: format_clock(crate::domain::types::epoch_ms()),
            total,
            free: total,
            occupied: 0,
            full: false,
            gate_open: false,
            slots: (0..total)
                .map(|i| SlotStatus {
                    slot: format!("S{}", i + 1),
                    occupied: false,
                    id: None,
                    time_in: None,
                    elapsed_ms: None,
                    vacating: false,
                })
                .collect(),
            closed: Vec::new(),
        }
    }
}
