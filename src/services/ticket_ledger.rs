//! Ticket ledger - closes tickets and keeps a bounded history
//!
//! An open ticket is the occupied slot itself; the ledger only stores
//! tickets once they are closed. Closed tickets are never mutated.

use crate::domain::ticket::{billed_minutes, compute_fee_cents, new_uuid_v7, ClosedTicket};
use crate::services::slot_registry::VacatedSlot;
use std::collections::VecDeque;
use tracing::info;

pub struct TicketLedger {
    price_per_minute_cents: u64,
    /// Oldest first
    history: VecDeque<ClosedTicket>,
    history_cap: usize,
    closed_total: u64,
    revenue_cents: u64,
}

impl TicketLedger {
    pub fn new(price_per_minute_cents: u64, history_cap: usize) -> Self {
        let history_cap = history_cap.max(1);
        Self {
            price_per_minute_cents,
            history: VecDeque::with_capacity(history_cap),
            history_cap,
            closed_total: 0,
            revenue_cents: 0,
        }
    }

    /// Close the ticket for a released slot and append it to the history
    pub fn close(&mut self, vacated: &VacatedSlot) -> ClosedTicket {
        let duration_ms = vacated.duration_ms();
        let ticket = ClosedTicket {
            ticket_ref: new_uuid_v7(),
            id: vacated.id,
            slot_index: vacated.slot_index,
            time_in_epoch_ms: vacated.time_in.epoch_ms,
            time_out_epoch_ms: vacated.time_out.epoch_ms,
            duration_ms,
            billed_minutes: billed_minutes(duration_ms),
            fee_cents: compute_fee_cents(duration_ms, self.price_per_minute_cents),
            closed: true,
        };

        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(ticket.clone());
        self.closed_total += 1;
        self.revenue_cents += ticket.fee_cents;

        info!(
            ticket_ref = %ticket.ticket_ref,
            id = %ticket.id,
            slot = %ticket.slot_index,
            duration_ms = %ticket.duration_ms,
            billed_minutes = %ticket.billed_minutes,
            fee_cents = %ticket.fee_cents,
            "ticket_closed"
        );

        ticket
    }

    /// Closed tickets, oldest first
    pub fn history(&self) -> impl ExactSizeIterator<Item = &ClosedTicket> + '_ {
        self.history.iter()
    }

    #[inline]
    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    #[inline]
    pub fn closed_total(&self) -> u64 {
        self.closed_total
    }

    #[inline]
    pub fn revenue_cents(&self) -> u64 {
        self.revenue_cents
    }

    #[inline]
    pub fn price_per_minute_cents(&self) -> u64 {
        self.price_per_minute_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SlotId, SlotIndex, Timestamp};

    fn vacated(id: u8, slot: usize, time_in: Timestamp, stay_ms: u64) -> VacatedSlot {
        VacatedSlot {
            id: SlotId(id),
            slot_index: SlotIndex(slot),
            time_in,
            time_out: time_in.plus_ms(stay_ms),
        }
    }

    #[test]
    fn test_close_computes_fee() {
        let mut ledger = TicketLedger::new(50, 10);
        let t0 = Timestamp::now();
        // In at t=1000, out at t=125000
        let v = VacatedSlot {
            id: SlotId(1),
            slot_index: SlotIndex(0),
            time_in: t0.plus_ms(1000),
            time_out: t0.plus_ms(125_000),
        };
        let ticket = ledger.close(&v);
        assert_eq!(ticket.duration_ms, 124_000);
        assert_eq!(ticket.billed_minutes, 3);
        assert_eq!(ticket.fee_cents, 150);
        assert!(ticket.closed);
        assert_eq!(ledger.revenue_cents(), 150);
    }

    #[test]
    fn test_near_zero_stay_bills_one_minute() {
        let mut ledger = TicketLedger::new(50, 10);
        let ticket = ledger.close(&vacated(1, 0, Timestamp::now(), 1000));
        assert_eq!(ticket.billed_minutes, 1);
        assert_eq!(ticket.fee_cents, 50);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut ledger = TicketLedger::new(50, 10);
        let t0 = Timestamp::now();
        let mut refs = Vec::new();
        for i in 0..13u64 {
            let t = ledger.close(&vacated(1, 0, t0.plus_ms(i * 100_000), 60_000 * (i + 1)));
            refs.push(t.ticket_ref);
        }

        assert_eq!(ledger.history().len(), 10);
        assert_eq!(ledger.closed_total(), 13);

        let kept: Vec<&str> = ledger.history().map(|t| t.ticket_ref.as_str()).collect();
        let expected: Vec<&str> = refs[3..].iter().map(String::as_str).collect();
        assert_eq!(kept, expected);
        // Oldest-first ordering
        assert_eq!(ledger.history().next().unwrap().billed_minutes, 4);
    }

    #[test]
    fn test_zero_cap_clamped_to_one() {
        let mut ledger = TicketLedger::new(50, 0);
        let t0 = Timestamp::now();
        ledger.close(&vacated(1, 0, t0, 1000));
        ledger.close(&vacated(2, 1, t0, 2000));
        assert_eq!(ledger.history_cap(), 1);
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.history().next().unwrap().id, SlotId(2));
    }
}
