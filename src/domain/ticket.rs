//! Ticket data model and fee arithmetic

use crate::domain::types::{format_clock, format_hms, SlotId, SlotIndex};
use serde::Serialize;
use uuid::Uuid;

const MS_PER_MINUTE: u64 = 60_000;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Chargeable minutes for a stay: ceiling of the duration in minutes, never
/// less than one.
#[inline]
pub fn billed_minutes(duration_ms: u64) -> u64 {
    duration_ms.div_ceil(MS_PER_MINUTE).max(1)
}

/// Fee in cents for a stay of `duration_ms`
#[inline]
pub fn compute_fee_cents(duration_ms: u64, price_per_minute_cents: u64) -> u64 {
    billed_minutes(duration_ms).saturating_mul(price_per_minute_cents)
}

/// Render an amount of cents as `{currency}{units}.{cents}`
pub fn format_money(cents: u64, currency: &str) -> String {
    format!("{}{}.{:02}", currency, cents / 100, cents % 100)
}

/// Immutable record of a finished stay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTicket {
    /// UUIDv7 for log correlation
    pub ticket_ref: String,
    pub id: SlotId,
    pub slot_index: SlotIndex,
    pub time_in_epoch_ms: u64,
    pub time_out_epoch_ms: u64,
    pub duration_ms: u64,
    pub billed_minutes: u64,
    pub fee_cents: u64,
    pub closed: bool,
}

impl ClosedTicket {
    pub fn time_in_clock(&self) -> String {
        format_clock(self.time_in_epoch_ms)
    }

    pub fn time_out_clock(&self) -> String {
        format_clock(self.time_out_epoch_ms)
    }

    pub fn duration_hms(&self) -> String {
        format_hms(self.duration_ms)
    }

    /// Multi-line summary sent to the notification channel
    pub fn notification_text(&self, currency: &str) -> String {
        format!(
            "\u{2705} Ticket CLOSED\nID: {} Slot: {}\nDuration: {} minute(s)\nFee: {}",
            self.id,
            self.slot_index.label(),
            self.billed_minutes,
            format_money(self.fee_cents, currency)
        )
    }
}
