//! Slot occupancy and identifier assignment
//!
//! Invariants held across every operation:
//! - a slot has an assigned id and a time-in iff it is occupied
//! - no two occupied slots share an id
//! - the pool's in-use set equals the set of ids held by occupied slots

use crate::domain::types::{SlotId, SlotIndex, Timestamp};
use crate::services::debounce::{DebounceOutcome, Debouncer};
use tracing::{debug, info, warn};

/// Fixed pool of reusable identifiers 1..=N, lowest free first
#[derive(Debug, Clone)]
pub struct IdentifierPool {
    in_use: Vec<bool>,
}

impl IdentifierPool {
    pub fn new(size: usize) -> Self {
        Self { in_use: vec![false; size] }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.in_use.len()
    }

    pub fn lowest_free(&self) -> Option<SlotId> {
        self.in_use.iter().position(|used| !used).map(|i| SlotId(i as u8 + 1))
    }

    pub fn free_count(&self) -> usize {
        self.in_use.iter().filter(|used| !**used).count()
    }

    pub fn in_use_count(&self) -> usize {
        self.size() - self.free_count()
    }

    pub fn is_in_use(&self, id: SlotId) -> bool {
        Self::index(id).and_then(|i| self.in_use.get(i).copied()).unwrap_or(false)
    }

    /// Check out the lowest free identifier
    fn acquire(&mut self) -> Option<SlotId> {
        let id = self.lowest_free()?;
        self.in_use[id.0 as usize - 1] = true;
        Some(id)
    }

    fn release(&mut self, id: SlotId) {
        if let Some(used) = Self::index(id).and_then(|i| self.in_use.get_mut(i)) {
            *used = false;
        }
    }

    fn index(id: SlotId) -> Option<usize> {
        (id.0 as usize).checked_sub(1)
    }
}

/// One physical bay
#[derive(Debug, Clone)]
pub struct Slot {
    pub occupied: bool,
    pub assigned_id: Option<SlotId>,
    pub time_in: Option<Timestamp>,
    /// Set when presence first drops while occupied
    pub vacating_since: Option<Timestamp>,
    /// Debounced IR presence
    pub presence: Debouncer,
    /// Assignment was refused for the current stay (logged once)
    refused: bool,
}

impl Slot {
    fn new(debounce_ms: u64) -> Self {
        Self {
            occupied: false,
            assigned_id: None,
            time_in: None,
            vacating_since: None,
            presence: Debouncer::new(debounce_ms),
            refused: false,
        }
    }

    fn clear(&mut self) {
        self.occupied = false;
        self.assigned_id = None;
        self.time_in = None;
        self.vacating_since = None;
    }
}

/// Data needed to close a ticket once a slot is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacatedSlot {
    pub id: SlotId,
    pub slot_index: SlotIndex,
    pub time_in: Timestamp,
    pub time_out: Timestamp,
}

impl VacatedSlot {
    #[inline]
    pub fn duration_ms(&self) -> u64 {
        self.time_out.millis_since(&self.time_in)
    }
}

pub struct SlotRegistry {
    slots: Vec<Slot>,
    pool: IdentifierPool,
}

impl SlotRegistry {
    /// One identifier per physical slot
    pub fn new(slot_count: usize, debounce_ms: u64) -> Self {
        Self {
            slots: (0..slot_count).map(|_| Slot::new(debounce_ms)).collect(),
            pool: IdentifierPool::new(slot_count),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index.0)
    }

    #[inline]
    pub fn pool(&self) -> &IdentifierPool {
        &self.pool
    }

    #[inline]
    pub fn has_free_id(&self) -> bool {
        self.pool.lowest_free().is_some()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    /// Indices of slots not currently occupied
    pub fn free_slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.slots.iter().enumerate().filter(|(_, s)| !s.occupied).map(|(i, _)| SlotIndex(i))
    }

    /// Feed a raw presence sample through the slot's debouncer
    pub fn sample_presence(
        &mut self,
        index: SlotIndex,
        raw: bool,
        now: Timestamp,
    ) -> Option<DebounceOutcome> {
        self.slots.get_mut(index.0).map(|slot| slot.presence.sample(raw, now))
    }

    /// Assign the lowest free identifier to a vacant slot.
    ///
    /// Returns None (and leaves the slot vacant) if the slot is already
    /// occupied or the pool is exhausted.
    pub fn try_assign(&mut self, index: SlotIndex, now: Timestamp) -> Option<SlotId> {
        let slot = self.slots.get_mut(index.0)?;
        if slot.occupied {
            return None;
        }

        let Some(id) = self.pool.acquire() else {
            if !slot.refused {
                slot.refused = true;
                warn!(slot = %index, "slot_assign_refused_pool_exhausted");
            }
            return None;
        };

        slot.occupied = true;
        slot.assigned_id = Some(id);
        slot.time_in = Some(now);
        slot.vacating_since = None;
        slot.refused = false;
        info!(slot = %index, id = %id, "slot_assigned");
        Some(id)
    }

    /// Presence dropped while occupied: start the exit grace window
    pub fn begin_vacate(&mut self, index: SlotIndex, now: Timestamp) {
        let Some(slot) = self.slots.get_mut(index.0) else {
            return;
        };
        if slot.occupied && slot.vacating_since.is_none() {
            slot.vacating_since = Some(now);
            debug!(slot = %index, "slot_vacate_started");
        }
    }

    /// Presence returned before the grace window elapsed
    pub fn cancel_vacate(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(index.0) {
            if slot.vacating_since.take().is_some() {
                debug!(slot = %index, "slot_vacate_cancelled");
            }
        }
    }

    /// Milliseconds the slot has been vacating, if it is
    pub fn vacating_ms(&self, index: SlotIndex, now: Timestamp) -> Option<u64> {
        let since = self.slots.get(index.0)?.vacating_since?;
        Some(now.millis_since(&since))
    }

    /// Release the slot and its identifier, returning what the ledger needs.
    ///
    /// Returns None if the slot was not occupied and vacating.
    pub fn finalize_vacate(&mut self, index: SlotIndex, now: Timestamp) -> Option<VacatedSlot> {
        let slot = self.slots.get_mut(index.0)?;
        if !slot.occupied || slot.vacating_since.is_none() {
            return None;
        }
        let (Some(id), Some(time_in)) = (slot.assigned_id, slot.time_in) else {
            // Occupied without id/time-in cannot happen; repair rather than panic
            warn!(slot = %index, "slot_state_inconsistent");
            slot.clear();
            return None;
        };

        slot.clear();
        self.pool.release(id);
        info!(slot = %index, id = %id, "slot_released");

        Some(VacatedSlot { id, slot_index: index, time_in, time_out: now })
    }

    /// Whether the current stay has already been refused an identifier
    pub fn is_refused(&self, index: SlotIndex) -> bool {
        self.slots.get(index.0).is_some_and(|s| s.refused)
    }

    /// Forget a pending refusal once the slot is stably empty again
    pub fn clear_refusal(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(index.0) {
            slot.refused = false;
        }
    }
}
