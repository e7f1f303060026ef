//! Time-based debouncing of a raw presence signal
//!
//! The stable value only flips after the raw signal has held the new level
//! continuously for at least the configured duration. The very first sample
//! establishes the baseline without waiting.

use crate::domain::types::Timestamp;

/// Result of feeding one raw sample into a [`Debouncer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceOutcome {
    /// Debounced value after this sample
    pub stable: bool,
    /// Whether the stable value flipped on this sample
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    min_stable_ms: u64,
    /// None until the first sample arrives
    stable: Option<bool>,
    last_raw: bool,
    /// When the raw signal last changed level
    since: Option<Timestamp>,
}

impl Debouncer {
    pub fn new(min_stable_ms: u64) -> Self {
        Self { min_stable_ms, stable: None, last_raw: false, since: None }
    }

    /// Current debounced value (false before the first sample)
    #[inline]
    pub fn stable(&self) -> bool {
        self.stable.unwrap_or(false)
    }

    /// Feed one raw sample taken at `now`
    pub fn sample(&mut self, raw: bool, now: Timestamp) -> DebounceOutcome {
        let Some(stable) = self.stable else {
            self.stable = Some(raw);
            self.last_raw = raw;
            self.since = Some(now);
            return DebounceOutcome { stable: raw, changed: false };
        };

        if raw != self.last_raw {
            self.last_raw = raw;
            self.since = Some(now);
            return DebounceOutcome { stable, changed: false };
        }

        if raw != stable {
            let held_ms = self.since.map(|since| now.millis_since(&since)).unwrap_or(0);
            if held_ms >= self.min_stable_ms {
                self.stable = Some(raw);
                return DebounceOutcome { stable: raw, changed: true };
            }
        }

        DebounceOutcome { stable, changed: false }
    }
}
