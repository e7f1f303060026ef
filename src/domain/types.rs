//! Shared types for the parking bay

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Newtype wrapper for slot-assignment identifiers (1..=N)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlotId(pub u8);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-based index of a physical bay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlotIndex(pub usize);

impl SlotIndex {
    /// Operator-facing label ("S1" for index 0)
    pub fn label(&self) -> String {
        format!("S{}", self.0 + 1)
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0 + 1)
    }
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A point in time as seen by the control loop.
///
/// Durations are always taken from the monotonic `at`; `epoch_ms` only feeds
/// wall-clock rendering for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub at: Instant,
    pub epoch_ms: u64,
}

impl Timestamp {
    pub fn now() -> Self {
        Self { at: Instant::now(), epoch_ms: epoch_ms() }
    }

    /// Timestamp `ms` milliseconds after this one
    pub fn plus_ms(&self, ms: u64) -> Self {
        Self { at: self.at + Duration::from_millis(ms), epoch_ms: self.epoch_ms + ms }
    }

    /// Milliseconds elapsed from `earlier` to `self` (saturating at zero)
    #[inline]
    pub fn millis_since(&self, earlier: &Timestamp) -> u64 {
        self.at.saturating_duration_since(earlier.at).as_millis() as u64
    }
}

/// Format epoch milliseconds as local wall-clock time (HH:MM:SS)
pub fn format_clock(epoch_ms: u64) -> String {
    match Local.timestamp_millis_opt(epoch_ms as i64).single() {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Format a duration in milliseconds as HH:MM:SS
pub fn format_hms(duration_ms: u64) -> String {
    let s_total = duration_ms / 1000;
    let hh = s_total / 3600;
    let mm = (s_total % 3600) / 60;
    let ss = s_total % 60;
    format!("{:02}:{:02}:{:02}", hh, mm, ss)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_label() {
        assert_eq!(SlotIndex(0).label(), "S1");
        assert_eq!(SlotIndex(2).to_string(), "S3");
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(124_000), "00:02:04");
        assert_eq!(format_hms(3_723_999), "01:02:03");
    }

    #[test]
    fn test_timestamp_plus_and_since() {
        let t0 = Timestamp::now();
        let t1 = t0.plus_ms(1500);
        assert_eq!(t1.millis_since(&t0), 1500);
        assert_eq!(t1.epoch_ms - t0.epoch_ms, 1500);
        // Never negative
        assert_eq!(t0.millis_since(&t1), 0);
    }
}
