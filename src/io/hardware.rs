//! Hardware boundary: entry distance sensor, per-slot IR presence, gate servo
//!
//! Implementations must bound every call with a timeout; the control loop
//! treats any error as "nothing detected".

use crate::domain::types::SlotIndex;
use async_trait::async_trait;
use thiserror::Error;

/// Speed-of-sound conversion used by HC-SR04 style sensors (µs per cm, one way)
const US_PER_CM: f64 = 29.1;

#[derive(Debug, Error)]
pub enum SensorError {
    /// No echo / no reply within the allowed window
    #[error("sensor read timed out")]
    Timeout,
    #[error("no such slot {0}")]
    NoSuchSlot(SlotIndex),
    #[error("malformed reply from sensor bridge: {0}")]
    Protocol(String),
    #[error("sensor bridge i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Injected by the simulator
    #[error("simulated fault")]
    Simulated,
}

impl SensorError {
    /// Timeouts are routine (nothing in front of the sensor); everything else
    /// deserves a warning.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SensorError::Timeout)
    }
}

#[async_trait]
pub trait BayHardware: Send {
    /// Distance in centimetres from the entry sensor
    async fn read_distance_cm(&mut self) -> Result<f64, SensorError>;

    /// Whether a vehicle is over the slot's IR sensor (raw, not debounced)
    async fn read_presence(&mut self, slot: SlotIndex) -> Result<bool, SensorError>;

    /// Drive the gate servo to the open or closed position
    async fn set_gate(&mut self, open: bool) -> Result<(), SensorError>;
}

/// Convert an echo pulse width into a distance.
///
/// A zero-length pulse means the sensor never saw an echo.
pub fn distance_from_echo_us(pulse_us: u16) -> Option<f64> {
    if pulse_us == 0 {
        return None;
    }
    Some((pulse_us as f64 / 2.0) / US_PER_CM)
}

/// Map a raw IR output level to presence
#[inline]
pub fn presence_from_level(level_high: bool, active_low: bool) -> bool {
    if active_low {
        !level_high
    } else {
        level_high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_from_echo() {
        assert_eq!(distance_from_echo_us(0), None);
        let cm = distance_from_echo_us(582).unwrap();
        assert!((cm - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_presence_from_level() {
        assert!(presence_from_level(false, true));
        assert!(!presence_from_level(true, true));
        assert!(presence_from_level(true, false));
        assert!(!presence_from_level(false, false));
    }

    #[test]
    fn test_timeout_classification() {
        assert!(SensorError::Timeout.is_timeout());
        assert!(!SensorError::Simulated.is_timeout());
    }
}
