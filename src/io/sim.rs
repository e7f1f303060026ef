//! In-process simulated bay for development and tests
//!
//! `SimBay` is a cloneable handle onto shared state: a traffic driver (or a
//! test) sets distances and presence, while `SimHardware` and `SimDisplay`
//! hand that state to the controller through the normal collaborator traits.

use crate::domain::types::SlotIndex;
use crate::io::display::{fit_line, Display, DisplayError};
use crate::io::hardware::{BayHardware, SensorError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct SimState {
    /// None: no echo (sensor reports a timeout)
    distance_cm: Option<f64>,
    presence: Vec<bool>,
    gate_open: bool,
    gate_actuations: u64,
    distance_fault: bool,
    presence_fault: bool,
    actuator_fault: bool,
    display_fault: bool,
    lines: (String, String),
    display_writes: u64,
}

#[derive(Clone, Default)]
pub struct SimBay {
    state: Arc<Mutex<SimState>>,
}

impl SimBay {
    pub fn new(slot_count: usize) -> Self {
        let state = SimState { presence: vec![false; slot_count], ..SimState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn hardware(&self) -> SimHardware {
        SimHardware { bay: self.clone() }
    }

    pub fn display(&self) -> SimDisplay {
        SimDisplay { bay: self.clone() }
    }

    pub fn set_distance(&self, distance_cm: Option<f64>) {
        self.state.lock().distance_cm = distance_cm;
    }

    pub fn set_presence(&self, slot: SlotIndex, present: bool) {
        if let Some(p) = self.state.lock().presence.get_mut(slot.0) {
            *p = present;
        }
    }

    pub fn fail_distance(&self, fail: bool) {
        self.state.lock().distance_fault = fail;
    }

    pub fn fail_presence(&self, fail: bool) {
        self.state.lock().presence_fault = fail;
    }

    pub fn fail_actuator(&self, fail: bool) {
        self.state.lock().actuator_fault = fail;
    }

    pub fn fail_display(&self, fail: bool) {
        self.state.lock().display_fault = fail;
    }

    pub fn gate_open(&self) -> bool {
        self.state.lock().gate_open
    }

    /// Number of servo commands accepted so far
    pub fn gate_actuations(&self) -> u64 {
        self.state.lock().gate_actuations
    }

    pub fn lines(&self) -> (String, String) {
        self.state.lock().lines.clone()
    }

    pub fn display_writes(&self) -> u64 {
        self.state.lock().display_writes
    }
}

pub struct SimHardware {
    bay: SimBay,
}

#[async_trait]
impl BayHardware for SimHardware {
    async fn read_distance_cm(&mut self) -> Result<f64, SensorError> {
        let state = self.bay.state.lock();
        if state.distance_fault {
            return Err(SensorError::Simulated);
        }
        state.distance_cm.ok_or(SensorError::Timeout)
    }

    async fn read_presence(&mut self, slot: SlotIndex) -> Result<bool, SensorError> {
        let state = self.bay.state.lock();
        if state.presence_fault {
            return Err(SensorError::Simulated);
        }
        state.presence.get(slot.0).copied().ok_or(SensorError::NoSuchSlot(slot))
    }

    async fn set_gate(&mut self, open: bool) -> Result<(), SensorError> {
        let mut state = self.bay.state.lock();
        if state.actuator_fault {
            return Err(SensorError::Simulated);
        }
        state.gate_open = open;
        state.gate_actuations += 1;
        debug!(open = %open, "sim_gate_set");
        Ok(())
    }
}

pub struct SimDisplay {
    bay: SimBay,
}

#[async_trait]
impl Display for SimDisplay {
    async fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        let mut state = self.bay.state.lock();
        if state.display_fault {
            return Err(DisplayError::Link("simulated fault".to_string()));
        }
        state.lines = (fit_line(line1), fit_line(line2));
        state.display_writes += 1;
        Ok(())
    }
}
