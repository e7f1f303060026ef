//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `debounce` - Per-slot presence debouncing
//! - `entry_gate` - Entry sensor and gate state machine
//! - `slot_registry` - Slot state and identifier pool
//! - `ticket_ledger` - Closed ticket history and fee computation
//! - `bay` - Pure bay core combining the above into effects
//! - `controller` - Control loop executing effects against hardware
//! - `notify_worker` - Async ticket notification worker

pub mod bay;
pub mod controller;
pub mod debounce;
pub mod entry_gate;
pub mod notify_worker;
pub mod slot_registry;
pub mod ticket_ledger;

// Re-export commonly used types
pub use bay::{Bay, Effect, Effects};
pub use controller::BayController;
pub use notify_worker::{create_notify_worker, NotifySender, NotifyWorker};
