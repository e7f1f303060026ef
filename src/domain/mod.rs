//! Domain models - core parking types
//!
//! This module contains the plain data types used throughout the system:
//! - `SlotId` / `SlotIndex` - assignment identifiers and physical bays
//! - `Timestamp` - monotonic + wall-clock time as seen by the control loop
//! - `ClosedTicket` - immutable record of a finished stay, fee arithmetic
//! - `StatusSnapshot` - read-only view served to renderers

pub mod status;
pub mod ticket;
pub mod types;

// Re-export commonly used types at module level
pub use status::StatusSnapshot;
pub use ticket::ClosedTicket;
pub use types::{SlotId, SlotIndex, Timestamp};
