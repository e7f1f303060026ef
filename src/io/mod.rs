//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `hardware` - Sensor and servo abstraction used by the control loop
//! - `display` - 16x2 character display abstraction and line formatting
//! - `sensor_bridge` - Serial link to the sensor bridge microcontroller
//! - `sim` - In-memory hardware for tests and the simulator binary
//! - `notifier` - Ticket notification backends (log, Telegram, MQTT)
//! - `status_server` - Read-only HTTP status endpoint
//! - `dashboard` - HTML rendering of the status snapshot
//! - `prometheus` - Prometheus text exposition

pub mod dashboard;
pub mod display;
pub mod hardware;
pub mod notifier;
pub mod prometheus;
pub mod sensor_bridge;
pub mod sim;
pub mod status_server;

// Re-export commonly used types
pub use display::{Display, DisplayError, LogDisplay};
pub use hardware::{BayHardware, SensorError};
pub use notifier::{build_notifier, Notifier, NotifyError, TicketNotice};
pub use sensor_bridge::SensorBridge;
pub use sim::SimBay;
pub use status_server::{start_status_server, StatusContext, StatusServer};
