//! Two-line status display (16x2 character LCD)

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Characters per LCD line
pub const LINE_WIDTH: usize = 16;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display link error: {0}")]
    Link(String),
    #[error("display did not acknowledge in time")]
    Timeout,
}

/// Display collaborator. Must be safe to call at any time, including before
/// the first tick.
#[async_trait]
pub trait Display: Send {
    async fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError>;
}

/// Truncate to the LCD width on a char boundary
pub fn fit_line(line: &str) -> String {
    line.chars().take(LINE_WIDTH).collect()
}

/// Lines shown when every slot is occupied
pub fn full_lines() -> (String, String) {
    ("     FULL".to_string(), String::new())
}

/// Lines shown when a car arrives at a full bay
pub fn rejected_lines() -> (String, String) {
    ("    FULL".to_string(), String::new())
}

pub fn starting_lines() -> (String, String) {
    ("Starting...".to_string(), String::new())
}

pub fn error_lines() -> (String, String) {
    ("Error".to_string(), String::new())
}

/// Best-effort "Error" screen ahead of a fatal startup failure
pub async fn show_startup_error(display: &mut dyn Display) {
    let (line1, line2) = error_lines();
    if let Err(e) = display.show(&line1, &line2).await {
        warn!(error = %e, "error_screen_failed");
    }
}

/// Summary lines from the labels of the free slots
pub fn occupancy_lines(free_labels: &[String], total: usize) -> (String, String) {
    if free_labels.is_empty() {
        return full_lines();
    }
    let free = free_labels.len();
    (
        format!("Free: {}", free_labels.join(" ")),
        format!("Occ:{} Free:{}", total.saturating_sub(free), free),
    )
}

/// Display that writes its lines to the log. Repeated identical frames are
/// suppressed.
#[derive(Default)]
pub struct LogDisplay {
    last: Option<(String, String)>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Display for LogDisplay {
    async fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        let frame = (fit_line(line1), fit_line(line2));
        if self.last.as_ref() != Some(&frame) {
            info!(line1 = %frame.0, line2 = %frame.1, "display");
            self.last = Some(frame);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sim::SimBay;

    #[test]
    fn test_fit_line_truncates() {
        assert_eq!(fit_line("Free: S1 S2 S3 S4 S5"), "Free: S1 S2 S3 S");
        assert_eq!(fit_line("short"), "short");
    }

    #[test]
    fn test_occupancy_lines() {
        let labels = vec!["S1".to_string(), "S3".to_string()];
        let (l1, l2) = occupancy_lines(&labels, 3);
        assert_eq!(l1, "Free: S1 S3");
        assert_eq!(l2, "Occ:1 Free:2");
    }

    #[test]
    fn test_occupancy_lines_full() {
        assert_eq!(occupancy_lines(&[], 3), full_lines());
        assert_eq!(full_lines().0, "     FULL");
    }

    #[tokio::test]
    async fn test_log_display_accepts_any_time() {
        let mut display = LogDisplay::new();
        let (l1, l2) = starting_lines();
        assert!(display.show(&l1, &l2).await.is_ok());
        assert!(display.show(&l1, &l2).await.is_ok());
        assert_eq!(display.last, Some((l1, l2)));
    }

    #[tokio::test]
    async fn test_startup_error_screen() {
        let sim = SimBay::new(1);
        let mut display = sim.display();
        show_startup_error(&mut display).await;
        assert_eq!(sim.lines(), ("Error".to_string(), String::new()));

        // A dead display is tolerated
        sim.fail_display(true);
        show_startup_error(&mut display).await;
        assert_eq!(sim.display_writes(), 1);
    }
}
