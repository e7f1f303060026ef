//! Notification worker - delivers closed-ticket notices off the control loop
//!
//! The controller enqueues with `try_send` and never waits on the network; a
//! full queue drops the notice. The worker performs the actual delivery with
//! the backend's own timeout.

use crate::infra::metrics::Metrics;
use crate::io::notifier::{Notifier, TicketNotice};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A notice waiting for delivery
#[derive(Debug)]
pub struct NotifyCmd {
    pub notice: TicketNotice,
    /// When the notice was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking handle used by the controller
#[derive(Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<NotifyCmd>,
    metrics: Arc<Metrics>,
}

impl NotifySender {
    /// Enqueue a notice. Returns false if it was dropped.
    pub fn dispatch(&self, notice: TicketNotice) -> bool {
        let ticket_ref = notice.ticket.ticket_ref.clone();
        match self.tx.try_send(NotifyCmd { notice, enqueued_at: Instant::now() }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_notification_dropped();
                warn!(ticket_ref = %ticket_ref, "notify_queue_full_dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_notification_dropped();
                warn!(ticket_ref = %ticket_ref, "notify_worker_gone_dropped");
                false
            }
        }
    }
}

pub struct NotifyWorker {
    notifier: Arc<dyn Notifier>,
    cmd_rx: mpsc::Receiver<NotifyCmd>,
    metrics: Arc<Metrics>,
}

impl NotifyWorker {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        cmd_rx: mpsc::Receiver<NotifyCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { notifier, cmd_rx, metrics }
    }

    /// Deliver notices until every sender is dropped
    pub async fn run(mut self) {
        info!(backend = self.notifier.name(), "notify_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;
            let send_start = Instant::now();
            let result = self.notifier.send(&cmd.notice).await;
            let send_us = send_start.elapsed().as_micros() as u64;

            match result {
                Ok(()) => {
                    self.metrics.record_notification_sent();
                    info!(
                        ticket_ref = %cmd.notice.ticket.ticket_ref,
                        queue_delay_us = %queue_delay_us,
                        send_us = %send_us,
                        "notification_sent"
                    );
                }
                Err(e) => {
                    self.metrics.record_notification_failed();
                    warn!(
                        ticket_ref = %cmd.notice.ticket.ticket_ref,
                        backend = self.notifier.name(),
                        error = %e,
                        "notification_failed"
                    );
                }
            }
        }

        info!("notify_worker_stopped");
    }
}

/// Create the notification channel and worker
///
/// Returns the sender (for the controller) and the worker (to be spawned)
pub fn create_notify_worker(
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (NotifySender, NotifyWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size.max(1));
    let worker = NotifyWorker::new(notifier, cmd_rx, metrics.clone());
    (NotifySender { tx: cmd_tx, metrics }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::ClosedTicket;
    use crate::domain::types::{SlotId, SlotIndex};
    use crate::io::notifier::NotifyError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records delivered ticket refs; fails every notice when `fail` is set
    #[derive(Default)]
    struct RecordingNotifier {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Rejected(500));
            }
            self.delivered.lock().push(notice.ticket.ticket_ref.clone());
            Ok(())
        }
    }

    fn notice(ticket_ref: &str) -> TicketNotice {
        let ticket = ClosedTicket {
            ticket_ref: ticket_ref.to_string(),
            id: SlotId(1),
            slot_index: SlotIndex(0),
            time_in_epoch_ms: 0,
            time_out_epoch_ms: 60_000,
            duration_ms: 60_000,
            billed_minutes: 1,
            fee_cents: 50,
            closed: true,
        };
        TicketNotice::new("test", ticket, "$")
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) = create_notify_worker(notifier.clone(), metrics.clone(), 8);

        assert!(sender.dispatch(notice("a")));
        assert!(sender.dispatch(notice("b")));
        drop(sender);
        worker.run().await;

        assert_eq!(*notifier.delivered.lock(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(metrics.summary().notifications_sent, 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) = create_notify_worker(notifier.clone(), metrics.clone(), 1);

        assert!(sender.dispatch(notice("kept")));
        assert!(!sender.dispatch(notice("dropped")));
        assert_eq!(metrics.summary().notifications_dropped, 1);

        drop(sender);
        worker.run().await;
        assert_eq!(*notifier.delivered.lock(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) = create_notify_worker(notifier, metrics.clone(), 4);

        sender.dispatch(notice("x"));
        drop(sender);
        worker.run().await;

        let summary = metrics.summary();
        assert_eq!(summary.notifications_failed, 1);
        assert_eq!(summary.notifications_sent, 0);
    }
}
