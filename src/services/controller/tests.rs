//! Tests for the BayController, driven through the simulated bay

use super::*;
use crate::domain::types::SlotId;
use crate::io::notifier::{Notifier, NotifyError, TicketNotice};
use crate::io::sim::SimBay;
use crate::services::notify_worker::{create_notify_worker, NotifyWorker};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingNotifier {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError> {
        self.texts.lock().push(notice.text.clone());
        Ok(())
    }
}

/// Test harness holding the simulated hardware handle and the notification
/// worker, which only runs once the controller is dropped
struct TestBay {
    controller: BayController,
    sim: SimBay,
    metrics: Arc<Metrics>,
    worker: NotifyWorker,
    notifier: Arc<RecordingNotifier>,
    t0: Timestamp,
}

impl TestBay {
    async fn at(&mut self, ms: u64) {
        self.controller.tick(self.t0.plus_ms(ms)).await;
    }

    fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.controller.snapshot_receiver().borrow().clone()
    }

    /// Drop the controller and deliver every queued notification
    async fn delivered(self) -> Vec<String> {
        let TestBay { controller, worker, notifier, .. } = self;
        drop(controller);
        worker.run().await;
        let texts = notifier.texts.lock().clone();
        texts
    }
}

/// Defaults with 150ms debounce, 1s exit grace, 2s gate grace; no servo wait
fn test_config() -> Config {
    Config::default().with_timing(150, 1000, 2000).with_gate_actuation_ms(0)
}

async fn create_test_bay(config: Config) -> TestBay {
    let sim = SimBay::new(config.slot_count());
    let metrics = Arc::new(Metrics::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let (notify, worker) = create_notify_worker(notifier.clone(), metrics.clone(), 8);
    let (snapshot_tx, _) = watch::channel(Arc::new(StatusSnapshot::starting(config.slot_count())));
    let mut controller = BayController::new(
        config,
        Box::new(sim.hardware()),
        Box::new(sim.display()),
        notify,
        metrics.clone(),
        snapshot_tx,
    );
    let t0 = Timestamp::now();
    controller.startup(t0).await;
    TestBay { controller, sim, metrics, worker, notifier, t0 }
}

#[tokio::test]
async fn test_startup_shows_free_slots() {
    let bay = create_test_bay(test_config()).await;
    assert_eq!(bay.sim.lines(), ("Free: S1 S2 S3".to_string(), "Occ:0 Free:3".to_string()));
    // Banner, then occupancy
    assert_eq!(bay.sim.display_writes(), 2);
    assert_eq!(bay.snapshot().free, 3);
}

#[tokio::test]
async fn test_car_present_at_startup_is_assigned() {
    let config = test_config();
    let sim = SimBay::new(3);
    sim.set_presence(SlotIndex(1), true);
    let metrics = Arc::new(Metrics::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let (notify, _worker) = create_notify_worker(notifier, metrics.clone(), 8);
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(StatusSnapshot::starting(3)));
    let mut controller = BayController::new(
        config,
        Box::new(sim.hardware()),
        Box::new(sim.display()),
        notify,
        metrics.clone(),
        snapshot_tx,
    );
    controller.startup(Timestamp::now()).await;

    let snapshot = snapshot_rx.borrow().clone();
    assert_eq!(snapshot.slots[1].id, Some(SlotId(1)));
    assert_eq!(sim.lines().0, "Free: S1 S3");
    assert_eq!(metrics.summary().assignments, 1);
}

#[tokio::test]
async fn test_arrival_opens_gate_then_grace_close() {
    let mut bay = create_test_bay(test_config()).await;

    bay.sim.set_distance(Some(8.0));
    bay.at(0).await;
    assert!(bay.sim.gate_open());
    assert!(bay.snapshot().gate_open);

    // Car drives through; sensor sees nothing from 200ms on
    bay.sim.set_distance(None);
    for ms in (200..=2000).step_by(200) {
        bay.at(ms).await;
    }
    assert!(bay.sim.gate_open(), "closed before the grace window elapsed");

    bay.at(2200).await;
    assert!(!bay.sim.gate_open());
    let summary = bay.metrics.summary();
    assert_eq!(summary.gate_opens, 1);
    assert_eq!(summary.gate_closes_grace, 1);
    assert!(!summary.gate_open);
}

#[tokio::test]
async fn test_entry_check_respects_interval() {
    let mut bay = create_test_bay(test_config()).await;

    bay.at(0).await;
    bay.sim.set_distance(Some(8.0));
    // Next check is due at 200ms
    bay.at(100).await;
    assert!(!bay.sim.gate_open());
    bay.at(200).await;
    assert!(bay.sim.gate_open());
}

#[tokio::test]
async fn test_full_stay_closes_ticket_and_notifies() {
    let mut bay = create_test_bay(test_config()).await;

    bay.sim.set_presence(SlotIndex(0), true);
    bay.at(1000).await;
    bay.at(1150).await;
    assert_eq!(bay.snapshot().slots[0].id, Some(SlotId(1)));
    assert_eq!(bay.sim.lines().0, "Free: S2 S3");

    bay.sim.set_presence(SlotIndex(0), false);
    bay.at(125_000).await;
    // Debounced at 125150, exit grace until 126150
    bay.at(125_150).await;
    assert!(bay.snapshot().slots[0].vacating);
    bay.at(126_150).await;

    let snapshot = bay.snapshot();
    assert!(!snapshot.slots[0].occupied);
    assert_eq!(snapshot.closed.len(), 1);
    assert_eq!(snapshot.closed[0].billed_minutes, 3);
    assert_eq!(snapshot.closed[0].fee, "$1.50");
    assert_eq!(bay.sim.lines().0, "Free: S1 S2 S3");

    let summary = bay.metrics.summary();
    assert_eq!(summary.tickets_closed, 1);
    assert_eq!(summary.revenue_cents, 150);

    let texts = bay.delivered().await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("ID: 1 Slot: S1"));
    assert!(texts[0].contains("Duration: 3 minute(s)"));
    assert!(texts[0].contains("Fee: $1.50"));
}

#[tokio::test]
async fn test_full_bay_rejects_arrival() {
    let mut bay = create_test_bay(test_config()).await;

    for i in 0..3 {
        bay.sim.set_presence(SlotIndex(i), true);
    }
    bay.at(0).await;
    bay.at(150).await;
    assert!(bay.snapshot().full);
    assert_eq!(bay.sim.lines().0, "     FULL");

    bay.sim.set_distance(Some(5.0));
    bay.at(400).await;
    assert!(!bay.sim.gate_open());
    assert_eq!(bay.sim.gate_actuations(), 0);
    assert_eq!(bay.sim.lines().0, "    FULL");
    assert_eq!(bay.metrics.summary().full_rejections, 1);
}

#[tokio::test]
async fn test_gate_force_closed_when_bay_fills() {
    let mut bay = create_test_bay(test_config()).await;

    bay.sim.set_distance(Some(5.0));
    bay.at(0).await;
    assert!(bay.sim.gate_open());

    for i in 0..3 {
        bay.sim.set_presence(SlotIndex(i), true);
    }
    bay.at(50).await;
    // Entry is checked before the slots settle, so the gate is still open
    bay.at(200).await;
    assert!(bay.snapshot().full);
    assert!(bay.sim.gate_open());

    // Next arrival reading finds no free identifier
    bay.at(400).await;
    assert!(!bay.sim.gate_open());
    assert_eq!(bay.metrics.summary().gate_closes_full, 1);
}

#[tokio::test]
async fn test_sensor_faults_are_contained() {
    let mut bay = create_test_bay(test_config()).await;

    bay.sim.set_distance(Some(5.0));
    bay.sim.fail_distance(true);
    bay.sim.set_presence(SlotIndex(0), true);
    bay.sim.fail_presence(true);
    for ms in [0, 200, 400] {
        bay.at(ms).await;
    }

    assert!(!bay.sim.gate_open());
    assert_eq!(bay.snapshot().occupied, 0);
    // One distance fault per check, one presence fault per slot per tick
    assert_eq!(bay.metrics.summary().sensor_faults, 3 + 3 * 3);

    // Recovery resumes normal operation
    bay.sim.fail_distance(false);
    bay.sim.fail_presence(false);
    bay.at(600).await;
    bay.at(750).await;
    assert!(bay.sim.gate_open());
    assert_eq!(bay.snapshot().occupied, 1);
}

#[tokio::test]
async fn test_collaborator_failures_do_not_stop_the_loop() {
    let mut bay = create_test_bay(test_config()).await;
    bay.sim.fail_actuator(true);
    bay.sim.fail_display(true);

    bay.sim.set_distance(Some(5.0));
    bay.at(0).await;
    bay.sim.set_presence(SlotIndex(2), true);
    bay.at(10).await;
    bay.at(160).await;

    let summary = bay.metrics.summary();
    assert_eq!(summary.actuator_faults, 1);
    assert!(summary.display_failures >= 2);
    // State still advanced
    assert!(bay.snapshot().gate_open);
    assert_eq!(bay.snapshot().slots[2].id, Some(SlotId(1)));
}

#[tokio::test]
async fn test_snapshot_tick_counter() {
    let mut bay = create_test_bay(test_config()).await;
    assert_eq!(bay.snapshot().tick, 0);
    bay.at(10).await;
    bay.at(20).await;
    assert_eq!(bay.snapshot().tick, 2);
    assert_eq!(bay.metrics.summary().ticks_total, 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_and_closes_gate() {
    let bay = create_test_bay(test_config()).await;
    let TestBay { mut controller, sim, .. } = bay;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    sim.set_distance(Some(5.0));
    let handle = tokio::spawn(async move {
        controller.run(shutdown_rx).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sim.gate_open());

    shutdown_tx.send_replace(true);
    handle.await.unwrap();
    assert!(!sim.gate_open());
}
