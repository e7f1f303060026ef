//! Prometheus text exposition of bay metrics
//!
//! Served at /metrics by the status server.

use crate::infra::metrics::{MetricsSummary, TICK_BUCKET_BOUNDS, TICK_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; TICK_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in TICK_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[TICK_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_loop_metrics(&mut output, site, summary);
    write_gate_metrics(&mut output, site, summary);
    write_occupancy_metrics(&mut output, site, summary);
    write_fault_metrics(&mut output, site, summary);
    write_notify_metrics(&mut output, site, summary);

    output
}

fn write_loop_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "bay_ticks_total",
        "Control loop ticks completed",
        MetricType::Counter,
        site,
        summary.ticks_total,
    );
    write_histogram(
        output,
        "bay_tick_duration_us",
        "Control loop tick duration in microseconds",
        site,
        &summary.tick_buckets,
        summary.tick_avg_us,
    );
    write_metric(
        output,
        "bay_tick_duration_max_us",
        "Longest tick observed",
        MetricType::Gauge,
        site,
        summary.tick_max_us,
    );
}

fn write_gate_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "bay_gate_opens_total",
        "Gate openings for an arriving vehicle",
        MetricType::Counter,
        site,
        summary.gate_opens,
    );
    write_metric(
        output,
        "bay_gate_closes_grace_total",
        "Gate closes after the no-car grace window",
        MetricType::Counter,
        site,
        summary.gate_closes_grace,
    );
    write_metric(
        output,
        "bay_gate_closes_full_total",
        "Gate force-closes because the bay filled",
        MetricType::Counter,
        site,
        summary.gate_closes_full,
    );
    write_metric(
        output,
        "bay_full_rejections_total",
        "Arrivals rejected while the bay was full",
        MetricType::Counter,
        site,
        summary.full_rejections,
    );
    write_metric(
        output,
        "bay_gate_open",
        "Gate state (1 = open)",
        MetricType::Gauge,
        site,
        summary.gate_open as u64,
    );
}

fn write_occupancy_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "bay_occupied_slots",
        "Slots currently holding a vehicle",
        MetricType::Gauge,
        site,
        summary.occupied_slots,
    );
    write_metric(
        output,
        "bay_free_ids",
        "Identifiers available for assignment",
        MetricType::Gauge,
        site,
        summary.free_ids,
    );
    write_metric(
        output,
        "bay_assignments_total",
        "Identifiers assigned to parked vehicles",
        MetricType::Counter,
        site,
        summary.assignments,
    );
    write_metric(
        output,
        "bay_refused_assignments_total",
        "Parked vehicles refused an identifier",
        MetricType::Counter,
        site,
        summary.refused_assignments,
    );
    write_metric(
        output,
        "bay_tickets_closed_total",
        "Tickets closed on departure",
        MetricType::Counter,
        site,
        summary.tickets_closed,
    );
    write_metric(
        output,
        "bay_revenue_cents_total",
        "Fees charged in cents",
        MetricType::Counter,
        site,
        summary.revenue_cents,
    );
}

fn write_fault_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "bay_sensor_faults_total",
        "Sensor reads that failed (timeouts on the entry sensor excluded)",
        MetricType::Counter,
        site,
        summary.sensor_faults,
    );
    write_metric(
        output,
        "bay_actuator_faults_total",
        "Gate servo commands that failed",
        MetricType::Counter,
        site,
        summary.actuator_faults,
    );
    write_metric(
        output,
        "bay_display_failures_total",
        "Display updates that failed",
        MetricType::Counter,
        site,
        summary.display_failures,
    );
}

fn write_notify_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "bay_notifications_sent_total",
        "Ticket notifications delivered",
        MetricType::Counter,
        site,
        summary.notifications_sent,
    );
    write_metric(
        output,
        "bay_notifications_failed_total",
        "Ticket notifications the backend rejected or could not reach",
        MetricType::Counter,
        site,
        summary.notifications_failed,
    );
    write_metric(
        output,
        "bay_notifications_dropped_total",
        "Ticket notifications dropped on a full queue",
        MetricType::Counter,
        site,
        summary.notifications_dropped,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::Metrics;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_tick(150);
        metrics.record_tick(250);
        metrics.record_gate_opened();
        metrics.record_ticket_closed(150);
        metrics.set_occupancy(2, 1);

        let output = format_prometheus_metrics(&metrics.summary(), "lot-a");

        assert!(output.contains("bay_ticks_total{site=\"lot-a\"} 2"));
        assert!(output.contains("bay_tick_duration_us_bucket{site=\"lot-a\",le=\"200\"} 1"));
        assert!(output.contains("bay_tick_duration_us_bucket{site=\"lot-a\",le=\"+Inf\"} 2"));
        assert!(output.contains("bay_tick_duration_us_sum{site=\"lot-a\"} 400"));
        assert!(output.contains("bay_gate_open{site=\"lot-a\"} 1"));
        assert!(output.contains("bay_revenue_cents_total{site=\"lot-a\"} 150"));
        assert!(output.contains("bay_occupied_slots{site=\"lot-a\"} 2"));
        assert!(output.contains("# TYPE bay_gate_opens_total counter"));
    }
}
