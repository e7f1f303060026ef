//! HTML dashboard rendered from a status snapshot

use crate::domain::status::StatusSnapshot;
use std::fmt::Write;

const STYLE: &str = r#"<style>
body { font-family: Arial, sans-serif; background: linear-gradient(to bottom right, #e0f7fa, #f1f8e9); color: #222; margin: 0; padding: 20px; text-align: center; }
h2 { color: #0277bd; margin-bottom: 10px; }
.status-bar { background: #ffffffcc; border-radius: 10px; box-shadow: 0 2px 6px rgba(0,0,0,0.2); padding: 12px; margin-bottom: 20px; display: inline-block; }
.slot { display: inline-block; border-radius: 10px; box-shadow: 0 2px 6px rgba(0,0,0,0.2); padding: 10px; margin: 10px; width: 180px; }
.slot h3 { margin-top: 0; color: #01579b; }
.occupied { background: #ffebee; border: 2px solid #e53935; }
.free { background: #e8f5e9; border: 2px solid #43a047; }
table { margin: 0 auto 20px; border-collapse: collapse; width: 90%; background: #ffffffcc; box-shadow: 0 2px 6px rgba(0,0,0,0.2); }
th { background-color: #0288d1; color: white; padding: 8px; }
td { padding: 8px; border-bottom: 1px solid #ddd; }
tr:nth-child(even) { background-color: #f2f2f2; }
.footer { margin-top: 20px; font-size: 13px; color: #555; }
</style>"#;

/// Minimal escaping for text interpolated into HTML
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Full page, auto-refreshing every 2 seconds
pub fn render_dashboard(snapshot: &StatusSnapshot, site: &str) -> String {
    let mut html = String::with_capacity(4096);
    let site = escape(site);

    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\">\
         <meta http-equiv=\"refresh\" content=\"2\"><title>Parking Bay {site}</title>{STYLE}</head><body>"
    );
    let _ = write!(html, "<h2>Parking Bay {site}</h2>");

    let (status_color, status_text) =
        if snapshot.full { ("red", "FULL") } else { ("green", "Available") };
    let gate = if snapshot.gate_open { "Open" } else { "Closed" };
    let _ = write!(
        html,
        "<div class=\"status-bar\"><b>Total Slots:</b> {} &nbsp;&nbsp; <b>Free:</b> {} &nbsp;&nbsp; \
         <b>Occupied:</b> {} &nbsp;&nbsp; <b>Gate:</b> {gate} &nbsp;&nbsp; <b>Status:</b> \
         <span style=\"color:{status_color};font-weight:bold;\">{status_text}</span></div><br>",
        snapshot.total, snapshot.free, snapshot.occupied
    );

    for slot in &snapshot.slots {
        let class = if slot.occupied { "occupied" } else { "free" };
        let _ = write!(html, "<div class=\"slot {class}\"><h3>Slot {}</h3>", slot.slot);
        match (slot.id, &slot.time_in, slot.elapsed_hms()) {
            (Some(id), Some(time_in), Some(elapsed)) => {
                let state = if slot.vacating { "Leaving" } else { "Occupied" };
                let _ = write!(
                    html,
                    "<b>Status:</b> <span style=\"color:#e53935;\">{state}</span><br>\
                     <b>ID:</b> {id}<br><b>Time-In:</b> {time_in}<br><b>Elapsed:</b> {elapsed}<br>"
                );
            }
            _ => html.push_str("<b>Status:</b> <span style=\"color:#43a047;\">Free</span>"),
        }
        html.push_str("</div>");
    }

    html.push_str("<h3 style=\"color:#1565c0;\">Active Tickets</h3>");
    html.push_str("<table><tr><th>ID</th><th>Slot</th><th>Time-In</th><th>Elapsed</th></tr>");
    for slot in snapshot.slots.iter().filter(|s| s.occupied) {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            slot.id.map(|id| id.to_string()).unwrap_or_default(),
            slot.slot,
            slot.time_in.as_deref().unwrap_or(""),
            slot.elapsed_hms().unwrap_or_default()
        );
    }
    html.push_str("</table>");

    html.push_str("<h3 style=\"color:#2e7d32;\">Recent Closed Tickets</h3>");
    html.push_str(
        "<table><tr><th>ID</th><th>Slot</th><th>Duration</th><th>Fee</th><th>Time-Out</th></tr>",
    );
    for ticket in &snapshot.closed {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            ticket.id,
            ticket.slot,
            ticket.duration,
            escape(&ticket.fee),
            ticket.time_out
        );
    }
    html.push_str("</table>");

    let _ = write!(
        html,
        "<div class=\"footer\">Updated automatically every 2 seconds - snapshot {} at {}</div>",
        snapshot.tick, snapshot.generated_at
    );
    html.push_str("</body></html>");
    html
}
