//! Output formatting for snapshots and departures.
//!
//! Supports pretty-printing, JSON serialization, and one-line departure
//! summaries.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::departures::{CoordinatorSnapshot, DepartureRecord};
use crate::sensors::SensorSummary;

/// Logs a snapshot using Rust's debug pretty-print format.
pub fn print_pretty(snapshot: &CoordinatorSnapshot) {
    debug!("{:#?}", snapshot);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local_hm(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// `X58 to Mount Nelson at 08:15 (exp 08:17) in 12 min`
pub fn format_departure(departure: &DepartureRecord) -> String {
    let mut line = format!(
        "{} to {} at {}",
        departure.line_number,
        departure.destination_name,
        local_hm(departure.scheduled_time)
    );
    if departure.estimated_time.is_some() && departure.estimated_time != departure.scheduled_time {
        line.push_str(&format!(" (exp {})", local_hm(departure.estimated_time)));
    }
    if let Some(minutes) = departure.minutes_until() {
        line.push_str(&format!(" in {} min", minutes));
    }
    if departure.cancelled {
        line.push_str(" [cancelled]");
    }
    line
}

/// Logs one line per stop summarizing its sensors.
pub fn print_summaries(summaries: &[SensorSummary]) {
    for summary in summaries {
        info!(
            stop_id = %summary.stop_id,
            status = %summary.bus_status,
            route = summary.route.as_deref().unwrap_or("-"),
            destination = summary.destination.as_deref().unwrap_or("-"),
            minutes_to_departure = ?summary.minutes_to_departure,
            minutes_to_leave = ?summary.minutes_to_leave,
            should_leave_now = summary.should_leave_now,
            "{}",
            summary.stop_name
        );
    }
}
