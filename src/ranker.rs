//! Turns the raw departure list of one stop into its [`StopSnapshot`].

use chrono::{DateTime, Utc};

use crate::config::StopConfig;
use crate::departures::{DepartureRecord, StopSnapshot};
use crate::filter::apply_filters;
use crate::status::classify;

/// Filters, drops cancelled and passed departures, orders by soonest and
/// classifies the next one.
///
/// The full ordered list is kept; callers decide how much of it to show.
pub fn process_departures(
    departures: &[DepartureRecord],
    stop: &StopConfig,
    now: DateTime<Utc>,
) -> StopSnapshot {
    let mut upcoming: Vec<DepartureRecord> = apply_filters(departures, stop)
        .into_iter()
        .filter(|d| !d.cancelled && d.is_upcoming())
        .collect();

    // Records without any timing sort last.
    upcoming.sort_by_key(|d| d.minutes_until().unwrap_or(i64::MAX));

    StopSnapshot::from_sorted(upcoming, now, |next| {
        classify(next, stop.early_threshold(), stop.late_threshold())
    })
}
