//! Per-stop include/exclude filtering by line and destination.

use crate::config::{FilterMode, StopConfig};
use crate::departures::DepartureRecord;

/// Narrows `departures` according to the stop's filters.
///
/// With both line and destination filters set, a departure matches if it
/// matches either category. Include keeps matches, Exclude drops them.
pub fn apply_filters(departures: &[DepartureRecord], stop: &StopConfig) -> Vec<DepartureRecord> {
    if !stop.has_filters() {
        return departures.to_vec();
    }

    departures
        .iter()
        .filter(|d| {
            let matched = matches_stop_filters(d, stop);
            match stop.filter_mode {
                FilterMode::Include => matched,
                FilterMode::Exclude => !matched,
            }
        })
        .cloned()
        .collect()
}

fn matches_stop_filters(departure: &DepartureRecord, stop: &StopConfig) -> bool {
    let line = !stop.line_filters.is_empty()
        && matches_line_filter(&departure.line_number, &stop.line_filters);
    let destination = !stop.destination_filters.is_empty()
        && matches_destination_filter(&departure.destination_name, &stop.destination_filters);
    line || destination
}

/// Case-insensitive match in both directions, so `58` matches `X58` and
/// `X58` matches `58`.
pub fn matches_line_filter<S: AsRef<str>>(line_number: &str, filters: &[S]) -> bool {
    let line = line_number.to_lowercase();
    filters.iter().any(|f| {
        let f = f.as_ref().to_lowercase();
        line.contains(&f) || f.contains(&line)
    })
}

/// Case-insensitive containment of a filter term in the destination.
pub fn matches_destination_filter<S: AsRef<str>>(destination: &str, filters: &[S]) -> bool {
    let destination = destination.to_lowercase();
    filters
        .iter()
        .any(|f| destination.contains(&f.as_ref().to_lowercase()))
}
