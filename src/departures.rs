//! Departure records and the per-cycle snapshots built from them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::status::BusStatus;

/// One scheduled visit of a vehicle at a stop, as reported by a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartureRecord {
    pub line_number: String,
    pub destination_name: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub estimated_time: Option<DateTime<Utc>>,
    pub scheduled_minutes_until: Option<i64>,
    pub estimated_minutes_until: Option<i64>,
    pub cancelled: bool,
    pub trip_id: Option<String>,
    pub platform_code: Option<String>,
    pub stop_name: Option<String>,
}

impl DepartureRecord {
    /// A record with only line and destination set.
    pub fn new(line_number: impl Into<String>, destination_name: impl Into<String>) -> Self {
        Self {
            line_number: line_number.into(),
            destination_name: destination_name.into(),
            scheduled_time: None,
            estimated_time: None,
            scheduled_minutes_until: None,
            estimated_minutes_until: None,
            cancelled: false,
            trip_id: None,
            platform_code: None,
            stop_name: None,
        }
    }

    /// Estimated minutes until departure, falling back to the timetable.
    pub fn minutes_until(&self) -> Option<i64> {
        self.estimated_minutes_until.or(self.scheduled_minutes_until)
    }

    /// True when either source reports a non-negative minutes-until value.
    pub fn is_upcoming(&self) -> bool {
        let ahead = |m: Option<i64>| m.is_some_and(|m| m >= 0);
        ahead(self.estimated_minutes_until) || ahead(self.scheduled_minutes_until)
    }
}

/// Processed result for one stop after one cycle.
///
/// Either there is a next departure, with its minutes-until and the full
/// upcoming list, or all three are empty. The constructors are the only way
/// to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopSnapshot {
    next_departure: Option<DepartureRecord>,
    bus_status: Option<BusStatus>,
    time_to_departure_minutes: Option<i64>,
    upcoming_departures: Vec<DepartureRecord>,
    last_updated: DateTime<Utc>,
}

impl StopSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            next_departure: None,
            bus_status: None,
            time_to_departure_minutes: None,
            upcoming_departures: Vec::new(),
            last_updated: now,
        }
    }

    /// Builds a snapshot from departures already sorted soonest first.
    /// `status_of` is applied to the head of the list.
    pub fn from_sorted<F>(upcoming: Vec<DepartureRecord>, now: DateTime<Utc>, status_of: F) -> Self
    where
        F: FnOnce(&DepartureRecord) -> BusStatus,
    {
        let Some(next) = upcoming.first().cloned() else {
            return Self::empty(now);
        };

        Self {
            bus_status: Some(status_of(&next)),
            time_to_departure_minutes: next.minutes_until(),
            next_departure: Some(next),
            upcoming_departures: upcoming,
            last_updated: now,
        }
    }

    pub fn next_departure(&self) -> Option<&DepartureRecord> {
        self.next_departure.as_ref()
    }

    pub fn bus_status(&self) -> Option<BusStatus> {
        self.bus_status
    }

    pub fn time_to_departure_minutes(&self) -> Option<i64> {
        self.time_to_departure_minutes
    }

    pub fn upcoming_departures(&self) -> &[DepartureRecord] {
        &self.upcoming_departures
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// The coordinator's published state: one [`StopSnapshot`] per configured
/// stop, keyed by stop id.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    stops: HashMap<String, StopSnapshot>,
    min_time_to_departure: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl CoordinatorSnapshot {
    pub fn new(stops: HashMap<String, StopSnapshot>, updated_at: DateTime<Utc>) -> Self {
        let min_time_to_departure = stops
            .values()
            .filter_map(StopSnapshot::time_to_departure_minutes)
            .min();
        Self {
            stops,
            min_time_to_departure,
            updated_at,
        }
    }

    pub fn get(&self, stop_id: &str) -> Option<&StopSnapshot> {
        self.stops.get(stop_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StopSnapshot)> {
        self.stops.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Soonest departure across all stops; stops without one do not count.
    pub fn min_time_to_departure(&self) -> Option<i64> {
        self.min_time_to_departure
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
