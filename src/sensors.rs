//! Per-stop values derived from a snapshot for display.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::StopConfig;
use crate::departures::{DepartureRecord, StopSnapshot};
use crate::status::BusStatus;

/// Read-only view over one stop's snapshot and its configuration.
#[derive(Debug, Clone, Copy)]
pub struct StopSensors<'a> {
    stop: &'a StopConfig,
    snapshot: Option<&'a StopSnapshot>,
}

impl<'a> StopSensors<'a> {
    pub fn new(stop: &'a StopConfig, snapshot: Option<&'a StopSnapshot>) -> Self {
        Self { stop, snapshot }
    }

    fn next(&self) -> Option<&'a DepartureRecord> {
        self.snapshot.and_then(StopSnapshot::next_departure)
    }

    pub fn stop(&self) -> &StopConfig {
        self.stop
    }

    /// Timetabled time of the next departure.
    pub fn next_departure_time(&self) -> Option<DateTime<Utc>> {
        self.next().and_then(|d| d.scheduled_time)
    }

    pub fn estimated_departure_time(&self) -> Option<DateTime<Utc>> {
        self.next().and_then(|d| d.estimated_time)
    }

    pub fn bus_status(&self) -> BusStatus {
        self.snapshot
            .and_then(StopSnapshot::bus_status)
            .unwrap_or(BusStatus::Unknown)
    }

    pub fn minutes_to_departure(&self) -> Option<i64> {
        self.snapshot.and_then(StopSnapshot::time_to_departure_minutes)
    }

    /// Minutes until the rider has to set off, never negative.
    pub fn minutes_to_leave(&self) -> Option<i64> {
        self.minutes_to_departure()
            .map(|ttd| (ttd - i64::from(self.stop.time_to_get_there())).max(0))
    }

    pub fn should_leave_now(&self) -> bool {
        self.minutes_to_leave() == Some(0)
    }

    pub fn route(&self) -> Option<&'a str> {
        self.next().map(|d| d.line_number.as_str())
    }

    pub fn destination(&self) -> Option<&'a str> {
        self.next().map(|d| d.destination_name.as_str())
    }

    pub fn upcoming_count(&self) -> usize {
        self.snapshot.map_or(0, |s| s.upcoming_departures().len())
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot.map(StopSnapshot::last_updated)
    }

    pub fn summary(&self) -> SensorSummary {
        SensorSummary {
            stop_id: self.stop.stop_id.clone(),
            stop_name: self.stop.display_name().to_string(),
            next_departure_time: self.next_departure_time(),
            estimated_departure_time: self.estimated_departure_time(),
            bus_status: self.bus_status(),
            minutes_to_departure: self.minutes_to_departure(),
            minutes_to_leave: self.minutes_to_leave(),
            should_leave_now: self.should_leave_now(),
            route: self.route().map(str::to_string),
            destination: self.destination().map(str::to_string),
            upcoming_count: self.upcoming_count(),
        }
    }
}

/// Owned copy of every sensor value, for printing or serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub stop_id: String,
    pub stop_name: String,
    pub next_departure_time: Option<DateTime<Utc>>,
    pub estimated_departure_time: Option<DateTime<Utc>>,
    pub bus_status: BusStatus,
    pub minutes_to_departure: Option<i64>,
    pub minutes_to_leave: Option<i64>,
    pub should_leave_now: bool,
    pub route: Option<String>,
    pub destination: Option<String>,
    pub upcoming_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn snapshot(minutes: i64, estimated: Option<DateTime<Utc>>) -> StopSnapshot {
        let next = DepartureRecord {
            scheduled_time: Some(at(8, 15)),
            estimated_time: estimated,
            scheduled_minutes_until: Some(minutes),
            ..DepartureRecord::new("X58", "Mount Nelson")
        };
        StopSnapshot::from_sorted(vec![next], at(8, 0), |_| BusStatus::Late)
    }

    #[test]
    fn test_sensors_without_snapshot() {
        let stop = StopConfig::new("7109023", "Grove Shop");
        let sensors = StopSensors::new(&stop, None);

        assert_eq!(sensors.bus_status(), BusStatus::Unknown);
        assert_eq!(sensors.next_departure_time(), None);
        assert_eq!(sensors.minutes_to_leave(), None);
        assert!(!sensors.should_leave_now());
        assert_eq!(sensors.route(), None);
        assert_eq!(sensors.upcoming_count(), 0);
    }

    #[test]
    fn test_sensors_empty_snapshot() {
        let stop = StopConfig::new("7109023", "Grove Shop");
        let empty = StopSnapshot::empty(at(8, 0));
        let sensors = StopSensors::new(&stop, Some(&empty));

        assert_eq!(sensors.bus_status(), BusStatus::Unknown);
        assert_eq!(sensors.minutes_to_departure(), None);
        assert_eq!(sensors.last_updated(), Some(at(8, 0)));
    }

    #[test]
    fn test_sensors_with_departure() {
        let stop = StopConfig::new("7109023", "Grove Shop").with_reminder(5, 10);
        let snap = snapshot(15, Some(at(8, 20)));
        let sensors = StopSensors::new(&stop, Some(&snap));

        assert_eq!(sensors.next_departure_time(), Some(at(8, 15)));
        assert_eq!(sensors.estimated_departure_time(), Some(at(8, 20)));
        assert_eq!(sensors.bus_status(), BusStatus::Late);
        assert_eq!(sensors.minutes_to_departure(), Some(15));
        assert_eq!(sensors.minutes_to_leave(), Some(10));
        assert!(!sensors.should_leave_now());
        assert_eq!(sensors.route(), Some("X58"));
        assert_eq!(sensors.destination(), Some("Mount Nelson"));
    }

    #[test]
    fn test_minutes_to_leave_floors_at_zero() {
        let stop = StopConfig::new("7109023", "Grove Shop").with_reminder(8, 10);
        let snap = snapshot(3, None);
        let sensors = StopSensors::new(&stop, Some(&snap));

        assert_eq!(sensors.minutes_to_leave(), Some(0));
        assert!(sensors.should_leave_now());

        let summary = sensors.summary();
        assert_eq!(summary.stop_name, "Grove Shop");
        assert!(summary.should_leave_now);
        assert_eq!(summary.route.as_deref(), Some("X58"));
    }
}
