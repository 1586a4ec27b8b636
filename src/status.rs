//! Punctuality classification of a single departure.

use serde::Serialize;
use std::fmt;

use crate::departures::DepartureRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    OnTime,
    Early,
    Late,
    Cancelled,
    Unknown,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::OnTime => "on_time",
            BusStatus::Early => "early",
            BusStatus::Late => "late",
            BusStatus::Cancelled => "cancelled",
            BusStatus::Unknown => "unknown",
        }
    }

    /// Early or late, the two states that warrant a status notification.
    pub fn is_off_schedule(&self) -> bool {
        matches!(self, BusStatus::Early | BusStatus::Late)
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compares estimated against scheduled time.
///
/// Missing real-time data is not evidence of a deviation, so a departure
/// with a scheduled but no estimated time is on time.
pub fn classify(departure: &DepartureRecord, early_threshold: u32, late_threshold: u32) -> BusStatus {
    let Some(scheduled) = departure.scheduled_time else {
        return BusStatus::Unknown;
    };

    if departure.cancelled {
        return BusStatus::Cancelled;
    }

    let Some(estimated) = departure.estimated_time else {
        return BusStatus::OnTime;
    };

    let diff_minutes = (estimated - scheduled).num_seconds() as f64 / 60.0;

    if diff_minutes < -(early_threshold as f64) {
        BusStatus::Early
    } else if diff_minutes > late_threshold as f64 {
        BusStatus::Late
    } else {
        BusStatus::OnTime
    }
}
