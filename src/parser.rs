//! JSON parsers for the stop display and stop search payloads.
//!
//! Payloads are navigated as [`serde_json::Value`]: missing or oddly typed
//! fields become `None` instead of failing the whole response. Only a body
//! whose overall shape is wrong is reported as an error.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::departures::DepartureRecord;
use crate::error::TransitError;
use crate::time::parse_time;

const UNKNOWN: &str = "Unknown";

/// Flattens a stop display payload into one record per visit.
///
/// Each `nextStopVisits` entry is a route direction carrying
/// `directionOfLine` and a `stopVisits` list; every visit inherits the line
/// number and destination of its direction. The result is ordered by
/// scheduled time, with unscheduled visits first.
pub fn parse_stop_display(payload: &Value) -> Result<Vec<DepartureRecord>, TransitError> {
    let Some(root) = payload.as_object() else {
        return Err(TransitError::Api(format!(
            "Unexpected stop display payload: expected an object, got {}",
            type_name(payload)
        )));
    };

    let groups = match root.get("nextStopVisits") {
        None | Some(Value::Null) => {
            debug!("Stop display has no nextStopVisits");
            return Ok(Vec::new());
        }
        Some(Value::Array(groups)) => groups,
        Some(other) => {
            return Err(TransitError::Api(format!(
                "Unexpected nextStopVisits: expected a list, got {}",
                type_name(other)
            )));
        }
    };

    let mut departures = Vec::new();

    for group in groups {
        let direction = &group["directionOfLine"];
        let line_number = direction["lineNumber"].as_str().unwrap_or(UNKNOWN);
        let destination = direction["destinationName"].as_str().unwrap_or(UNKNOWN);

        let Some(visits) = group["stopVisits"].as_array() else {
            continue;
        };

        for visit in visits {
            if !visit.is_object() {
                warn!(line_number, "Skipping malformed stop visit");
                continue;
            }
            departures.push(parse_visit(visit, line_number, destination));
        }
    }

    // Stable, so visits sharing a time keep their payload order.
    departures.sort_by_key(|d| d.scheduled_time);

    Ok(departures)
}

fn parse_visit(visit: &Value, line_number: &str, destination: &str) -> DepartureRecord {
    DepartureRecord {
        line_number: line_number.to_string(),
        destination_name: destination.to_string(),
        scheduled_time: parse_time(visit.get("scheduledDepartureTime")),
        estimated_time: parse_time(visit.get("estimatedDepartureTime")),
        scheduled_minutes_until: parse_minutes(&visit["scheduledMinutesUntilDeparture"]),
        estimated_minutes_until: parse_minutes(&visit["estimatedMinutesUntilDeparture"]),
        cancelled: visit["departureCancelled"].as_bool().unwrap_or(false),
        trip_id: parse_text(&visit["tripId"]),
        platform_code: parse_text(&visit["platformCode"]),
        stop_name: parse_text(&visit["stopName"]),
    }
}

fn parse_minutes(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => match s.trim().parse() {
            Ok(m) => Some(m),
            Err(_) => {
                warn!(value = %s, "Could not parse minutes value");
                None
            }
        },
        other => {
            warn!(value = %other, "Unexpected minutes value type");
            None
        }
    }
}

fn parse_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// A stop returned by the location search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopLocation {
    pub id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Extracts typed stops from search results, skipping entries without an id.
pub fn parse_stop_locations(items: &[Value]) -> Vec<StopLocation> {
    items
        .iter()
        .filter_map(|item| {
            let id = parse_text(&item["id"])?;
            let name = item["name"].as_str().unwrap_or_default().to_string();
            let latitude = item["location"]["latitude"].as_f64();
            let longitude = item["location"]["longitude"].as_f64();
            Some(StopLocation {
                id,
                name,
                latitude,
                longitude,
            })
        })
        .collect()
}

/// Picks the stop whose name equals `query`, then one whose name contains
/// it, then the first result.
pub fn best_stop_match<'a>(stops: &'a [StopLocation], query: &str) -> Option<&'a StopLocation> {
    let query = query.to_lowercase();

    stops
        .iter()
        .find(|s| s.name.to_lowercase() == query)
        .or_else(|| stops.iter().find(|s| s.name.to_lowercase().contains(&query)))
        .or_else(|| stops.first())
}
