//! Trait and types for talking to a real-time transit API.

use async_trait::async_trait;
use serde_json::Value;

use crate::departures::DepartureRecord;
use crate::error::TransitError;

pub const DEFAULT_SEARCH_RADIUS: u32 = 1000;

/// Parameters for a stop search around a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct StopSearch {
    pub latitude: f64,
    pub longitude: f64,
    pub query: Option<String>,
    /// Search radius in metres.
    pub radius: u32,
}

impl StopSearch {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            query: None,
            radius: DEFAULT_SEARCH_RADIUS,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }
}

/// Abstraction over the stop display provider (e.g., Tasmanian Metro).
#[async_trait]
pub trait TransitApi: Send + Sync {
    /// Raw stop display payload, `None` when the API answers with `null`.
    async fn get_stop_info(&self, stop_id: &str) -> Result<Option<Value>, TransitError>;

    /// Stops near a coordinate. A response that is not a list yields no stops.
    async fn search_stops_by_location(&self, search: &StopSearch) -> Result<Vec<Value>, TransitError>;

    /// All visits at a stop, flattened and ordered by scheduled time.
    async fn get_stop_departures(&self, stop_id: &str) -> Result<Vec<DepartureRecord>, TransitError>;

    /// Releases the underlying connection resources. Idempotent.
    fn close(&self);

    /// Returns `true` if the API knows the stop.
    async fn validate_stop(&self, stop_id: &str) -> Result<bool, TransitError> {
        match self.get_stop_info(stop_id).await {
            Ok(info) => Ok(info.is_some()),
            Err(TransitError::UnknownStop(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
