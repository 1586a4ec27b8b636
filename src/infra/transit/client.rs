use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DEFAULT_BASE_URL;
use crate::departures::DepartureRecord;
use crate::error::TransitError;
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use crate::parser::parse_stop_display;
use crate::services::transit_api::{DEFAULT_SEARCH_RADIUS, StopSearch, TransitApi};

/// Client for the Tasmanian Metro real-time timetable API.
pub struct TransitClient<C = BasicClient> {
    http: C,
    base_url: String,
    timeout: Duration,
}

impl TransitClient<BasicClient> {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_http(BasicClient::with_timeout(timeout), base_url, timeout)
    }
}

impl Default for TransitClient<BasicClient> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(30))
    }
}

impl<C: HttpClient> TransitClient<C> {
    pub fn with_http(http: C, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    fn get_request(&self, url: &str) -> Result<reqwest::Request, TransitError> {
        let url = url
            .parse()
            .map_err(|e| TransitError::Api(format!("Invalid URL {}: {}", url, e)))?;
        Ok(reqwest::Request::new(reqwest::Method::GET, url))
    }

    async fn fetch_stop_display(&self, stop_id: &str) -> Result<Value, TransitError> {
        let url = format!("{}/stopdisplays/{}", self.base_url, stop_id);
        let req = self.get_request(&url)?;
        fetch_json(&self.http, req, self.timeout, || {
            TransitError::UnknownStop(stop_id.to_string())
        })
        .await
    }
}

#[async_trait]
impl<C: HttpClient> TransitApi for TransitClient<C> {
    #[tracing::instrument(skip(self))]
    async fn get_stop_info(&self, stop_id: &str) -> Result<Option<Value>, TransitError> {
        let payload = self.fetch_stop_display(stop_id).await?;
        Ok((!payload.is_null()).then_some(payload))
    }

    #[tracing::instrument(skip(self))]
    async fn search_stops_by_location(&self, search: &StopSearch) -> Result<Vec<Value>, TransitError> {
        let url = format!("{}/stops/searchbylocation", self.base_url);
        let mut req = self.get_request(&url)?;
        {
            let mut query = req.url_mut().query_pairs_mut();
            query
                .append_pair("latitude", &search.latitude.to_string())
                .append_pair("longitude", &search.longitude.to_string());
            if let Some(q) = search.query.as_deref().filter(|q| !q.is_empty()) {
                query.append_pair("query", q);
            }
            if search.radius != DEFAULT_SEARCH_RADIUS {
                query.append_pair("radius", &search.radius.to_string());
            }
        }

        let payload = fetch_json(&self.http, req, self.timeout, || {
            TransitError::Api("Stop search endpoint not found".to_string())
        })
        .await?;

        match payload {
            Value::Array(stops) => {
                debug!(count = stops.len(), "Stop search complete");
                Ok(stops)
            }
            other => {
                warn!(response = %other, "Unexpected stop search response format");
                Ok(Vec::new())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn get_stop_departures(&self, stop_id: &str) -> Result<Vec<DepartureRecord>, TransitError> {
        let payload = self.fetch_stop_display(stop_id).await?;
        let departures = parse_stop_display(&payload)?;
        debug!(count = departures.len(), "Departures fetched");
        Ok(departures)
    }

    fn close(&self) {
        self.http.close();
    }
}
