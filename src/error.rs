//! Error types shared by the transit client and the polling coordinator.

use thiserror::Error;

/// Failures raised by a transit API call.
///
/// None of the variants carry retry state; the coordinator decides when the
/// next attempt happens.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Unknown stop: {0}")]
    UnknownStop(String),
}

impl TransitError {
    /// Classifies a reqwest failure into the transit taxonomy.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransitError::Timeout(format!("{context}: {err}"))
        } else if err.is_connect() || err.is_request() {
            TransitError::Connection(format!("{context}: {err}"))
        } else {
            TransitError::Api(format!("{context}: {err}"))
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Error communicating with API for stop {stop_id}: {source}")]
    UpdateFailed {
        stop_id: String,
        #[source]
        source: TransitError,
    },
    #[error("Coordinator has been shut down")]
    ShutDown,
}
