//! Configuration for the poller: API location, polling cadence and the
//! monitored stops.
//!
//! Stored as a JSON file on disk:
//! ```json
//! {
//!   "polling": { "frequent_threshold_minutes": 30 },
//!   "stops": [
//!     { "stop_id": "7109023", "stop_name": "Grove Shop", "line_filters": ["X58"] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://real-time.transport.tas.gov.au/timetable/rest";

pub const DEFAULT_EARLY_THRESHOLD: u32 = 2;
pub const DEFAULT_LATE_THRESHOLD: u32 = 5;
pub const DEFAULT_TIME_TO_GET_THERE: u32 = 5;
pub const DEFAULT_DEPARTURE_REMINDER: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Seconds between notification checks (default: 60)
    #[serde(default = "Config::default_notification_interval_secs")]
    pub notification_interval_secs: u64,
    #[serde(default)]
    pub stops: Vec<StopConfig>,
}

impl Config {
    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }
    fn default_notification_interval_secs() -> u64 {
        60
    }

    /// Loads and validates the config from a JSON file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.polling.validate()?;
        if self.notification_interval_secs == 0 {
            return Err(ConfigError::InvalidPolling(
                "notification_interval_secs must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for stop in &self.stops {
            stop.validate()?;
            if !seen.insert(stop.stop_id.as_str()) {
                return Err(ConfigError::DuplicateStop(stop.stop_id.clone()));
            }
        }
        Ok(())
    }
}

/// Polling cadence. The coordinator only ever runs at one of the two
/// intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Interval when nothing departs soon (default: 300)
    #[serde(default = "PollingConfig::default_interval_secs")]
    pub default_interval_secs: u64,
    /// Interval while a departure is within the threshold (default: 30)
    #[serde(default = "PollingConfig::default_frequent_interval_secs")]
    pub frequent_interval_secs: u64,
    /// Departures at most this many minutes away switch to the frequent
    /// interval (default: 60)
    #[serde(default = "PollingConfig::default_frequent_threshold_minutes")]
    pub frequent_threshold_minutes: i64,
    /// Upper bound for every API request (default: 30)
    #[serde(default = "PollingConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: Self::default_interval_secs(),
            frequent_interval_secs: Self::default_frequent_interval_secs(),
            frequent_threshold_minutes: Self::default_frequent_threshold_minutes(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

impl PollingConfig {
    fn default_interval_secs() -> u64 {
        300
    }
    fn default_frequent_interval_secs() -> u64 {
        30
    }
    fn default_frequent_threshold_minutes() -> i64 {
        60
    }
    fn default_request_timeout_secs() -> u64 {
        30
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Intervals and the request timeout must all be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let knobs = [
            ("default_interval_secs", self.default_interval_secs),
            ("frequent_interval_secs", self.frequent_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in knobs {
            if value == 0 {
                return Err(ConfigError::InvalidPolling(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

/// One monitored stop. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopConfig {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: String,
    #[serde(default)]
    pub line_filters: Vec<String>,
    #[serde(default)]
    pub destination_filters: Vec<String>,
    #[serde(default)]
    pub filter_mode: FilterMode,
    #[serde(default)]
    pub early_threshold_minutes: Option<u32>,
    #[serde(default)]
    pub late_threshold_minutes: Option<u32>,
    #[serde(default)]
    pub time_to_get_there_minutes: Option<u32>,
    #[serde(default)]
    pub departure_reminder_minutes: Option<u32>,
}

impl StopConfig {
    /// A stop with no filters and default thresholds.
    pub fn new(stop_id: impl Into<String>, stop_name: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.into(),
            stop_name: stop_name.into(),
            line_filters: Vec::new(),
            destination_filters: Vec::new(),
            filter_mode: FilterMode::Include,
            early_threshold_minutes: None,
            late_threshold_minutes: None,
            time_to_get_there_minutes: None,
            departure_reminder_minutes: None,
        }
    }

    pub fn with_line_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.line_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_destination_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destination_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn with_thresholds(mut self, early: u32, late: u32) -> Self {
        self.early_threshold_minutes = Some(early);
        self.late_threshold_minutes = Some(late);
        self
    }

    pub fn with_reminder(mut self, time_to_get_there: u32, departure_reminder: u32) -> Self {
        self.time_to_get_there_minutes = Some(time_to_get_there);
        self.departure_reminder_minutes = Some(departure_reminder);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_id.trim().is_empty() {
            return Err(ConfigError::InvalidStop("stop_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn has_filters(&self) -> bool {
        !self.line_filters.is_empty() || !self.destination_filters.is_empty()
    }

    pub fn early_threshold(&self) -> u32 {
        self.early_threshold_minutes.unwrap_or(DEFAULT_EARLY_THRESHOLD)
    }

    pub fn late_threshold(&self) -> u32 {
        self.late_threshold_minutes.unwrap_or(DEFAULT_LATE_THRESHOLD)
    }

    pub fn time_to_get_there(&self) -> u32 {
        self.time_to_get_there_minutes.unwrap_or(DEFAULT_TIME_TO_GET_THERE)
    }

    pub fn departure_reminder(&self) -> u32 {
        self.departure_reminder_minutes.unwrap_or(DEFAULT_DEPARTURE_REMINDER)
    }

    /// Name used in logs and notifications, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.stop_name.is_empty() {
            &self.stop_id
        } else {
            &self.stop_name
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid stop configuration: {0}")]
    InvalidStop(String),
    #[error("Stop {0} is already configured")]
    DuplicateStop(String),
    #[error("Invalid polling configuration: {0}")]
    InvalidPolling(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_json(r#"{"stops": [{"stop_id": "7109023"}]}"#).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.polling.default_interval_secs, 300);
        assert_eq!(config.polling.frequent_interval_secs, 30);
        assert_eq!(config.polling.frequent_threshold_minutes, 60);
        assert_eq!(config.polling.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.notification_interval_secs, 60);

        let stop = &config.stops[0];
        assert_eq!(stop.filter_mode, FilterMode::Include);
        assert!(!stop.has_filters());
        assert_eq!(stop.early_threshold(), DEFAULT_EARLY_THRESHOLD);
        assert_eq!(stop.late_threshold(), DEFAULT_LATE_THRESHOLD);
        assert_eq!(stop.display_name(), "7109023");
    }

    #[test]
    fn test_full_stop_entry() {
        let config = Config::from_json(
            r#"{
                "polling": {"frequent_threshold_minutes": 30},
                "stops": [{
                    "stop_id": "7109023",
                    "stop_name": "Grove Shop",
                    "line_filters": ["X58"],
                    "destination_filters": ["University"],
                    "filter_mode": "exclude",
                    "early_threshold_minutes": 1,
                    "late_threshold_minutes": 3,
                    "time_to_get_there_minutes": 8,
                    "departure_reminder_minutes": 4
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.polling.frequent_threshold_minutes, 30);
        let stop = &config.stops[0];
        assert_eq!(stop.filter_mode, FilterMode::Exclude);
        assert_eq!(stop.line_filters, vec!["X58"]);
        assert_eq!(stop.early_threshold(), 1);
        assert_eq!(stop.late_threshold(), 3);
        assert_eq!(stop.time_to_get_there(), 8);
        assert_eq!(stop.departure_reminder(), 4);
        assert_eq!(stop.display_name(), "Grove Shop");
    }

    #[test]
    fn test_rejects_empty_stop_id() {
        let err = Config::from_json(r#"{"stops": [{"stop_id": "  "}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStop(_)));
    }

    #[test]
    fn test_rejects_duplicate_stop() {
        let err = Config::from_json(r#"{"stops": [{"stop_id": "1"}, {"stop_id": "1"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStop(id) if id == "1"));
    }

    #[test]
    fn test_rejects_zero_polling_values() {
        for knob in [
            "default_interval_secs",
            "frequent_interval_secs",
            "request_timeout_secs",
        ] {
            let json = format!(r#"{{"polling": {{"{knob}": 0}}, "stops": [{{"stop_id": "1"}}]}}"#);
            let err = Config::from_json(&json).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidPolling(ref msg) if msg.contains(knob)),
                "{knob}: {err:?}"
            );
        }
    }

    #[test]
    fn test_rejects_zero_notification_interval() {
        let err = Config::from_json(r#"{"notification_interval_secs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolling(ref msg) if msg.contains("notification")));
    }

    #[test]
    fn test_polling_validate() {
        assert!(PollingConfig::default().validate().is_ok());
        let polling = PollingConfig {
            frequent_interval_secs: 0,
            ..PollingConfig::default()
        };
        assert!(polling.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = Config::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/tas_transit.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
