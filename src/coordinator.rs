//! Adaptive polling coordinator.
//!
//! Each cycle fetches every configured stop in configuration order, ranks
//! the departures, publishes one [`CoordinatorSnapshot`] and then picks the
//! polling interval: frequent while any stop has a departure within the
//! threshold, default otherwise. A change of interval cancels the pending
//! timer and arms a new one; an unchanged interval leaves it alone.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PollingConfig, StopConfig};
use crate::departures::CoordinatorSnapshot;
use crate::error::CoordinatorError;
use crate::ranker::process_departures;
use crate::services::TransitApi;

type SnapshotStore = Arc<RwLock<Option<Arc<CoordinatorSnapshot>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    Frequent,
    Default,
}

impl PollInterval {
    /// Frequent iff a departure is known and at most `threshold_minutes` away.
    pub fn select(min_time_to_departure: Option<i64>, threshold_minutes: i64) -> Self {
        match min_time_to_departure {
            Some(minutes) if minutes <= threshold_minutes => PollInterval::Frequent,
            _ => PollInterval::Default,
        }
    }

    pub fn duration(&self, polling: &PollingConfig) -> Duration {
        match self {
            PollInterval::Frequent => Duration::from_secs(polling.frequent_interval_secs),
            PollInterval::Default => Duration::from_secs(polling.default_interval_secs),
        }
    }
}

struct PollingState {
    current: PollInterval,
    timer: Option<JoinHandle<()>>,
}

pub struct Coordinator<A> {
    api: A,
    polling: PollingConfig,
    stops: StdRwLock<Vec<StopConfig>>,
    snapshot: SnapshotStore,
    state: Mutex<PollingState>,
    /// Held for the duration of a cycle.
    cycle_lock: tokio::sync::Mutex<()>,
    last_update_success: AtomicBool,
    shut_down: AtomicBool,
}

impl<A: TransitApi + 'static> Coordinator<A> {
    pub fn new(api: A, polling: PollingConfig, stops: Vec<StopConfig>) -> Result<Self, ConfigError> {
        polling.validate()?;
        let coordinator = Self {
            api,
            polling,
            stops: StdRwLock::new(Vec::with_capacity(stops.len())),
            snapshot: Arc::new(RwLock::new(None)),
            state: Mutex::new(PollingState {
                current: PollInterval::Default,
                timer: None,
            }),
            cycle_lock: tokio::sync::Mutex::new(()),
            last_update_success: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };
        for stop in stops {
            coordinator.add_stop(stop)?;
        }
        Ok(coordinator)
    }

    /// Adds a stop to be polled from the next cycle on. Stops cannot be
    /// removed.
    pub fn add_stop(&self, stop: StopConfig) -> Result<(), ConfigError> {
        stop.validate()?;
        let mut stops = self.stops.write().unwrap_or_else(|e| e.into_inner());
        if stops.iter().any(|s| s.stop_id == stop.stop_id) {
            return Err(ConfigError::DuplicateStop(stop.stop_id));
        }
        info!(stop_id = %stop.stop_id, stop_name = %stop.stop_name, "Stop added");
        stops.push(stop);
        Ok(())
    }

    pub fn stops(&self) -> Vec<StopConfig> {
        self.stops.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Latest snapshot, `None` until the first successful cycle.
    pub async fn snapshot(&self) -> Option<Arc<CoordinatorSnapshot>> {
        self.snapshot.read().await.clone()
    }

    /// `false` after a failed cycle, until the next successful one. The
    /// snapshot is stale while this is `false`.
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    pub fn poll_interval(&self) -> PollInterval {
        self.lock_state().current
    }

    pub fn current_interval(&self) -> Duration {
        self.poll_interval().duration(&self.polling)
    }

    pub fn has_pending_timer(&self) -> bool {
        self.lock_state().timer.is_some()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PollingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arms the timer at the current interval and runs the first cycle.
    ///
    /// A failed first cycle is returned, but the timer stays armed so polling
    /// carries on.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoordinatorError::ShutDown);
        }
        {
            let mut state = self.lock_state();
            if state.timer.is_none() {
                let period = state.current.duration(&self.polling);
                state.timer = Some(self.arm_timer(period));
            }
        }
        info!(stops = self.stops().len(), "Starting coordinator");
        self.refresh().await
    }

    /// Runs a cycle now, waiting for any cycle already in flight.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoordinatorError::ShutDown);
        }
        let _cycle = self.cycle_lock.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoordinatorError::ShutDown);
        }
        self.run_cycle().await
    }

    /// Timer-triggered cycle; skipped when one is already in flight.
    async fn scheduled_refresh(self: &Arc<Self>) {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            debug!("Cycle already in flight, skipping tick");
            return;
        };
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.run_cycle().await {
            warn!(error = %e, "Scheduled update failed");
        }
    }

    #[tracing::instrument(skip(self))]
    async fn run_cycle(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let stops = self.stops();
        let mut results = HashMap::with_capacity(stops.len());

        for stop in &stops {
            let departures = match self.api.get_stop_departures(&stop.stop_id).await {
                Ok(departures) => departures,
                Err(e) => {
                    warn!(stop_id = %stop.stop_id, error = %e, "Update failed, keeping previous data");
                    self.last_update_success.store(false, Ordering::SeqCst);
                    return Err(CoordinatorError::UpdateFailed {
                        stop_id: stop.stop_id.clone(),
                        source: e,
                    });
                }
            };

            let stop_snapshot = process_departures(&departures, stop, Utc::now());
            debug!(
                stop_id = %stop.stop_id,
                fetched = departures.len(),
                upcoming = stop_snapshot.upcoming_departures().len(),
                time_to_departure = ?stop_snapshot.time_to_departure_minutes(),
                "Stop processed"
            );
            results.insert(stop.stop_id.clone(), stop_snapshot);
        }

        let snapshot = CoordinatorSnapshot::new(results, Utc::now());
        let min_time_to_departure = snapshot.min_time_to_departure();

        *self.snapshot.write().await = Some(Arc::new(snapshot));
        self.last_update_success.store(true, Ordering::SeqCst);

        info!(
            stops = stops.len(),
            min_time_to_departure = ?min_time_to_departure,
            "Departures updated"
        );

        self.schedule_next_update(min_time_to_departure);
        Ok(())
    }

    /// Picks the interval for `min_time_to_departure` and rearms the timer
    /// if it changed. Returns whether the timer was rearmed.
    pub fn schedule_next_update(self: &Arc<Self>, min_time_to_departure: Option<i64>) -> bool {
        let desired = PollInterval::select(min_time_to_departure, self.polling.frequent_threshold_minutes);

        let mut state = self.lock_state();
        if self.shut_down.load(Ordering::SeqCst) || desired == state.current {
            return false;
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let period = desired.duration(&self.polling);
        state.current = desired;
        state.timer = Some(self.arm_timer(period));

        info!(
            interval = ?desired,
            interval_secs = period.as_secs(),
            min_time_to_departure = ?min_time_to_departure,
            "Polling interval changed"
        );
        true
    }

    /// Spawns a ticker that triggers a cycle every `period`, first after one
    /// full period. Each cycle runs in its own task so aborting the ticker
    /// never cuts a cycle short.
    fn arm_timer(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    coordinator.scheduled_refresh().await;
                });
            }
        })
    }

    /// Cancels the pending timer and releases the API client. Idempotent.
    pub fn shutdown(&self) {
        let first = !self.shut_down.swap(true, Ordering::SeqCst);
        if let Some(timer) = self.lock_state().timer.take() {
            timer.abort();
        }
        self.api.close();
        if first {
            info!("Coordinator shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::departures::DepartureRecord;
    use crate::error::TransitError;
    use crate::services::StopSearch;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    /// Serves canned departures per stop; stops listed in `failing` error out.
    #[derive(Default)]
    struct FakeApi {
        departures: Mutex<HashMap<String, Vec<DepartureRecord>>>,
        failing: Mutex<Vec<String>>,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    impl FakeApi {
        fn with_stop(self, stop_id: &str, minutes: &[i64]) -> Self {
            self.set_stop(stop_id, minutes);
            self
        }

        fn set_stop(&self, stop_id: &str, minutes: &[i64]) {
            let departures = minutes
                .iter()
                .map(|m| DepartureRecord {
                    scheduled_minutes_until: Some(*m),
                    ..DepartureRecord::new("X58", "Mount Nelson")
                })
                .collect();
            self.departures
                .lock()
                .unwrap()
                .insert(stop_id.to_string(), departures);
        }

        fn fail(&self, stop_id: &str) {
            self.failing.lock().unwrap().push(stop_id.to_string());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransitApi for FakeApi {
        async fn get_stop_info(&self, _stop_id: &str) -> Result<Option<Value>, TransitError> {
            Ok(None)
        }

        async fn search_stops_by_location(&self, _search: &StopSearch) -> Result<Vec<Value>, TransitError> {
            Ok(Vec::new())
        }

        async fn get_stop_departures(&self, stop_id: &str) -> Result<Vec<DepartureRecord>, TransitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().iter().any(|s| s == stop_id) {
                return Err(TransitError::Connection("refused".into()));
            }
            Ok(self
                .departures
                .lock()
                .unwrap()
                .get(stop_id)
                .cloned()
                .unwrap_or_default())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator(api: FakeApi, stop_ids: &[&str]) -> Arc<Coordinator<FakeApi>> {
        let stops = stop_ids
            .iter()
            .map(|id| StopConfig::new(*id, format!("Stop {id}")))
            .collect();
        Arc::new(Coordinator::new(api, PollingConfig::default(), stops).unwrap())
    }

    #[test]
    fn test_interval_selection() {
        let cases = [
            (Some(15), PollInterval::Frequent),
            (Some(30), PollInterval::Frequent),
            (Some(45), PollInterval::Frequent),
            (Some(60), PollInterval::Frequent),
            (Some(61), PollInterval::Default),
            (Some(90), PollInterval::Default),
            (Some(120), PollInterval::Default),
            (None, PollInterval::Default),
        ];
        for (minutes, expected) in cases {
            assert_eq!(PollInterval::select(minutes, 60), expected, "minutes = {minutes:?}");
        }
        assert_eq!(PollInterval::select(Some(45), 30), PollInterval::Default);
    }

    #[tokio::test]
    async fn test_schedule_switches_between_intervals() {
        let c = coordinator(FakeApi::default(), &["1"]);
        assert_eq!(c.poll_interval(), PollInterval::Default);
        assert_eq!(c.current_interval(), Duration::from_secs(300));

        assert!(c.schedule_next_update(Some(30)));
        assert_eq!(c.poll_interval(), PollInterval::Frequent);
        assert_eq!(c.current_interval(), Duration::from_secs(30));
        assert!(c.has_pending_timer());

        assert!(c.schedule_next_update(Some(90)));
        assert_eq!(c.current_interval(), Duration::from_secs(300));

        assert!(c.schedule_next_update(Some(45)));
        assert_eq!(c.poll_interval(), PollInterval::Frequent);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_unchanged_interval_is_noop() {
        let c = coordinator(FakeApi::default(), &["1"]);

        // Default stays Default: nothing to rearm.
        assert!(!c.schedule_next_update(None));
        assert!(!c.has_pending_timer());

        assert!(c.schedule_next_update(Some(30)));
        assert!(!c.schedule_next_update(Some(30)));
        assert!(!c.schedule_next_update(Some(12)));
        assert!(c.has_pending_timer());

        c.shutdown();
    }

    #[tokio::test]
    async fn test_refresh_tracks_minimum_across_stops() {
        let api = FakeApi::default()
            .with_stop("1", &[90, 120])
            .with_stop("2", &[25, 70]);
        let c = coordinator(api, &["1", "2", "3"]);

        assert!(c.snapshot().await.is_none());
        c.refresh().await.unwrap();

        let snapshot = c.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        let mut ids: Vec<_> = snapshot.iter().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(snapshot.min_time_to_departure(), Some(25));
        assert_eq!(snapshot.get("1").unwrap().time_to_departure_minutes(), Some(90));
        assert!(snapshot.get("3").unwrap().next_departure().is_none());
        assert!(c.last_update_success());
        assert_eq!(c.poll_interval(), PollInterval::Frequent);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let api = FakeApi::default()
            .with_stop("1", &[10])
            .with_stop("2", &[20]);
        let c = coordinator(api, &["1", "2"]);

        c.refresh().await.unwrap();
        let before = c.snapshot().await.unwrap();

        c.api().set_stop("1", &[200]);
        c.api().fail("2");
        let err = c.refresh().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UpdateFailed { ref stop_id, .. } if stop_id == "2"));

        let after = c.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!c.last_update_success());
        assert_eq!(c.poll_interval(), PollInterval::Frequent);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_first_failure_leaves_no_snapshot() {
        let api = FakeApi::default();
        api.fail("1");
        let c = coordinator(api, &["1", "2"]);

        assert!(c.refresh().await.is_err());
        assert!(c.snapshot().await.is_none());
        // aborted at the first stop
        assert_eq!(c.api().calls(), 1);
    }

    #[tokio::test]
    async fn test_start_arms_default_timer() {
        let c = coordinator(FakeApi::default(), &["1"]);
        c.start().await.unwrap();

        assert!(c.has_pending_timer());
        assert_eq!(c.poll_interval(), PollInterval::Default);
        assert_eq!(c.snapshot().await.unwrap().min_time_to_departure(), None);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_timer_and_is_idempotent() {
        let c = coordinator(FakeApi::default(), &["1"]);
        c.schedule_next_update(Some(30));
        assert!(c.has_pending_timer());

        c.shutdown();
        assert!(!c.has_pending_timer());
        c.shutdown();
        assert!(c.api().closes.load(Ordering::SeqCst) >= 1);

        assert!(matches!(c.refresh().await, Err(CoordinatorError::ShutDown)));
        assert!(!c.schedule_next_update(Some(90)));
        assert!(!c.has_pending_timer());
    }

    #[tokio::test]
    async fn test_shutdown_without_cycle() {
        let c = coordinator(FakeApi::default(), &[]);
        c.shutdown();
        assert!(c.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_triggers_cycles() {
        let c = coordinator(FakeApi::default().with_stop("1", &[30]), &["1"]);
        c.start().await.unwrap();
        assert_eq!(c.api().calls(), 1);
        assert_eq!(c.current_interval(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        for _ in 0..10 {
            if c.api().calls() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(c.api().calls() >= 2);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_tick_skipped_while_cycle_in_flight() {
        let c = coordinator(FakeApi::default().with_stop("1", &[5]), &["1"]);

        let guard = c.cycle_lock.lock().await;
        c.scheduled_refresh().await;
        assert_eq!(c.api().calls(), 0);
        drop(guard);

        c.scheduled_refresh().await;
        assert_eq!(c.api().calls(), 1);

        c.shutdown();
    }

    #[tokio::test]
    async fn test_forced_refresh_waits_for_cycle_in_flight() {
        let c = coordinator(FakeApi::default().with_stop("1", &[5]), &["1"]);

        let guard = c.cycle_lock.lock().await;
        let pending = tokio::spawn({
            let c = c.clone();
            async move { c.refresh().await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(c.api().calls(), 0);
        assert!(!pending.is_finished());

        drop(guard);
        pending.await.unwrap().unwrap();
        assert_eq!(c.api().calls(), 1);
        assert!(c.snapshot().await.is_some());

        c.shutdown();
    }

    #[tokio::test]
    async fn test_waiting_refresh_stops_after_shutdown() {
        let c = coordinator(FakeApi::default().with_stop("1", &[5]), &["1"]);

        let guard = c.cycle_lock.lock().await;
        let pending = tokio::spawn({
            let c = c.clone();
            async move { c.refresh().await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        c.shutdown();
        drop(guard);
        assert!(matches!(pending.await.unwrap(), Err(CoordinatorError::ShutDown)));
        assert_eq!(c.api().calls(), 0);
        assert!(c.snapshot().await.is_none());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let polling = PollingConfig {
            frequent_interval_secs: 0,
            ..PollingConfig::default()
        };
        let err = Coordinator::new(FakeApi::default(), polling, Vec::new()).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidPolling(_)));

        let polling = PollingConfig {
            default_interval_secs: 0,
            ..PollingConfig::default()
        };
        assert!(Coordinator::new(FakeApi::default(), polling, Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_add_stop() {
        let c = coordinator(FakeApi::default().with_stop("2", &[15]), &["1"]);

        let err = c.add_stop(StopConfig::new("1", "Again")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStop(_)));
        assert!(c.add_stop(StopConfig::new("", "Blank")).is_err());

        c.add_stop(StopConfig::new("2", "Second")).unwrap();
        c.refresh().await.unwrap();

        let ids: Vec<_> = c.stops().into_iter().map(|s| s.stop_id).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(c.snapshot().await.unwrap().min_time_to_departure(), Some(15));

        c.shutdown();
    }
}
