//! Status-change and departure-reminder notifications.
//!
//! A [`NotificationTracker`] compares each new snapshot with what it has
//! already announced and yields the notifications that are due. Delivery
//! goes through a [`Notifier`]; failures are logged and not retried.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::StopConfig;
use crate::coordinator::Coordinator;
use crate::departures::CoordinatorSnapshot;
use crate::sensors::StopSensors;
use crate::services::TransitApi;
use crate::status::BusStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BusStatus,
    DepartureReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BusStatus => "bus_status",
            NotificationKind::DepartureReminder => "departure_reminder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub stop_id: String,
    pub title: String,
    pub message: String,
}

impl Notification {
    fn bus_status(stop: &StopConfig, status: BusStatus) -> Option<Self> {
        let stop_name = stop.display_name();
        let (title, message) = match status {
            BusStatus::Early => (
                "Bus Running Early",
                format!("Your bus from {stop_name} is running early. Check the schedule!"),
            ),
            BusStatus::Late => (
                "Bus Running Late",
                format!("Your bus from {stop_name} is running late. Plan accordingly!"),
            ),
            _ => return None,
        };
        Some(Self {
            kind: NotificationKind::BusStatus,
            stop_id: stop.stop_id.clone(),
            title: title.to_string(),
            message,
        })
    }

    fn departure_reminder(stop: &StopConfig, minutes_to_leave: i64) -> Self {
        let stop_name = stop.display_name();
        let (title, message) = if minutes_to_leave <= 0 {
            (
                "Time to Leave!",
                format!("It's time to leave for your bus at {stop_name}!"),
            )
        } else {
            (
                "Bus Departure Reminder",
                format!("Leave in {minutes_to_leave} minutes for your bus at {stop_name}!"),
            )
        };
        Self {
            kind: NotificationKind::DepartureReminder,
            stop_id: stop.stop_id.clone(),
            title: title.to_string(),
            message,
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to deliver notification: {0}")]
pub struct NotifyError(pub String);

/// Sink for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = notification.kind.as_str(),
            stop_id = %notification.stop_id,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Remembers, per stop, the last announced status and the departure the
/// last reminder was sent for.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    last_status: HashMap<String, BusStatus>,
    last_reminder: HashMap<String, i64>,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications due for `snapshot`. Stops missing from the snapshot are
    /// skipped.
    pub fn check(&mut self, stops: &[StopConfig], snapshot: &CoordinatorSnapshot) -> Vec<Notification> {
        let mut due = Vec::new();

        for stop in stops {
            let Some(stop_snapshot) = snapshot.get(&stop.stop_id) else {
                continue;
            };

            // Status change: announce transitions into Early or Late once.
            let current = stop_snapshot.bus_status();
            let previous = self.last_status.get(&stop.stop_id).copied();
            if current != previous {
                if let Some(notification) = current.and_then(|s| Notification::bus_status(stop, s)) {
                    due.push(notification);
                }
                match current {
                    Some(status) => self.last_status.insert(stop.stop_id.clone(), status),
                    None => self.last_status.remove(&stop.stop_id),
                };
            }

            let sensors = StopSensors::new(stop, Some(stop_snapshot));
            let Some(time_to_departure) = sensors.minutes_to_departure() else {
                continue;
            };
            let reminder = time_to_departure - i64::from(stop.time_to_get_there());
            let threshold = i64::from(stop.departure_reminder());
            if (0..=threshold).contains(&reminder)
                && self.last_reminder.get(&stop.stop_id) != Some(&time_to_departure)
            {
                due.push(Notification::departure_reminder(stop, reminder));
                self.last_reminder.insert(stop.stop_id.clone(), time_to_departure);
            }
        }

        due
    }
}

/// Checks the coordinator's snapshot every `period` and hands due
/// notifications to `notifier`. The task ends once the coordinator is dropped.
pub fn spawn_notifications<A>(
    coordinator: &Arc<Coordinator<A>>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> JoinHandle<()>
where
    A: TransitApi + 'static,
{
    let weak = Arc::downgrade(coordinator);
    tokio::spawn(async move {
        let mut tracker = NotificationTracker::new();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(coordinator) = weak.upgrade() else {
                break;
            };
            let Some(snapshot) = coordinator.snapshot().await else {
                continue;
            };

            let due = tracker.check(&coordinator.stops(), &snapshot);
            debug!(count = due.len(), "Notifications checked");
            for notification in &due {
                if let Err(e) = notifier.send(notification).await {
                    error!(error = %e, stop_id = %notification.stop_id, "Failed to send notification");
                }
            }
        }
    })
}
