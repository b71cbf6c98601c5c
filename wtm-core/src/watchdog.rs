//! Background scan for sensors that stopped reporting.
//!
//! The loop wakes up every tick and scans once per interval. A sensor is
//! dead when its tank has not been updated for at least the no-signal
//! threshold. Because scans happen on interval boundaries, a sensor that
//! goes quiet right after a reading is only reported at the scan after the
//! one that follows it; that latency is expected.

use crate::notify::MessageDispatcher;
use crate::registry::{lock, SharedRegistry};
use crate::tank::Tank;
use chrono::{Duration as TimeDelta, NaiveDateTime};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wtm_utils::dates::now_seconds;

pub struct DeadSensorWatchdog {
    registry: SharedRegistry,
    messages: MessageDispatcher,
    /// Seconds without an update before a sensor counts as dead.
    no_signal_threshold: u64,
    /// Seconds between scans. Shared with the handle so it can be changed
    /// while the loop runs.
    interval: Arc<AtomicU64>,
    last_check: NaiveDateTime,
    tick_period: Duration,
}

impl DeadSensorWatchdog {
    /// Threshold and interval both come from `max_sensor_no_signal_time`.
    pub fn new(registry: SharedRegistry, messages: MessageDispatcher, now: NaiveDateTime) -> Self {
        let seconds = messages.settings().max_sensor_no_signal_time;
        DeadSensorWatchdog {
            registry,
            messages,
            no_signal_threshold: seconds,
            interval: Arc::new(AtomicU64::new(seconds)),
            // a day back so the first tick always scans
            last_check: now - TimeDelta::days(1),
            tick_period: Duration::from_secs(1),
        }
    }

    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    pub fn reset(&self, interval: Duration) {
        set_interval(&self.interval, interval);
    }

    /// Scan if a full interval has passed since the last scan. Returns the
    /// ids of the dead sensors' tanks, or `None` when no scan was due.
    pub fn tick(&mut self, now: NaiveDateTime) -> Option<Vec<String>> {
        let interval = self.interval.load(Ordering::Relaxed) as i64;
        if (now - self.last_check).num_seconds() < interval {
            return None;
        }
        self.last_check = now;
        Some(self.check_dead_sensors(now))
    }

    /// Notify about every tank whose sensor has been silent for at least the
    /// threshold. Notification failures are logged and ignored.
    pub fn check_dead_sensors(&self, now: NaiveDateTime) -> Vec<String> {
        let threshold = self.no_signal_threshold as i64;
        let dead: Vec<Tank> = lock(&self.registry)
            .iter()
            .filter(|tank| tank.sensor_id.is_some())
            .filter(|tank| {
                tank.last_updated
                    .is_some_and(|last| (now - last).num_seconds() >= threshold)
            })
            .cloned()
            .collect();
        debug!("Dead sensor scan found {} silent sensors", dead.len());

        dead.iter()
            .map(|tank| {
                warn!(
                    "Sensor {} of water tank {} may be dead",
                    tank.sensor_id.as_deref().unwrap_or_default(),
                    tank.id
                );
                if let Err(e) = self.messages.dead_sensor(tank) {
                    warn!("Dead sensor notification failed: {:#}", e);
                }
                tank.id.clone()
            })
            .collect()
    }

    /// Run the scan loop on the tokio runtime until the handle stops it.
    pub fn spawn(mut self) -> WatchdogHandle {
        let interval = Arc::clone(&self.interval);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!("Dead sensor watchdog started");
            let mut ticker = tokio::time::interval(self.tick_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(now_seconds());
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("Dead sensor watchdog stopped");
        });
        WatchdogHandle {
            interval,
            stop_tx,
            task,
        }
    }
}

pub struct WatchdogHandle {
    interval: Arc<AtomicU64>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    /// Change the scan interval without restarting the loop.
    pub fn reset(&self, interval: Duration) {
        set_interval(&self.interval, interval);
    }

    /// Ask the loop to finish. It notices on its next wake-up.
    pub fn stop(&self) {
        if self.stop_tx.send(true).is_err() {
            warn!("Dead sensor watchdog already stopped");
        }
    }

    pub async fn join(self) -> anyhow::Result<()> {
        self.task.await?;
        Ok(())
    }
}

fn set_interval(shared: &AtomicU64, interval: Duration) {
    info!("Dead sensor scan interval set to {}s", interval.as_secs());
    shared.store(interval.as_secs(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{shared, TankRegistry};
    use crate::settings::Settings;
    use crate::testing::{at, rectangular_tank, RecordingNotifier};

    fn setup(last_updated: NaiveDateTime) -> (DeadSensorWatchdog, Arc<RecordingNotifier>) {
        let mut registry = TankRegistry::default();
        let mut stale = rectangular_tank("a", 2.0);
        stale.last_updated = Some(last_updated);
        registry.insert(stale);
        let mut silent = rectangular_tank("b", 2.0);
        silent.sensor_id = None;
        silent.last_updated = Some(last_updated);
        registry.insert(silent);
        registry.insert(rectangular_tank("never", 2.0));

        let notifier = Arc::new(RecordingNotifier::default());
        let settings = Settings {
            dead_sensor_xmpp: false,
            ..Settings::default()
        };
        let messages = MessageDispatcher::new(notifier.clone(), settings);
        let watchdog = DeadSensorWatchdog::new(shared(registry), messages, last_updated);
        (watchdog, notifier)
    }

    #[test]
    fn test_stale_sensor_notified_once_per_scan() {
        let t0 = at(10, 0, 0);
        let (mut watchdog, notifier) = setup(t0);

        // threshold is 10s: 11s of silence is dead
        assert_eq!(watchdog.tick(t0 + TimeDelta::seconds(11)), Some(vec!["a".to_string()]));
        assert_eq!(notifier.subjects(), vec!["Dead Sensor"]);

        assert_eq!(watchdog.tick(t0 + TimeDelta::seconds(15)), None);
        assert_eq!(notifier.sent().len(), 1);

        assert_eq!(watchdog.tick(t0 + TimeDelta::seconds(21)), Some(vec!["a".to_string()]));
        assert_eq!(notifier.sent().len(), 2);
    }

    #[test]
    fn test_fresh_sensor_is_not_dead() {
        let t0 = at(10, 0, 0);
        let (mut watchdog, notifier) = setup(t0);
        assert_eq!(watchdog.tick(t0 + TimeDelta::seconds(9)), Some(vec![]));
        assert_eq!(watchdog.check_dead_sensors(t0 + TimeDelta::seconds(10)), vec!["a"]);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn test_reset_changes_interval() {
        let t0 = at(10, 0, 0);
        let (mut watchdog, _) = setup(t0);
        watchdog.reset(Duration::from_secs(30));
        assert!(watchdog.tick(t0).is_some());
        assert!(watchdog.tick(t0 + TimeDelta::seconds(20)).is_none());
        assert!(watchdog.tick(t0 + TimeDelta::seconds(30)).is_some());
    }

    #[tokio::test]
    async fn test_loop_scans_and_stops() {
        // last update long ago relative to the wall clock
        let (watchdog, notifier) = setup(at(0, 0, 0) - TimeDelta::days(365));
        let handle = watchdog
            .with_tick_period(Duration::from_millis(10))
            .spawn();
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.reset(Duration::from_secs(3600));
        handle.stop();
        handle.join().await.unwrap();
        assert_eq!(notifier.subjects(), vec!["Dead Sensor"]);
    }

    #[tokio::test]
    async fn test_handle_reset_and_repeated_stop() {
        let (watchdog, _) = setup(at(10, 0, 0));
        let handle = watchdog
            .with_tick_period(Duration::from_millis(10))
            .spawn();
        handle.reset(Duration::from_secs(45));
        assert_eq!(handle.interval.load(Ordering::Relaxed), 45);

        handle.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.task.is_finished());
        // the loop is gone, so this send fails and is only logged
        handle.stop();
        handle.join().await.unwrap();
    }
}
