//! Test doubles shared by the unit tests.

use crate::geometry::TankGeometry;
use crate::notify::Notifier;
use crate::scheduler::{Scheduler, StationRun};
use crate::tank::Tank;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::sync::Mutex;

pub fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

pub fn rectangular_tank(id: &str, height: f64) -> Tank {
    let mut tank = Tank::new(
        id,
        format!("Tank {}", id),
        TankGeometry::Rectangular {
            width: Some(1.0),
            length: Some(1.0),
            height: Some(height),
        },
    );
    tank.sensor_id = Some(format!("sensor-{}", id));
    tank.sensor_mqtt_topic = Some("sensors/level".to_string());
    tank
}

#[derive(Default)]
pub struct FakeSchedulerState {
    pub calls: Vec<String>,
    pub enabled_programs: BTreeSet<usize>,
    pub open_stations: BTreeSet<usize>,
    pub disabled_stations: BTreeSet<usize>,
    pub master: Option<usize>,
    pub running_program: Option<usize>,
    pub fail: bool,
}

/// Records every request as a string and keeps just enough state to answer
/// the queries.
#[derive(Default)]
pub struct FakeScheduler {
    pub state: Mutex<FakeSchedulerState>,
}

impl FakeScheduler {
    pub fn with(configure: impl FnOnce(&mut FakeSchedulerState)) -> Self {
        let scheduler = FakeScheduler::default();
        configure(&mut scheduler.state.lock().unwrap());
        scheduler
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.fail {
            anyhow::bail!("scheduler unavailable");
        }
        Ok(())
    }
}

impl Scheduler for FakeScheduler {
    fn start_program(&self, index: usize) -> anyhow::Result<()> {
        self.record(format!("start_program {}", index))?;
        self.state.lock().unwrap().running_program = Some(index);
        Ok(())
    }

    fn is_program_enabled(&self, index: usize) -> bool {
        self.state.lock().unwrap().enabled_programs.contains(&index)
    }

    fn set_program_enabled(&self, index: usize, enabled: bool) -> anyhow::Result<()> {
        self.record(format!("set_program_enabled {} {}", index, enabled))?;
        let mut state = self.state.lock().unwrap();
        if enabled {
            state.enabled_programs.insert(index);
        } else {
            state.enabled_programs.remove(&index);
        }
        Ok(())
    }

    fn stop_all_stations(&self) -> anyhow::Result<()> {
        self.record("stop_all_stations".to_string())?;
        let mut state = self.state.lock().unwrap();
        state.open_stations.clear();
        state.running_program = None;
        Ok(())
    }

    fn activate_stations(&self, runs: &[StationRun]) -> anyhow::Result<()> {
        let desc: Vec<String> = runs
            .iter()
            .map(|r| format!("{}:{}", r.index, r.duration_seconds))
            .collect();
        self.record(format!("activate_stations {}", desc.join(",")))?;
        let mut state = self.state.lock().unwrap();
        state.open_stations.extend(runs.iter().map(|r| r.index));
        Ok(())
    }

    fn stop_stations(&self, indices: &[usize]) -> anyhow::Result<()> {
        let desc: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
        self.record(format!("stop_stations {}", desc.join(",")))?;
        let mut state = self.state.lock().unwrap();
        for index in indices {
            state.open_stations.remove(index);
        }
        Ok(())
    }

    fn is_station_topology_enabled(&self, index: usize) -> bool {
        !self.state.lock().unwrap().disabled_stations.contains(&index)
    }

    fn master_station_index(&self) -> Option<usize> {
        self.state.lock().unwrap().master
    }

    fn running_program_index(&self) -> Option<usize> {
        self.state.lock().unwrap().running_program
    }

    fn any_station_open(&self) -> bool {
        !self.state.lock().unwrap().open_stations.is_empty()
    }

    fn is_station_open(&self, index: usize) -> bool {
        self.state.lock().unwrap().open_stations.contains(&index)
    }

    fn program_count(&self) -> usize {
        4
    }

    fn station_count(&self) -> usize {
        8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Email { body: String, subject: String },
    Xmpp { body: String },
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Email { subject, .. } => Some(subject),
                Sent::Xmpp { .. } => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send_email(&self, body: &str, subject_suffix: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Email {
            body: body.to_string(),
            subject: subject_suffix.to_string(),
        });
        if self.fail {
            anyhow::bail!("smtp down");
        }
        Ok(())
    }

    fn send_xmpp(&self, body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Xmpp {
            body: body.to_string(),
        });
        if self.fail {
            anyhow::bail!("xmpp down");
        }
        Ok(())
    }
}
