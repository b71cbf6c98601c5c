//! Scheduler actions taken when a tank enters or leaves an alarm level,
//! or crosses a station's target percentage.
//!
//! Scheduler failures are logged and skipped so one bad program or station
//! never blocks the rest of the level. Timestamps are stamped only when the
//! matching scheduler request succeeded.

use crate::error::TankError;
use crate::scheduler::{Scheduler, StationRun};
use crate::tank::{Level, Tank, TankState};
use chrono::NaiveDateTime;
use log::{error, info};
use std::collections::BTreeSet;

pub struct SideEffectCoordinator<'a> {
    scheduler: &'a dyn Scheduler,
    /// Run time in seconds for stations without `minutes`.
    default_station_duration: u64,
}

impl<'a> SideEffectCoordinator<'a> {
    pub fn new(scheduler: &'a dyn Scheduler, default_station_duration: u64) -> Self {
        SideEffectCoordinator {
            scheduler,
            default_station_duration,
        }
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler
    }

    /// Start, suspend or enable the programs configured for a level.
    ///
    /// Accepts only OVERFLOW, WARNING and CRITICAL. Returns the number of
    /// programs changed.
    pub fn activate_programs(
        &self,
        tank: &mut Tank,
        state: TankState,
        now: NaiveDateTime,
    ) -> Result<usize, TankError> {
        let level = entry_level("activate_programs", state)?;
        info!("Activating {} programs of water tank {}", level.name(), tank.id);
        let mut changed = 0;
        for (&index, program) in tank.programs_mut(level).iter_mut() {
            if program.run {
                match self.scheduler.start_program(index) {
                    Ok(()) => {
                        info!("Running program {}", index);
                        program.start_datetime = Some(now);
                        program.end_datetime = None;
                        changed += 1;
                    }
                    Err(e) => error!("Failed to run program {}: {:#}", index, e),
                }
            }
            let enabled = self.scheduler.is_program_enabled(index);
            let target = if program.suspend && enabled {
                Some(false)
            } else if program.enable && !enabled {
                Some(true)
            } else {
                None
            };
            if let Some(target) = target {
                match self.scheduler.set_program_enabled(index, target) {
                    Ok(()) => {
                        info!(
                            "{} program {}",
                            if target { "Enabling" } else { "Disabling" },
                            index
                        );
                        program.original_enabled = Some(enabled);
                        changed += 1;
                    }
                    Err(e) => error!("Failed to toggle program {}: {:#}", index, e),
                }
            }
        }
        Ok(changed)
    }

    /// Open the stations configured for a level in one scheduling call.
    ///
    /// Stations disabled in the topology are skipped. The master output is
    /// marked as started but never sent to the scheduler. Returns the
    /// number of stations marked as started.
    pub fn activate_stations(
        &self,
        tank: &mut Tank,
        state: TankState,
        now: NaiveDateTime,
    ) -> Result<usize, TankError> {
        let level = entry_level("activate_stations", state)?;
        info!("Activating {} stations of water tank {}", level.name(), tank.id);
        let master = self.scheduler.master_station_index();
        let mut selected = Vec::new();
        let mut runs = Vec::new();
        for (&index, station) in tank.stations(level) {
            if !station.run || !self.scheduler.is_station_topology_enabled(index) {
                continue;
            }
            selected.push(index);
            if Some(index) == master {
                continue;
            }
            let duration_seconds = station
                .minutes
                .map(|m| u64::from(m) * 60)
                .unwrap_or(self.default_station_duration);
            runs.push(StationRun {
                index,
                duration_seconds,
            });
        }
        if !runs.is_empty() {
            if let Err(e) = self.scheduler.activate_stations(&runs) {
                error!("Failed to activate {} stations: {:#}", level.name(), e);
                return Ok(0);
            }
        }
        let stations = tank.stations_mut(level);
        for index in &selected {
            if let Some(station) = stations.get_mut(index) {
                info!("Running station {}", index);
                station.start_datetime = Some(now);
                station.end_datetime = None;
            }
        }
        Ok(selected.len())
    }

    /// Undo what [`activate_programs`](Self::activate_programs) did for the
    /// level that `state` belongs to.
    ///
    /// Enabled flags are restored where they differ from the captured
    /// original. A program still marked running that is not the scheduler's
    /// current program is marked ended and all stations are stopped, since
    /// the scheduler runs one program at a time. Calling it again without a
    /// state change does nothing.
    pub fn revert_programs(
        &self,
        tank: &mut Tank,
        state: TankState,
        now: NaiveDateTime,
    ) -> Result<usize, TankError> {
        let level = alarm_level("revert_programs", state)?;
        info!("Reverting {} programs of water tank {}", level.name(), tank.id);
        let running = self.scheduler.running_program_index();
        let mut changed = 0;
        for (&index, program) in tank.programs_mut(level).iter_mut() {
            if let Some(original) = program.original_enabled {
                if self.scheduler.is_program_enabled(index) != original {
                    match self.scheduler.set_program_enabled(index, original) {
                        Ok(()) => {
                            info!(
                                "{} program {}",
                                if original { "Enabling" } else { "Disabling" },
                                index
                            );
                            changed += 1;
                        }
                        Err(e) => error!("Failed to restore program {}: {:#}", index, e),
                    }
                }
            }
            if program.is_running() && running != Some(index) {
                info!("Program {} was still running, stopping it now", index);
                program.end_datetime = Some(now);
                changed += 1;
                if let Err(e) = self.scheduler.stop_all_stations() {
                    error!("Failed to stop stations of program {}: {:#}", index, e);
                }
            }
        }
        Ok(changed)
    }

    /// Stop the running `stop_on_exit` stations of the level that `state`
    /// belongs to. Returns the number of stations marked as ended.
    pub fn stop_stations_on_event_exit(
        &self,
        tank: &mut Tank,
        state: TankState,
        now: NaiveDateTime,
    ) -> Result<usize, TankError> {
        let level = alarm_level("stop_stations_on_event_exit", state)?;
        let master = self.scheduler.master_station_index();
        let mut ended = 0;
        let mut stop = Vec::new();
        for (&index, station) in tank.stations_mut(level).iter_mut() {
            if station.run
                && station.stop_on_exit
                && station.is_running()
                && self.scheduler.is_station_topology_enabled(index)
            {
                info!("Stopping on event exit running station {}", index);
                station.end_datetime = Some(now);
                ended += 1;
                if Some(index) != master {
                    stop.push(index);
                }
            }
        }
        if !stop.is_empty() {
            if let Err(e) = self.scheduler.stop_stations(&stop) {
                error!("Failed to stop {} stations: {:#}", level.name(), e);
            }
        }
        Ok(ended)
    }

    /// Stop every running station, across all levels, whose target
    /// percentage lies between `previous` and the tank's new percentage.
    ///
    /// A station is crossed when `previous <= target < current` or
    /// `previous >= target > current`.
    pub fn stop_stations_on_percentage_change(
        &self,
        tank: &mut Tank,
        previous: Option<u8>,
        now: NaiveDateTime,
    ) -> usize {
        let (Some(previous), Some(current)) = (previous, tank.percentage) else {
            return 0;
        };
        let master = self.scheduler.master_station_index();
        let mut stop = BTreeSet::new();
        let mut ended = 0;
        for level in Level::ALL {
            for (&index, station) in tank.stations_mut(level).iter_mut() {
                if Some(index) == master || !station.run || !station.is_running() {
                    continue;
                }
                let Some(target) = station.percentage else {
                    continue;
                };
                let crossed = (previous <= target && current > target)
                    || (previous >= target && current < target);
                if crossed {
                    info!(
                        "Stopping on percentage change running station {} ({}% -> {}%, target {}%)",
                        index, previous, current, target
                    );
                    station.end_datetime = Some(now);
                    stop.insert(index);
                    ended += 1;
                }
            }
        }
        if !stop.is_empty() {
            let indices: Vec<usize> = stop.into_iter().collect();
            if let Err(e) = self.scheduler.stop_stations(&indices) {
                error!("Failed to stop stations on percentage change: {:#}", e);
            }
        }
        ended
    }

    /// Mark programs ended once the scheduler has moved on from them.
    ///
    /// A running program stays running only while the tank is in its level
    /// and it is the scheduler's current program.
    pub fn running_program_changed(&self, tank: &mut Tank, now: NaiveDateTime) -> bool {
        let running = self.scheduler.running_program_index();
        let current_level = tank.state.and_then(TankState::level);
        let mut changed = false;
        for level in Level::ALL {
            let in_level = current_level == Some(level);
            for (&index, program) in tank.programs_mut(level).iter_mut() {
                if program.is_running() && !(in_level && running == Some(index)) {
                    info!("Program {} is no longer running, marking it stopped", index);
                    program.end_datetime = Some(now);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Mark stations ended once the scheduler reports their output closed.
    pub fn zone_changed(&self, tank: &mut Tank, now: NaiveDateTime) -> bool {
        let mut changed = false;
        for level in Level::ALL {
            for (&index, station) in tank.stations_mut(level).iter_mut() {
                if station.run && station.is_running() && !self.scheduler.is_station_open(index) {
                    info!("Marking ended station {}", index);
                    station.end_datetime = Some(now);
                    changed = true;
                }
            }
        }
        changed
    }
}

fn entry_level(operation: &'static str, state: TankState) -> Result<Level, TankError> {
    match state.level() {
        Some(level) if state.is_base() => Ok(level),
        _ => Err(TankError::InvalidLevelState { operation, state }),
    }
}

fn alarm_level(operation: &'static str, state: TankState) -> Result<Level, TankError> {
    state
        .level()
        .ok_or(TankError::InvalidLevelState { operation, state })
}
