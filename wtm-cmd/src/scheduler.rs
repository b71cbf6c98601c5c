//! A scheduler stand-in for one-shot commands: queries are answered from
//! the command line and requests are only logged.

use clap::Args;
use log::info;
use std::collections::BTreeSet;
use std::sync::Mutex;
use wtm_core::scheduler::{Scheduler, StationRun};

/// Scheduler state as seen by the caller.
#[derive(Args, Debug, Clone, Default)]
pub struct SchedulerSnapshot {
    /// Number of programs the scheduler has
    #[arg(long, default_value_t = 0)]
    pub programs: usize,

    /// Number of stations the scheduler has
    #[arg(long, default_value_t = 0)]
    pub stations: usize,

    /// Program currently running
    #[arg(long)]
    pub running_program: Option<usize>,

    /// Enabled program index (repeatable)
    #[arg(long = "enabled-program")]
    pub enabled_programs: Vec<usize>,

    /// Open station index (repeatable)
    #[arg(long = "open-station")]
    pub open_stations: Vec<usize>,

    /// Station index disabled in the topology (repeatable)
    #[arg(long = "hidden-station")]
    pub hidden_stations: Vec<usize>,

    /// Master station index
    #[arg(long)]
    pub master_station: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    running_program: Option<usize>,
    enabled_programs: BTreeSet<usize>,
    open_stations: BTreeSet<usize>,
}

#[derive(Debug)]
pub struct DryRunScheduler {
    snapshot: SchedulerSnapshot,
    state: Mutex<State>,
}

impl DryRunScheduler {
    pub fn new(snapshot: SchedulerSnapshot) -> Self {
        let state = State {
            running_program: snapshot.running_program,
            enabled_programs: snapshot.enabled_programs.iter().copied().collect(),
            open_stations: snapshot.open_stations.iter().copied().collect(),
        };
        DryRunScheduler {
            snapshot,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for DryRunScheduler {
    fn start_program(&self, index: usize) -> anyhow::Result<()> {
        info!("[scheduler] start program {}", index);
        self.state().running_program = Some(index);
        Ok(())
    }

    fn is_program_enabled(&self, index: usize) -> bool {
        self.state().enabled_programs.contains(&index)
    }

    fn set_program_enabled(&self, index: usize, enabled: bool) -> anyhow::Result<()> {
        info!("[scheduler] set program {} enabled={}", index, enabled);
        let mut state = self.state();
        if enabled {
            state.enabled_programs.insert(index);
        } else {
            state.enabled_programs.remove(&index);
        }
        Ok(())
    }

    fn stop_all_stations(&self) -> anyhow::Result<()> {
        info!("[scheduler] stop all stations");
        let mut state = self.state();
        state.open_stations.clear();
        state.running_program = None;
        Ok(())
    }

    fn activate_stations(&self, runs: &[StationRun]) -> anyhow::Result<()> {
        let mut state = self.state();
        for run in runs {
            info!(
                "[scheduler] open station {} for {}s",
                run.index, run.duration_seconds
            );
            state.open_stations.insert(run.index);
        }
        Ok(())
    }

    fn stop_stations(&self, indices: &[usize]) -> anyhow::Result<()> {
        let mut state = self.state();
        for index in indices {
            info!("[scheduler] close station {}", index);
            state.open_stations.remove(index);
        }
        Ok(())
    }

    fn is_station_topology_enabled(&self, index: usize) -> bool {
        !self.snapshot.hidden_stations.contains(&index)
    }

    fn master_station_index(&self) -> Option<usize> {
        self.snapshot.master_station
    }

    fn running_program_index(&self) -> Option<usize> {
        self.state().running_program
    }

    fn any_station_open(&self) -> bool {
        !self.state().open_stations.is_empty()
    }

    fn is_station_open(&self, index: usize) -> bool {
        self.state().open_stations.contains(&index)
    }

    fn program_count(&self) -> usize {
        self.snapshot.programs
    }

    fn station_count(&self) -> usize {
        self.snapshot.stations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_update_the_snapshot() {
        let scheduler = DryRunScheduler::new(SchedulerSnapshot {
            enabled_programs: vec![1],
            open_stations: vec![4],
            hidden_stations: vec![7],
            ..Default::default()
        });
        assert!(scheduler.is_program_enabled(1));
        assert!(scheduler.any_station_open());
        assert!(!scheduler.is_station_topology_enabled(7));

        scheduler.set_program_enabled(1, false).unwrap();
        scheduler.start_program(2).unwrap();
        scheduler
            .activate_stations(&[StationRun {
                index: 5,
                duration_seconds: 60,
            }])
            .unwrap();
        assert!(!scheduler.is_program_enabled(1));
        assert_eq!(scheduler.running_program_index(), Some(2));
        assert!(scheduler.is_station_open(5));

        scheduler.stop_all_stations().unwrap();
        assert!(!scheduler.any_station_open());
        assert_eq!(scheduler.running_program_index(), None);
    }
}
