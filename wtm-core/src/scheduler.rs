//! Contract of the irrigation scheduler the tank core drives.
//!
//! Station and program indices are flat zero-based indices; how they map
//! onto boards and outputs is the scheduler's business.

/// One station to open, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationRun {
    pub index: usize,
    pub duration_seconds: u64,
}

pub trait Scheduler: Send + Sync {
    /// Start a program now.
    fn start_program(&self, index: usize) -> anyhow::Result<()>;

    /// Live enabled flag of a program.
    fn is_program_enabled(&self, index: usize) -> bool;

    /// Change and persist a program's enabled flag.
    fn set_program_enabled(&self, index: usize, enabled: bool) -> anyhow::Result<()>;

    /// Stop every station, which also ends the running program.
    fn stop_all_stations(&self) -> anyhow::Result<()>;

    /// Open the given stations in one scheduling call.
    fn activate_stations(&self, runs: &[StationRun]) -> anyhow::Result<()>;

    /// Close the given stations now.
    fn stop_stations(&self, indices: &[usize]) -> anyhow::Result<()>;

    /// False for stations that are disabled in the station topology.
    fn is_station_topology_enabled(&self, index: usize) -> bool;

    /// Index of the master output, if any. It is never addressed directly.
    fn master_station_index(&self) -> Option<usize>;

    fn running_program_index(&self) -> Option<usize>;

    fn any_station_open(&self) -> bool;

    fn is_station_open(&self, index: usize) -> bool;

    /// Number of programs the scheduler knows about.
    fn program_count(&self) -> usize {
        0
    }

    /// Number of stations the scheduler knows about.
    fn station_count(&self) -> usize {
        0
    }
}
