//! Scheduler events and operator actions on saved tanks.

use crate::scheduler::SchedulerSnapshot;
use log::info;
use std::path::Path;
use wtm_core::registry::SettingsDocument;
use wtm_core::tank::TankState;
use wtm_utils::dates::now_seconds;

pub fn run_revert_programs(
    data: &Path,
    tank_id: &str,
    state: u8,
    snapshot: SchedulerSnapshot,
) -> anyhow::Result<()> {
    let state = TankState::try_from(state)?;
    let document = SettingsDocument::load(data)?;
    let monitor = crate::open_monitor(&document, snapshot);
    let changed = monitor.revert_programs(tank_id, state, now_seconds())?;
    info!(
        "Reverted {} programs of water tank {}: {} changes",
        state.name(),
        tank_id,
        changed
    );
    println!("{}", monitor.feed()?);
    crate::save(&monitor, document, data)
}

pub fn run_zone_changed(data: &Path, snapshot: SchedulerSnapshot) -> anyhow::Result<()> {
    let document = SettingsDocument::load(data)?;
    let monitor = crate::open_monitor(&document, snapshot);
    let updated = monitor.zone_changed(now_seconds());
    finish(monitor, document, data, updated)
}

pub fn run_program_changed(data: &Path, snapshot: SchedulerSnapshot) -> anyhow::Result<()> {
    let document = SettingsDocument::load(data)?;
    let monitor = crate::open_monitor(&document, snapshot);
    let updated = monitor.running_program_changed(now_seconds());
    finish(monitor, document, data, updated)
}

fn finish(
    monitor: wtm_core::monitor::TankMonitor,
    document: SettingsDocument,
    data: &Path,
    updated: Vec<String>,
) -> anyhow::Result<()> {
    if updated.is_empty() {
        info!("No water tank was updated");
        return Ok(());
    }
    info!("Updated water tanks: {}", updated.join(", "));
    println!("{}", monitor.feed()?);
    crate::save(&monitor, document, data)
}
