use crate::scheduler::SchedulerSnapshot;
use anyhow::Context;
use log::info;
use std::path::Path;
use wtm_core::registry::SettingsDocument;
use wtm_utils::dates::now_seconds;

/// Apply one sensor message, save the document if a tank changed and print
/// the feed.
pub fn run_ingest(
    data: &Path,
    topic: &str,
    payload: Option<String>,
    payload_file: Option<String>,
    snapshot: SchedulerSnapshot,
) -> anyhow::Result<()> {
    let message = match (payload, payload_file) {
        (Some(payload), _) => payload.into_bytes(),
        (None, Some(file)) => std::fs::read(&file).with_context(|| format!("reading {}", file))?,
        (None, None) => anyhow::bail!("either --payload or --payload-file is required"),
    };

    let document = SettingsDocument::load(data)?;
    let monitor = crate::open_monitor(&document, snapshot);
    let report = monitor.handle_sensor_message(topic, &message, now_seconds());
    info!(
        "Updated: {:?}, rejected: {:?}, unassociated sensors: {:?}",
        report.updated, report.rejected, report.unassociated
    );
    if report.unrecognised {
        anyhow::bail!("unrecognised sensor message on topic '{}'", topic);
    }
    if !report.changed() {
        info!("No water tank was updated");
        return Ok(());
    }
    println!("{}", monitor.feed()?);
    crate::save(&monitor, document, data)
}
