use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wtm_core::notify::{LogNotifier, MessageDispatcher};
use wtm_core::registry::{lock, shared, SettingsDocument, SharedRegistry};
use wtm_core::watchdog::DeadSensorWatchdog;
use wtm_utils::dates::now_seconds;

/// Run the dead sensor watchdog until Ctrl-C.
///
/// Other commands update the document on disk, so the tanks are reloaded
/// before every scan.
pub async fn run_watch(data: &Path, interval: Option<u64>) -> anyhow::Result<()> {
    let document = SettingsDocument::load(data)?;
    let interval = interval.unwrap_or(document.settings.max_sensor_no_signal_time);
    let registry = shared(document.water_tanks);
    let messages = MessageDispatcher::new(Arc::new(LogNotifier), document.settings);

    let reload = tokio::spawn(reload_tanks(
        data.to_path_buf(),
        Arc::clone(&registry),
        Duration::from_secs(interval.max(1)),
    ));

    let watchdog = DeadSensorWatchdog::new(registry, messages, now_seconds());
    watchdog.reset(Duration::from_secs(interval));
    let handle = watchdog.spawn();
    info!("Watching for dead sensors every {}s, press Ctrl-C to stop", interval);

    tokio::signal::ctrl_c().await?;
    handle.stop();
    reload.abort();
    handle.join().await
}

async fn reload_tanks(data: PathBuf, registry: SharedRegistry, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // the first tick fires at once and the tanks are already loaded
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match SettingsDocument::load(&data) {
            Ok(document) => *lock(&registry) = document.water_tanks,
            Err(e) => warn!("Keeping previous tanks, reload failed: {:#}", e),
        }
    }
}
