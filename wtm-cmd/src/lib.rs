//! Command implementations for the water tank monitor CLI.
//!
//! Every command loads the settings document, applies one operation to the
//! tanks, saves the document when something changed and prints the data
//! feed.

use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;
use wtm_core::monitor::TankMonitor;
use wtm_core::notify::{LogNotifier, MessageDispatcher};
use wtm_core::registry::{lock, shared, SettingsDocument};

pub mod events;
pub mod feed;
pub mod ingest;
pub mod scheduler;
pub mod watch;

use scheduler::{DryRunScheduler, SchedulerSnapshot};

#[derive(Subcommand)]
pub enum Command {
    /// Apply one sensor message to the tanks listening to its sensor
    Ingest {
        /// MQTT topic the message arrived on
        #[arg(short, long, default_value = "")]
        topic: String,

        /// Message body, e.g. '{"sensor_id": "s1", "measurement": 0.4}'
        #[arg(short, long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Read the message body from a file
        #[arg(long)]
        payload_file: Option<String>,

        #[command(flatten)]
        scheduler: SchedulerSnapshot,
    },

    /// Run the dead sensor watchdog until interrupted
    Watch {
        /// Seconds between scans (defaults to max_sensor_no_signal_time)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Print the data feed
    Feed,

    /// Revert the programs a tank activated for an alarm level
    RevertPrograms {
        /// Tank id
        tank_id: String,

        /// State code of the level (2-7)
        state: u8,

        #[command(flatten)]
        scheduler: SchedulerSnapshot,
    },

    /// Mark stations ended that the scheduler reports closed
    ZoneChanged {
        #[command(flatten)]
        scheduler: SchedulerSnapshot,
    },

    /// Mark programs ended that the scheduler is no longer running
    ProgramChanged {
        #[command(flatten)]
        scheduler: SchedulerSnapshot,
    },
}

pub async fn run(command: Command, data: &Path) -> anyhow::Result<()> {
    match command {
        Command::Ingest {
            topic,
            payload,
            payload_file,
            scheduler,
        } => {
            ingest::run_ingest(data, &topic, payload, payload_file, scheduler)
        }
        Command::Watch { interval } => watch::run_watch(data, interval).await,
        Command::Feed => feed::run_feed(data),
        Command::RevertPrograms {
            tank_id,
            state,
            scheduler,
        } => {
            events::run_revert_programs(data, &tank_id, state, scheduler)
        }
        Command::ZoneChanged { scheduler } => events::run_zone_changed(data, scheduler),
        Command::ProgramChanged { scheduler } => events::run_program_changed(data, scheduler),
    }
}

/// Monitor over the document's tanks, logging notifications and scheduler
/// requests instead of delivering them.
pub(crate) fn open_monitor(document: &SettingsDocument, snapshot: SchedulerSnapshot) -> TankMonitor {
    let messages = MessageDispatcher::new(Arc::new(LogNotifier), document.settings.clone());
    let scheduler = Arc::new(DryRunScheduler::new(snapshot));
    let monitor = TankMonitor::new(shared(document.water_tanks.clone()), scheduler, messages);
    monitor.prepare_tanks();
    monitor
}

/// Copy the monitor's tanks back into the document and save it.
pub(crate) fn save(
    monitor: &TankMonitor,
    mut document: SettingsDocument,
    data: &Path,
) -> anyhow::Result<()> {
    document.water_tanks = lock(monitor.registry()).clone();
    document.save(data)
}
