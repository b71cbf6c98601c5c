//! Entry points used by the hosting process: sensor messages, scheduler
//! events and operator commands, all applied to the shared registry.

use crate::engine::update_sensor_measurement;
use crate::notify::{AlarmNotifier, MessageDispatcher};
use crate::payload;
use crate::registry::{lock, SharedRegistry};
use crate::scheduler::Scheduler;
use crate::side_effects::SideEffectCoordinator;
use crate::tank::TankState;
use chrono::NaiveDateTime;
use log::{info, warn};
use std::sync::Arc;

/// What one sensor message did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Tanks that accepted a reading.
    pub updated: Vec<String>,
    /// Tanks that recorded a rejected reading.
    pub rejected: Vec<String>,
    /// Sensor ids no tank listens to.
    pub unassociated: Vec<String>,
    /// The message could not be decoded.
    pub unrecognised: bool,
}

impl IngestReport {
    /// True when any tank was modified and the document should be saved.
    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.rejected.is_empty()
    }
}

pub struct TankMonitor {
    registry: SharedRegistry,
    scheduler: Arc<dyn Scheduler>,
    messages: MessageDispatcher,
}

impl TankMonitor {
    pub fn new(
        registry: SharedRegistry,
        scheduler: Arc<dyn Scheduler>,
        messages: MessageDispatcher,
    ) -> Self {
        TankMonitor {
            registry,
            scheduler,
            messages,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    fn coordinator(&self) -> SideEffectCoordinator<'_> {
        SideEffectCoordinator::new(
            self.scheduler.as_ref(),
            self.messages.settings().max_station_duration,
        )
    }

    /// Create missing program and station entries for every tank and
    /// subscribe the alarm notifier to each of them.
    pub fn prepare_tanks(&self) {
        let notifier = Arc::new(AlarmNotifier::new(
            self.messages.clone(),
            Arc::clone(&self.scheduler),
        ));
        let programs = self.scheduler.program_count();
        let stations = self.scheduler.station_count();
        let mut registry = lock(&self.registry);
        for tank in registry.iter_mut() {
            tank.ensure_programs(programs);
            tank.ensure_stations(stations);
            tank.observers.clear();
            tank.observers.register_percentage_observer(notifier.clone());
            tank.observers.register_state_observer(notifier.clone());
        }
    }

    /// Apply a sensor message received on `topic`.
    pub fn handle_sensor_message(
        &self,
        topic: &str,
        message: &[u8],
        now: NaiveDateTime,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        let readings = match payload::parse(message) {
            Ok(readings) => readings,
            Err(e) => {
                warn!("{} (topic {})", e, topic);
                report.unrecognised = true;
                let text = String::from_utf8_lossy(message);
                if let Err(e) = self.messages.unrecognised_message(topic, now, &text) {
                    warn!("Unrecognised message notification failed: {:#}", e);
                }
                return report;
            }
        };

        let coordinator = self.coordinator();
        let mut unassociated = Vec::new();
        {
            let mut registry = lock(&self.registry);
            for reading in &readings {
                let mut matched = false;
                for tank in registry.tanks_for_sensor(&reading.sensor_id) {
                    matched = true;
                    let outcome = update_sensor_measurement(
                        tank,
                        &reading.sensor_id,
                        reading.measurement,
                        now,
                        &coordinator,
                        &self.messages,
                    );
                    if outcome.is_accepted() {
                        report.updated.push(tank.id.clone());
                    } else {
                        report.rejected.push(tank.id.clone());
                    }
                }
                if !matched {
                    unassociated.push(reading);
                }
            }
        }

        for reading in unassociated {
            info!("No water tank listens to sensor {}", reading.sensor_id);
            if let Err(e) = self.messages.unassociated_sensor(
                &reading.sensor_id,
                reading.measurement,
                now,
                topic,
            ) {
                warn!("Unassociated sensor notification failed: {:#}", e);
            }
            report.unassociated.push(reading.sensor_id.clone());
        }
        report
    }

    /// The scheduler's running program changed. Returns the tanks modified.
    pub fn running_program_changed(&self, now: NaiveDateTime) -> Vec<String> {
        let coordinator = self.coordinator();
        let mut registry = lock(&self.registry);
        registry
            .iter_mut()
            .filter_map(|tank| {
                coordinator
                    .running_program_changed(tank, now)
                    .then(|| tank.id.clone())
            })
            .collect()
    }

    /// A station opened or closed. Returns the tanks modified.
    pub fn zone_changed(&self, now: NaiveDateTime) -> Vec<String> {
        let coordinator = self.coordinator();
        let mut registry = lock(&self.registry);
        registry
            .iter_mut()
            .filter_map(|tank| coordinator.zone_changed(tank, now).then(|| tank.id.clone()))
            .collect()
    }

    /// Operator request to revert the programs of one tank's level.
    pub fn revert_programs(
        &self,
        tank_id: &str,
        state: TankState,
        now: NaiveDateTime,
    ) -> anyhow::Result<usize> {
        let coordinator = self.coordinator();
        let mut registry = lock(&self.registry);
        let tank = registry.require_mut(tank_id)?;
        Ok(coordinator.revert_programs(tank, state, now)?)
    }

    pub fn feed(&self) -> anyhow::Result<String> {
        crate::feed::render(&lock(&self.registry))
    }
}
