//! Measurement validation and the per-reading update of a tank.

use crate::notify::MessageDispatcher;
use crate::side_effects::SideEffectCoordinator;
use crate::state_machine::{apply_transition, compute_next_state, Transition};
use crate::tank::Tank;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use wtm_utils::dates::truncate_to_seconds;

/// Why a reading did not produce a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Negative, outside the configured sane range, or below the bottom of
    /// the tank. The operator is notified.
    OutOfRange,
    /// The geometry cannot produce a percentage (missing dimensions or a
    /// reading outside the volume formula's domain). No notification.
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementOutcome {
    Accepted {
        previous: Option<u8>,
        percentage: u8,
        transition: Option<Transition>,
    },
    Rejected(Rejection),
}

impl MeasurementOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MeasurementOutcome::Accepted { .. })
    }
}

/// Whether `measurement` is a plausible reading for `tank`.
pub fn validate(tank: &Tank, measurement: f64) -> bool {
    if !measurement.is_finite() || measurement < 0.0 {
        return false;
    }
    if tank
        .min_valid_sensor_measurement
        .is_some_and(|min| measurement < min)
    {
        return false;
    }
    if tank
        .max_valid_sensor_measurement
        .is_some_and(|max| measurement > max)
    {
        return false;
    }
    tank.geometry
        .measurement_is_valid(measurement, &tank.sensor_frame())
}

/// Record a reading on `tank` and run everything that follows from it.
///
/// The reading and its time are always recorded. A rejected reading clears
/// the percentage and leaves the state alone. An accepted one stops stations
/// whose target was crossed, notifies percentage observers and then runs the
/// state machine, in that order: entry actions may open stations, which
/// would hide a water loss from the observers.
pub fn update_sensor_measurement(
    tank: &mut Tank,
    sensor_id: &str,
    measurement: f64,
    now: NaiveDateTime,
    coordinator: &SideEffectCoordinator<'_>,
    messages: &MessageDispatcher,
) -> MeasurementOutcome {
    let now = truncate_to_seconds(now);
    tank.last_updated = Some(now);
    tank.sensor_measurement = Some(measurement);

    if !validate(tank, measurement) {
        warn!(
            "Invalid measurement {} from sensor {} for water tank {}",
            measurement, sensor_id, tank.id
        );
        tank.invalid_sensor_measurement = true;
        tank.percentage = None;
        if let Err(e) = messages.invalid_measurement(tank) {
            warn!("Invalid measurement notification failed: {:#}", e);
        }
        return MeasurementOutcome::Rejected(Rejection::OutOfRange);
    }

    let previous = tank.percentage;
    let Some(percentage) = tank
        .geometry
        .calculate_percentage(measurement, &tank.sensor_frame())
    else {
        info!(
            "Water tank {} cannot compute a percentage for measurement {}",
            tank.id, measurement
        );
        tank.invalid_sensor_measurement = true;
        tank.percentage = None;
        return MeasurementOutcome::Rejected(Rejection::Undefined);
    };

    debug!(
        "Water tank {}: measurement {} from sensor {} -> {}%",
        tank.id, measurement, sensor_id, percentage
    );
    tank.invalid_sensor_measurement = false;
    tank.percentage = Some(percentage);
    coordinator.stop_stations_on_percentage_change(tank, previous, now);

    let observers = tank.observers.clone();
    observers.notify_percentage_changed(tank, previous);

    let next = compute_next_state(tank.state, tank.percentage, &tank.thresholds());
    let transition = apply_transition(tank, next, coordinator, now);
    MeasurementOutcome::Accepted {
        previous,
        percentage,
        transition,
    }
}
