//! Tank model: configuration, live readings, alarm state and the
//! per-level programs and stations to drive on alarm.

use crate::error::TankError;
use crate::geometry::{SensorFrame, TankGeometry};
use crate::observer::ObserverBus;
use crate::state_machine::Thresholds;
use crate::units::LengthUnit;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use wtm_utils::dates::optional_timestamp;

/// Alarm state of a tank. Persisted as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TankState {
    Normal = 1,
    Overflow = 2,
    OverflowUnsafe = 3,
    Warning = 4,
    WarningUnsafe = 5,
    Critical = 6,
    CriticalUnsafe = 7,
}

impl TankState {
    pub fn name(self) -> &'static str {
        match self {
            TankState::Normal => "NORMAL",
            TankState::Overflow => "OVERFLOW",
            TankState::OverflowUnsafe => "OVERFLOW_UNSAFE",
            TankState::Warning => "WARNING",
            TankState::WarningUnsafe => "WARNING_UNSAFE",
            TankState::Critical => "CRITICAL",
            TankState::CriticalUnsafe => "CRITICAL_UNSAFE",
        }
    }

    /// The alarm family this state belongs to, `None` for NORMAL.
    pub fn level(self) -> Option<Level> {
        Level::from_state(self)
    }

    /// True for OVERFLOW, WARNING and CRITICAL.
    pub fn is_base(self) -> bool {
        matches!(
            self,
            TankState::Overflow | TankState::Warning | TankState::Critical
        )
    }
}

impl TryFrom<u8> for TankState {
    type Error = TankError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TankState::Normal),
            2 => Ok(TankState::Overflow),
            3 => Ok(TankState::OverflowUnsafe),
            4 => Ok(TankState::Warning),
            5 => Ok(TankState::WarningUnsafe),
            6 => Ok(TankState::Critical),
            7 => Ok(TankState::CriticalUnsafe),
            other => Err(TankError::UnknownState(other)),
        }
    }
}

impl From<TankState> for u8 {
    fn from(state: TankState) -> u8 {
        state as u8
    }
}

/// One of the three alarm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Overflow,
    Warning,
    Critical,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Overflow, Level::Warning, Level::Critical];

    pub fn base_state(self) -> TankState {
        match self {
            Level::Overflow => TankState::Overflow,
            Level::Warning => TankState::Warning,
            Level::Critical => TankState::Critical,
        }
    }

    pub fn unsafe_state(self) -> TankState {
        match self {
            Level::Overflow => TankState::OverflowUnsafe,
            Level::Warning => TankState::WarningUnsafe,
            Level::Critical => TankState::CriticalUnsafe,
        }
    }

    pub fn from_state(state: TankState) -> Option<Level> {
        match state {
            TankState::Normal => None,
            TankState::Overflow | TankState::OverflowUnsafe => Some(Level::Overflow),
            TankState::Warning | TankState::WarningUnsafe => Some(Level::Warning),
            TankState::Critical | TankState::CriticalUnsafe => Some(Level::Critical),
        }
    }

    pub fn name(self) -> &'static str {
        self.base_state().name()
    }
}

/// What to do with one scheduler program when a level is entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankProgram {
    pub run: bool,
    pub enable: bool,
    pub suspend: bool,
    /// Enabled flag captured before `enable`/`suspend` changed it.
    pub original_enabled: Option<bool>,
    #[serde(with = "optional_timestamp")]
    pub start_datetime: Option<NaiveDateTime>,
    #[serde(with = "optional_timestamp")]
    pub end_datetime: Option<NaiveDateTime>,
}

impl TankProgram {
    pub fn is_running(&self) -> bool {
        self.start_datetime.is_some() && self.end_datetime.is_none()
    }
}

/// What to do with one station (output) when a level is entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankStation {
    pub run: bool,
    /// Run time; the global default applies when unset.
    pub minutes: Option<u32>,
    /// Stop the station once the tank crosses this percentage.
    #[serde(deserialize_with = "rounded_percentage")]
    pub percentage: Option<u8>,
    /// Stop the station when the tank leaves the level.
    pub stop_on_exit: bool,
    #[serde(with = "optional_timestamp")]
    pub start_datetime: Option<NaiveDateTime>,
    #[serde(with = "optional_timestamp")]
    pub end_datetime: Option<NaiveDateTime>,
}

impl TankStation {
    pub fn is_running(&self) -> bool {
        self.start_datetime.is_some() && self.end_datetime.is_none()
    }
}

/// Programs keyed by scheduler program index.
pub type ProgramMap = BTreeMap<usize, TankProgram>;
/// Stations keyed by scheduler station index.
pub type StationMap = BTreeMap<usize, TankStation>;

fn default_true() -> bool {
    true
}

/// Percentages and thresholds may be stored as floats.
pub(crate) fn rounded_percentage<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<f64> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u8))
}

/// A monitored water tank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub geometry: TankGeometry,

    #[serde(default)]
    pub sensor_mqtt_topic: Option<String>,
    #[serde(default)]
    pub sensor_id: Option<String>,
    /// Distance from the top of the tank to the sensor, in tank units.
    #[serde(default)]
    pub sensor_offset_from_top: f64,
    #[serde(default)]
    pub min_valid_sensor_measurement: Option<f64>,
    #[serde(default)]
    pub max_valid_sensor_measurement: Option<f64>,
    #[serde(default)]
    pub water_tank_units: LengthUnit,
    #[serde(default)]
    pub sensor_units: LengthUnit,
    /// Gates scheduler side effects only; readings, state and
    /// notifications are processed either way.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, deserialize_with = "rounded_percentage")]
    pub overflow_level: Option<u8>,
    #[serde(default, deserialize_with = "rounded_percentage")]
    pub overflow_safe_level: Option<u8>,
    #[serde(default)]
    pub overflow_email: bool,
    #[serde(default)]
    pub overflow_xmpp: bool,
    #[serde(default)]
    pub overflow_programs: ProgramMap,
    #[serde(default)]
    pub overflow_stations: StationMap,

    #[serde(default, deserialize_with = "rounded_percentage")]
    pub warning_level: Option<u8>,
    #[serde(default, deserialize_with = "rounded_percentage")]
    pub warning_safe_level: Option<u8>,
    #[serde(default)]
    pub warning_email: bool,
    #[serde(default)]
    pub warning_xmpp: bool,
    #[serde(default)]
    pub warning_programs: ProgramMap,
    #[serde(default)]
    pub warning_stations: StationMap,

    #[serde(default, deserialize_with = "rounded_percentage")]
    pub critical_level: Option<u8>,
    #[serde(default, deserialize_with = "rounded_percentage")]
    pub critical_safe_level: Option<u8>,
    #[serde(default)]
    pub critical_email: bool,
    #[serde(default)]
    pub critical_xmpp: bool,
    #[serde(default)]
    pub critical_programs: ProgramMap,
    #[serde(default)]
    pub critical_stations: StationMap,

    #[serde(default)]
    pub loss_email: bool,
    #[serde(default)]
    pub loss_xmpp: bool,
    #[serde(default)]
    pub invalid_sensor_measurement_email: bool,
    #[serde(default)]
    pub invalid_sensor_measurement_xmpp: bool,

    #[serde(default, with = "optional_timestamp")]
    pub last_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub sensor_measurement: Option<f64>,
    #[serde(default)]
    pub invalid_sensor_measurement: bool,
    #[serde(default, deserialize_with = "rounded_percentage")]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub state: Option<TankState>,
    /// Position in the data feed.
    #[serde(default)]
    pub order: Option<u32>,

    #[serde(skip)]
    pub observers: ObserverBus,
}

impl Tank {
    /// A new, enabled tank with no sensor, thresholds or actions.
    pub fn new(id: impl Into<String>, label: impl Into<String>, geometry: TankGeometry) -> Self {
        Tank {
            id: id.into(),
            label: label.into(),
            geometry,
            sensor_mqtt_topic: None,
            sensor_id: None,
            sensor_offset_from_top: 0.0,
            min_valid_sensor_measurement: None,
            max_valid_sensor_measurement: None,
            water_tank_units: LengthUnit::default(),
            sensor_units: LengthUnit::default(),
            enabled: true,
            overflow_level: None,
            overflow_safe_level: None,
            overflow_email: false,
            overflow_xmpp: false,
            overflow_programs: ProgramMap::new(),
            overflow_stations: StationMap::new(),
            warning_level: None,
            warning_safe_level: None,
            warning_email: false,
            warning_xmpp: false,
            warning_programs: ProgramMap::new(),
            warning_stations: StationMap::new(),
            critical_level: None,
            critical_safe_level: None,
            critical_email: false,
            critical_xmpp: false,
            critical_programs: ProgramMap::new(),
            critical_stations: StationMap::new(),
            loss_email: false,
            loss_xmpp: false,
            invalid_sensor_measurement_email: false,
            invalid_sensor_measurement_xmpp: false,
            last_updated: None,
            sensor_measurement: None,
            invalid_sensor_measurement: false,
            percentage: None,
            state: None,
            order: None,
            observers: ObserverBus::default(),
        }
    }

    pub fn sensor_frame(&self) -> SensorFrame {
        SensorFrame {
            offset_from_top: self.sensor_offset_from_top,
            tank_units: self.water_tank_units,
            sensor_units: self.sensor_units,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            overflow_level: self.overflow_level,
            overflow_safe_level: self.overflow_safe_level,
            warning_level: self.warning_level,
            warning_safe_level: self.warning_safe_level,
            critical_level: self.critical_level,
            critical_safe_level: self.critical_safe_level,
        }
    }

    pub fn programs(&self, level: Level) -> &ProgramMap {
        match level {
            Level::Overflow => &self.overflow_programs,
            Level::Warning => &self.warning_programs,
            Level::Critical => &self.critical_programs,
        }
    }

    pub fn programs_mut(&mut self, level: Level) -> &mut ProgramMap {
        match level {
            Level::Overflow => &mut self.overflow_programs,
            Level::Warning => &mut self.warning_programs,
            Level::Critical => &mut self.critical_programs,
        }
    }

    pub fn stations(&self, level: Level) -> &StationMap {
        match level {
            Level::Overflow => &self.overflow_stations,
            Level::Warning => &self.warning_stations,
            Level::Critical => &self.critical_stations,
        }
    }

    pub fn stations_mut(&mut self, level: Level) -> &mut StationMap {
        match level {
            Level::Overflow => &mut self.overflow_stations,
            Level::Warning => &mut self.warning_stations,
            Level::Critical => &mut self.critical_stations,
        }
    }

    /// (email, xmpp) alarm flags of a level.
    pub fn alarm_channels(&self, level: Level) -> (bool, bool) {
        match level {
            Level::Overflow => (self.overflow_email, self.overflow_xmpp),
            Level::Warning => (self.warning_email, self.warning_xmpp),
            Level::Critical => (self.critical_email, self.critical_xmpp),
        }
    }

    /// Text for the `{additional_info}` message placeholder.
    pub fn additional_info(&self) -> String {
        format!(
            "type: {}, min_valid_sensor_measurement: '{}', max_valid_sensor_measurement: '{}'",
            self.geometry.tank_type().name(),
            display_or_empty(self.min_valid_sensor_measurement),
            display_or_empty(self.max_valid_sensor_measurement),
        )
    }

    /// Add a default entry to every level for each program index the
    /// scheduler knows about. Existing entries are left alone.
    pub fn ensure_programs(&mut self, program_count: usize) {
        for level in Level::ALL {
            let programs = self.programs_mut(level);
            for index in 0..program_count {
                programs.entry(index).or_default();
            }
        }
    }

    /// Station counterpart of [`Tank::ensure_programs`].
    pub fn ensure_stations(&mut self, station_count: usize) {
        for level in Level::ALL {
            let stations = self.stations_mut(level);
            for index in 0..station_count {
                stations.entry(index).or_default();
            }
        }
    }
}

pub(crate) fn display_or_empty<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
