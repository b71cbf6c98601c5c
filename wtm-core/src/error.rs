use crate::tank::TankState;
use std::fmt;

/// Errors raised by the tank core.
///
/// Sensor problems (out-of-range readings, undefined geometry) are not
/// errors: they are recorded on the tank and reported through
/// [`crate::engine::MeasurementOutcome`].
#[derive(Debug, Clone, PartialEq)]
pub enum TankError {
    /// A level-scoped side-effect operation was called with a state outside
    /// the set it accepts. This is a programming error.
    InvalidLevelState {
        operation: &'static str,
        state: TankState,
    },
    /// No tank with this id exists in the registry.
    UnknownTank(String),
    UnknownTankType(u8),
    UnknownLengthUnit(u8),
    UnknownState(u8),
    /// A sensor payload could not be interpreted.
    Payload(String),
}

impl fmt::Display for TankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TankError::InvalidLevelState { operation, state } => {
                write!(f, "Invalid state '{}' for {}", state.name(), operation)
            }
            TankError::UnknownTank(id) => write!(f, "Water tank with id [{}] was not found", id),
            TankError::UnknownTankType(code) => write!(f, "Unknown water tank type: {}", code),
            TankError::UnknownLengthUnit(code) => write!(f, "Unknown length unit: {}", code),
            TankError::UnknownState(code) => write!(f, "Unknown water tank state: {}", code),
            TankError::Payload(msg) => write!(f, "Unrecognised sensor payload: {}", msg),
        }
    }
}

impl std::error::Error for TankError {}
