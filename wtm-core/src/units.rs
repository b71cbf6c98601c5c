use crate::error::TankError;
use serde::{Deserialize, Serialize};

/// Length unit of a tank dimension or a sensor reading.
///
/// Persisted as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LengthUnit {
    Centimeters = 1,
    #[default]
    Meters = 2,
    Inches = 3,
    Feet = 4,
}

impl LengthUnit {
    /// Convert `value` expressed in this unit into meters.
    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            LengthUnit::Centimeters => value / 100.0,
            LengthUnit::Meters => value,
            LengthUnit::Inches => value * 0.0254,
            LengthUnit::Feet => value * 0.3048,
        }
    }
}

impl TryFrom<u8> for LengthUnit {
    type Error = TankError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(LengthUnit::Centimeters),
            2 => Ok(LengthUnit::Meters),
            3 => Ok(LengthUnit::Inches),
            4 => Ok(LengthUnit::Feet),
            other => Err(TankError::UnknownLengthUnit(other)),
        }
    }
}

impl From<LengthUnit> for u8 {
    fn from(unit: LengthUnit) -> u8 {
        unit as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_to_meters() {
        assert!(close(LengthUnit::Centimeters.to_meters(150.0), 1.5));
        assert!(close(LengthUnit::Meters.to_meters(1.5), 1.5));
        assert!(close(LengthUnit::Inches.to_meters(100.0), 2.54));
        assert!(close(LengthUnit::Feet.to_meters(10.0), 3.048));
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(LengthUnit::try_from(3).unwrap(), LengthUnit::Inches);
        assert_eq!(u8::from(LengthUnit::Feet), 4);
        assert_eq!(LengthUnit::try_from(9), Err(TankError::UnknownLengthUnit(9)));
    }

    #[test]
    fn test_serde_uses_numeric_code() {
        assert_eq!(serde_json::to_string(&LengthUnit::Centimeters).unwrap(), "1");
        let unit: LengthUnit = serde_json::from_str("2").unwrap();
        assert_eq!(unit, LengthUnit::Meters);
        assert!(serde_json::from_str::<LengthUnit>("7").is_err());
    }
}
