//! Tank shapes and their fill-percentage formulas.
//!
//! Every formula works in meters: tank dimensions and the sensor offset are
//! expressed in the tank's unit, the raw reading in the sensor's unit, and
//! both are converted before use. The reading is the distance from the
//! sensor down to the liquid surface, so the depth from the top of the tank
//! is `x = reading - offset` and the liquid height is `reference - x`.

use crate::error::TankError;
use crate::units::LengthUnit;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Numeric tank type codes used in the persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TankType {
    Rectangular = 1,
    CylindricalHorizontal = 2,
    CylindricalVertical = 3,
    Elliptical = 4,
}

impl TankType {
    pub fn name(self) -> &'static str {
        match self {
            TankType::Rectangular => "RECTANGULAR",
            TankType::CylindricalHorizontal => "CYLINDRICAL_HORIZONTAL",
            TankType::CylindricalVertical => "CYLINDRICAL_VERTICAL",
            TankType::Elliptical => "ELLIPTICAL",
        }
    }
}

impl TryFrom<u8> for TankType {
    type Error = TankError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TankType::Rectangular),
            2 => Ok(TankType::CylindricalHorizontal),
            3 => Ok(TankType::CylindricalVertical),
            4 => Ok(TankType::Elliptical),
            other => Err(TankError::UnknownTankType(other)),
        }
    }
}

/// Where the sensor sits and which units the numbers are in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// Distance from the top of the tank to the sensor, in tank units.
    pub offset_from_top: f64,
    pub tank_units: LengthUnit,
    pub sensor_units: LengthUnit,
}

impl SensorFrame {
    /// Depth of the liquid surface below the top of the tank, in meters.
    pub fn depth_from_top(&self, measurement: f64) -> f64 {
        self.sensor_units.to_meters(measurement) - self.tank_units.to_meters(self.offset_from_top)
    }
}

/// Tank shape with its (possibly incomplete) dimensions, in tank units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeometryRecord", into = "GeometryRecord")]
pub enum TankGeometry {
    Rectangular {
        width: Option<f64>,
        length: Option<f64>,
        height: Option<f64>,
    },
    /// A cylinder lying on its side.
    CylindricalHorizontal {
        length: Option<f64>,
        diameter: Option<f64>,
    },
    CylindricalVertical {
        diameter: Option<f64>,
        height: Option<f64>,
    },
    /// A horizontal tank with an elliptical cross-section.
    Elliptical {
        length: Option<f64>,
        horizontal_axis: Option<f64>,
        vertical_axis: Option<f64>,
    },
}

impl TankGeometry {
    pub fn tank_type(&self) -> TankType {
        match self {
            TankGeometry::Rectangular { .. } => TankType::Rectangular,
            TankGeometry::CylindricalHorizontal { .. } => TankType::CylindricalHorizontal,
            TankGeometry::CylindricalVertical { .. } => TankType::CylindricalVertical,
            TankGeometry::Elliptical { .. } => TankType::Elliptical,
        }
    }

    /// The vertical dimension readings are compared against, in tank units:
    /// height, diameter for a horizontal cylinder, vertical axis for an
    /// elliptical tank.
    pub fn reference_height(&self) -> Option<f64> {
        match self {
            TankGeometry::Rectangular { height, .. } => *height,
            TankGeometry::CylindricalHorizontal { diameter, .. } => *diameter,
            TankGeometry::CylindricalVertical { height, .. } => *height,
            TankGeometry::Elliptical { vertical_axis, .. } => *vertical_axis,
        }
    }

    /// False when the reading places the liquid surface below the bottom of
    /// the tank. A tank without a reference height cannot be checked here;
    /// its percentage will come out undefined instead.
    pub fn measurement_is_valid(&self, measurement: f64, frame: &SensorFrame) -> bool {
        match self.reference_height() {
            Some(height) => frame.tank_units.to_meters(height) >= frame.depth_from_top(measurement),
            None => true,
        }
    }

    /// Fill percentage for `measurement`, or `None` when the dimensions are
    /// missing or non-positive, or the volume formula leaves its domain.
    pub fn calculate_percentage(&self, measurement: f64, frame: &SensorFrame) -> Option<u8> {
        let m = |value: f64| frame.tank_units.to_meters(value);
        let x = frame.depth_from_top(measurement);
        match *self {
            TankGeometry::Rectangular {
                width,
                length,
                height,
            } => {
                positive(width)?;
                positive(length)?;
                straight_wall_ratio(m(positive(height)?), x)
            }
            TankGeometry::CylindricalHorizontal { length, diameter } => {
                horizontal_cylinder_ratio(m(positive(diameter)?), m(positive(length)?), x)
            }
            TankGeometry::CylindricalVertical { diameter, height } => {
                positive(diameter)?;
                straight_wall_ratio(m(positive(height)?), x)
            }
            TankGeometry::Elliptical {
                length,
                horizontal_axis,
                vertical_axis,
            } => elliptical_ratio(
                m(positive(vertical_axis)?),
                m(positive(horizontal_axis)?),
                m(positive(length)?),
                x,
            ),
        }
        .and_then(to_percent)
    }
}

fn positive(dimension: Option<f64>) -> Option<f64> {
    dimension.filter(|d| d.is_finite() && *d > 0.0)
}

/// Rounds half away from zero and clamps into 0..=100.
fn to_percent(ratio: f64) -> Option<u8> {
    if !ratio.is_finite() {
        return None;
    }
    Some((100.0 * ratio).round().clamp(0.0, 100.0) as u8)
}

/// Constant cross-section: the fill ratio is the liquid height over the
/// tank height.
fn straight_wall_ratio(h: f64, x: f64) -> Option<f64> {
    Some((h - x) / h)
}

/// Circular-segment area of the liquid over the `diameter x length`
/// rectangle. A brim-full tank reads `pi * diameter / (4 * length)`.
fn horizontal_cylinder_ratio(diameter: f64, length: f64, x: f64) -> Option<f64> {
    let r = diameter / 2.0;
    let liquid = diameter - x;
    let cosine = (r - liquid) / r;
    let radicand = 2.0 * r * liquid - liquid * liquid;
    if !(-1.0..=1.0).contains(&cosine) || radicand < 0.0 {
        return None;
    }
    let segment = cosine.acos() * r * r - (r - liquid) * radicand.sqrt();
    let volume = diameter * length;
    Some(segment / volume)
}

/// `a` is the vertical axis, `b` the horizontal axis.
fn elliptical_ratio(a: f64, b: f64, length: f64, x: f64) -> Option<f64> {
    let liquid = a - x;
    let u = 1.0 - 2.0 * liquid / a;
    let radicand = 4.0 * liquid / a - 4.0 * liquid * liquid / (a * a);
    if !(-1.0..=1.0).contains(&u) || radicand < 0.0 {
        return None;
    }
    let liquid_volume = (a * b * length / 4.0) * (u.acos() - u * radicand.sqrt());
    let volume = b / 2.0 * a / 2.0 * length * PI;
    Some(liquid_volume / volume)
}

/// Flat persisted form of a geometry: `type` plus the shape's dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryRecord {
    #[serde(rename = "type")]
    pub tank_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_axis: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_axis: Option<f64>,
}

impl TryFrom<GeometryRecord> for TankGeometry {
    type Error = TankError;

    fn try_from(r: GeometryRecord) -> Result<Self, Self::Error> {
        Ok(match TankType::try_from(r.tank_type)? {
            TankType::Rectangular => TankGeometry::Rectangular {
                width: r.width,
                length: r.length,
                height: r.height,
            },
            TankType::CylindricalHorizontal => TankGeometry::CylindricalHorizontal {
                length: r.length,
                diameter: r.diameter,
            },
            TankType::CylindricalVertical => TankGeometry::CylindricalVertical {
                diameter: r.diameter,
                height: r.height,
            },
            TankType::Elliptical => TankGeometry::Elliptical {
                length: r.length,
                horizontal_axis: r.horizontal_axis,
                vertical_axis: r.vertical_axis,
            },
        })
    }
}

impl From<TankGeometry> for GeometryRecord {
    fn from(geometry: TankGeometry) -> Self {
        let tank_type = geometry.tank_type() as u8;
        match geometry {
            TankGeometry::Rectangular {
                width,
                length,
                height,
            } => GeometryRecord {
                tank_type,
                width,
                length,
                height,
                ..Default::default()
            },
            TankGeometry::CylindricalHorizontal { length, diameter } => GeometryRecord {
                tank_type,
                length,
                diameter,
                ..Default::default()
            },
            TankGeometry::CylindricalVertical { diameter, height } => GeometryRecord {
                tank_type,
                diameter,
                height,
                ..Default::default()
            },
            TankGeometry::Elliptical {
                length,
                horizontal_axis,
                vertical_axis,
            } => GeometryRecord {
                tank_type,
                length,
                horizontal_axis,
                vertical_axis,
                ..Default::default()
            },
        }
    }
}
