//! Sensor message decoding.
//!
//! A message is either one reading object or an array of them:
//!
//! ```json
//! {"sensor_id": "tank-1", "measurement": 0.42}
//! [{"sensor_id": "tank-1", "measurement": 0.42}, {"sensor_id": "tank-2", "measurement": "1.1"}]
//! ```

use crate::error::TankError;
use log::warn;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub sensor_id: String,
    pub measurement: f64,
}

/// Decode a sensor message into its readings.
///
/// Anything that is not a reading object or an array is an error. Array
/// items that are not readings are skipped.
pub fn parse(payload: &[u8]) -> Result<Vec<SensorReading>, TankError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| TankError::Payload(e.to_string()))?;
    match &value {
        Value::Object(_) => reading(&value)
            .map(|r| vec![r])
            .ok_or_else(|| TankError::Payload("expected sensor_id and measurement".to_string())),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| {
                let parsed = reading(item);
                if parsed.is_none() {
                    warn!("Skipping sensor reading {}", item);
                }
                parsed
            })
            .collect()),
        other => Err(TankError::Payload(format!("unexpected message {}", other))),
    }
}

fn reading(value: &Value) -> Option<SensorReading> {
    let sensor_id = match value.get("sensor_id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let measurement = match value.get("measurement")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(SensorReading {
        sensor_id,
        measurement,
    })
}
