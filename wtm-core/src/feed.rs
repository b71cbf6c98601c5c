//! The data feed republished after every change: all tanks, in display
//! order, as a JSON array.

use crate::registry::TankRegistry;
use crate::tank::Tank;

/// Tanks sorted by `order`; tanks without one come last. Ties go by id.
pub fn sorted_tanks(registry: &TankRegistry) -> Vec<&Tank> {
    let mut tanks: Vec<&Tank> = registry.iter().collect();
    tanks.sort_by(|a, b| {
        (a.order.is_none(), a.order, &a.id).cmp(&(b.order.is_none(), b.order, &b.id))
    });
    tanks
}

pub fn to_value(registry: &TankRegistry) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(sorted_tanks(registry))
}

pub fn render(registry: &TankRegistry) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&sorted_tanks(registry))?)
}
