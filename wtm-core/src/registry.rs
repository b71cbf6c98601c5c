//! The tank collection and the settings document it is persisted in.

use crate::error::TankError;
use crate::settings::Settings;
use crate::tank::Tank;
use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tanks keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TankRegistry {
    tanks: BTreeMap<String, Tank>,
}

impl TankRegistry {
    pub fn get(&self, id: &str) -> Option<&Tank> {
        self.tanks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Tank> {
        self.tanks.get_mut(id)
    }

    pub fn require_mut(&mut self, id: &str) -> Result<&mut Tank, TankError> {
        self.tanks
            .get_mut(id)
            .ok_or_else(|| TankError::UnknownTank(id.to_string()))
    }

    /// Insert or replace a tank, keyed by its id.
    pub fn insert(&mut self, tank: Tank) -> Option<Tank> {
        self.tanks.insert(tank.id.clone(), tank)
    }

    pub fn remove(&mut self, id: &str) -> Option<Tank> {
        self.tanks.remove(id)
    }

    pub fn len(&self) -> usize {
        self.tanks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tanks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tank> {
        self.tanks.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tank> {
        self.tanks.values_mut()
    }

    /// Tanks fed by `sensor_id`.
    pub fn tanks_for_sensor<'a>(
        &'a mut self,
        sensor_id: &'a str,
    ) -> impl Iterator<Item = &'a mut Tank> + 'a {
        self.tanks
            .values_mut()
            .filter(move |t| t.sensor_id.as_deref() == Some(sensor_id))
    }
}

/// Registry shared by the ingestion path and the watchdog.
pub type SharedRegistry = Arc<Mutex<TankRegistry>>;

pub fn shared(registry: TankRegistry) -> SharedRegistry {
    Arc::new(Mutex::new(registry))
}

/// Lock the registry, recovering it if a previous holder panicked.
pub fn lock(registry: &Mutex<TankRegistry>) -> MutexGuard<'_, TankRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Settings and tanks as stored on disk: one JSON object holding the
/// settings fields and a `water_tanks` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub water_tanks: TankRegistry,
}

impl SettingsDocument {
    /// Load a document. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("{} does not exist, using default settings", path.display());
            return Ok(SettingsDocument::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let document: SettingsDocument = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        debug!(
            "Loaded {} water tanks from {}",
            document.water_tanks.len(),
            path.display()
        );
        Ok(document)
    }

    /// Write the whole document through a temporary file and rename it into
    /// place.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        debug!("Saved settings document to {}", path.display());
        Ok(())
    }
}
