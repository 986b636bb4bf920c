//! Sensor registry: the whitelist of authorized sensors and their live state.
//!
//! Static sensor information is built once at startup from the whitelist
//! config and never changes. Each sensor's mutable state lives behind its own
//! lock as a single [`SensorState`] value; updates swap the whole value, so a
//! reader sees either the previous reading with its timestamp or the new
//! reading with its timestamp, never a mix of the two.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::geometry::{parse_point, Coordinates};
use crate::models::Reading;

// ---

/// Descriptive sensor metadata. Only `province` matters to analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorMetadata {
    // ---
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub deployment_date: Option<String>,
    #[serde(default)]
    pub site_type: Option<String>,
}

/// One entry of the sensor whitelist config.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistEntry {
    // ---
    pub id: String,
    pub location: String,
    #[serde(default)]
    pub metadata: SensorMetadata,
}

/// Read the whitelist JSON array from disk.
pub fn load_whitelist(path: &Path) -> anyhow::Result<Vec<WhitelistEntry>> {
    // ---
    info!("Loading sensor whitelist from {}", path.display());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sensors file '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse sensors file '{}'", path.display()))
}

/// Immutable identity and placement of a registered sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorInfo {
    // ---
    pub id: String,
    pub coordinates: Coordinates,
    pub metadata: SensorMetadata,
}

/// Lifecycle of a sensor's live state. `Unseen` moves to `Reporting` on the
/// first successful ingestion and never goes back.
#[derive(Debug, Clone, Default)]
pub enum SensorState {
    #[default]
    Unseen,
    Reporting {
        reading: Arc<Reading>,
        last_update: DateTime<Utc>,
    },
}

/// A consistent point-in-time view of one sensor.
#[derive(Debug, Clone)]
pub struct Sensor {
    info: Arc<SensorInfo>,
    state: SensorState,
}

impl Sensor {
    // ---
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn coordinates(&self) -> Coordinates {
        self.info.coordinates
    }

    pub fn metadata(&self) -> &SensorMetadata {
        &self.info.metadata
    }

    pub fn latest_reading(&self) -> Option<&Reading> {
        match &self.state {
            SensorState::Reporting { reading, .. } => Some(reading.as_ref()),
            SensorState::Unseen => None,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SensorState::Reporting { last_update, .. } => Some(*last_update),
            SensorState::Unseen => None,
        }
    }

    pub fn is_reporting(&self) -> bool {
        matches!(self.state, SensorState::Reporting { .. })
    }
}

struct Slot {
    info: Arc<SensorInfo>,
    state: RwLock<SensorState>,
}

impl Slot {
    fn view(&self) -> Sensor {
        Sensor {
            info: Arc::clone(&self.info),
            state: self.state.read().clone(),
        }
    }
}

/// Authoritative catalog of authorized sensors, in whitelist order.
pub struct SensorRegistry {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
}

impl SensorRegistry {
    // ---
    /// Bulk-load validated sensors. Duplicate ids keep the first entry.
    ///
    /// Fails only when nothing usable remains.
    pub fn register(sensors: Vec<SensorInfo>) -> CoreResult<Self> {
        // ---
        let mut slots = Vec::with_capacity(sensors.len());
        let mut index = HashMap::with_capacity(sensors.len());

        for sensor in sensors {
            if index.contains_key(&sensor.id) {
                warn!(sensor_id = %sensor.id, "Duplicate sensor id in whitelist, keeping first entry");
                continue;
            }
            index.insert(sensor.id.clone(), slots.len());
            slots.push(Slot {
                info: Arc::new(sensor),
                state: RwLock::new(SensorState::Unseen),
            });
        }

        if slots.is_empty() {
            return Err(CoreError::EmptyRegistry);
        }
        Ok(Self { slots, index })
    }

    /// Resolve each whitelist geometry and register the sensors that parse.
    /// Sensors with invalid geometry are logged and left out.
    pub fn from_whitelist(entries: Vec<WhitelistEntry>) -> CoreResult<Self> {
        // ---
        let total = entries.len();
        let sensors: Vec<SensorInfo> = entries
            .into_iter()
            .filter_map(|entry| match parse_point(&entry.location) {
                Ok(coordinates) => Some(SensorInfo {
                    id: entry.id,
                    coordinates,
                    metadata: entry.metadata,
                }),
                Err(e) => {
                    warn!(sensor_id = %entry.id, location = %entry.location, "Skipping sensor: {}", e);
                    None
                }
            })
            .collect();

        let registry = Self::register(sensors)?;
        info!("Registered {} of {} whitelisted sensors", registry.len(), total);
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.info.id.as_str())
    }

    fn slot(&self, id: &str) -> CoreResult<&Slot> {
        self.index
            .get(id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    pub fn lookup(&self, id: &str) -> CoreResult<Sensor> {
        Ok(self.slot(id)?.view())
    }

    /// Static information only, without taking the state lock.
    pub fn info(&self, id: &str) -> Option<&SensorInfo> {
        self.index.get(id).map(|&i| self.slots[i].info.as_ref())
    }

    /// Replace the sensor's latest reading; `last_update` becomes the
    /// reading's timestamp in the same write.
    pub fn update_latest_reading(&self, id: &str, reading: Reading) -> CoreResult<Sensor> {
        // ---
        let slot = self.slot(id)?;
        let last_update = reading.timestamp;
        let next = SensorState::Reporting {
            reading: Arc::new(reading),
            last_update,
        };

        let mut state = slot.state.write();
        *state = next;
        Ok(Sensor {
            info: Arc::clone(&slot.info),
            state: state.clone(),
        })
    }

    /// Like [`update_latest_reading`](Self::update_latest_reading) but keeps
    /// the current state when it is strictly newer. Used when replaying the
    /// persisted log at startup, so on equal timestamps the later log entry
    /// wins, as it did when ingested live. Returns whether the reading was
    /// applied.
    pub fn restore_latest_reading(&self, id: &str, reading: Reading) -> CoreResult<bool> {
        // ---
        let slot = self.slot(id)?;
        let mut state = slot.state.write();
        let newer = match &*state {
            SensorState::Unseen => true,
            SensorState::Reporting { last_update, .. } => reading.timestamp >= *last_update,
        };
        if newer {
            let last_update = reading.timestamp;
            *state = SensorState::Reporting {
                reading: Arc::new(reading),
                last_update,
            };
        }
        Ok(newer)
    }

    /// Consistent views of every sensor, in whitelist order.
    pub fn snapshot(&self) -> Vec<Sensor> {
        self.slots.iter().map(Slot::view).collect()
    }
}
