//! Ingestion of live readings from whitelisted sensors.
//!
//! The whitelist check runs before anything else: an unknown sensor id is
//! rejected without building a [`Reading`]. Accepted payloads are stored
//! verbatim (no range checks); judging values is left to the analytics and
//! presentation paths.
//!
//! For a given sensor, stamping, persisting and updating the registry run
//! under that sensor's gate, so the order of the persisted log and the
//! registry's latest reading always agree. Different sensors proceed in
//! parallel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, CoreResult, StoreError};
use crate::models::{Confirmation, IngestRequest};
use crate::registry::SensorRegistry;
use crate::store::ReadingStore;

// ---

pub struct IngestionService {
    registry: Arc<SensorRegistry>,
    store: Arc<dyn ReadingStore>,
    gates: HashMap<String, Mutex<()>>,
    total_readings: AtomicU64,
}

/// Outcome of replaying the persisted log at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hydration {
    pub events: u64,
    pub restored_sensors: usize,
    pub unknown_sensor_events: u64,
}

impl IngestionService {
    // ---
    pub fn new(registry: Arc<SensorRegistry>, store: Arc<dyn ReadingStore>) -> Self {
        let gates = registry.ids().map(|id| (id.to_string(), Mutex::new(()))).collect();
        Self {
            registry,
            store,
            gates,
            total_readings: AtomicU64::new(0),
        }
    }

    /// Ingestion events accepted since the log began (including replayed ones).
    pub fn total_readings(&self) -> u64 {
        self.total_readings.load(Ordering::Relaxed)
    }

    /// Authorize, record and persist one reading.
    ///
    /// Fails with [`CoreError::UnauthorizedSensor`] for ids outside the
    /// whitelist and with [`CoreError::Persistence`] when the store rejects
    /// the append; in the latter case the registry and counter are unchanged.
    pub async fn ingest(&self, request: IngestRequest) -> CoreResult<Confirmation> {
        // ---
        let Some(gate) = self.gates.get(&request.sensor_id) else {
            warn!(sensor_id = %request.sensor_id, "Rejected ingestion from unauthorized sensor");
            return Err(CoreError::UnauthorizedSensor(request.sensor_id));
        };
        let _guard = gate.lock().await;

        let reading = request.into_reading(Utc::now());
        let confirmation = Confirmation::for_reading(&reading);

        if let Err(e) = self.store.append(&reading).await {
            error!(sensor_id = %reading.sensor_id, "Failed to persist reading: {}", e);
            return Err(e.into());
        }

        let sensor_id = reading.sensor_id.clone();
        self.registry.update_latest_reading(&sensor_id, reading)?;
        self.total_readings.fetch_add(1, Ordering::Relaxed);

        debug!(sensor_id = %confirmation.sensor_id, "Reading ingested");
        Ok(confirmation)
    }

    /// Restore live state from the persisted log. Call once before serving.
    ///
    /// Each registered sensor gets its newest persisted reading back; the
    /// event counter is seeded with the size of the log.
    pub async fn hydrate(&self) -> Result<Hydration, StoreError> {
        // ---
        let readings = self.store.load_all().await?;
        let events = readings.len() as u64;

        let mut restored = HashSet::new();
        let mut unknown_sensor_events = 0;
        for reading in readings {
            let sensor_id = reading.sensor_id.clone();
            match self.registry.restore_latest_reading(&sensor_id, reading) {
                Ok(_) => {
                    restored.insert(sensor_id);
                }
                Err(_) => unknown_sensor_events += 1,
            }
        }

        self.total_readings.store(events, Ordering::Relaxed);

        let summary = Hydration {
            events,
            restored_sensors: restored.len(),
            unknown_sensor_events,
        };
        info!(
            events = summary.events,
            restored_sensors = summary.restored_sensors,
            unknown_sensor_events = summary.unknown_sensor_events,
            "Live state restored from persisted readings"
        );
        Ok(summary)
    }
}
