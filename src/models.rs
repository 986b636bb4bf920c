//! Data models for readings, both at the API boundary and in the domain.
//!
//! [`IngestRequest`] is the strict boundary shape: it only deserializes when
//! the payload is structurally sound. [`Reading`] is the permissive domain
//! record that stores whatever values were submitted. Conversion runs one way
//! only, boundary to domain, through [`IngestRequest::into_reading`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

pub const PM25: &str = "pm25";
pub const PM10: &str = "pm10";
pub const NO2: &str = "no2";
pub const O3: &str = "o3";

/// Pollutant name to measured value. Values are stored verbatim.
pub type PollutantValues = BTreeMap<String, f64>;

/// A single sensor reading.
///
/// Values are not checked at construction: negative or extreme numbers are
/// kept as submitted and judged later by the presentation or aggregation
/// path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub id: Uuid,
    pub sensor_id: String,
    pub values: PollutantValues,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    // ---
    pub fn new(sensor_id: impl Into<String>, values: PollutantValues, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sensor_id: sensor_id.into(),
            values,
            timestamp,
        }
    }

    pub fn value(&self, pollutant: &str) -> Option<f64> {
        self.values.get(pollutant).copied()
    }
}

/// Request body for `POST /ingest` and `POST /validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    // ---
    pub sensor_id: String,
    pub readings: PollutantValues,
}

impl IngestRequest {
    // ---
    pub fn into_reading(self, timestamp: DateTime<Utc>) -> Reading {
        Reading::new(self.sensor_id, self.readings, timestamp)
    }
}

/// Returned to the caller after a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    // ---
    pub status: &'static str,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Confirmation {
    pub fn for_reading(reading: &Reading) -> Self {
        Self {
            status: "ok",
            sensor_id: reading.sensor_id.clone(),
            timestamp: reading.timestamp,
        }
    }
}
