//! The cleaned historical dataset, held in memory for the process lifetime.
//!
//! Built once at startup from the output of [`crate::cleaning::clean`] and
//! never mutated afterwards, so concurrent readers share it through an `Arc`
//! without locking.

use std::collections::HashMap;

use chrono::Datelike;

use crate::models::Reading;

// ---

pub struct CleanedDataset {
    /// All readings, ascending by timestamp (stable for equal timestamps).
    readings: Vec<Reading>,
    /// Positions into `readings` per sensor, ascending by timestamp.
    by_sensor: HashMap<String, Vec<usize>>,
}

impl CleanedDataset {
    // ---
    pub fn new(mut readings: Vec<Reading>) -> Self {
        // ---
        readings.sort_by_key(|r| r.timestamp);

        let mut by_sensor: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, reading) in readings.iter().enumerate() {
            by_sensor.entry(reading.sensor_id.clone()).or_default().push(i);
        }

        Self { readings, by_sensor }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings of one sensor in ascending timestamp order.
    pub fn for_sensor<'a>(&'a self, sensor_id: &str) -> impl Iterator<Item = &'a Reading> + 'a {
        self.by_sensor
            .get(sensor_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.readings[i])
    }

    /// Most recent reading of one sensor.
    pub fn latest_for(&self, sensor_id: &str) -> Option<&Reading> {
        self.by_sensor
            .get(sensor_id)
            .and_then(|positions| positions.last())
            .map(|&i| &self.readings[i])
    }

    /// Readings whose UTC timestamp falls in the given calendar month.
    pub fn in_month(&self, year: i32, month: u32) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .filter(move |r| r.timestamp.year() == year && r.timestamp.month() == month)
    }
}
