//! Analytics over the cleaned historical dataset and the live registry.
//!
//! Produces the structures the rendering layer consumes: per-sensor time
//! series, monthly provincial category distributions, map markers and the
//! service status snapshot. PM2.5 drives every categorization.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::cleaning;
use crate::dataset::CleanedDataset;
use crate::error::{CoreError, CoreResult};
use crate::models::{PollutantValues, Reading, NO2, O3, PM10, PM25};
use crate::registry::{Sensor, SensorMetadata, SensorRegistry};
use crate::thresholds::{Category, ThresholdConfig};

// ---

/// Years accepted by [`AggregationEngine::distribution`].
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2100;

/// Province used when a reading's sensor has none on record.
pub const UNKNOWN_PROVINCE: &str = "Unknown";

/// Map label for sensors without a usable reading.
pub const NO_DATA: &str = "no-data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub values: PollutantValues,
}

/// Historical readings of one sensor, ascending by timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeries {
    pub sensor_id: String,
    pub points: Vec<TimeSeriesPoint>,
}

/// Category shares of one province. The four percentages sum to 100.
#[derive(Debug, Clone, Serialize)]
pub struct ProvinceShare {
    pub readings: usize,
    pub percentages: BTreeMap<Category, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub year: i32,
    pub month: u32,
    /// Only provinces with at least one contributing reading appear.
    pub provinces: BTreeMap<String, ProvinceShare>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub active_sensors: usize,
    pub total_readings: u64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Where a map marker's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSource {
    Live,
    Historical,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapMarker {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    /// Category label, or `"no-data"`.
    pub category: String,
    pub source: MarkerSource,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub metadata: SensorMetadata,
}

// ---

pub struct AggregationEngine {
    dataset: Arc<CleanedDataset>,
    registry: Arc<SensorRegistry>,
    thresholds: Arc<ThresholdConfig>,
    started_at: Instant,
}

impl AggregationEngine {
    // ---
    pub fn new(
        dataset: Arc<CleanedDataset>,
        registry: Arc<SensorRegistry>,
        thresholds: Arc<ThresholdConfig>,
    ) -> Self {
        Self {
            dataset,
            registry,
            thresholds,
            started_at: Instant::now(),
        }
    }

    /// Historical readings of a registered sensor.
    ///
    /// [`CoreError::NotFound`] if the sensor is unregistered or has no rows.
    pub fn timeseries(&self, sensor_id: &str) -> CoreResult<TimeSeries> {
        // ---
        if !self.registry.contains(sensor_id) {
            return Err(CoreError::NotFound(sensor_id.to_string()));
        }

        let points: Vec<TimeSeriesPoint> = self
            .dataset
            .for_sensor(sensor_id)
            .map(|r| TimeSeriesPoint {
                timestamp: r.timestamp,
                values: r.values.clone(),
            })
            .collect();

        if points.is_empty() {
            return Err(CoreError::NotFound(sensor_id.to_string()));
        }
        Ok(TimeSeries {
            sensor_id: sensor_id.to_string(),
            points,
        })
    }

    /// Share of readings per PM2.5 category, grouped by province, for one
    /// calendar month.
    pub fn distribution(&self, year: i32, month: u32) -> CoreResult<AggregationResult> {
        // ---
        if !(1..=12).contains(&month) || !YEAR_RANGE.contains(&year) {
            return Err(CoreError::InvalidPeriod { year, month });
        }

        let mut counts: BTreeMap<String, BTreeMap<Category, usize>> = BTreeMap::new();
        let mut in_period = 0usize;
        let mut without_pm25 = 0usize;

        for reading in self.dataset.in_month(year, month) {
            in_period += 1;
            let Some(pm25) = reading.value(PM25) else {
                without_pm25 += 1;
                continue;
            };
            let category = self.thresholds.categorize_pm25(pm25);
            *counts
                .entry(self.province_of(&reading.sensor_id))
                .or_default()
                .entry(category)
                .or_default() += 1;
        }

        if counts.is_empty() {
            debug!(year, month, in_period, without_pm25, "No contributing readings for period");
            return Err(CoreError::NoData { year, month });
        }

        let provinces = counts
            .into_iter()
            .map(|(province, by_category)| (province, share(&by_category)))
            .collect();

        Ok(AggregationResult {
            year,
            month,
            provinces,
        })
    }

    fn province_of(&self, sensor_id: &str) -> String {
        self.registry
            .info(sensor_id)
            .and_then(|info| info.metadata.province.clone())
            .unwrap_or_else(|| UNKNOWN_PROVINCE.to_string())
    }

    /// Service health derived from the registry and the ingestion counter.
    pub fn status(&self, total_readings: u64) -> StatusSnapshot {
        // ---
        let snapshot = self.registry.snapshot();
        StatusSnapshot {
            status: "healthy",
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            active_sensors: snapshot.iter().filter(|s| s.is_reporting()).count(),
            total_readings,
            last_update: snapshot.iter().filter_map(Sensor::last_update).max(),
        }
    }

    /// One marker per registered sensor, in whitelist order.
    ///
    /// Live readings take precedence; a sensor that has not reported falls
    /// back to its most recent historical row. A live reading that fails
    /// validation keeps its raw values but is labelled `no-data`.
    pub fn map_markers(&self) -> Vec<MapMarker> {
        // ---
        self.registry
            .snapshot()
            .iter()
            .map(|sensor| {
                let (reading, source, category) = match sensor.latest_reading() {
                    Some(live) => {
                        let outcome = cleaning::validate(live);
                        let category = if outcome.is_valid {
                            self.category_label(live)
                        } else {
                            debug!(sensor_id = sensor.id(), errors = ?outcome.errors, "Live reading not categorized");
                            NO_DATA.to_string()
                        };
                        (Some(live), MarkerSource::Live, category)
                    }
                    None => match self.dataset.latest_for(sensor.id()) {
                        Some(hist) => (Some(hist), MarkerSource::Historical, self.category_label(hist)),
                        None => (None, MarkerSource::None, NO_DATA.to_string()),
                    },
                };

                let value = |p: &str| reading.and_then(|r| r.value(p));
                let coordinates = sensor.coordinates();
                MapMarker {
                    id: sensor.id().to_string(),
                    lon: coordinates.lon,
                    lat: coordinates.lat,
                    category,
                    source,
                    pm25: value(PM25),
                    pm10: value(PM10),
                    no2: value(NO2),
                    o3: value(O3),
                    last_update: reading.map(|r| r.timestamp),
                    metadata: sensor.metadata().clone(),
                }
            })
            .collect()
    }

    fn category_label(&self, reading: &Reading) -> String {
        reading
            .value(PM25)
            .map(|v| self.thresholds.categorize_pm25(v).label().to_string())
            .unwrap_or_else(|| NO_DATA.to_string())
    }
}

/// Turn category counts into percentages, zero-filling absent categories.
fn share(by_category: &BTreeMap<Category, usize>) -> ProvinceShare {
    // ---
    let readings: usize = by_category.values().sum();
    let percentages = Category::ALL
        .iter()
        .map(|c| {
            let n = by_category.get(c).copied().unwrap_or(0);
            (*c, n as f64 * 100.0 / readings as f64)
        })
        .collect();
    ProvinceShare {
        readings,
        percentages,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::registry::WhitelistEntry;
    use chrono::{Duration, TimeZone};

    fn whitelist_entry(id: &str, province: Option<&str>) -> WhitelistEntry {
        WhitelistEntry {
            id: id.to_string(),
            location: "POINT(5.1 52.1)".to_string(),
            metadata: SensorMetadata {
                province: province.map(String::from),
                region: Some("Randstad".to_string()),
                ..Default::default()
            },
        }
    }

    fn reading(sensor: &str, ts: DateTime<Utc>, pm25: Option<f64>) -> Reading {
        let mut values = PollutantValues::from([(PM10.to_string(), 10.0)]);
        if let Some(v) = pm25 {
            values.insert(PM25.to_string(), v);
        }
        Reading::new(sensor, values, ts)
    }

    fn july(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap()
    }

    fn engine(rows: Vec<Reading>) -> AggregationEngine {
        let registry = SensorRegistry::from_whitelist(vec![
            whitelist_entry("utr_1", Some("Utrecht")),
            whitelist_entry("utr_2", Some("Utrecht")),
            whitelist_entry("lim_1", Some("Limburg")),
            whitelist_entry("nowhere", None),
            whitelist_entry("silent", Some("Drenthe")),
        ])
        .unwrap();
        AggregationEngine::new(
            Arc::new(CleanedDataset::new(rows)),
            Arc::new(registry),
            Arc::new(ThresholdConfig::default()),
        )
    }

    fn sample_rows() -> Vec<Reading> {
        vec![
            reading("utr_1", july(1), Some(10.0)),  // Safe
            reading("utr_1", july(2), Some(30.0)),  // Moderate
            reading("utr_2", july(3), Some(60.0)),  // Unhealthy
            reading("lim_1", july(4), Some(80.0)),  // Dangerous
            reading("lim_1", july(5), Some(5.0)),   // Safe
            reading("lim_1", july(6), Some(7.0)),   // Safe
            reading("nowhere", july(7), Some(1.0)), // Safe, Unknown province
            reading("utr_1", july(8), None),        // no PM2.5: ignored
            reading("utr_1", Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(), Some(99.0)),
        ]
    }

    #[test]
    fn test_distribution_percentages_sum_to_100() {
        // ---
        let result = engine(sample_rows()).distribution(2024, 7).unwrap();

        assert_eq!(
            result.provinces.keys().collect::<Vec<_>>(),
            vec!["Limburg", "Unknown", "Utrecht"]
        );
        for (province, share) in &result.provinces {
            let sum: f64 = share.percentages.values().sum();
            assert!((sum - 100.0).abs() < 0.01, "{province} sums to {sum}");
            assert_eq!(share.percentages.len(), 4);
        }

        let utrecht = &result.provinces["Utrecht"];
        assert_eq!(utrecht.readings, 3);
        assert!((utrecht.percentages[&Category::Safe] - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(utrecht.percentages[&Category::Dangerous], 0.0);

        let limburg = &result.provinces["Limburg"];
        assert!((limburg.percentages[&Category::Safe] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribution_omits_silent_provinces() {
        // ---
        let result = engine(sample_rows()).distribution(2024, 7).unwrap();
        assert!(!result.provinces.contains_key("Drenthe"));
    }

    #[test]
    fn test_distribution_invalid_period() {
        // ---
        let engine = engine(sample_rows());
        assert!(matches!(
            engine.distribution(2024, 13),
            Err(CoreError::InvalidPeriod { month: 13, .. })
        ));
        assert!(matches!(engine.distribution(2024, 0), Err(CoreError::InvalidPeriod { .. })));
        assert!(matches!(engine.distribution(1999, 5), Err(CoreError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_distribution_empty_month_is_no_data() {
        // ---
        let populated = engine(sample_rows());
        assert!(matches!(
            populated.distribution(2023, 7),
            Err(CoreError::NoData { year: 2023, month: 7 })
        ));

        let only_missing_pm25 = engine(vec![reading("utr_1", july(1), None)]);
        assert!(matches!(only_missing_pm25.distribution(2024, 7), Err(CoreError::NoData { .. })));
    }

    #[test]
    fn test_timeseries_sorted_for_registered_sensor() {
        // ---
        let series = engine(sample_rows()).timeseries("utr_1").unwrap();
        assert_eq!(series.points.len(), 4);
        assert!(series.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_timeseries_not_found() {
        // ---
        let engine = engine(sample_rows());
        // Registered but no historical rows.
        assert!(matches!(engine.timeseries("silent"), Err(CoreError::NotFound(_))));
        // Not registered at all.
        assert!(matches!(engine.timeseries("sensor_x"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_status_tracks_reporting_sensors() {
        // ---
        let engine = engine(vec![]);
        let empty = engine.status(0);
        assert_eq!(empty.status, "healthy");
        assert_eq!(empty.active_sensors, 0);
        assert!(empty.last_update.is_none());
        assert!(empty.uptime_seconds >= 0.0);

        let t = july(1);
        engine
            .registry
            .update_latest_reading("utr_1", reading("utr_1", t, Some(5.0)))
            .unwrap();
        engine
            .registry
            .update_latest_reading("lim_1", reading("lim_1", t + Duration::hours(1), Some(5.0)))
            .unwrap();

        let status = engine.status(7);
        assert_eq!(status.active_sensors, 2);
        assert_eq!(status.total_readings, 7);
        assert_eq!(status.last_update, Some(t + Duration::hours(1)));
    }

    #[test]
    fn test_map_markers_prefer_live_then_history() {
        // ---
        let engine = engine(sample_rows());
        engine
            .registry
            .update_latest_reading("utr_2", reading("utr_2", july(20), Some(40.0)))
            .unwrap();
        engine
            .registry
            .update_latest_reading("nowhere", reading("nowhere", july(21), Some(-3.0)))
            .unwrap();

        let markers = engine.map_markers();
        let by_id = |id: &str| markers.iter().find(|m| m.id == id).unwrap();

        let live = by_id("utr_2");
        assert_eq!(live.source, MarkerSource::Live);
        assert_eq!(live.category, "Moderate");
        assert_eq!(live.pm25, Some(40.0));

        let invalid_live = by_id("nowhere");
        assert_eq!(invalid_live.source, MarkerSource::Live);
        assert_eq!(invalid_live.category, NO_DATA);
        assert_eq!(invalid_live.pm25, Some(-3.0));

        // Latest historical row for utr_1 is the August one (99 -> Dangerous).
        let historical = by_id("utr_1");
        assert_eq!(historical.source, MarkerSource::Historical);
        assert_eq!(historical.category, "Dangerous");

        let silent = by_id("silent");
        assert_eq!(silent.source, MarkerSource::None);
        assert_eq!(silent.category, NO_DATA);
        assert_eq!(silent.metadata.province.as_deref(), Some("Drenthe"));

        assert_eq!(markers.len(), 5);
        assert_eq!(live.lon, 5.1);
        assert_eq!(live.lat, 52.1);
    }
}
