//! Validation and filtering rules for historical and ad-hoc readings.
//!
//! [`clean`] is a pure batch transform over raw tabular rows. Rules run in a
//! fixed order and each one counts what it drops:
//!
//! 1. missing `sensor_id` or `timestamp`
//! 2. any negative pollutant value
//! 3. PM2.5 above [`PM25_MAX`]
//! 4. timestamp that does not parse to an instant
//!
//! Malformed rows never raise; they are dropped and counted. Running
//! [`clean`] again on its own output drops nothing.
//!
//! [`validate`] applies the same checks to one [`Reading`] without dropping
//! anything, returning diagnostics instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{PollutantValues, Reading, NO2, O3, PM10, PM25};

// ---

/// PM2.5 values above this are treated as instrument outliers.
pub const PM25_MAX: f64 = 500.0;

/// One unvalidated row of the historical dataset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRow {
    // ---
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub pm25: Option<String>,
    pub pm10: Option<String>,
    pub no2: Option<String>,
    pub o3: Option<String>,
}

impl RawRow {
    fn pollutant_cells(&self) -> [(&'static str, Option<&str>); 4] {
        [
            (PM25, self.pm25.as_deref()),
            (PM10, self.pm10.as_deref()),
            (NO2, self.no2.as_deref()),
            (O3, self.o3.as_deref()),
        ]
    }
}

impl From<&Reading> for RawRow {
    /// Render a cleaned reading back to its tabular form.
    fn from(reading: &Reading) -> Self {
        let cell = |p: &str| reading.value(p).map(|v| v.to_string());
        Self {
            sensor_id: Some(reading.sensor_id.clone()),
            timestamp: Some(reading.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            pm25: cell(PM25),
            pm10: cell(PM10),
            no2: cell(NO2),
            o3: cell(O3),
        }
    }
}

/// Rows dropped by each rule, in rule order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DroppedPerRule {
    pub missing_key: usize,
    pub negative_value: usize,
    pub pm25_outlier: usize,
    pub bad_timestamp: usize,
}

impl DroppedPerRule {
    pub fn total(&self) -> usize {
        self.missing_key + self.negative_value + self.pm25_outlier + self.bad_timestamp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub dropped_per_rule: DroppedPerRule,
    pub rows_out: usize,
}

impl CleaningReport {
    pub fn percent_dropped(&self) -> f64 {
        if self.rows_in == 0 {
            0.0
        } else {
            self.dropped_per_rule.total() as f64 / self.rows_in as f64 * 100.0
        }
    }
}

/// Surviving readings plus the per-rule report.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub readings: Vec<Reading>,
    pub report: CleaningReport,
}

/// Apply the cleaning rules, in order, to a batch of raw rows.
pub fn clean(rows: Vec<RawRow>) -> Cleaned {
    // ---
    let mut report = CleaningReport {
        rows_in: rows.len(),
        ..Default::default()
    };
    let mut readings = Vec::with_capacity(rows.len());

    for (row_no, row) in rows.into_iter().enumerate() {
        // Rule 1
        let (Some(sensor_id), Some(timestamp)) = (non_blank(&row.sensor_id), non_blank(&row.timestamp))
        else {
            report.dropped_per_rule.missing_key += 1;
            continue;
        };

        let values = parse_values(row_no, &row);

        // Rule 2
        if values.values().any(|v| *v < 0.0) {
            report.dropped_per_rule.negative_value += 1;
            continue;
        }

        // Rule 3
        if values.get(PM25).is_some_and(|v| *v > PM25_MAX) {
            report.dropped_per_rule.pm25_outlier += 1;
            continue;
        }

        // Rule 4
        let Some(instant) = parse_timestamp(timestamp) else {
            report.dropped_per_rule.bad_timestamp += 1;
            continue;
        };

        readings.push(Reading::new(sensor_id, values, instant));
    }

    report.rows_out = readings.len();
    Cleaned { readings, report }
}

fn non_blank(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Numeric cells that are blank, unparseable or NaN are absent. Infinities
/// are kept so the sign and outlier rules see them.
fn parse_values(row_no: usize, row: &RawRow) -> PollutantValues {
    // ---
    let mut values = PollutantValues::new();
    for (pollutant, cell) in row.pollutant_cells() {
        let Some(text) = cell.map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        match text.parse::<f64>() {
            Ok(v) if !v.is_nan() => {
                values.insert(pollutant.to_string(), v);
            }
            _ => debug!(row = row_no, column = pollutant, raw = text, "Ignoring non-numeric cell"),
        }
    }
    values
}

/// Parse the timestamp formats seen in exported datasets. Values without an
/// offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    // ---
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---

/// Diagnostics for one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Check a reading against the cleaning rules without altering it.
pub fn validate(reading: &Reading) -> Validation {
    // ---
    let mut errors = Vec::new();

    if reading.sensor_id.trim().is_empty() {
        errors.push("sensor_id is missing".to_string());
    }
    if reading.values.is_empty() {
        errors.push("readings are empty".to_string());
    }
    for (pollutant, value) in &reading.values {
        if !value.is_finite() {
            errors.push(format!("{pollutant} is not a finite number"));
        } else if *value < 0.0 {
            errors.push(format!("{pollutant} is negative ({value})"));
        }
    }
    if let Some(pm25) = reading.value(PM25).filter(|v| *v > PM25_MAX) {
        errors.push(format!("{PM25} exceeds {PM25_MAX} ({pm25})"));
    }

    Validation {
        is_valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn row(sensor: Option<&str>, ts: Option<&str>, pm25: Option<&str>, no2: Option<&str>) -> RawRow {
        RawRow {
            sensor_id: sensor.map(String::from),
            timestamp: ts.map(String::from),
            pm25: pm25.map(String::from),
            pm10: Some("20".to_string()),
            no2: no2.map(String::from),
            o3: None,
        }
    }

    fn mixed_batch() -> Vec<RawRow> {
        vec![
            row(Some("s1"), Some("2024-01-01T00:00:00Z"), Some("12.5"), Some("10")),
            row(None, Some("2024-01-01T01:00:00Z"), Some("12.5"), Some("10")),
            row(Some("s1"), Some("  "), Some("12.5"), Some("10")),
            row(Some("s1"), Some("2024-01-01T02:00:00Z"), Some("-1"), Some("10")),
            row(Some("s1"), Some("2024-01-01T03:00:00Z"), Some("10"), Some("-0.5")),
            row(Some("s1"), Some("2024-01-01T04:00:00Z"), Some("500.1"), Some("10")),
            row(Some("s1"), Some("not a date"), Some("10"), Some("10")),
            row(Some("s2"), Some("2024-01-01 05:00:00"), Some("500"), None),
            row(Some("s2"), Some("2024-01-02"), Some("n/a"), Some("3")),
        ]
    }

    #[test]
    fn test_each_rule_counts_separately() {
        // ---
        let cleaned = clean(mixed_batch());
        let report = cleaned.report;

        assert_eq!(report.rows_in, 9);
        assert_eq!(report.dropped_per_rule.missing_key, 2);
        assert_eq!(report.dropped_per_rule.negative_value, 2);
        assert_eq!(report.dropped_per_rule.pm25_outlier, 1);
        assert_eq!(report.dropped_per_rule.bad_timestamp, 1);
        assert_eq!(report.rows_out, 3);
        assert_eq!(report.rows_in, report.rows_out + report.dropped_per_rule.total());
    }

    #[test]
    fn test_infinite_values_hit_sign_and_outlier_rules() {
        // ---
        let mut pm10_minus_inf = row(Some("s1"), Some("2024-01-01T01:00:00Z"), Some("10"), None);
        pm10_minus_inf.pm10 = Some("-inf".to_string());
        let rows = vec![
            row(Some("s1"), Some("2024-01-01T00:00:00Z"), Some("-1e400"), None),
            pm10_minus_inf,
            row(Some("s1"), Some("2024-01-01T02:00:00Z"), Some("1e400"), None),
            row(Some("s1"), Some("2024-01-01T03:00:00Z"), Some("NaN"), None),
        ];

        let cleaned = clean(rows);
        let dropped = cleaned.report.dropped_per_rule;
        assert_eq!(dropped.negative_value, 2);
        assert_eq!(dropped.pm25_outlier, 1);
        assert_eq!(cleaned.report.rows_out, 1);
        // NaN is treated like any other unparseable cell.
        assert_eq!(cleaned.readings[0].value(PM25), None);
        assert_eq!(cleaned.readings[0].value(PM10), Some(20.0));
    }

    #[test]
    fn test_rules_apply_in_order() {
        // ---
        // Negative value and bad timestamp: rule 2 wins.
        let cleaned = clean(vec![row(Some("s"), Some("garbage"), Some("-3"), None)]);
        assert_eq!(cleaned.report.dropped_per_rule.negative_value, 1);
        assert_eq!(cleaned.report.dropped_per_rule.bad_timestamp, 0);

        // Missing id and outlier: rule 1 wins.
        let cleaned = clean(vec![row(None, Some("garbage"), Some("900"), None)]);
        assert_eq!(cleaned.report.dropped_per_rule.missing_key, 1);
        assert_eq!(cleaned.report.dropped_per_rule.pm25_outlier, 0);
    }

    #[test]
    fn test_output_satisfies_dataset_invariants() {
        // ---
        let cleaned = clean(mixed_batch());
        for r in &cleaned.readings {
            assert!(!r.sensor_id.is_empty());
            assert!(r.values.values().all(|v| *v >= 0.0));
            assert!(r.value(PM25).map_or(true, |v| v <= PM25_MAX));
        }
        // Unparseable pm25 is absent, not dropped.
        let s2_day = cleaned
            .readings
            .iter()
            .find(|r| r.timestamp == Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(s2_day.value(PM25), None);
        assert_eq!(s2_day.value(NO2), Some(3.0));
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        // ---
        let first = clean(mixed_batch());
        let rows: Vec<RawRow> = first.readings.iter().map(RawRow::from).collect();
        let second = clean(rows);

        assert_eq!(second.report.dropped_per_rule.total(), 0);
        assert_eq!(second.report.rows_out, first.report.rows_out);
        for (a, b) in first.readings.iter().zip(&second.readings) {
            assert_eq!(a.sensor_id, b.sensor_id);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.values, b.values);
        }
    }

    #[test]
    fn test_empty_input() {
        // ---
        let cleaned = clean(vec![]);
        assert_eq!(cleaned.report, CleaningReport::default());
        assert_eq!(cleaned.report.percent_dropped(), 0.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        // ---
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-05T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T15:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 14:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 16:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("05/03/2024"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
    }

    #[test]
    fn test_validate_reports_without_dropping() {
        // ---
        let reading = Reading::new(
            "s1",
            PollutantValues::from([(PM25.to_string(), 600.0), (NO2.to_string(), -2.0)]),
            Utc::now(),
        );
        let outcome = validate(&reading);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().any(|e| e.contains("no2")));
        assert!(outcome.errors.iter().any(|e| e.contains("pm25")));
        // The reading itself is untouched.
        assert_eq!(reading.value(NO2), Some(-2.0));
    }

    #[test]
    fn test_validate_accepts_clean_reading() {
        // ---
        let reading = Reading::new(
            "s1",
            PollutantValues::from([(PM25.to_string(), 500.0), (O3.to_string(), 0.0)]),
            Utc::now(),
        );
        let outcome = validate(&reading);
        assert!(outcome.is_valid, "{:?}", outcome.errors);
    }

    #[test]
    fn test_validate_rejects_empty_readings() {
        // ---
        let outcome = validate(&Reading::new("s1", PollutantValues::new(), Utc::now()));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["readings are empty".to_string()]);
    }
}
