//! Historical dataset loader.
//!
//! Reads the CSV export (`sensor_id,timestamp,pm25,pm10,no2,o3`) as raw
//! string cells and hands them to the cleaning rules. Records the CSV parser
//! itself cannot decode (wrong field count, invalid UTF-8) are skipped and
//! counted here; everything else is judged by [`crate::cleaning`].

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cleaning::{self, Cleaned, RawRow};
use crate::dataset::CleanedDataset;

// ---

/// Decode raw rows from any CSV source with a header line.
pub fn read_rows<R: Read>(source: R) -> (Vec<RawRow>, usize) {
    // ---
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(source);

    let mut rows = Vec::new();
    let mut undecodable = 0;
    for (i, record) in reader.deserialize::<RawRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                undecodable += 1;
                debug!(record = i, "Skipping undecodable CSV record: {}", e);
            }
        }
    }
    (rows, undecodable)
}

/// Load, clean and index the historical dataset. Blocks until done.
pub fn load_cleaned(path: &Path) -> Result<CleanedDataset> {
    // ---
    info!("Loading historical data from {}", path.display());
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open historical data '{}'", path.display()))?;

    let (rows, undecodable) = read_rows(std::io::BufReader::new(file));
    if undecodable > 0 {
        warn!("Skipped {} undecodable CSV records in {}", undecodable, path.display());
    }

    let Cleaned { readings, report } = cleaning::clean(rows);
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        missing_key = report.dropped_per_rule.missing_key,
        negative_value = report.dropped_per_rule.negative_value,
        pm25_outlier = report.dropped_per_rule.pm25_outlier,
        bad_timestamp = report.dropped_per_rule.bad_timestamp,
        "Historical cleaning complete, {:.2}% of rows dropped",
        report.percent_dropped()
    );

    Ok(CleanedDataset::new(readings))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{NO2, O3, PM10, PM25};

    const SAMPLE: &str = "\
sensor_id,timestamp,pm25,pm10,no2,o3
ams_001,2024-01-01 00:00:00,12.1,20.0,15.2,40.1
ams_001,2024-01-01 01:00:00,,22.0,14.0,39.0
,2024-01-01 02:00:00,10,10,10,10
rot_001,2024-01-01 00:00:00, 8.5 ,abc,-1,30
broken,row
";

    #[test]
    fn test_read_rows_keeps_blank_cells_absent() {
        // ---
        let (rows, undecodable) = read_rows(SAMPLE.as_bytes());
        assert_eq!(rows.len(), 4);
        assert_eq!(undecodable, 1);

        assert_eq!(rows[0].sensor_id.as_deref(), Some("ams_001"));
        assert_eq!(rows[0].pm25.as_deref(), Some("12.1"));
        assert_eq!(rows[1].pm25, None);
        assert_eq!(rows[2].sensor_id, None);
        assert_eq!(rows[3].pm25.as_deref(), Some("8.5"));
    }

    #[test]
    fn test_rows_flow_through_cleaning() {
        // ---
        let (rows, _) = read_rows(SAMPLE.as_bytes());
        let cleaned = cleaning::clean(rows);

        assert_eq!(cleaned.report.rows_in, 4);
        assert_eq!(cleaned.report.dropped_per_rule.missing_key, 1);
        assert_eq!(cleaned.report.dropped_per_rule.negative_value, 1);
        assert_eq!(cleaned.report.rows_out, 2);

        let first = &cleaned.readings[0];
        assert_eq!(first.value(PM25), Some(12.1));
        assert_eq!(first.value(PM10), Some(20.0));
        assert_eq!(first.value(NO2), Some(15.2));
        assert_eq!(first.value(O3), Some(40.1));
        assert_eq!(cleaned.readings[1].value(PM25), None);
    }

    #[test]
    fn test_load_cleaned_missing_file_is_error() {
        // ---
        assert!(load_cleaned(Path::new("/definitely/not/here.csv")).is_err());
    }
}
