//! Point-geometry parsing for sensor placement.
//!
//! Sensor locations arrive as WKT-style point strings, e.g.
//! `POINT(4.9041 52.3676)`. The keyword is case-insensitive and whitespace
//! is tolerated around the keyword, inside the parentheses, and between the
//! two coordinates. The pattern captures longitude and latitude as named
//! groups before any numeric conversion.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

// ---

/// `POINT ( <lon> <lat> )`, numbers as `[+-]? digits ( . digits? )?`.
static POINT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*POINT\s*\(\s*(?P<lon>[+-]?\d+(?:\.\d*)?)\s+(?P<lat>[+-]?\d+(?:\.\d*)?)\s*\)\s*$")
        .expect("point pattern is a valid regex")
});

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

/// Parse a point-geometry string into validated coordinates.
///
/// Fails with [`CoreError::InvalidGeometry`] if the text does not match
/// `POINT ( lon lat )` or if lon ∉ [-180, 180] / lat ∉ [-90, 90].
pub fn parse_point(input: &str) -> CoreResult<Coordinates> {
    // ---
    let caps = POINT_PATTERN
        .captures(input)
        .ok_or_else(|| invalid(input, "expected POINT(lon lat)"))?;

    let lon: f64 = caps["lon"]
        .parse()
        .map_err(|_| invalid(input, "longitude is not a number"))?;
    let lat: f64 = caps["lat"]
        .parse()
        .map_err(|_| invalid(input, "latitude is not a number"))?;

    if !(-180.0..=180.0).contains(&lon) {
        return Err(invalid(input, &format!("longitude {lon} outside [-180, 180]")));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(invalid(input, &format!("latitude {lat} outside [-90, 90]")));
    }

    Ok(Coordinates { lon, lat })
}

fn invalid(input: &str, reason: &str) -> CoreError {
    CoreError::InvalidGeometry {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
