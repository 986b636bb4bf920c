//! Pollutant thresholds and the four-bucket air-quality categorization.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{PM10, PM25};

// ---

/// Air-quality category, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Safe,
    Moderate,
    Unhealthy,
    Dangerous,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Safe,
        Category::Moderate,
        Category::Unhealthy,
        Category::Dangerous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Safe => "Safe",
            Category::Moderate => "Moderate",
            Category::Unhealthy => "Unhealthy",
            Category::Dangerous => "Dangerous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper bounds (inclusive) for the first three buckets of one pollutant.
/// Anything above `danger` is [`Category::Dangerous`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Cutoffs {
    pub safe: f64,
    pub moderate: f64,
    pub danger: f64,
}

impl Cutoffs {
    // ---
    pub fn categorize(&self, value: f64) -> Category {
        if value <= self.safe {
            Category::Safe
        } else if value <= self.moderate {
            Category::Moderate
        } else if value <= self.danger {
            Category::Unhealthy
        } else {
            Category::Dangerous
        }
    }

    fn is_ordered(&self) -> bool {
        self.safe <= self.moderate && self.moderate <= self.danger
    }
}

/// Per-pollutant cutoffs, loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    cutoffs: BTreeMap<String, Cutoffs>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cutoffs: BTreeMap::from([
                (
                    PM25.to_string(),
                    Cutoffs {
                        safe: 25.0,
                        moderate: 50.0,
                        danger: 75.0,
                    },
                ),
                (
                    PM10.to_string(),
                    Cutoffs {
                        safe: 50.0,
                        moderate: 100.0,
                        danger: 150.0,
                    },
                ),
            ]),
        }
    }
}

impl ThresholdConfig {
    // ---
    /// Build from explicit cutoffs, checking PM2.5/PM10 presence and ordering.
    pub fn new(cutoffs: BTreeMap<String, Cutoffs>) -> Result<Self> {
        // ---
        for required in [PM25, PM10] {
            if !cutoffs.contains_key(required) {
                return Err(anyhow!("threshold config is missing '{required}'"));
            }
        }
        for (pollutant, c) in &cutoffs {
            if !c.is_ordered() {
                return Err(anyhow!(
                    "thresholds for '{pollutant}' must satisfy safe <= moderate <= danger, got {c:?}"
                ));
            }
        }
        Ok(Self { cutoffs })
    }

    /// Load a JSON object of `{pollutant: {safe, moderate, danger}}`.
    pub fn load(path: &Path) -> Result<Self> {
        // ---
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read thresholds file '{}'", path.display()))?;
        let cutoffs: BTreeMap<String, Cutoffs> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse thresholds file '{}'", path.display()))?;
        Self::new(cutoffs)
    }

    pub fn cutoffs(&self, pollutant: &str) -> Option<&Cutoffs> {
        self.cutoffs.get(pollutant)
    }

    /// Categorize a value for a pollutant. `None` when that pollutant has no
    /// configured cutoffs.
    pub fn categorize(&self, pollutant: &str, value: f64) -> Option<Category> {
        self.cutoffs(pollutant).map(|c| c.categorize(value))
    }

    /// Categorize by PM2.5, the driver used for map colours and
    /// provincial distributions.
    pub fn categorize_pm25(&self, value: f64) -> Category {
        // ---
        // PM2.5 presence is enforced by `new` and `default`.
        self.categorize(PM25, value).unwrap_or(Category::Dangerous)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_default_pm25_buckets() {
        // ---
        let t = ThresholdConfig::default();
        assert_eq!(t.categorize_pm25(0.0), Category::Safe);
        assert_eq!(t.categorize_pm25(25.0), Category::Safe);
        assert_eq!(t.categorize_pm25(25.1), Category::Moderate);
        assert_eq!(t.categorize_pm25(50.0), Category::Moderate);
        assert_eq!(t.categorize_pm25(75.0), Category::Unhealthy);
        assert_eq!(t.categorize_pm25(75.5), Category::Dangerous);
    }

    #[test]
    fn test_pm10_uses_its_own_cutoffs() {
        // ---
        let t = ThresholdConfig::default();
        assert_eq!(t.categorize(PM10, 60.0), Some(Category::Moderate));
        assert_eq!(t.categorize("no2", 60.0), None);
    }

    #[test]
    fn test_rejects_missing_required_pollutant() {
        // ---
        let only_pm25 = BTreeMap::from([(
            PM25.to_string(),
            Cutoffs {
                safe: 1.0,
                moderate: 2.0,
                danger: 3.0,
            },
        )]);
        assert!(ThresholdConfig::new(only_pm25).is_err());
    }

    #[test]
    fn test_rejects_unordered_cutoffs() {
        // ---
        let mut cutoffs = ThresholdConfig::default().cutoffs;
        cutoffs.insert(
            PM10.to_string(),
            Cutoffs {
                safe: 100.0,
                moderate: 50.0,
                danger: 150.0,
            },
        );
        assert!(ThresholdConfig::new(cutoffs).is_err());
    }

    #[test]
    fn test_parses_json_shape() {
        // ---
        let json = r#"{
            "pm25": {"safe": 10, "moderate": 20, "danger": 30},
            "pm10": {"safe": 40, "moderate": 80, "danger": 120}
        }"#;
        let cutoffs: BTreeMap<String, Cutoffs> = serde_json::from_str(json).unwrap();
        let t = ThresholdConfig::new(cutoffs).unwrap();
        assert_eq!(t.categorize_pm25(15.0), Category::Moderate);
        assert_eq!(t.categorize(PM10, 130.0), Some(Category::Dangerous));
    }
}
