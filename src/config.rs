use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::processor::AnalyticsError;

/// Parameters shared by every report of a session.
///
/// Loaded from TOML; every field is optional and falls back to its default:
///
/// ```toml
/// baseline_year = 2022
/// comparison_year = 2023
/// top_products = 10
/// top_sellers_per_region = 5
/// cache_capacity = 128   # 0 disables the report cache
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Earlier year of year-over-year comparisons
    pub baseline_year: i32,
    /// Later year of year-over-year comparisons
    pub comparison_year: i32,
    /// Rows kept by the top revenue products report
    pub top_products: usize,
    /// Rows kept per region by the top sellers report
    pub top_sellers_per_region: usize,
    /// Finished reports kept in memory
    pub cache_capacity: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            baseline_year: 2022,
            comparison_year: 2023,
            top_products: 10,
            top_sellers_per_region: 5,
            cache_capacity: 128,
            log_level: "info".to_string(),
        }
    }
}

impl ReportConfig {
    /// Reads and validates a TOML config file
    pub fn load(path: &Path) -> Result<Self, AnalyticsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AnalyticsError> {
        let config: ReportConfig =
            toml::from_str(content).map_err(|e| AnalyticsError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.baseline_year == self.comparison_year {
            return Err(AnalyticsError::Configuration(format!(
                "baseline_year and comparison_year are both {}",
                self.baseline_year
            )));
        }
        Ok(())
    }
}
