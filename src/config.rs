// Readout configuration
//
// Loaded from an optional TOML file; command-line flags override the file.

use crate::experiment::metrics::{self, PRIMARY_METRIC};
use crate::experiment::srm::DEFAULT_SRM_ALPHA;
use crate::experiment::statistics::DEFAULT_CONFIDENCE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_EXPERIMENT_ID: &str = "exp_checkout_v1";

/// Configuration for one experiment readout
///
/// # Example
/// ```
/// use launchlens::config::LaunchLensConfig;
///
/// let config = LaunchLensConfig::default();
/// assert_eq!(config.expected_treatment_share, 0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchLensConfig {
    pub experiment_id: String,

    /// Designed treatment allocation, strictly inside (0, 1)
    pub expected_treatment_share: f64,

    /// Two-sided confidence level for every interval in the readout
    pub confidence_level: f64,

    /// SRM is flagged when the chi-square p-value falls below this
    pub srm_alpha: f64,

    /// Ship requires the primary metric p-value below this
    pub decision_alpha: f64,

    /// Registry name of the metric the decision is based on
    pub primary_metric: String,

    /// Trailing window for the trend summary
    pub trend_window_days: u32,
}

impl Default for LaunchLensConfig {
    fn default() -> Self {
        Self {
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            expected_treatment_share: 0.5,
            confidence_level: DEFAULT_CONFIDENCE,
            srm_alpha: DEFAULT_SRM_ALPHA,
            decision_alpha: 0.05,
            primary_metric: PRIMARY_METRIC.to_string(),
            trend_window_days: 7,
        }
    }
}

impl LaunchLensConfig {
    /// Stricter thresholds for high-risk launches
    pub fn strict() -> Self {
        Self {
            confidence_level: 0.99,
            srm_alpha: 0.001,
            decision_alpha: 0.01,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse configuration from TOML; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.experiment_id.trim().is_empty() {
            return Err("experiment_id must not be empty".to_string());
        }

        let share = self.expected_treatment_share;
        if !(share > 0.0 && share < 1.0) {
            return Err(format!(
                "expected_treatment_share must be in (0, 1), got {}",
                share
            ));
        }

        for (name, value) in [
            ("confidence_level", self.confidence_level),
            ("srm_alpha", self.srm_alpha),
            ("decision_alpha", self.decision_alpha),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(format!("{} must be in (0, 1), got {}", name, value));
            }
        }

        if metrics::find(&self.primary_metric).is_none() {
            return Err(format!("unknown primary_metric '{}'", self.primary_metric));
        }

        if self.trend_window_days == 0 {
            return Err("trend_window_days must be >= 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LaunchLensConfig::default();
        assert_eq!(config.experiment_id, "exp_checkout_v1");
        assert_eq!(config.confidence_level, 0.95);
        assert_eq!(config.srm_alpha, 0.01);
        assert_eq!(config.decision_alpha, 0.05);
        assert_eq!(config.primary_metric, PRIMARY_METRIC);
        assert_eq!(config.trend_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_config() {
        let config = LaunchLensConfig::strict();
        assert_eq!(config.confidence_level, 0.99);
        assert_eq!(config.srm_alpha, 0.001);
        assert_eq!(config.decision_alpha, 0.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LaunchLensConfig::from_toml_str(
            r#"
            experiment_id = "exp_search_v2"
            expected_treatment_share = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.experiment_id, "exp_search_v2");
        assert_eq!(config.expected_treatment_share, 0.2);
        assert_eq!(config.decision_alpha, 0.05);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "decision_alpha = 0.1").unwrap();
        let config = LaunchLensConfig::from_file(file.path()).unwrap();
        assert_eq!(config.decision_alpha, 0.1);
    }

    #[test]
    fn test_bad_toml() {
        assert!(LaunchLensConfig::from_toml_str("decision_alpha = \"high\"").is_err());
        assert!(LaunchLensConfig::from_file("/no/such/launchlens.toml").is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_share() {
        let mut config = LaunchLensConfig::default();
        config.expected_treatment_share = 1.0;
        assert!(config.validate().is_err());
        config.expected_treatment_share = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_alpha() {
        let mut config = LaunchLensConfig::default();
        config.srm_alpha = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.contains("srm_alpha"));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_unknown_primary_metric() {
        let mut config = LaunchLensConfig::default();
        config.primary_metric = "bounce_rate".to_string();
        assert!(config.validate().is_err());
    }
}
