use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{ChannelError, ChannelResult};
use crate::incidence::DEFAULT_MULTIPLIER;
use crate::models::{ThresholdPercentile, EPI_WEEKS};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel percentile a week must exceed to raise an alert.
    pub threshold_percentile: ThresholdPercentile,
    pub apply_consecutive_rule: bool,
    /// Run length required to confirm an alert; 1 confirms immediately.
    pub consecutive_weeks: usize,
    pub baseline_years: u32,
    pub epidemiological_weeks: u32,
    pub min_baseline_weeks: usize,
    pub max_interpolation_gap: usize,
    pub interpolate_missing: bool,
    pub trend_window: usize,
    pub incidence_multiplier: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: ThresholdPercentile::Q3,
            apply_consecutive_rule: false,
            consecutive_weeks: 1,
            baseline_years: 5,
            epidemiological_weeks: EPI_WEEKS,
            min_baseline_weeks: 40,
            max_interpolation_gap: 4,
            interpolate_missing: true,
            trend_window: 4,
            incidence_multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl ChannelConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse channel config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Enables the consecutive rule whenever more than one week is required.
    pub fn with_consecutive_weeks(mut self, weeks: usize) -> Self {
        self.consecutive_weeks = weeks;
        self.apply_consecutive_rule = weeks > 1;
        self
    }

    pub fn validate(&self) -> ChannelResult<()> {
        if self.consecutive_weeks == 0 {
            return Err(ChannelError::InvalidConfig(
                "consecutive_weeks must be at least 1".to_string(),
            ));
        }
        if self.epidemiological_weeks != EPI_WEEKS {
            return Err(ChannelError::InvalidConfig(format!(
                "epidemiological_weeks is fixed at {EPI_WEEKS}, got {}",
                self.epidemiological_weeks
            )));
        }
        if self.baseline_years == 0 {
            return Err(ChannelError::InvalidConfig(
                "baseline_years must be at least 1".to_string(),
            ));
        }
        if self.incidence_multiplier.is_nan() || self.incidence_multiplier <= 0.0 {
            return Err(ChannelError::InvalidConfig(format!(
                "incidence_multiplier must be positive, got {}",
                self.incidence_multiplier
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_who_standard() {
        let config = ChannelConfig::default();
        assert_eq!(config.threshold_percentile, ThresholdPercentile::Q3);
        assert!(!config.apply_consecutive_rule);
        assert_eq!(config.consecutive_weeks, 1);
        assert_eq!(config.baseline_years, 5);
        assert_eq!(config.min_baseline_weeks, 40);
        assert_eq!(config.max_interpolation_gap, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = ChannelConfig::from_toml_str(
            "threshold_percentile = \"q85\"\nconsecutive_weeks = 2\napply_consecutive_rule = true\n",
        )
        .unwrap();
        assert_eq!(config.threshold_percentile, ThresholdPercentile::Q85);
        assert_eq!(config.consecutive_weeks, 2);
        assert!(config.apply_consecutive_rule);
        assert_eq!(config.baseline_years, 5);
    }

    #[test]
    fn rejects_zero_consecutive_weeks() {
        assert!(ChannelConfig::from_toml_str("consecutive_weeks = 0").is_err());
    }

    #[test]
    fn rejects_non_standard_epi_year() {
        let config = ChannelConfig {
            epidemiological_weeks: 53,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ChannelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn consecutive_weeks_above_one_enable_rule() {
        let config = ChannelConfig::default().with_consecutive_weeks(3);
        assert!(config.apply_consecutive_rule);
        let config = ChannelConfig::default().with_consecutive_weeks(1);
        assert!(!config.apply_consecutive_rule);
    }
}
