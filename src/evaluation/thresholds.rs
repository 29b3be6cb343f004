//! Threshold configuration for plant-state evaluation.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Soil moisture (%) at and above which the moisture sub-score is 100.
pub const MOISTURE_EXCELLENT: f32 = 60.0;

/// Light level (lux) at and above which the light sub-score is 100.
pub const LIGHT_EXCELLENT: f32 = 2000.0;

/// Evaluation thresholds. All values are mutable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub moisture_low: f32,
    pub moisture_critical: f32,
    pub light_low: f32,
    pub light_critical: f32,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub temperature_optimal_min: f32,
    pub temperature_optimal_max: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            moisture_low: 30.0,
            moisture_critical: 10.0,
            light_low: 500.0,
            light_critical: 100.0,
            temperature_min: 15.0,
            temperature_max: 35.0,
            temperature_optimal_min: 20.0,
            temperature_optimal_max: 28.0,
        }
    }
}

impl ThresholdConfig {
    /// Check that the bands are ordered and non-degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.moisture_low,
            self.moisture_critical,
            self.light_low,
            self.light_critical,
            self.temperature_min,
            self.temperature_max,
            self.temperature_optimal_min,
            self.temperature_optimal_max,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("thresholds", "non-finite value"));
        }
        if self.moisture_low <= 0.0 || self.moisture_low > 100.0 {
            return Err(ConfigError::invalid(
                "thresholds.moistureLow",
                format!("must be in (0, 100], got {}", self.moisture_low),
            ));
        }
        if self.moisture_critical < 0.0 || self.moisture_critical > self.moisture_low {
            return Err(ConfigError::invalid(
                "thresholds.moistureCritical",
                format!(
                    "must be in [0, moistureLow={}], got {}",
                    self.moisture_low, self.moisture_critical
                ),
            ));
        }
        if self.light_low <= 0.0 {
            return Err(ConfigError::invalid(
                "thresholds.lightLow",
                format!("must be positive, got {}", self.light_low),
            ));
        }
        if self.light_critical < 0.0 || self.light_critical > self.light_low {
            return Err(ConfigError::invalid(
                "thresholds.lightCritical",
                format!(
                    "must be in [0, lightLow={}], got {}",
                    self.light_low, self.light_critical
                ),
            ));
        }
        if self.temperature_min >= self.temperature_max {
            return Err(ConfigError::invalid(
                "thresholds.temperatureMin",
                format!(
                    "must be below temperatureMax ({} >= {})",
                    self.temperature_min, self.temperature_max
                ),
            ));
        }
        if self.temperature_optimal_min > self.temperature_optimal_max
            || self.temperature_optimal_min < self.temperature_min
            || self.temperature_optimal_max > self.temperature_max
        {
            return Err(ConfigError::invalid(
                "thresholds.temperatureOptimal",
                "optimal band must lie inside the safe band",
            ));
        }
        Ok(())
    }

    pub fn is_temperature_safe(&self, temperature: f32) -> bool {
        temperature >= self.temperature_min && temperature <= self.temperature_max
    }

    pub fn is_temperature_optimal(&self, temperature: f32) -> bool {
        temperature >= self.temperature_optimal_min && temperature <= self.temperature_optimal_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let thresholds = ThresholdConfig::default();
        assert!(thresholds.validate().is_ok());
        assert_eq!(thresholds.moisture_low, 30.0);
        assert_eq!(thresholds.light_low, 500.0);
        assert_eq!(thresholds.temperature_min, 15.0);
        assert_eq!(thresholds.temperature_max, 35.0);
    }

    #[test]
    fn test_rejects_inverted_temperature_band() {
        let thresholds = ThresholdConfig {
            temperature_min: 30.0,
            temperature_max: 20.0,
            ..ThresholdConfig::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_rejects_critical_above_low() {
        let thresholds = ThresholdConfig {
            moisture_critical: 40.0,
            ..ThresholdConfig::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let thresholds: ThresholdConfig =
            serde_json::from_str(r#"{"moistureLow": 25.0}"#).unwrap();
        assert_eq!(thresholds.moisture_low, 25.0);
        assert_eq!(thresholds.light_low, 500.0);
    }
}
