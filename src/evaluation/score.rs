//! Health score computation.
//!
//! Each metric is scored on a piecewise-linear curve:
//! - below critical: 0 → 20 across [0, critical]
//! - critical → low: 20 → 60
//! - low → excellent: 60 → 100
//! - at or above excellent: 100
//!
//! Temperature scores 100 inside the optimal band, 70 + (1 − d/10)·30 in the
//! safe band (d = distance to the nearer optimal bound) and 0 outside it.
//! The final score weighs moisture 40%, light 40%, temperature 20%.

use super::reading::SensorReading;
use super::thresholds::{ThresholdConfig, LIGHT_EXCELLENT, MOISTURE_EXCELLENT};

const MOISTURE_WEIGHT: f32 = 0.4;
const LIGHT_WEIGHT: f32 = 0.4;
const TEMPERATURE_WEIGHT: f32 = 0.2;

/// Linear interpolation of `value` from [from, to] onto [lo, hi].
/// A degenerate span scores the upper end.
fn ramp(value: f32, from: f32, to: f32, lo: f32, hi: f32) -> f32 {
    let span = to - from;
    if span <= f32::EPSILON {
        return hi;
    }
    lo + (value - from) / span * (hi - lo)
}

fn banded_score(value: f32, critical: f32, low: f32, excellent: f32) -> f32 {
    let score = if value >= excellent {
        100.0
    } else if value >= low {
        ramp(value, low, excellent, 60.0, 100.0)
    } else if value >= critical {
        ramp(value, critical, low, 20.0, 60.0)
    } else {
        ramp(value, 0.0, critical, 0.0, 20.0)
    };
    score.clamp(0.0, 100.0)
}

pub fn moisture_score(moisture: f32, thresholds: &ThresholdConfig) -> f32 {
    banded_score(
        moisture,
        thresholds.moisture_critical,
        thresholds.moisture_low,
        MOISTURE_EXCELLENT.max(thresholds.moisture_low),
    )
}

pub fn light_score(light: f32, thresholds: &ThresholdConfig) -> f32 {
    banded_score(
        light,
        thresholds.light_critical,
        thresholds.light_low,
        LIGHT_EXCELLENT.max(thresholds.light_low),
    )
}

pub fn temperature_score(temperature: f32, thresholds: &ThresholdConfig) -> f32 {
    if thresholds.is_temperature_optimal(temperature) {
        return 100.0;
    }
    if !thresholds.is_temperature_safe(temperature) {
        return 0.0;
    }
    let distance = (temperature - thresholds.temperature_optimal_min)
        .abs()
        .min((temperature - thresholds.temperature_optimal_max).abs());
    (70.0 + (1.0 - distance / 10.0) * 30.0).clamp(0.0, 100.0)
}

/// Weighted health score in [0, 100].
pub fn health_score(reading: &SensorReading, thresholds: &ThresholdConfig) -> u8 {
    let total = moisture_score(reading.soil_moisture, thresholds) * MOISTURE_WEIGHT
        + light_score(reading.light_intensity, thresholds) * LIGHT_WEIGHT
        + temperature_score(reading.temperature, thresholds) * TEMPERATURE_WEIGHT;
    total.clamp(0.0, 100.0).round() as u8
}
