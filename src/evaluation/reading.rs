//! Raw sensor samples and their validity bounds.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

pub const SOIL_MOISTURE_RANGE: (f32, f32) = (0.0, 100.0);
pub const LIGHT_INTENSITY_RANGE: (f32, f32) = (0.0, 50_000.0);
pub const TEMPERATURE_RANGE: (f32, f32) = (-40.0, 80.0);
pub const AIR_HUMIDITY_RANGE: (f32, f32) = (0.0, 100.0);

/// One periodic sample from the sensing collaborator.
///
/// Moisture and humidity are percentages, light is in lux, temperature in °C.
/// `timestamp` is the caller's monotonic clock in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub soil_moisture: f32,
    pub light_intensity: f32,
    pub temperature: f32,
    pub air_humidity: f32,
    pub timestamp: Timestamp,
}

impl SensorReading {
    pub fn new(
        soil_moisture: f32,
        light_intensity: f32,
        temperature: f32,
        air_humidity: f32,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            soil_moisture,
            light_intensity,
            temperature,
            air_humidity,
            timestamp,
        }
    }

    /// A reading is valid when every field is finite and inside its bound
    /// and the timestamp is non-zero.
    pub fn is_valid(&self) -> bool {
        self.invalid_field().is_none()
    }

    /// Name of the first field that fails validation, if any.
    pub fn invalid_field(&self) -> Option<&'static str> {
        if self.timestamp == 0 {
            return Some("timestamp");
        }
        let checks = [
            ("soil_moisture", self.soil_moisture, SOIL_MOISTURE_RANGE),
            ("light_intensity", self.light_intensity, LIGHT_INTENSITY_RANGE),
            ("temperature", self.temperature, TEMPERATURE_RANGE),
            ("air_humidity", self.air_humidity, AIR_HUMIDITY_RANGE),
        ];
        checks
            .iter()
            .find(|(_, value, (min, max))| !in_bounds(*value, *min, *max))
            .map(|(name, _, _)| *name)
    }
}

fn in_bounds(value: f32, min: f32, max: f32) -> bool {
    value.is_finite() && value >= min && value <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_reading() {
        let reading = SensorReading::new(45.0, 1200.0, 24.0, 55.0, 1_000);
        assert!(reading.is_valid());
        assert_eq!(reading.invalid_field(), None);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(SensorReading::new(0.0, 0.0, -40.0, 0.0, 1).is_valid());
        assert!(SensorReading::new(100.0, 50_000.0, 80.0, 100.0, 1).is_valid());
    }

    #[test]
    fn test_out_of_range_fields() {
        assert_eq!(
            SensorReading::new(101.0, 500.0, 20.0, 50.0, 1).invalid_field(),
            Some("soil_moisture")
        );
        assert_eq!(
            SensorReading::new(50.0, 60_000.0, 20.0, 50.0, 1).invalid_field(),
            Some("light_intensity")
        );
        assert_eq!(
            SensorReading::new(50.0, 500.0, -41.0, 50.0, 1).invalid_field(),
            Some("temperature")
        );
        assert_eq!(
            SensorReading::new(50.0, 500.0, 20.0, -1.0, 1).invalid_field(),
            Some("air_humidity")
        );
    }

    #[test]
    fn test_non_finite_and_zero_timestamp() {
        assert!(!SensorReading::new(f32::NAN, 500.0, 20.0, 50.0, 1).is_valid());
        assert!(!SensorReading::new(50.0, f32::INFINITY, 20.0, 50.0, 1).is_valid());
        assert_eq!(
            SensorReading::new(50.0, 500.0, 20.0, 50.0, 0).invalid_field(),
            Some("timestamp")
        );
    }
}
