//! Payload builders for outbound messages.
//!
//! Each builder returns the JSON payload string that goes inside a frame.

use serde_json::json;

use crate::alerting::AlertInfo;
use crate::evaluation::{PlantStatus, SensorReading};
use crate::Timestamp;

pub struct MessageBuilder;

impl MessageBuilder {
    pub fn sensor_data(device_id: &str, reading: &SensorReading) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": reading.timestamp,
            "sensorData": {
                "soilHumidity": reading.soil_moisture,
                "airHumidity": reading.air_humidity,
                "temperature": reading.temperature,
                "lightIntensity": reading.light_intensity,
            }
        })
        .to_string()
    }

    pub fn plant_status(device_id: &str, status: &PlantStatus) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": status.timestamp,
            "plantStatus": {
                "state": status.state,
                "needsAttention": status.needs_attention,
                "healthScore": status.health_score,
                "message": status.status_message,
            }
        })
        .to_string()
    }

    /// Severity is 2 for urgent alerts, 1 otherwise.
    pub fn alert(device_id: &str, alert: &AlertInfo, now: Timestamp) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": now,
            "alert": {
                "type": alert.alert_type,
                "state": alert.state,
                "message": alert.message,
                "severity": if alert.is_urgent { 2 } else { 1 },
                "repeatCount": alert.repeat_count,
                "startTime": alert.start_time,
            }
        })
        .to_string()
    }

    pub fn command_response(
        device_id: &str,
        command_id: &str,
        success: bool,
        message: &str,
        now: Timestamp,
    ) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": now,
            "commandId": command_id,
            "success": success,
            "message": message,
        })
        .to_string()
    }

    pub fn error_report(device_id: &str, code: i32, message: &str, now: Timestamp) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": now,
            "error": {
                "code": code,
                "message": message,
            }
        })
        .to_string()
    }

    pub fn heartbeat(device_id: &str, session_id: &str, queue_size: usize, now: Timestamp) -> String {
        json!({
            "deviceId": device_id,
            "timestamp": now,
            "sessionId": session_id,
            "queueSize": queue_size,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertState, AlertType};
    use serde_json::Value;

    #[test]
    fn test_sensor_data_payload() {
        let reading = SensorReading::new(15.0, 800.0, 25.0, 55.0, 1_000);
        let value: Value = serde_json::from_str(&MessageBuilder::sensor_data("pot-1", &reading)).unwrap();
        assert_eq!(value["deviceId"], "pot-1");
        assert_eq!(value["sensorData"]["soilHumidity"], 15.0);
        assert_eq!(value["sensorData"]["lightIntensity"], 800.0);
    }

    #[test]
    fn test_alert_payload() {
        let alert = AlertInfo {
            alert_type: AlertType::Critical,
            state: AlertState::Active,
            is_urgent: true,
            repeat_count: 1,
            message: AlertType::Critical.message().to_string(),
            ..AlertInfo::default()
        };
        let value: Value = serde_json::from_str(&MessageBuilder::alert("pot-1", &alert, 9)).unwrap();
        assert_eq!(value["alert"]["type"], "CRITICAL");
        assert_eq!(value["alert"]["severity"], 2);
        assert_eq!(value["timestamp"], 9);
    }

    #[test]
    fn test_plant_status_payload() {
        let status = PlantStatus::default();
        let value: Value =
            serde_json::from_str(&MessageBuilder::plant_status("pot-1", &status)).unwrap();
        assert_eq!(value["plantStatus"]["state"], "UNKNOWN");
    }
}
