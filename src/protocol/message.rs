//! Message types, headers and the JSON frame wire format.
//!
//! A frame is one JSON object:
//!
//! ```json
//! {"messageId":"...","type":"SENSOR_DATA","deviceId":"pot-1","timestamp":1700000000000,
//!  "version":1,"checksum":"<sha256 hex of payload>","payload":"{...}"}
//! ```
//!
//! `signature` and `keyId` are present only on signed inbound commands.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::communicator::ProtocolError;
use crate::security::checksum::compute_hash;
use crate::Timestamp;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SensorData,
    PlantStatus,
    DeviceConfig,
    AlertNotification,
    CommandRequest,
    CommandResponse,
    Heartbeat,
    ErrorReport,
    SyncRequest,
    SyncResponse,
}

impl MessageType {
    /// Wire name, e.g. `SENSOR_DATA`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::SensorData => "SENSOR_DATA",
            MessageType::PlantStatus => "PLANT_STATUS",
            MessageType::DeviceConfig => "DEVICE_CONFIG",
            MessageType::AlertNotification => "ALERT_NOTIFICATION",
            MessageType::CommandRequest => "COMMAND_REQUEST",
            MessageType::CommandResponse => "COMMAND_RESPONSE",
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::ErrorReport => "ERROR_REPORT",
            MessageType::SyncRequest => "SYNC_REQUEST",
            MessageType::SyncResponse => "SYNC_RESPONSE",
        }
    }

    /// Types that can change device behaviour and may require a signature.
    pub fn is_command(&self) -> bool {
        matches!(self, MessageType::CommandRequest | MessageType::DeviceConfig)
    }
}

/// Generate a unique message id (uppercase hex, 32 chars).
pub fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub message_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub device_id: String,
    pub timestamp: Timestamp,
    pub version: u32,
    pub checksum: String,
}

impl MessageHeader {
    /// Fresh header for `payload`.
    pub fn new(message_type: MessageType, device_id: &str, payload: &str, now: Timestamp) -> Self {
        Self {
            message_id: new_message_id(),
            message_type,
            device_id: device_id.to_string(),
            timestamp: now,
            version: PROTOCOL_VERSION,
            checksum: compute_hash(payload),
        }
    }

    /// Canonical string covered by a command signature.
    pub fn signing_input(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.message_id,
            self.message_type.as_str(),
            self.device_id,
            self.timestamp,
            self.checksum
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl Frame {
    pub fn new(header: MessageHeader, payload: String) -> Self {
        Self {
            header,
            payload,
            signature: None,
            key_id: None,
        }
    }

    pub fn with_signature(mut self, key_id: &str, signature: &str) -> Self {
        self.key_id = Some(key_id.to_string());
        self.signature = Some(signature.to_string());
        self
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> String {
        let mut value = json!({
            "messageId": self.header.message_id,
            "type": self.header.message_type.as_str(),
            "deviceId": self.header.device_id,
            "timestamp": self.header.timestamp,
            "version": self.header.version,
            "checksum": self.header.checksum,
            "payload": self.payload,
        });
        if let (Some(signature), Some(key_id)) = (&self.signature, &self.key_id) {
            value["signature"] = json!(signature);
            value["keyId"] = json!(key_id);
        }
        value.to_string()
    }

    /// Parse a frame. Does not validate checksum or freshness.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// A framed message waiting in (or travelling through) the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub frame: Frame,
    pub retry_count: u32,
    pub queued_at: Timestamp,
    pub is_priority: bool,
}

impl QueuedMessage {
    pub fn new(
        message_type: MessageType,
        device_id: &str,
        payload: String,
        is_priority: bool,
        now: Timestamp,
    ) -> Self {
        let header = MessageHeader::new(message_type, device_id, &payload, now);
        Self {
            frame: Frame::new(header, payload),
            retry_count: 0,
            queued_at: now,
            is_priority,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.frame.header.message_id
    }

    pub fn message_type(&self) -> MessageType {
        self.frame.header.message_type
    }
}
