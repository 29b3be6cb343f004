//! Inbound frame validation.

use lazy_static::lazy_static;
use regex::Regex;

use super::communicator::ProtocolError;
use super::message::{Frame, PROTOCOL_VERSION};
use crate::security::checksum::{checksum_matches, compute_hash};
use crate::Timestamp;

/// Largest payload accepted from the wire.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

lazy_static! {
    static ref DEVICE_ID_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").unwrap();
}

pub fn is_valid_device_id(device_id: &str) -> bool {
    DEVICE_ID_PATTERN.is_match(device_id)
}

/// Structural checks on an inbound frame: device id, version, payload size,
/// checksum and timestamp freshness. Signatures are checked separately.
pub fn validate_frame(frame: &Frame, now: Timestamp, tolerance: u64) -> Result<(), ProtocolError> {
    let header = &frame.header;

    if !is_valid_device_id(&header.device_id) {
        return Err(ProtocolError::InvalidDeviceId(header.device_id.clone()));
    }

    if header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header.version));
    }

    if frame.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(frame.payload.len()));
    }

    if !checksum_matches(&frame.payload, &header.checksum) {
        return Err(ProtocolError::ChecksumMismatch {
            expected: header.checksum.clone(),
            actual: compute_hash(&frame.payload),
        });
    }

    let skew = header.timestamp.abs_diff(now);
    if skew > tolerance {
        return Err(ProtocolError::StaleTimestamp { skew_ms: skew });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{MessageHeader, MessageType};

    fn frame(payload: &str, timestamp: Timestamp) -> Frame {
        let header = MessageHeader::new(MessageType::CommandRequest, "pot-1", payload, timestamp);
        Frame::new(header, payload.to_string())
    }

    #[test]
    fn test_device_ids() {
        assert!(is_valid_device_id("pot-1"));
        assert!(is_valid_device_id("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_device_id("greenhouse_3.shelf"));
        assert!(!is_valid_device_id(""));
        assert!(!is_valid_device_id("has space"));
        assert!(!is_valid_device_id("../etc"));
        assert!(!is_valid_device_id(&"x".repeat(65)));
    }

    #[test]
    fn test_valid_frame() {
        assert!(validate_frame(&frame("{}", 1_000), 1_000, 300_000).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let mut f = frame("{\"cmd\":\"water\"}", 1_000);
        f.payload = "{\"cmd\":\"drain\"}".to_string();
        assert!(matches!(
            validate_frame(&f, 1_000, 300_000),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_timestamp_tolerance_both_directions() {
        let tolerance = 300_000;
        let now = 10_000_000;
        assert!(validate_frame(&frame("{}", now - tolerance), now, tolerance).is_ok());
        assert!(validate_frame(&frame("{}", now + tolerance), now, tolerance).is_ok());
        assert_eq!(
            validate_frame(&frame("{}", now - tolerance - 1), now, tolerance),
            Err(ProtocolError::StaleTimestamp { skew_ms: tolerance + 1 })
        );
        assert!(validate_frame(&frame("{}", now + tolerance + 1), now, tolerance).is_err());
    }

    #[test]
    fn test_bad_version_and_device() {
        let mut f = frame("{}", 1_000);
        f.header.version = 2;
        assert_eq!(
            validate_frame(&f, 1_000, 300_000),
            Err(ProtocolError::UnsupportedVersion(2))
        );

        let mut f = frame("{}", 1_000);
        f.header.device_id = "bad id".to_string();
        assert!(matches!(
            validate_frame(&f, 1_000, 300_000),
            Err(ProtocolError::InvalidDeviceId(_))
        ));
    }
}
