//! SHA-256 content checksums.
//!
//! Used to detect corruption of frames in transit and records at rest.
//! Not a security boundary on its own; see `signature` for that.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Compute SHA256 hash of content, hex encoded.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `expected` is the checksum of `content`. Case-insensitive.
pub fn checksum_matches(content: &str, expected: &str) -> bool {
    expected.len() == CHECKSUM_HEX_LEN && compute_hash(content).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("test content");
        assert_eq!(hash.len(), CHECKSUM_HEX_LEN);
        assert_eq!(
            compute_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksum_matches() {
        let hash = compute_hash("{\"moisture\":42}");
        assert!(checksum_matches("{\"moisture\":42}", &hash));
        assert!(checksum_matches("{\"moisture\":42}", &hash.to_uppercase()));
        assert!(!checksum_matches("{\"moisture\":43}", &hash));
        assert!(!checksum_matches("{\"moisture\":42}", "abc"));
    }
}
