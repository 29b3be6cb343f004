//! Ed25519 signature verification for inbound commands.
//!
//! Keys are held per device in a [`TrustedKeys`] cache, loaded from
//! base64-encoded public keys.

use std::collections::HashMap;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

use crate::logging::structured::LogContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no signature provided")]
    MissingSignature,

    #[error("unknown signer key {0}")]
    UnknownKey(String),

    #[error("failed to decode base64: {0}")]
    Decode(String),

    #[error("invalid key length: expected 32, got {0}")]
    KeyLength(usize),

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("verification failed for key {0}")]
    VerificationFailed(String),
}

/// Cache of trusted public keys, by key id.
#[derive(Debug, Clone, Default)]
pub struct TrustedKeys {
    keys: HashMap<String, VerifyingKey>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Load public key from base64-encoded bytes.
    pub fn load_key(&mut self, key_id: &str, public_key_base64: &str) -> Result<(), AuthError> {
        let key_bytes = general_purpose::STANDARD
            .decode(public_key_base64.trim())
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        let key_array: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::KeyLength(key_bytes.len()))?;

        let verifying_key = VerifyingKey::from_bytes(&key_array)
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;

        self.keys.insert(key_id.to_string(), verifying_key);
        Ok(())
    }

    pub fn remove_key(&mut self, key_id: &str) -> bool {
        self.keys.remove(key_id).is_some()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        log::info!("TRUSTED_KEYS_CLEARED");
    }

    /// Verify an Ed25519 signature over `message`.
    ///
    /// Accepts URL-safe (unpadded) or standard base64 signatures.
    pub fn verify(
        &self,
        message: &str,
        signature_base64: &str,
        key_id: &str,
        ctx: &LogContext,
    ) -> Result<(), AuthError> {
        let verifying_key = match self.keys.get(key_id) {
            Some(key) => key,
            None => {
                log::warn!("{} SIGNATURE_KEY_LOOKUP key_id={} found=false", ctx, key_id);
                return Err(AuthError::UnknownKey(key_id.to_string()));
            }
        };

        let signature_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(signature_base64)
            .or_else(|_| general_purpose::STANDARD.decode(signature_base64))
            .map_err(|e| {
                log::warn!(
                    "{} SIGNATURE_DECODE_FAILED key_id={} error={}",
                    ctx,
                    key_id,
                    e
                );
                AuthError::Decode(e.to_string())
            })?;

        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| AuthError::MalformedSignature(e.to_string()))?;

        match verifying_key.verify(message.as_bytes(), &signature) {
            Ok(()) => {
                log::debug!("{} SIGNATURE_VERIFY key_id={} valid=true", ctx, key_id);
                Ok(())
            }
            Err(e) => {
                log::warn!("{} SIGNATURE_INVALID key_id={} error={}", ctx, key_id, e);
                Err(AuthError::VerificationFailed(key_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn trusted() -> TrustedKeys {
        let public = general_purpose::STANDARD.encode(signing_key().verifying_key().to_bytes());
        let mut keys = TrustedKeys::new();
        keys.load_key("app-1", &public).unwrap();
        keys
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut keys = TrustedKeys::new();
        assert!(keys.is_empty());

        let result = keys.load_key("test-key", "11111111111111111111111111111111111111111111");
        assert!(result.is_err());
        assert!(!keys.has_key("test-key"));

        assert_eq!(
            keys.load_key("short", &general_purpose::STANDARD.encode([1u8; 8])),
            Err(AuthError::KeyLength(8))
        );
    }

    #[test]
    fn test_verify_roundtrip() {
        let keys = trusted();
        let message = "MSG1:COMMAND_REQUEST:pot-1:1000:abc";
        let signature = signing_key().sign(message.as_bytes());
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature.to_bytes());

        let ctx = LogContext::default();
        assert!(keys.verify(message, &encoded, "app-1", &ctx).is_ok());
        assert_eq!(
            keys.verify("tampered", &encoded, "app-1", &ctx),
            Err(AuthError::VerificationFailed("app-1".to_string()))
        );
    }

    #[test]
    fn test_standard_base64_signature_accepted() {
        let keys = trusted();
        let signature = signing_key().sign(b"hello");
        let encoded = general_purpose::STANDARD.encode(signature.to_bytes());
        assert!(keys.verify("hello", &encoded, "app-1", &LogContext::default()).is_ok());
    }

    #[test]
    fn test_unknown_key() {
        let keys = trusted();
        assert_eq!(
            keys.verify("hello", "AAAA", "other", &LogContext::default()),
            Err(AuthError::UnknownKey("other".to_string()))
        );
    }
}
