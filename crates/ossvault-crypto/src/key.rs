//! The stream secret key: 256-bit, zeroized on drop, never printed

use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use ossvault_core::{CryptError, CryptResult};

use crate::KEY_SIZE;

/// A 256-bit secret key. Zeroized on drop.
#[derive(Clone)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Any other length than 32 bytes is a configuration error.
    pub fn from_slice(bytes: &[u8]) -> CryptResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptError::invalid_config(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decode a standard-alphabet base64 key (as stored in ossvault.toml).
    pub fn from_base64(encoded: &str) -> CryptResult<Self> {
        let mut decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptError::invalid_config(format!("encryption key is not base64: {e}")))?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = SecretKey::generate();
        let k2 = SecretKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_base64_roundtrip() {
        let key = SecretKey::generate();
        let decoded = SecretKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), decoded.as_bytes());
    }

    #[test]
    fn test_zero_key_from_base64() {
        let key = SecretKey::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap();
        assert_eq!(key.as_bytes(), &[0u8; KEY_SIZE]);
    }

    #[test]
    fn test_wrong_length_is_invalid_configuration() {
        let err = SecretKey::from_slice(&[1u8; 16]).unwrap_err();
        assert!(matches!(err, CryptError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("got 16"));

        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 31]);
        assert!(matches!(
            SecretKey::from_base64(&short),
            Err(CryptError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_garbage_is_invalid_configuration() {
        assert!(matches!(
            SecretKey::from_base64("not base64 at all!"),
            Err(CryptError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::from_bytes([0x41; KEY_SIZE]);
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("65"));
    }
}
