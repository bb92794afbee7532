//! Sealing Keys
//!
//! One 256-bit key per ticket. Keys are wiped from memory on drop and
//! never appear in `Debug` output.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LotteryError;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Secret key for one sealed ticket.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey([u8; KEY_LEN]);

impl SealingKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string (64 characters).
    pub fn from_hex(s: &str) -> Result<Self, LotteryError> {
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| LotteryError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex for hand-off to key custody.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SealingKey {
    fn eq(&self, other: &Self) -> bool {
        // no early exit on the first differing byte
        self.0.iter().zip(other.0.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

impl Eq for SealingKey {}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(SealingKey::generate(), SealingKey::generate());
    }

    #[test]
    fn test_hex_roundtrip() {
        let key = SealingKey::generate();
        let hex = key.to_hex();
        assert_eq!(hex.len(), KEY_LEN * 2);
        assert_eq!(SealingKey::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(matches!(SealingKey::from_hex("zz"), Err(LotteryError::InvalidKey(_))));
        assert!(matches!(SealingKey::from_hex("abcd"), Err(LotteryError::InvalidKey(_))));
    }

    #[test]
    fn test_debug_redacts() {
        let key = SealingKey::from_bytes([0xAB; KEY_LEN]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("ab"));
        assert!(printed.contains("redacted"));
    }
}
