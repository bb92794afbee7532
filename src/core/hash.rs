//! Domain-Separated Hashing
//!
//! SHA-256 helpers for commitment digests and ledger references.
//! Variable-length fields are length-prefixed so that two different
//! field splits can never hash to the same preimage.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type Hash32 = [u8; 32];

/// Incremental hasher with a domain separator.
///
/// Order of updates is part of the format.
pub struct DomainHasher {
    hasher: Sha256,
}

impl DomainHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with a length-prefixed byte field.
    #[inline]
    pub fn update_field(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Update with a length-prefixed UTF-8 string.
    #[inline]
    pub fn update_str(&mut self, s: &str) {
        self.update_field(s.as_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u128 value (little-endian).
    #[inline]
    pub fn update_u128(&mut self, value: u128) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Hash32 {
        self.hasher.finalize().into()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_determinism() {
        let make_hash = || {
            let mut hasher = DomainHasher::new(b"test");
            hasher.update_field(b"abc");
            hasher.update_i64(-5);
            hasher.update_u128(7);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_field_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc"
        let hash1 = {
            let mut h = DomainHasher::new(b"test");
            h.update_field(b"ab");
            h.update_field(b"c");
            h.finalize()
        };

        let hash2 = {
            let mut h = DomainHasher::new(b"test");
            h.update_field(b"a");
            h.update_field(b"bc");
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash_in = |domain: &[u8]| {
            let mut h = DomainHasher::new(domain);
            h.update_field(&data);
            h.finalize()
        };

        let hash1 = hash_in(b"DOMAIN_A");
        let hash2 = hash_in(b"DOMAIN_B");

        assert_ne!(hash1, hash2);
    }
}
