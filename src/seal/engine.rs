//! Sealing Engine
//!
//! Authenticated encryption of ticket numbers.
//!
//! ## Record layout
//!
//! ```text
//! plaintext   = bincode(NumberSet)
//! nonce       = 24 random bytes (fresh per seal)
//! ciphertext  = XChaCha20-Poly1305(key, nonce, plaintext, aad = ticket_id) || tag
//! commitment  = SHA-256(domain, ciphertext, nonce, ticket_id, sealed_at)
//! ```
//!
//! The 192-bit nonce makes random generation collision-safe, so nonces
//! never come from a counter that could be reset.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::core::numbers::NumberSet;
use crate::error::{LotteryError, TamperCause};
use crate::seal::commitment::CommitmentDigest;
use crate::seal::key::SealingKey;
use crate::ticket::TicketId;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypted ticket numbers plus their commitment.
///
/// Holds no key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedTicket {
    /// Ticket identifier, also bound as associated data.
    pub ticket_id: TicketId,
    /// Ciphertext with trailing authentication tag.
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    /// Per-seal nonce.
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    /// Digest published to the ledger.
    pub commitment_digest: CommitmentDigest,
    /// Seal time, millisecond precision.
    pub sealed_at: DateTime<Utc>,
}

impl SealedTicket {
    /// Recompute the digest over this record's own fields.
    pub fn verify_commitment(&self) -> bool {
        let expected = CommitmentDigest::compute(
            &self.ciphertext,
            &self.nonce,
            &self.ticket_id,
            self.sealed_at,
        );
        expected == self.commitment_digest
    }
}

/// Seals and unseals number sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct SealingEngine;

impl SealingEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `numbers` under a fresh key.
    ///
    /// The key is returned separately and is never part of the record.
    pub fn seal(&self, numbers: &NumberSet) -> Result<(SealedTicket, SealingKey), LotteryError> {
        let key = SealingKey::generate();
        let ticket_id = TicketId::generate();
        // millisecond precision so the digest survives a JSON round trip
        let sealed_at = Utc::now().trunc_subsecs(3);

        let plaintext = Zeroizing::new(
            bincode::serialize(numbers).map_err(|e| LotteryError::Internal(e.to_string()))?,
        );

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = encrypt_payload(&key, &nonce, &ticket_id, &plaintext)?;
        let commitment_digest = CommitmentDigest::compute(&ciphertext, &nonce, &ticket_id, sealed_at);

        debug!("Sealed ticket {} ({} bytes)", ticket_id, ciphertext.len());

        let sealed = SealedTicket {
            ticket_id,
            ciphertext,
            nonce: nonce.to_vec(),
            commitment_digest,
            sealed_at,
        };

        Ok((sealed, key))
    }

    /// Decrypt a sealed record.
    ///
    /// Never returns partial plaintext: any authentication failure is
    /// `TamperedRecord`.
    pub fn unseal(&self, sealed: &SealedTicket, key: &SealingKey) -> Result<NumberSet, LotteryError> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(LotteryError::MalformedCiphertext(format!(
                "nonce is {} bytes, expected {}",
                sealed.nonce.len(),
                NONCE_LEN
            )));
        }
        if sealed.ciphertext.len() <= TAG_LEN {
            return Err(LotteryError::MalformedCiphertext(format!(
                "ciphertext is {} bytes, shorter than tag plus payload",
                sealed.ciphertext.len()
            )));
        }

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let payload = Payload {
            msg: &sealed.ciphertext,
            aad: sealed.ticket_id.as_str().as_bytes(),
        };

        let plaintext = match cipher.decrypt(XNonce::from_slice(&sealed.nonce), payload) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(_) => {
                // an intact commitment means the record is as sealed, so the key is wrong
                let cause = if sealed.verify_commitment() {
                    TamperCause::WrongKey
                } else {
                    TamperCause::CorruptedRecord
                };
                warn!("Authentication failed for ticket {}: {}", sealed.ticket_id, cause);
                return Err(LotteryError::TamperedRecord {
                    ticket_id: sealed.ticket_id.clone(),
                    cause,
                });
            }
        };

        bincode::deserialize::<NumberSet>(&plaintext)
            .map_err(|e| LotteryError::CorruptPayload(e.to_string()))
    }

    /// Recompute and compare the commitment digest.
    pub fn verify_commitment(&self, sealed: &SealedTicket) -> bool {
        sealed.verify_commitment()
    }
}

fn encrypt_payload(
    key: &SealingKey,
    nonce: &[u8; NONCE_LEN],
    ticket_id: &TicketId,
    plaintext: &[u8],
) -> Result<Vec<u8>, LotteryError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let payload = Payload {
        msg: plaintext,
        aad: ticket_id.as_str().as_bytes(),
    };
    cipher
        .encrypt(XNonce::from_slice(nonce), payload)
        .map_err(|_| LotteryError::Internal("encryption failed".into()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numbers::draw;
    use proptest::prelude::*;

    fn sample_set() -> NumberSet {
        NumberSet::new(vec![7, 13, 21, 35, 42, 88], 99).unwrap()
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let engine = SealingEngine::new();
        let numbers = sample_set();

        let (sealed, key) = engine.seal(&numbers).unwrap();
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert!(sealed.ciphertext.len() > TAG_LEN);

        let opened = engine.unseal(&sealed, &key).unwrap();
        assert_eq!(opened, numbers);
    }

    #[test]
    fn test_ciphertext_hides_numbers() {
        let engine = SealingEngine::new();
        let numbers = sample_set();
        let plaintext = bincode::serialize(&numbers).unwrap();

        let (sealed, _key) = engine.seal(&numbers).unwrap();
        assert!(!sealed
            .ciphertext
            .windows(plaintext.len())
            .any(|w| w == plaintext.as_slice()));
    }

    #[test]
    fn test_fresh_key_and_nonce_per_seal() {
        let engine = SealingEngine::new();
        let numbers = sample_set();

        let (a, key_a) = engine.seal(&numbers).unwrap();
        let (b, key_b) = engine.seal(&numbers).unwrap();

        assert_ne!(key_a, key_b);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ticket_id, b.ticket_id);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_tampered() {
        let engine = SealingEngine::new();
        let (sealed, _key) = engine.seal(&sample_set()).unwrap();

        let result = engine.unseal(&sealed, &SealingKey::generate());
        assert!(matches!(
            result,
            Err(LotteryError::TamperedRecord { cause: TamperCause::WrongKey, .. })
        ));
    }

    #[test]
    fn test_ciphertext_bit_flips_are_tampered() {
        let engine = SealingEngine::new();
        let (sealed, key) = engine.seal(&sample_set()).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in [0u8, 3, 7] {
                let mut corrupted = sealed.clone();
                corrupted.ciphertext[byte] ^= 1 << bit;
                let result = engine.unseal(&corrupted, &key);
                assert!(
                    matches!(
                        result,
                        Err(LotteryError::TamperedRecord { cause: TamperCause::CorruptedRecord, .. })
                    ),
                    "flip at byte {} bit {} gave {:?}",
                    byte,
                    bit,
                    result
                );
            }
        }
    }

    #[test]
    fn test_nonce_bit_flips_are_tampered() {
        let engine = SealingEngine::new();
        let (sealed, key) = engine.seal(&sample_set()).unwrap();

        for byte in 0..NONCE_LEN {
            let mut corrupted = sealed.clone();
            corrupted.nonce[byte] ^= 0x01;
            assert!(matches!(
                engine.unseal(&corrupted, &key),
                Err(LotteryError::TamperedRecord { .. })
            ));
        }
    }

    #[test]
    fn test_ticket_id_is_authenticated() {
        let engine = SealingEngine::new();
        let (mut sealed, key) = engine.seal(&sample_set()).unwrap();
        sealed.ticket_id = TicketId::generate();

        assert!(matches!(
            engine.unseal(&sealed, &key),
            Err(LotteryError::TamperedRecord { .. })
        ));
    }

    #[test]
    fn test_malformed_lengths() {
        let engine = SealingEngine::new();
        let (sealed, key) = engine.seal(&sample_set()).unwrap();

        let mut short_nonce = sealed.clone();
        short_nonce.nonce.truncate(12);
        assert!(matches!(
            engine.unseal(&short_nonce, &key),
            Err(LotteryError::MalformedCiphertext(_))
        ));

        let mut short_cipher = sealed;
        short_cipher.ciphertext.truncate(TAG_LEN);
        assert!(matches!(
            engine.unseal(&short_cipher, &key),
            Err(LotteryError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_corrupt_payload() {
        // authentic ciphertext whose plaintext is not a number set
        let engine = SealingEngine::new();
        let key = SealingKey::generate();
        let ticket_id = TicketId::generate();
        let nonce = [9u8; NONCE_LEN];
        let bogus = bincode::serialize(&vec![5u32, 3, 3]).unwrap();
        let ciphertext = encrypt_payload(&key, &nonce, &ticket_id, &bogus).unwrap();
        let sealed_at = Utc::now().trunc_subsecs(3);

        let sealed = SealedTicket {
            commitment_digest: CommitmentDigest::compute(&ciphertext, &nonce, &ticket_id, sealed_at),
            ticket_id,
            ciphertext,
            nonce: nonce.to_vec(),
            sealed_at,
        };

        assert!(matches!(
            engine.unseal(&sealed, &key),
            Err(LotteryError::CorruptPayload(_))
        ));
    }

    #[test]
    fn test_verify_commitment() {
        let engine = SealingEngine::new();
        let (sealed, _key) = engine.seal(&sample_set()).unwrap();
        assert!(engine.verify_commitment(&sealed));

        let mut c = sealed.clone();
        c.ciphertext[0] ^= 0xFF;
        assert!(!engine.verify_commitment(&c));

        let mut n = sealed.clone();
        n.nonce[0] ^= 0xFF;
        assert!(!engine.verify_commitment(&n));

        let mut i = sealed.clone();
        i.ticket_id = TicketId::from("TICKET_OTHER");
        assert!(!engine.verify_commitment(&i));

        let mut t = sealed.clone();
        t.sealed_at = t.sealed_at + chrono::Duration::milliseconds(1);
        assert!(!engine.verify_commitment(&t));

        let mut d = sealed;
        d.commitment_digest.0[31] ^= 0x01;
        assert!(!engine.verify_commitment(&d));
    }

    #[test]
    fn test_commitment_survives_json() {
        let engine = SealingEngine::new();
        let (sealed, key) = engine.seal(&sample_set()).unwrap();

        let json = serde_json::to_string(&sealed).unwrap();
        let back: SealedTicket = serde_json::from_str(&json).unwrap();

        assert_eq!(back, sealed);
        assert!(back.verify_commitment());
        assert_eq!(engine.unseal(&back, &key).unwrap(), sample_set());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip(max in 6u32..500, count in 1u32..7) {
            let numbers = draw(count, max).unwrap();
            let engine = SealingEngine::new();
            let (sealed, key) = engine.seal(&numbers).unwrap();
            prop_assert_eq!(engine.unseal(&sealed, &key).unwrap(), numbers);
        }
    }
}
