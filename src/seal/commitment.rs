//! Ticket Commitment Digests
//!
//! The digest published to the ledger at purchase. It binds the sealed
//! bytes to the ticket without revealing the numbers; anyone holding the
//! record can recompute it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::hash::{DomainHasher, Hash32};
use crate::ticket::TicketId;

/// Domain separator for commitments.
const COMMITMENT_DOMAIN: &[u8] = b"SPIN_DRAW_COMMIT_V1";

/// SHA-256 commitment over a sealed ticket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentDigest(#[serde(with = "hex::serde")] pub Hash32);

impl CommitmentDigest {
    /// Compute from the sealed fields.
    ///
    /// Field order: ciphertext, nonce, ticket id, sealed-at (unix millis).
    pub fn compute(
        ciphertext: &[u8],
        nonce: &[u8],
        ticket_id: &TicketId,
        sealed_at: DateTime<Utc>,
    ) -> Self {
        let mut hasher = DomainHasher::new(COMMITMENT_DOMAIN);
        hasher.update_field(ciphertext);
        hasher.update_field(nonce);
        hasher.update_str(ticket_id.as_str());
        hasher.update_i64(sealed_at.timestamp_millis());
        Self(hasher.finalize())
    }

    /// `0x`-prefixed hex, the form submitted to the ledger.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }
}

impl std::fmt::Debug for CommitmentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommitmentDigest({})", self.to_hex())
    }
}

impl std::fmt::Display for CommitmentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_commitment_determinism() {
        let id = TicketId::from("TICKET_1");
        let d1 = CommitmentDigest::compute(b"cipher", b"nonce", &id, at(1_700_000_000_000));
        let d2 = CommitmentDigest::compute(b"cipher", b"nonce", &id, at(1_700_000_000_000));
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_every_field_is_bound() {
        let id = TicketId::from("TICKET_1");
        let base = CommitmentDigest::compute(b"cipher", b"nonce", &id, at(1000));

        assert_ne!(base, CommitmentDigest::compute(b"cipheR", b"nonce", &id, at(1000)));
        assert_ne!(base, CommitmentDigest::compute(b"cipher", b"noncE", &id, at(1000)));
        assert_ne!(base, CommitmentDigest::compute(b"cipher", b"nonce", &TicketId::from("TICKET_2"), at(1000)));
        assert_ne!(base, CommitmentDigest::compute(b"cipher", b"nonce", &id, at(1001)));
    }

    #[test]
    fn test_shifted_boundary_changes_digest() {
        let id = TicketId::from("TICKET_1");
        let a = CommitmentDigest::compute(b"ciphern", b"once", &id, at(0));
        let b = CommitmentDigest::compute(b"cipher", b"nonce", &id, at(0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_forms() {
        let digest = CommitmentDigest([0xAB; 32]);
        assert_eq!(digest.to_hex(), format!("0x{}", "ab".repeat(32)));

        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: CommitmentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
