//! Ticket Records
//!
//! The full ticket held by the store: the sealed record plus ownership,
//! payment and visibility state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::numbers::NumberSet;
use crate::core::price::Price;
use crate::round::RoundId;
use crate::seal::SealedTicket;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique ticket identifier (`TICKET_<32 uppercase hex>`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("TICKET_{}", raw))
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TicketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wallet identity that owns a ticket.
///
/// Addresses are compared case-insensitively, so the handle is stored
/// lowercased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Owner(String);

impl Owner {
    /// Create from any address string.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_lowercase())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Owner {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self {
        owner.0
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Visibility of a ticket's numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    /// Numbers are only available as ciphertext.
    Sealed,
    /// Numbers were decrypted and attached. Terminal.
    Revealed,
}

/// Opaque reference returned by the ledger for a submitted commitment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(pub String);

impl std::fmt::Display for TxReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger submission status of a ticket's commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Not attempted yet, or the attempt was abandoned.
    Pending,
    /// An attempt is in flight.
    Submitting,
    /// Accepted by the ledger.
    Submitted {
        /// Ledger reference.
        tx_ref: TxReference,
    },
    /// Last attempt failed; may be retried.
    Failed {
        /// Collaborator message.
        reason: String,
    },
}

impl SubmissionStatus {
    /// Whether the ledger holds this commitment.
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    /// Whether a new attempt may be started.
    pub fn awaits_submission(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed { .. })
    }
}

// =============================================================================
// TICKET
// =============================================================================

/// A purchased ticket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ticket {
    /// Sealed numbers and commitment.
    pub sealed: SealedTicket,
    /// Wallet that bought the ticket.
    pub owner: Owner,
    /// Round the ticket was bought in.
    pub round_id: RoundId,
    /// Amount paid.
    pub price: Price,
    /// Purchase time.
    pub purchased_at: DateTime<Utc>,
    /// Sealed or revealed.
    pub reveal_state: RevealState,
    /// Plaintext numbers, present only once revealed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub numbers: Option<NumberSet>,
    /// Reveal time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revealed_at: Option<DateTime<Utc>>,
    /// Ledger submission status.
    pub submission: SubmissionStatus,
}

impl Ticket {
    /// Create a sealed ticket with pending submission.
    pub fn new(
        sealed: SealedTicket,
        owner: Owner,
        round_id: RoundId,
        price: Price,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sealed,
            owner,
            round_id,
            price,
            purchased_at,
            reveal_state: RevealState::Sealed,
            numbers: None,
            revealed_at: None,
            submission: SubmissionStatus::Pending,
        }
    }

    /// Ticket identifier.
    pub fn id(&self) -> &TicketId {
        &self.sealed.ticket_id
    }

    /// Whether the numbers are visible.
    pub fn is_revealed(&self) -> bool {
        self.reveal_state == RevealState::Revealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_format() {
        let id = TicketId::generate();
        let s = id.as_str();
        assert!(s.starts_with("TICKET_"));
        assert_eq!(s.len(), "TICKET_".len() + 32);
        assert!(s["TICKET_".len()..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(id, TicketId::generate());
    }

    #[test]
    fn test_owner_case_insensitive() {
        assert_eq!(Owner::new("0xABCdef"), Owner::new("0xabcdef"));
        assert_eq!(Owner::new(" 0xabc ").as_str(), "0xabc");

        let owner: Owner = serde_json::from_str("\"0xABC\"").unwrap();
        assert_eq!(owner.as_str(), "0xabc");
    }

    #[test]
    fn test_submission_status_json() {
        let status = SubmissionStatus::Submitted { tx_ref: TxReference("0x01".into()) };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"submitted\""));
        assert!(status.is_submitted());
        assert!(!SubmissionStatus::Pending.is_submitted());
    }
}
