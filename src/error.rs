//! Lottery Errors
//!
//! One error type for the whole ticket lifecycle, grouped into kinds so
//! callers (and the wire layer) can react by category:
//!
//! | Kind         | Variants                                                    |
//! |--------------|-------------------------------------------------------------|
//! | Validation   | `InvalidRange`, `MalformedCiphertext`, `InvalidPrice`, ...  |
//! | Conflict     | `AlreadyRevealed`, `SubmissionInFlight`, round transitions  |
//! | Integrity    | `TamperedRecord`, `CorruptPayload`                          |
//! | NotFound     | `NotFound`, `KeyNotFound`                                   |
//! | External     | `LedgerSubmissionFailed`, `KeyCustodyFailed`                |
//!
//! Nothing here is retried automatically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::price::Price;
use crate::round::RoundId;
use crate::ticket::TicketId;

/// Result alias used across the crate.
pub type LotteryResult<T> = Result<T, LotteryError>;

/// Error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any state was touched.
    Validation,
    /// Misuse or lost race on a state transition.
    Conflict,
    /// Possible tampering or a format bug.
    Integrity,
    /// Referenced entity does not exist.
    NotFound,
    /// A collaborator (ledger, key custody) failed.
    External,
    /// Unexpected failure inside the crate.
    Internal,
}

/// Why authenticated decryption rejected a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperCause {
    /// The record's commitment still verifies, so the key is the likely culprit.
    WrongKey,
    /// The record no longer matches its own commitment.
    CorruptedRecord,
}

impl std::fmt::Display for TamperCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongKey => write!(f, "wrong key"),
            Self::CorruptedRecord => write!(f, "corrupted record"),
        }
    }
}

/// Errors produced by the ticket lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotteryError {
    /// Draw parameters outside `1 <= count <= max`.
    #[error("invalid range: count {count}, max {max}")]
    InvalidRange {
        /// Requested number count.
        count: u32,
        /// Upper bound of the number range.
        max: u32,
    },

    /// Sealed record fields have impossible lengths.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Price string could not be parsed.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Payment below the round's ticket price.
    #[error("insufficient payment: paid {paid} ETH, ticket costs {required} ETH")]
    InsufficientPayment {
        /// Amount offered.
        paid: Price,
        /// Round ticket price.
        required: Price,
    },

    /// Sealing key has the wrong encoding or length.
    #[error("invalid sealing key: {0}")]
    InvalidKey(String),

    /// Ticket id already present in the store.
    #[error("duplicate ticket id {0}")]
    DuplicateTicketId(TicketId),

    /// Ticket was revealed before.
    #[error("ticket {0} already revealed")]
    AlreadyRevealed(TicketId),

    /// Ticket has not been revealed yet.
    #[error("ticket {0} not revealed")]
    TicketNotRevealed(TicketId),

    /// Another round is open.
    #[error("round {0} is already open")]
    RoundAlreadyOpen(RoundId),

    /// Round does not accept tickets.
    #[error("round {0} is not open")]
    RoundNotOpen(RoundId),

    /// Round must be closed before the draw.
    #[error("round {0} is not closed")]
    RoundNotClosed(RoundId),

    /// Winning numbers were already drawn.
    #[error("round {0} already completed")]
    RoundAlreadyCompleted(RoundId),

    /// Winning numbers are not drawn yet.
    #[error("round {0} not completed")]
    RoundNotCompleted(RoundId),

    /// Authenticated decryption failed.
    #[error("tampered record for ticket {ticket_id}: {cause}")]
    TamperedRecord {
        /// Affected ticket.
        ticket_id: TicketId,
        /// Best guess at the reason.
        cause: TamperCause,
    },

    /// Decrypted bytes are not a number set.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// Entity lookup failed.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name ("ticket", "round").
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Another submission of the ticket's commitment is in flight.
    #[error("ledger submission for ticket {0} already in flight")]
    SubmissionInFlight(TicketId),

    /// Key custody holds no key for the ticket.
    #[error("no sealing key in custody for ticket {0}")]
    KeyNotFound(TicketId),

    /// Ledger rejected or failed the commitment submission.
    #[error("ledger submission failed for ticket {ticket_id}: {reason}")]
    LedgerSubmissionFailed {
        /// Ticket whose commitment was submitted.
        ticket_id: TicketId,
        /// Collaborator message.
        reason: String,
    },

    /// Key custody collaborator failed.
    #[error("key custody failed: {0}")]
    KeyCustodyFailed(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LotteryError {
    /// Shorthand for a missing ticket.
    pub fn ticket_not_found(id: &TicketId) -> Self {
        Self::NotFound { entity: "ticket", id: id.to_string() }
    }

    /// Shorthand for a missing round.
    pub fn round_not_found(id: &RoundId) -> Self {
        Self::NotFound { entity: "round", id: id.to_string() }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange { .. }
            | Self::MalformedCiphertext(_)
            | Self::InvalidPrice(_)
            | Self::InsufficientPayment { .. }
            | Self::InvalidKey(_) => ErrorKind::Validation,

            Self::DuplicateTicketId(_)
            | Self::AlreadyRevealed(_)
            | Self::TicketNotRevealed(_)
            | Self::RoundAlreadyOpen(_)
            | Self::RoundNotOpen(_)
            | Self::RoundNotClosed(_)
            | Self::RoundAlreadyCompleted(_)
            | Self::RoundNotCompleted(_)
            | Self::SubmissionInFlight(_) => ErrorKind::Conflict,

            Self::TamperedRecord { .. } | Self::CorruptPayload(_) => ErrorKind::Integrity,

            Self::NotFound { .. } | Self::KeyNotFound(_) => ErrorKind::NotFound,

            Self::LedgerSubmissionFailed { .. } | Self::KeyCustodyFailed(_) => ErrorKind::External,

            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-submitting the same request can succeed.
    ///
    /// Only external failures qualify: the local record is already valid.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::External
    }
}
