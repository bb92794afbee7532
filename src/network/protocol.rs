//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object tagged by `type`. Binary fields
//! (ciphertext, nonce, digests, keys) travel as hex strings and
//! amounts as decimal ether strings.

use serde::{Deserialize, Serialize};

use crate::core::numbers::NumberSet;
use crate::core::price::Price;
use crate::error::{ErrorKind, LotteryError};
use crate::network::auth::AuthError;
use crate::round::{LotteryRound, RoundId};
use crate::service::{PurchaseReceipt, TicketResult};
use crate::ticket::{Ticket, TicketId, TxReference};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present a wallet session token.
    Auth {
        /// Signed JWT; `sub` is the wallet address.
        token: String,
    },

    /// Open a new round (admin).
    OpenRound {
        /// Minimum payment per ticket.
        ticket_price: Price,
        /// Advertised prize.
        jackpot: Price,
        /// Sales window; server default when absent.
        #[serde(default)]
        duration_secs: Option<u64>,
    },

    /// Stop sales for a round (admin).
    CloseRound {
        /// Round to close.
        round_id: RoundId,
    },

    /// Buy a ticket in the given round.
    Purchase {
        /// Round to buy into.
        round_id: RoundId,
        /// Payment in ether.
        price: Price,
    },

    /// Reveal a ticket with a key the client holds.
    Reveal {
        /// Ticket to reveal.
        ticket_id: TicketId,
        /// Sealing key, hex encoded.
        key: String,
    },

    /// Reveal a ticket with the key held in custody.
    RevealStored {
        /// Ticket to reveal.
        ticket_id: TicketId,
    },

    /// Draw the winning numbers for a closed round (admin).
    CompleteRound {
        /// Round to draw.
        round_id: RoundId,
    },

    /// List the caller's tickets.
    ListTickets,

    /// Fetch the round currently selling tickets.
    CurrentRound,

    /// Compare a revealed ticket with its round's draw.
    TicketResult {
        /// Ticket to check.
        ticket_id: TicketId,
    },

    /// Resubmit a ticket's commitment to the ledger.
    RetrySubmission {
        /// Ticket to resubmit.
        ticket_id: TicketId,
    },

    /// Latency probe.
    Ping {
        /// Client timestamp, echoed back.
        #[serde(default)]
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Whether the message needs an authenticated wallet.
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            ClientMessage::Auth { .. } | ClientMessage::CurrentRound | ClientMessage::Ping { .. }
        )
    }

    /// Whether the message needs the `admin` claim.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            ClientMessage::OpenRound { .. }
                | ClientMessage::CloseRound { .. }
                | ClientMessage::CompleteRound { .. }
        )
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Round snapshot (or none open).
    Round {
        /// The round, if any.
        round: Option<LotteryRound>,
    },

    /// Ticket bought. Carries no numbers and no key.
    Purchased(PurchaseReceipt),

    /// Ticket numbers after a successful reveal.
    Revealed {
        /// Revealed ticket.
        ticket_id: TicketId,
        /// Its numbers.
        numbers: NumberSet,
    },

    /// Winning numbers drawn.
    RoundCompleted {
        /// Completed round.
        round_id: RoundId,
        /// Official draw.
        winning_numbers: NumberSet,
    },

    /// The caller's tickets, in purchase order.
    Tickets {
        /// Ticket records.
        tickets: Vec<Ticket>,
    },

    /// Result of a ticket against its draw.
    TicketResult(TicketResult),

    /// Commitment anchored on the ledger.
    Submission {
        /// Ticket submitted.
        ticket_id: TicketId,
        /// Ledger reference.
        tx_ref: TxReference,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (Unix millis).
        server_time: u64,
    },

    /// Request failed.
    Error(ErrorInfo),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Normalized wallet address on success.
    pub owner: Option<String>,
    /// Whether the session may run round administration.
    #[serde(default)]
    pub admin: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Request needs an authenticated wallet.
    NotAuthenticated,
    /// Request needs the admin claim.
    Forbidden,
    /// Token expired.
    TokenExpired,
    /// Token malformed or signature bad.
    InvalidToken,
    /// Malformed frame or invalid argument.
    InvalidInput,
    /// Conflicts with current ticket or round state.
    Conflict,
    /// Ticket, round or key does not exist.
    NotFound,
    /// Sealed record failed verification.
    IntegrityFailure,
    /// Ledger or key custody unavailable.
    Unavailable,
    /// Unexpected server error.
    InternalError,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::InvalidInput,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::Integrity => ErrorCode::IntegrityFailure,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::External => ErrorCode::Unavailable,
            ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

impl From<&AuthError> for ErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::NotConfigured => ErrorCode::AuthFailed,
            _ => ErrorCode::InvalidToken,
        }
    }
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorInfo {
            code,
            message: message.into(),
        })
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<&LotteryError> for ServerMessage {
    fn from(err: &LotteryError) -> Self {
        ServerMessage::error(err.kind().into(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TamperCause;

    #[test]
    fn test_parse_purchase() {
        let json = r#"{"type":"purchase","round_id":"ROUND_1","price":"0.1"}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Purchase { round_id, price } => {
                assert_eq!(round_id, RoundId::from("ROUND_1"));
                assert_eq!(price, Price::parse_ether("0.1").unwrap());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unit_variants() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"list_tickets"}"#).unwrap(),
            ClientMessage::ListTickets
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"current_round"}"#).unwrap(),
            ClientMessage::CurrentRound
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping { timestamp: 0 }
        ));
    }

    #[test]
    fn test_parse_open_round_optional_duration() {
        let json = r#"{"type":"open_round","ticket_price":"0.1","jackpot":"10"}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::OpenRound { jackpot, duration_secs, .. } => {
                assert_eq!(jackpot, Price::parse_ether("10").unwrap());
                assert_eq!(duration_secs, None);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_price_and_unknown_type() {
        assert!(ClientMessage::from_json(r#"{"type":"purchase","round_id":"R","price":"-1"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"steal_jackpot"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_auth_and_admin_requirements() {
        assert!(!ClientMessage::Ping { timestamp: 0 }.requires_auth());
        assert!(!ClientMessage::CurrentRound.requires_auth());
        assert!(ClientMessage::ListTickets.requires_auth());
        assert!(!ClientMessage::ListTickets.requires_admin());

        let complete = ClientMessage::CompleteRound {
            round_id: RoundId::from("ROUND_1"),
        };
        assert!(complete.requires_auth());
        assert!(complete.requires_admin());
    }

    #[test]
    fn test_server_message_tagging() {
        let msg = ServerMessage::Revealed {
            ticket_id: TicketId::from("TICKET_A"),
            numbers: NumberSet::new(vec![3, 1, 2], 99).unwrap(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "revealed");
        assert_eq!(value["ticket_id"], "TICKET_A");
        assert_eq!(value["numbers"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_error_mapping() {
        let err = LotteryError::TamperedRecord {
            ticket_id: TicketId::from("TICKET_A"),
            cause: TamperCause::WrongKey,
        };
        match ServerMessage::from(&err) {
            ServerMessage::Error(info) => assert_eq!(info.code, ErrorCode::IntegrityFailure),
            other => panic!("Wrong message type: {:?}", other),
        }

        let err = LotteryError::AlreadyRevealed(TicketId::from("TICKET_A"));
        let json = ServerMessage::from(&err).to_json().unwrap();
        assert!(json.contains(r#""code":"conflict""#));

        assert_eq!(ErrorCode::from(&AuthError::Expired), ErrorCode::TokenExpired);
        assert_eq!(ErrorCode::from(&AuthError::InvalidSignature), ErrorCode::InvalidToken);
    }
}
