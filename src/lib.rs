//! # Spin Draw Lottery Server
//!
//! Commit-reveal lottery tickets: numbers are drawn and sealed at
//! purchase, a commitment digest is published, and the plaintext only
//! appears once the holder of the key reveals it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SPIN DRAW SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── numbers.rs  - Unique sorted number draws                │
//! │  ├── price.rs    - Wei amounts and ether parsing             │
//! │  └── hash.rs     - Domain-separated SHA-256                  │
//! │                                                              │
//! │  seal/           - Sealing and commitments                   │
//! │  ├── engine.rs   - XChaCha20-Poly1305 seal/unseal            │
//! │  ├── commitment.rs - Commitment digest                       │
//! │  └── key.rs      - Zeroizing sealing keys                    │
//! │                                                              │
//! │  ticket/         - Ticket records and indexed store          │
//! │  round/          - Round lifecycle and winning draw          │
//! │                                                              │
//! │  service/        - Orchestration                             │
//! │  ├── ticket_service.rs - purchase / reveal / results         │
//! │  └── ports.rs    - Ledger and key custody seams              │
//! │                                                              │
//! │  network/        - WebSocket front door                      │
//! │  ├── server.rs   - Connection loop and request routing       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - Wallet JWT validation                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A sealed ticket never exposes its numbers without the right key.
//! - Any change to ciphertext, nonce or ticket id fails unsealing.
//! - A ticket is revealed at most once, however many callers race.
//! - At most one round is open at a time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod network;
pub mod round;
pub mod seal;
pub mod service;
pub mod ticket;

// Re-export commonly used types
pub use crate::core::{DrawConfig, NumberSet, Price};
pub use error::{ErrorKind, LotteryError, LotteryResult, TamperCause};
pub use round::{LotteryRound, RoundId, RoundState};
pub use seal::{CommitmentDigest, SealedTicket, SealingEngine, SealingKey};
pub use service::{PurchaseReceipt, ServiceConfig, TicketResult, TicketService};
pub use ticket::{Owner, RevealState, SubmissionStatus, Ticket, TicketId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
