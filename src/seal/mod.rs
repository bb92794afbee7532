//! Ticket Sealing
//!
//! Hides a ticket's numbers until reveal while publishing a digest that
//! proves the sealed record existed at purchase time.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      SEALING                               │
//! ├────────────────────────────────────────────────────────────┤
//! │  key.rs        - Per-ticket 256-bit keys (zeroized)        │
//! │  engine.rs     - XChaCha20-Poly1305 seal / unseal          │
//! │  commitment.rs - SHA-256 commitment digest                 │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod engine;
pub mod key;

pub use commitment::CommitmentDigest;
pub use engine::{SealedTicket, SealingEngine, NONCE_LEN, TAG_LEN};
pub use key::{SealingKey, KEY_LEN};
