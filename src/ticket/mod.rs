//! Tickets
//!
//! Ticket records and the indexed store that owns them.

pub mod store;
pub mod types;

pub use store::{SubmissionClaim, TicketStore};
pub use types::{Owner, RevealState, SubmissionStatus, Ticket, TicketId, TxReference};
