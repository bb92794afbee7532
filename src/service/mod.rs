//! Ticket Service
//!
//! The orchestrating layer over sealing, the ticket store and rounds,
//! plus the ports for its external collaborators.

pub mod ports;
pub mod ticket_service;

pub use ports::{InMemoryKeyCustody, InMemoryLedger, KeyCustodyPort, LedgerPort, PortError};
pub use ticket_service::{PurchaseReceipt, ServiceConfig, TicketResult, TicketService};
