//! Collaborator Ports
//!
//! Capabilities the core needs but does not own: anchoring commitments
//! on a ledger and keeping sealing keys. Both are injected into the
//! service; the in-memory implementations back local runs and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::core::hash::DomainHasher;
use crate::core::price::Price;
use crate::seal::{CommitmentDigest, SealingKey};
use crate::ticket::{TicketId, TxReference};

/// Domain separator for simulated transaction references.
const TX_DOMAIN: &[u8] = b"SPIN_DRAW_TX_V1";

/// Failure reported by a collaborator.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// Collaborator could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Collaborator refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Publishes ticket commitments to a ledger.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Submit a commitment; returns the ledger's reference for it.
    async fn submit_commitment(
        &self,
        ticket_id: &TicketId,
        digest: &CommitmentDigest,
        price: Price,
    ) -> Result<TxReference, PortError>;
}

/// Holds sealing keys outside the core.
#[async_trait]
pub trait KeyCustodyPort: Send + Sync {
    /// Keep the key for `ticket_id`.
    async fn store(&self, ticket_id: &TicketId, key: SealingKey) -> Result<(), PortError>;

    /// Hand back the key for `ticket_id`, if held.
    async fn fetch(&self, ticket_id: &TicketId) -> Result<Option<SealingKey>, PortError>;
}

// =============================================================================
// IN-MEMORY LEDGER
// =============================================================================

/// A commitment accepted by [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Ticket the commitment belongs to.
    pub ticket_id: TicketId,
    /// Published digest.
    pub digest: CommitmentDigest,
    /// Payment attached to the transaction.
    pub value: Price,
    /// Reference handed back to the caller.
    pub tx_ref: TxReference,
}

/// Ledger that keeps commitments in memory.
///
/// References are `0x`-prefixed SHA-256 hashes over the submitted fields,
/// so resubmitting the same commitment yields the same reference.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<Vec<LedgerRecord>>,
    failing: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following submission fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepted commitments, oldest first.
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn submit_commitment(
        &self,
        ticket_id: &TicketId,
        digest: &CommitmentDigest,
        price: Price,
    ) -> Result<TxReference, PortError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("ledger offline".into()));
        }

        let mut hasher = DomainHasher::new(TX_DOMAIN);
        hasher.update_str(ticket_id.as_str());
        hasher.update_field(digest.as_bytes());
        hasher.update_u128(price.wei());
        let tx_ref = TxReference(format!("0x{}", hex::encode(hasher.finalize())));

        let mut records = self.records.lock();
        if let Some(existing) = records.iter().find(|r| &r.ticket_id == ticket_id) {
            return Ok(existing.tx_ref.clone());
        }
        records.push(LedgerRecord {
            ticket_id: ticket_id.clone(),
            digest: *digest,
            value: price,
            tx_ref: tx_ref.clone(),
        });

        debug!("Ledger accepted commitment {} for {}", digest, ticket_id);
        Ok(tx_ref)
    }
}

// =============================================================================
// IN-MEMORY KEY CUSTODY
// =============================================================================

/// Key custody backed by a map. Keys are zeroized when dropped.
#[derive(Default)]
pub struct InMemoryKeyCustody {
    keys: Mutex<BTreeMap<TicketId, SealingKey>>,
}

impl InMemoryKeyCustody {
    /// Create an empty custody.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether no keys are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyCustodyPort for InMemoryKeyCustody {
    async fn store(&self, ticket_id: &TicketId, key: SealingKey) -> Result<(), PortError> {
        let mut keys = self.keys.lock();
        if keys.contains_key(ticket_id) {
            return Err(PortError::Rejected(format!("key for {} already stored", ticket_id)));
        }
        keys.insert(ticket_id.clone(), key);
        Ok(())
    }

    async fn fetch(&self, ticket_id: &TicketId) -> Result<Option<SealingKey>, PortError> {
        Ok(self.keys.lock().get(ticket_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_records_commitment() {
        let ledger = InMemoryLedger::new();
        let id = TicketId::from("TICKET_1");
        let digest = CommitmentDigest([1; 32]);
        let price = Price::parse_ether("0.1").unwrap();

        let tx = ledger.submit_commitment(&id, &digest, price).await.unwrap();
        assert!(tx.0.starts_with("0x"));
        assert_eq!(tx.0.len(), 66);

        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].digest, digest);
        assert_eq!(records[0].value, price);
    }

    #[tokio::test]
    async fn test_ledger_resubmit_is_stable() {
        let ledger = InMemoryLedger::new();
        let id = TicketId::from("TICKET_1");
        let digest = CommitmentDigest([1; 32]);

        let a = ledger.submit_commitment(&id, &digest, Price::ZERO).await.unwrap();
        let b = ledger.submit_commitment(&id, &digest, Price::ZERO).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(ledger.records().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_toggle() {
        let ledger = InMemoryLedger::new();
        let id = TicketId::from("TICKET_1");
        let digest = CommitmentDigest([1; 32]);

        ledger.set_failing(true);
        assert!(ledger.submit_commitment(&id, &digest, Price::ZERO).await.is_err());
        assert!(ledger.records().is_empty());

        ledger.set_failing(false);
        assert!(ledger.submit_commitment(&id, &digest, Price::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_key_custody() {
        let custody = InMemoryKeyCustody::new();
        let id = TicketId::from("TICKET_1");
        let key = SealingKey::generate();

        custody.store(&id, key.clone()).await.unwrap();
        assert_eq!(custody.fetch(&id).await.unwrap(), Some(key.clone()));
        assert!(custody.fetch(&TicketId::from("TICKET_2")).await.unwrap().is_none());

        // keys are never overwritten
        assert!(custody.store(&id, SealingKey::generate()).await.is_err());
        assert_eq!(custody.fetch(&id).await.unwrap(), Some(key));
        assert_eq!(custody.len(), 1);
    }
}
