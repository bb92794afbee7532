//! Ticket Store
//!
//! Indexed ticket records: id → record and owner → ids.
//!
//! The index sits behind one `RwLock` that is held only for lookups and
//! inserts. Each record has its own `Mutex`, which is the serialization
//! point for state transitions: concurrent reveals of the same ticket
//! contend on that mutex and nothing else.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::core::numbers::NumberSet;
use crate::error::{LotteryError, LotteryResult};
use crate::ticket::types::{Owner, RevealState, SubmissionStatus, Ticket, TicketId, TxReference};

type Entry = Arc<Mutex<Ticket>>;

/// Outcome of [`TicketStore::claim_submission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionClaim {
    /// The caller now owns the attempt and must finish or release it.
    Claimed,
    /// Another attempt holds the claim.
    InFlight,
    /// Already on the ledger.
    Submitted(TxReference),
}

#[derive(Default)]
struct Index {
    tickets: BTreeMap<TicketId, Entry>,
    by_owner: BTreeMap<Owner, Vec<TicketId>>,
    /// Insertion order, used for pending-submission scans.
    order: Vec<TicketId>,
}

/// In-memory ticket table with an owner index.
#[derive(Default)]
pub struct TicketStore {
    index: RwLock<Index>,
}

impl TicketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new ticket.
    ///
    /// The record and its owner index entry become visible together.
    pub fn insert(&self, ticket: Ticket) -> LotteryResult<()> {
        let id = ticket.id().clone();
        let owner = ticket.owner.clone();

        let mut index = self.index.write();
        if index.tickets.contains_key(&id) {
            return Err(LotteryError::DuplicateTicketId(id));
        }

        index.tickets.insert(id.clone(), Arc::new(Mutex::new(ticket)));
        index.by_owner.entry(owner).or_default().push(id.clone());
        index.order.push(id.clone());

        debug!("Stored ticket {}", id);
        Ok(())
    }

    /// Snapshot of a ticket.
    pub fn get(&self, id: &TicketId) -> LotteryResult<Ticket> {
        let entry = self.entry(id)?;
        let ticket = entry.lock().clone();
        Ok(ticket)
    }

    /// Tickets of `owner` in insertion order.
    pub fn list_by_owner(&self, owner: &Owner) -> Vec<Ticket> {
        let entries: Vec<Entry> = {
            let index = self.index.read();
            match index.by_owner.get(owner) {
                Some(ids) => ids.iter().filter_map(|id| index.tickets.get(id).cloned()).collect(),
                None => Vec::new(),
            }
        };

        entries.iter().map(|e| e.lock().clone()).collect()
    }

    /// Transition `Sealed → Revealed` and attach the numbers.
    ///
    /// Compare-and-set under the record's lock: exactly one caller wins,
    /// every other caller gets `AlreadyRevealed`.
    pub fn mark_revealed(
        &self,
        id: &TicketId,
        numbers: NumberSet,
        revealed_at: DateTime<Utc>,
    ) -> LotteryResult<()> {
        let entry = self.entry(id)?;
        let mut ticket = entry.lock();

        if ticket.reveal_state == RevealState::Revealed {
            return Err(LotteryError::AlreadyRevealed(id.clone()));
        }

        ticket.reveal_state = RevealState::Revealed;
        ticket.numbers = Some(numbers);
        ticket.revealed_at = Some(revealed_at);
        Ok(())
    }

    /// Take the right to submit a ticket's commitment.
    ///
    /// Compare-and-set under the record's lock: `Pending`/`Failed` become
    /// `Submitting` for exactly one caller. Everyone else learns why not.
    pub fn claim_submission(&self, id: &TicketId) -> LotteryResult<SubmissionClaim> {
        let entry = self.entry(id)?;
        let mut ticket = entry.lock();

        match &ticket.submission {
            SubmissionStatus::Submitted { tx_ref } => Ok(SubmissionClaim::Submitted(tx_ref.clone())),
            SubmissionStatus::Submitting => Ok(SubmissionClaim::InFlight),
            SubmissionStatus::Pending | SubmissionStatus::Failed { .. } => {
                ticket.submission = SubmissionStatus::Submitting;
                Ok(SubmissionClaim::Claimed)
            }
        }
    }

    /// Record the outcome of a submission attempt.
    ///
    /// `Submitted` is terminal and is never overwritten. Returns the
    /// status actually stored.
    pub fn set_submission(
        &self,
        id: &TicketId,
        status: SubmissionStatus,
    ) -> LotteryResult<SubmissionStatus> {
        let entry = self.entry(id)?;
        let mut ticket = entry.lock();

        if ticket.submission.is_submitted() {
            if ticket.submission != status {
                debug!("Ignoring {:?} for {}, already submitted", status, id);
            }
            return Ok(ticket.submission.clone());
        }

        ticket.submission = status;
        Ok(ticket.submission.clone())
    }

    /// Give back a claim whose attempt never finished.
    pub fn release_submission(&self, id: &TicketId) -> LotteryResult<()> {
        let entry = self.entry(id)?;
        let mut ticket = entry.lock();
        if ticket.submission == SubmissionStatus::Submitting {
            ticket.submission = SubmissionStatus::Pending;
        }
        Ok(())
    }

    /// Tickets whose commitment is neither on the ledger nor being
    /// submitted, oldest first.
    pub fn pending_submissions(&self) -> Vec<Ticket> {
        let entries: Vec<Entry> = {
            let index = self.index.read();
            index.order.iter().filter_map(|id| index.tickets.get(id).cloned()).collect()
        };

        entries
            .iter()
            .filter_map(|e| {
                let ticket = e.lock();
                ticket.submission.awaits_submission().then(|| ticket.clone())
            })
            .collect()
    }

    /// Number of stored tickets.
    pub fn len(&self) -> usize {
        self.index.read().tickets.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &TicketId) -> LotteryResult<Entry> {
        self.index
            .read()
            .tickets
            .get(id)
            .cloned()
            .ok_or_else(|| LotteryError::ticket_not_found(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::Price;
    use crate::round::RoundId;
    use crate::seal::SealingEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers() -> NumberSet {
        NumberSet::new(vec![1, 2, 3, 4, 5, 6], 99).unwrap()
    }

    fn make_ticket(owner: &str) -> Ticket {
        let (sealed, _key) = SealingEngine::new().seal(&numbers()).unwrap();
        Ticket::new(
            sealed,
            Owner::new(owner),
            RoundId::from("ROUND_TEST"),
            Price::parse_ether("0.1").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();

        store.insert(ticket).unwrap();
        assert_eq!(store.len(), 1);

        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.id(), &id);
        assert_eq!(fetched.reveal_state, RevealState::Sealed);
        assert!(fetched.numbers.is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        store.insert(ticket.clone()).unwrap();

        let result = store.insert(ticket);
        assert!(matches!(result, Err(LotteryError::DuplicateTicketId(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.list_by_owner(&Owner::new("0xabc")).len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let store = TicketStore::new();
        let result = store.get(&TicketId::from("TICKET_NOPE"));
        assert!(matches!(result, Err(LotteryError::NotFound { entity: "ticket", .. })));
    }

    #[test]
    fn test_list_by_owner_order_and_scope() {
        let store = TicketStore::new();
        let mut mine = Vec::new();
        for i in 0..5 {
            let t = make_ticket(if i % 2 == 0 { "0xAbC" } else { "0xdef" });
            if i % 2 == 0 {
                mine.push(t.id().clone());
            }
            store.insert(t).unwrap();
        }

        let listed: Vec<TicketId> = store
            .list_by_owner(&Owner::new("0xabc"))
            .iter()
            .map(|t| t.id().clone())
            .collect();
        assert_eq!(listed, mine);
        assert!(store.list_by_owner(&Owner::new("0x999")).is_empty());
    }

    #[test]
    fn test_mark_revealed_once() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();
        store.insert(ticket).unwrap();

        store.mark_revealed(&id, numbers(), Utc::now()).unwrap();
        let revealed = store.get(&id).unwrap();
        assert!(revealed.is_revealed());
        assert_eq!(revealed.numbers, Some(numbers()));
        assert!(revealed.revealed_at.is_some());

        let second = store.mark_revealed(&id, numbers(), Utc::now());
        assert!(matches!(second, Err(LotteryError::AlreadyRevealed(_))));
    }

    #[test]
    fn test_mark_revealed_missing() {
        let store = TicketStore::new();
        let result = store.mark_revealed(&TicketId::from("TICKET_NOPE"), numbers(), Utc::now());
        assert!(matches!(result, Err(LotteryError::NotFound { .. })));
    }

    #[test]
    fn test_concurrent_mark_revealed() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();
        store.insert(ticket).unwrap();

        let wins = AtomicUsize::new(0);
        let losses = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| match store.mark_revealed(&id, numbers(), Utc::now()) {
                    Ok(()) => {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(LotteryError::AlreadyRevealed(_)) => {
                        losses.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(losses.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_submission_tracking() {
        let store = TicketStore::new();
        let a = make_ticket("0xabc");
        let b = make_ticket("0xabc");
        let (a_id, b_id) = (a.id().clone(), b.id().clone());
        store.insert(a).unwrap();
        store.insert(b).unwrap();

        assert_eq!(store.pending_submissions().len(), 2);

        store
            .set_submission(&a_id, SubmissionStatus::Submitted { tx_ref: TxReference("0x1".into()) })
            .unwrap();
        store
            .set_submission(&b_id, SubmissionStatus::Failed { reason: "down".into() })
            .unwrap();

        let pending = store.pending_submissions();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), &b_id);
    }

    #[test]
    fn test_submitted_is_never_downgraded() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();
        store.insert(ticket).unwrap();

        let accepted = SubmissionStatus::Submitted { tx_ref: TxReference("0xaccepted".into()) };
        store.set_submission(&id, accepted.clone()).unwrap();

        let stored = store
            .set_submission(&id, SubmissionStatus::Failed { reason: "timeout".into() })
            .unwrap();
        assert_eq!(stored, accepted);
        assert_eq!(store.set_submission(&id, SubmissionStatus::Pending).unwrap(), accepted);
        assert_eq!(store.get(&id).unwrap().submission, accepted);
        assert!(store.pending_submissions().is_empty());
    }

    #[test]
    fn test_claim_submission() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();
        store.insert(ticket).unwrap();

        assert_eq!(store.claim_submission(&id).unwrap(), SubmissionClaim::Claimed);
        assert_eq!(store.claim_submission(&id).unwrap(), SubmissionClaim::InFlight);
        assert!(store.pending_submissions().is_empty());

        // an abandoned attempt goes back to the sweep
        store.release_submission(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().submission, SubmissionStatus::Pending);
        assert_eq!(store.pending_submissions().len(), 1);

        assert_eq!(store.claim_submission(&id).unwrap(), SubmissionClaim::Claimed);
        let tx_ref = TxReference("0x2".into());
        store
            .set_submission(&id, SubmissionStatus::Submitted { tx_ref: tx_ref.clone() })
            .unwrap();
        store.release_submission(&id).unwrap();
        assert_eq!(store.claim_submission(&id).unwrap(), SubmissionClaim::Submitted(tx_ref));
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = TicketStore::new();
        let ticket = make_ticket("0xabc");
        let id = ticket.id().clone();
        store.insert(ticket).unwrap();

        let claimed = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    if store.claim_submission(&id).unwrap() == SubmissionClaim::Claimed {
                        claimed.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(claimed.load(Ordering::SeqCst), 1);
    }
}
