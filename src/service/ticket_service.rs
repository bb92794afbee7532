//! Ticket Service
//!
//! Orchestrates purchase, reveal and round completion.
//!
//! Purchase order of operations:
//!
//! 1. check the round is open and the payment covers the ticket price
//! 2. draw numbers, seal them
//! 3. hand the key to key custody
//! 4. insert the sealed ticket (the local commit point)
//! 5. submit the commitment to the ledger and record the outcome
//!
//! A caller that abandons the future before step 4 leaves nothing
//! behind; after step 4 the ticket is fully stored with submission
//! `Pending` and can be resubmitted without redrawing.
//!
//! Every ledger attempt first claims the ticket (`Submitting`), so the
//! purchase path, explicit retries and the background sweep never submit
//! the same commitment concurrently, and a `Submitted` status is final.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::core::numbers::{DrawConfig, NumberSet};
use crate::core::price::Price;
use crate::error::{ErrorKind, LotteryError, LotteryResult};
use crate::round::{LotteryRound, RoundId, RoundManager, RoundState};
use crate::seal::{CommitmentDigest, SealingEngine, SealingKey};
use crate::service::ports::{KeyCustodyPort, LedgerPort};
use crate::ticket::{
    Owner, SubmissionClaim, SubmissionStatus, Ticket, TicketId, TicketStore, TxReference,
};

/// Upper bound on a configured sales window (ten years).
const MAX_ROUND_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Parameters for ticket and winning-number draws.
    pub draw: DrawConfig,
    /// Reject reveals until the ticket's round is completed.
    pub reveal_after_draw: bool,
    /// Sales window used when a round is opened without one.
    pub default_round_duration: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            draw: DrawConfig::default(),
            reveal_after_draw: false,
            default_round_duration: Duration::days(7),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> LotteryResult<Self> {
        let defaults = Self::default();
        let default_round_duration = std::env::var("SPIN_ROUND_DURATION_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::seconds(secs.min(MAX_ROUND_SECS)))
            .unwrap_or(defaults.default_round_duration);

        Ok(Self {
            draw: DrawConfig::from_env()?,
            reveal_after_draw: std::env::var("SPIN_REVEAL_AFTER_DRAW")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.reveal_after_draw),
            default_round_duration,
        })
    }
}

/// What a buyer gets back from a purchase.
///
/// Carries no plaintext numbers and no key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// The stored ticket (sealed).
    pub ticket: Ticket,
    /// Digest to anchor on the ledger.
    pub commitment_digest: CommitmentDigest,
    /// Ledger outcome of the first submission attempt.
    pub submission: SubmissionStatus,
}

/// Outcome of a revealed ticket against its round's draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketResult {
    /// Ticket checked.
    pub ticket_id: TicketId,
    /// Round the ticket played in.
    pub round_id: RoundId,
    /// Ticket numbers.
    pub numbers: NumberSet,
    /// Official draw.
    pub winning_numbers: NumberSet,
    /// Numbers present in both.
    pub matched: Vec<u32>,
    /// Every ticket number was drawn.
    pub jackpot_won: bool,
}

/// Entry point for the UI and server layers.
pub struct TicketService {
    config: ServiceConfig,
    engine: SealingEngine,
    tickets: TicketStore,
    rounds: RoundManager,
    ledger: Arc<dyn LedgerPort>,
    keys: Arc<dyn KeyCustodyPort>,
}

impl TicketService {
    /// Create a service with the given collaborators.
    pub fn new(
        config: ServiceConfig,
        ledger: Arc<dyn LedgerPort>,
        keys: Arc<dyn KeyCustodyPort>,
    ) -> Self {
        Self {
            config,
            engine: SealingEngine::new(),
            tickets: TicketStore::new(),
            rounds: RoundManager::new(),
            ledger,
            keys,
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // =========================================================================
    // ROUNDS
    // =========================================================================

    /// Open a round; `duration` defaults to the configured window.
    pub fn open_round(
        &self,
        ticket_price: Price,
        jackpot: Price,
        duration: Option<Duration>,
    ) -> LotteryResult<LotteryRound> {
        let duration = duration.unwrap_or(self.config.default_round_duration);
        self.rounds.open_round(ticket_price, jackpot, duration, Utc::now())
    }

    /// Stop sales for a round.
    pub fn close_round(&self, round_id: &RoundId) -> LotteryResult<LotteryRound> {
        self.rounds.close_round(round_id, Utc::now())
    }

    /// Close the open round if its window has passed.
    pub fn close_expired_rounds(&self) -> Option<RoundId> {
        self.rounds.close_expired(Utc::now())
    }

    /// Draw the winning numbers for a closed round.
    #[instrument(skip_all, fields(round = %round_id))]
    pub fn complete_round(&self, round_id: &RoundId) -> LotteryResult<NumberSet> {
        self.rounds.complete_round(round_id, &self.config.draw, Utc::now())
    }

    /// The round currently selling tickets.
    pub fn current_round(&self) -> Option<LotteryRound> {
        self.rounds.current(Utc::now())
    }

    /// Snapshot of a round.
    pub fn round(&self, round_id: &RoundId) -> LotteryResult<LotteryRound> {
        self.rounds.get(round_id)
    }

    /// All rounds, oldest first.
    pub fn rounds(&self) -> Vec<LotteryRound> {
        self.rounds.list()
    }

    // =========================================================================
    // TICKETS
    // =========================================================================

    /// Buy a ticket in an open round.
    #[instrument(skip_all, fields(owner = %owner, round = %round_id))]
    pub async fn purchase(
        &self,
        owner: &Owner,
        price: Price,
        round_id: &RoundId,
    ) -> LotteryResult<PurchaseReceipt> {
        let round = self.rounds.ensure_open(round_id, Utc::now())?;
        if price < round.ticket_price {
            return Err(LotteryError::InsufficientPayment {
                paid: price,
                required: round.ticket_price,
            });
        }

        let numbers = self.config.draw.draw()?;
        let (sealed, key) = self.engine.seal(&numbers)?;

        let ticket_id = sealed.ticket_id.clone();
        let commitment_digest = sealed.commitment_digest;

        self.keys
            .store(&ticket_id, key)
            .await
            .map_err(|e| LotteryError::KeyCustodyFailed(e.to_string()))?;

        // inserted claimed; no sweep may submit it alongside this attempt
        let mut ticket = Ticket::new(sealed, owner.clone(), round_id.clone(), price, Utc::now());
        ticket.submission = SubmissionStatus::Submitting;
        self.tickets.insert(ticket)?;
        let claim = ClaimGuard::new(&self.tickets, ticket_id.clone());
        self.rounds.record_sale(round_id)?;

        info!("Ticket {} sold, commitment {}", ticket_id, commitment_digest);

        let submission = self.submit(claim, &commitment_digest, price).await;
        let ticket = self.tickets.get(&ticket_id)?;

        Ok(PurchaseReceipt {
            ticket,
            commitment_digest,
            submission,
        })
    }

    /// Re-submit a ticket's commitment after a ledger failure.
    ///
    /// Already-submitted tickets return their existing reference; a
    /// ticket with an attempt in flight is `SubmissionInFlight`.
    pub async fn retry_submission(&self, ticket_id: &TicketId) -> LotteryResult<TxReference> {
        match self.tickets.claim_submission(ticket_id)? {
            SubmissionClaim::Submitted(tx_ref) => return Ok(tx_ref),
            SubmissionClaim::InFlight => {
                return Err(LotteryError::SubmissionInFlight(ticket_id.clone()));
            }
            SubmissionClaim::Claimed => {}
        }
        let claim = ClaimGuard::new(&self.tickets, ticket_id.clone());
        let ticket = self.tickets.get(ticket_id)?;

        match self
            .submit(claim, &ticket.sealed.commitment_digest, ticket.price)
            .await
        {
            SubmissionStatus::Submitted { tx_ref } => Ok(tx_ref),
            SubmissionStatus::Failed { reason } => Err(LotteryError::LedgerSubmissionFailed {
                ticket_id: ticket_id.clone(),
                reason,
            }),
            SubmissionStatus::Pending | SubmissionStatus::Submitting => {
                Err(LotteryError::Internal("submission outcome not recorded".into()))
            }
        }
    }

    /// Resubmit every ticket not yet on the ledger. Returns how many succeeded.
    ///
    /// Tickets with an attempt in flight are left to that attempt.
    pub async fn retry_pending_submissions(&self) -> usize {
        let mut submitted = 0;
        for ticket in self.tickets.pending_submissions() {
            match self.retry_submission(ticket.id()).await {
                Ok(_) => submitted += 1,
                Err(LotteryError::SubmissionInFlight(_)) => {}
                Err(e) if e.is_retryable() => debug!("{}, retrying on next sweep", e),
                Err(e) => warn!("Giving up on submission for {}: {}", ticket.id(), e),
            }
        }
        submitted
    }

    async fn submit(
        &self,
        claim: ClaimGuard<'_>,
        digest: &CommitmentDigest,
        price: Price,
    ) -> SubmissionStatus {
        let ticket_id = claim.ticket_id.clone();
        let status = match self.ledger.submit_commitment(&ticket_id, digest, price).await {
            Ok(tx_ref) => {
                debug!("Commitment for {} anchored as {}", ticket_id, tx_ref);
                SubmissionStatus::Submitted { tx_ref }
            }
            Err(e) => {
                let err = LotteryError::LedgerSubmissionFailed {
                    ticket_id: ticket_id.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
                SubmissionStatus::Failed { reason: e.to_string() }
            }
        };

        claim.finish(status)
    }

    /// Decrypt a ticket with `key` and mark it revealed.
    ///
    /// Only the caller that wins the `Sealed → Revealed` transition gets
    /// the numbers back.
    #[instrument(skip_all, fields(ticket = %ticket_id))]
    pub fn reveal(&self, ticket_id: &TicketId, key: &SealingKey) -> LotteryResult<NumberSet> {
        let ticket = self.tickets.get(ticket_id).map_err(log_failure)?;
        if ticket.is_revealed() {
            return Err(LotteryError::AlreadyRevealed(ticket_id.clone()));
        }

        if self.config.reveal_after_draw {
            let round = self.rounds.get(&ticket.round_id)?;
            if round.state != RoundState::Completed {
                return Err(LotteryError::RoundNotCompleted(ticket.round_id));
            }
        }

        let numbers = self.engine.unseal(&ticket.sealed, key).map_err(log_failure)?;
        self.tickets.mark_revealed(ticket_id, numbers.clone(), Utc::now())?;

        info!("Ticket {} revealed", ticket_id);
        Ok(numbers)
    }

    /// Reveal using the key held by key custody.
    pub async fn reveal_with_custody(&self, ticket_id: &TicketId) -> LotteryResult<NumberSet> {
        let key = self
            .keys
            .fetch(ticket_id)
            .await
            .map_err(|e| LotteryError::KeyCustodyFailed(e.to_string()))?
            .ok_or_else(|| LotteryError::KeyNotFound(ticket_id.clone()))?;
        self.reveal(ticket_id, &key)
    }

    /// Tickets owned by `owner`, in purchase order.
    pub fn list_by_owner(&self, owner: &Owner) -> Vec<Ticket> {
        self.tickets.list_by_owner(owner)
    }

    /// Snapshot of a ticket.
    pub fn ticket(&self, ticket_id: &TicketId) -> LotteryResult<Ticket> {
        self.tickets.get(ticket_id)
    }

    /// Compare a revealed ticket with its round's winning numbers.
    pub fn ticket_result(&self, ticket_id: &TicketId) -> LotteryResult<TicketResult> {
        let ticket = self.tickets.get(ticket_id)?;
        let numbers = ticket
            .numbers
            .clone()
            .ok_or_else(|| LotteryError::TicketNotRevealed(ticket_id.clone()))?;

        let round = self.rounds.get(&ticket.round_id)?;
        let winning_numbers = round
            .winning_numbers
            .ok_or_else(|| LotteryError::RoundNotCompleted(ticket.round_id.clone()))?;

        let matched = numbers.matches(&winning_numbers);
        let jackpot_won = matched.len() == numbers.len();

        Ok(TicketResult {
            ticket_id: ticket_id.clone(),
            round_id: ticket.round_id,
            numbers,
            winning_numbers,
            matched,
            jackpot_won,
        })
    }
}

/// Holds a submission claim; an unfinished claim goes back to `Pending`
/// when dropped, so abandoned attempts are picked up by the next sweep.
struct ClaimGuard<'a> {
    tickets: &'a TicketStore,
    ticket_id: TicketId,
    finished: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(tickets: &'a TicketStore, ticket_id: TicketId) -> Self {
        Self {
            tickets,
            ticket_id,
            finished: false,
        }
    }

    /// Store the attempt's outcome; returns the status actually kept.
    fn finish(mut self, status: SubmissionStatus) -> SubmissionStatus {
        self.finished = true;
        match self.tickets.set_submission(&self.ticket_id, status.clone()) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Could not record submission for {}: {}", self.ticket_id, e);
                status
            }
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.tickets.release_submission(&self.ticket_id) {
            error!("Could not release submission claim for {}: {}", self.ticket_id, e);
        }
    }
}

/// Integrity failures are logged loudly; plain misses are not.
fn log_failure(err: LotteryError) -> LotteryError {
    match err.kind() {
        ErrorKind::Integrity => error!("Integrity failure: {}", err),
        ErrorKind::NotFound => debug!("{}", err),
        _ => {}
    }
    err
}

// =============================================================================
// TESTS
// =============================================================================
