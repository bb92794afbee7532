//! Lottery Round Management
//!
//! Round lifecycle:
//!
//! ```text
//! Open ──(closes_at reached | explicit close)──▶ Closed ──(draw)──▶ Completed
//! ```
//!
//! At most one round is `Open`. All transitions run under a single lock,
//! so opening, closing and drawing can never interleave.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::numbers::{DrawConfig, NumberSet};
use crate::core::price::Price;
use crate::error::{LotteryError, LotteryResult};

/// Unique round identifier (`ROUND_<unix millis>_<8 hex>`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(String);

impl RoundId {
    /// Generate an id for a round opened at `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ROUND_{}_{}", now.timestamp_millis(), &suffix[..8]))
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoundId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Round state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// Selling tickets.
    Open,
    /// Sales stopped, waiting for the draw.
    Closed,
    /// Winning numbers drawn. Terminal.
    Completed,
}

/// A lottery round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryRound {
    /// Round identifier.
    pub round_id: RoundId,
    /// Minimum payment per ticket.
    pub ticket_price: Price,
    /// Advertised prize.
    pub jackpot: Price,
    /// When sales opened.
    pub opened_at: DateTime<Utc>,
    /// When sales close.
    pub closes_at: DateTime<Utc>,
    /// Current state.
    pub state: RoundState,
    /// Tickets sold so far.
    pub tickets_sold: u64,
    /// Set only once `Completed`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winning_numbers: Option<NumberSet>,
    /// Draw time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LotteryRound {
    /// Whether the sales window has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.closes_at
    }

    /// Whether tickets can be bought right now.
    pub fn accepts_tickets(&self, now: DateTime<Utc>) -> bool {
        self.state == RoundState::Open && !self.is_expired(now)
    }
}

#[derive(Default)]
struct Rounds {
    by_id: BTreeMap<RoundId, LotteryRound>,
    order: Vec<RoundId>,
    open: Option<RoundId>,
}

impl Rounds {
    fn get_mut(&mut self, id: &RoundId) -> LotteryResult<&mut LotteryRound> {
        self.by_id.get_mut(id).ok_or_else(|| LotteryError::round_not_found(id))
    }

    /// Close the open round if its window has passed.
    fn expire(&mut self, now: DateTime<Utc>) -> Option<RoundId> {
        let id = self.open.clone()?;
        let round = self.by_id.get_mut(&id)?;
        if !round.is_expired(now) {
            return None;
        }
        round.state = RoundState::Closed;
        self.open = None;
        info!("Round {} closed at end of sales window", id);
        Some(id)
    }
}

/// Owns all rounds and guards their transitions.
#[derive(Default)]
pub struct RoundManager {
    rounds: Mutex<Rounds>,
}

impl RoundManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new round selling for `duration` from `now`.
    pub fn open_round(
        &self,
        ticket_price: Price,
        jackpot: Price,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> LotteryResult<LotteryRound> {
        let mut rounds = self.rounds.lock();
        rounds.expire(now);

        if let Some(open) = &rounds.open {
            return Err(LotteryError::RoundAlreadyOpen(open.clone()));
        }

        let round = LotteryRound {
            round_id: RoundId::generate(now),
            ticket_price,
            jackpot,
            opened_at: now,
            closes_at: now + duration,
            state: RoundState::Open,
            tickets_sold: 0,
            winning_numbers: None,
            completed_at: None,
        };

        let id = round.round_id.clone();
        rounds.by_id.insert(id.clone(), round.clone());
        rounds.order.push(id.clone());
        rounds.open = Some(id.clone());

        info!("Opened round {} (ticket {} ETH, jackpot {} ETH)", id, ticket_price, jackpot);
        Ok(round)
    }

    /// Stop ticket sales for an open round.
    pub fn close_round(&self, id: &RoundId, now: DateTime<Utc>) -> LotteryResult<LotteryRound> {
        let mut rounds = self.rounds.lock();
        rounds.expire(now);

        let round = rounds.get_mut(id)?;
        match round.state {
            RoundState::Open => {
                round.state = RoundState::Closed;
                let closed = round.clone();
                rounds.open = None;
                info!("Round {} closed", id);
                Ok(closed)
            }
            // the window ran out just now; closing is what the caller wanted
            RoundState::Closed if round.closes_at <= now => Ok(round.clone()),
            _ => Err(LotteryError::RoundNotOpen(id.clone())),
        }
    }

    /// Close the open round if its sales window has passed.
    pub fn close_expired(&self, now: DateTime<Utc>) -> Option<RoundId> {
        self.rounds.lock().expire(now)
    }

    /// Draw the winning numbers of a closed round.
    ///
    /// Never redraws: a completed round keeps its numbers forever.
    pub fn complete_round(
        &self,
        id: &RoundId,
        draw: &DrawConfig,
        now: DateTime<Utc>,
    ) -> LotteryResult<NumberSet> {
        let mut rounds = self.rounds.lock();
        rounds.expire(now);

        let round = rounds.get_mut(id)?;
        match round.state {
            RoundState::Open => Err(LotteryError::RoundNotClosed(id.clone())),
            RoundState::Completed => {
                warn!("Round {} already completed, refusing to redraw", id);
                Err(LotteryError::RoundAlreadyCompleted(id.clone()))
            }
            RoundState::Closed => {
                let winning = draw.draw()?;
                round.winning_numbers = Some(winning.clone());
                round.completed_at = Some(now);
                round.state = RoundState::Completed;
                info!("Round {} completed, winning numbers {}", id, winning);
                Ok(winning)
            }
        }
    }

    /// Require `id` to be open for sales at `now`.
    pub fn ensure_open(&self, id: &RoundId, now: DateTime<Utc>) -> LotteryResult<LotteryRound> {
        let mut rounds = self.rounds.lock();
        rounds.expire(now);

        let round = rounds.get_mut(id)?;
        if round.state != RoundState::Open {
            return Err(LotteryError::RoundNotOpen(id.clone()));
        }
        Ok(round.clone())
    }

    /// Count one more ticket sold.
    pub fn record_sale(&self, id: &RoundId) -> LotteryResult<()> {
        let mut rounds = self.rounds.lock();
        let round = rounds.get_mut(id)?;
        round.tickets_sold += 1;
        Ok(())
    }

    /// Snapshot of a round.
    pub fn get(&self, id: &RoundId) -> LotteryResult<LotteryRound> {
        let rounds = self.rounds.lock();
        rounds.by_id.get(id).cloned().ok_or_else(|| LotteryError::round_not_found(id))
    }

    /// The round currently selling tickets, if any.
    pub fn current(&self, now: DateTime<Utc>) -> Option<LotteryRound> {
        let mut rounds = self.rounds.lock();
        rounds.expire(now);
        let id = rounds.open.clone()?;
        rounds.by_id.get(&id).cloned()
    }

    /// All rounds, oldest first.
    pub fn list(&self) -> Vec<LotteryRound> {
        let rounds = self.rounds.lock();
        rounds.order.iter().filter_map(|id| rounds.by_id.get(id).cloned()).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
