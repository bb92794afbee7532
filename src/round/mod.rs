//! Lottery Rounds
//!
//! Round windows and the official winning-number draw.

pub mod manager;

pub use manager::{LotteryRound, RoundId, RoundManager, RoundState};
