//! Lottery Number Sets
//!
//! Draws `count` distinct numbers from `[1, max]` using the operating
//! system CSPRNG. Ticket numbers must stay unpredictable until reveal,
//! so a seeded statistical generator is never used here.

use std::collections::BTreeSet;

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::LotteryError;

/// Numbers per ticket in the standard game.
pub const DEFAULT_COUNT: u32 = 6;

/// Highest number in the standard game.
pub const DEFAULT_MAX: u32 = 99;

/// Parameters shared by ticket draws and winning-number draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawConfig {
    /// Numbers per set.
    pub count: u32,
    /// Inclusive upper bound.
    pub max: u32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            max: DEFAULT_MAX,
        }
    }
}

impl DrawConfig {
    /// Create config from environment variables.
    ///
    /// `SPIN_DRAW_COUNT` and `SPIN_DRAW_MAX` override the defaults.
    pub fn from_env() -> Result<Self, LotteryError> {
        let defaults = Self::default();
        let config = Self {
            count: env_u32("SPIN_DRAW_COUNT").unwrap_or(defaults.count),
            max: env_u32("SPIN_DRAW_MAX").unwrap_or(defaults.max),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check `1 <= count <= max`.
    pub fn validate(&self) -> Result<(), LotteryError> {
        check_range(self.count, self.max)
    }

    /// Draw a set with these parameters.
    pub fn draw(&self) -> Result<NumberSet, LotteryError> {
        draw(self.count, self.max)
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn check_range(count: u32, max: u32) -> Result<(), LotteryError> {
    if count == 0 || max == 0 || count > max {
        return Err(LotteryError::InvalidRange { count, max });
    }
    Ok(())
}

/// Sorted set of distinct lottery numbers.
///
/// Always non-empty, strictly ascending, every element `>= 1`.
/// Deserialization enforces the same rules, so a decrypted payload
/// cannot smuggle in an unsorted or duplicated set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct NumberSet(Vec<u32>);

impl NumberSet {
    /// Build from arbitrary values, checking them against `max`.
    ///
    /// Values are sorted; duplicates, zero and out-of-range values are rejected.
    pub fn new(mut values: Vec<u32>, max: u32) -> Result<Self, LotteryError> {
        let count = values.len() as u32;
        check_range(count, max)?;
        values.sort_unstable();
        let in_range = values.iter().all(|&v| (1..=max).contains(&v));
        let distinct = values.windows(2).all(|w| w[0] < w[1]);
        if !in_range || !distinct {
            return Err(LotteryError::InvalidRange { count, max });
        }
        Ok(Self(values))
    }

    /// Numbers in ascending order.
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Number count.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `n` is in the set.
    pub fn contains(&self, n: u32) -> bool {
        self.0.binary_search(&n).is_ok()
    }

    /// Numbers present in both sets, ascending.
    pub fn matches(&self, other: &NumberSet) -> Vec<u32> {
        self.0.iter().copied().filter(|&n| other.contains(n)).collect()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl TryFrom<Vec<u32>> for NumberSet {
    type Error = LotteryError;

    fn try_from(values: Vec<u32>) -> Result<Self, Self::Error> {
        let count = values.len() as u32;
        let ascending = values.windows(2).all(|w| w[0] < w[1]);
        let positive = values.first().map_or(false, |&first| first >= 1);
        if count == 0 || !ascending || !positive {
            return Err(LotteryError::CorruptPayload(format!(
                "not a sorted set of distinct positive numbers: {:?}",
                values
            )));
        }
        Ok(Self(values))
    }
}

impl From<NumberSet> for Vec<u32> {
    fn from(set: NumberSet) -> Self {
        set.0
    }
}

impl std::fmt::Display for NumberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Draw `count` distinct numbers in `[1, max]` from the OS CSPRNG.
pub fn draw(count: u32, max: u32) -> Result<NumberSet, LotteryError> {
    draw_with(&mut OsRng, count, max)
}

/// Draw with a caller-supplied cryptographic RNG.
///
/// Samples uniformly without replacement: values already drawn are
/// rejected and re-drawn until the set is full.
pub fn draw_with<R>(rng: &mut R, count: u32, max: u32) -> Result<NumberSet, LotteryError>
where
    R: RngCore + CryptoRng,
{
    check_range(count, max)?;

    let mut picked = BTreeSet::new();
    while picked.len() < count as usize {
        picked.insert(rng.gen_range(1..=max));
    }

    Ok(NumberSet(picked.into_iter().collect()))
}

// =============================================================================
// TESTS
// =============================================================================
