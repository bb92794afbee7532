//! Ticket Prices
//!
//! Amounts are held in wei (10^-18 ETH) so arithmetic is exact.
//! The wire format is a decimal ether string such as `"0.1"`.

use serde::{Deserialize, Serialize};

use crate::error::LotteryError;

/// Decimal places between ether and wei.
pub const ETHER_DECIMALS: usize = 18;

/// Wei per ether.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// A non-negative amount in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(u128);

impl Price {
    /// Zero wei.
    pub const ZERO: Price = Price(0);

    /// Create from a raw wei amount.
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Raw wei amount.
    pub const fn wei(self) -> u128 {
        self.0
    }

    /// Parse a decimal ether string (`"1"`, `"0.1"`, `"2.000000000000000001"`).
    pub fn parse_ether(s: &str) -> Result<Self, LotteryError> {
        let s = s.trim();
        let invalid = || LotteryError::InvalidPrice(s.to_string());

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > ETHER_DECIMALS {
            return Err(invalid());
        }

        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .ok()
                .and_then(|w| w.checked_mul(WEI_PER_ETHER))
                .ok_or_else(invalid)?
        };

        let frac_wei = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = ETHER_DECIMALS);
            padded.parse::<u128>().map_err(|_| invalid())?
        };

        whole_wei.checked_add(frac_wei).map(Self).ok_or_else(invalid)
    }

    /// Format as a decimal ether string with trailing zeros trimmed.
    pub fn to_ether_string(self) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:0>width$}", frac, width = ETHER_DECIMALS);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ether_string())
    }
}

impl std::str::FromStr for Price {
    type Err = LotteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}

impl TryFrom<String> for Price {
    type Error = LotteryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse_ether(&s)
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        price.to_ether_string()
    }
}
