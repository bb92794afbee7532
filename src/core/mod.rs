//! Core primitives.
//!
//! Number drawing, prices and hashing. No I/O, no locks.

pub mod hash;
pub mod numbers;
pub mod price;

// Re-export core types
pub use hash::{DomainHasher, Hash32};
pub use numbers::{draw, DrawConfig, NumberSet, DEFAULT_COUNT, DEFAULT_MAX};
pub use price::Price;
