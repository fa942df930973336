//! Read positions.
//!
//! A [`ReadPosition`] counts the raw items a step's reader has consumed.
//! The engine only compares and advances it; readers decide how to resume
//! from it (skip N records, seek a byte offset, re-issue a query, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of raw items consumed from a source.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReadPosition(u64);

impl ReadPosition {
    /// Position before the first item.
    pub const START: Self = Self(0);

    #[must_use]
    pub const fn new(items_consumed: u64) -> Self {
        Self(items_consumed)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Position after consuming `n` more items.
    #[must_use]
    pub const fn advance(self, n: u64) -> Self {
        Self(self.0.saturating_add(n))
    }

    /// Items between `earlier` and `self` (zero if `earlier` is ahead).
    #[must_use]
    pub const fn distance_from(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for ReadPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ReadPosition {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
