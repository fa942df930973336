//! Skipped-item records.
//!
//! When a step runs with skip-on-error enabled, every processor failure
//! that was converted into a skip is captured as a [`SkippedItem`] and
//! persisted next to the step execution for later inspection.

use crate::error::ErrorCategory;
use crate::position::ReadPosition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO-8601 formatted timestamp string.
///
/// Thin wrapper providing type clarity without a datetime dependency.
/// No format validation is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    #[must_use]
    pub fn new(iso8601: impl Into<String>) -> Self {
        Self(iso8601.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An item that was excluded from its chunk because processing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Step the item belongs to.
    pub step: String,
    /// Zero-based ordinal of the item within the step input.
    pub position: ReadPosition,
    /// Debug rendering of the raw item.
    pub item_repr: String,
    /// Human-readable failure description.
    pub error_message: String,
    /// Failure classification.
    pub category: ErrorCategory,
    /// When the skip happened.
    pub skipped_at: Timestamp,
}
