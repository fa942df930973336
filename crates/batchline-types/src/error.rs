//! Failure classification persisted alongside step status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stage of a chunk cycle produced a failure.
///
/// Stored with failed statuses and skip records so operators can tell a
/// bad input file from a broken destination without reading logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// I/O failure or corrupt input in the reader.
    SourceRead,
    /// Transform failure in the processor.
    Process,
    /// Destination rejected the batch.
    SinkWrite,
    /// Destination commit failed.
    Commit,
    /// State store failed after a successful commit.
    Checkpoint,
    /// Chunk exceeded its configured time budget.
    Timeout,
    /// State store failure outside the checkpoint write.
    State,
    /// Invalid step or job configuration.
    Config,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceRead => "source_read",
            Self::Process => "process",
            Self::SinkWrite => "sink_write",
            Self::Commit => "commit",
            Self::Checkpoint => "checkpoint",
            Self::Timeout => "timeout",
            Self::State => "state",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for category in [
            ErrorCategory::SourceRead,
            ErrorCategory::Process,
            ErrorCategory::SinkWrite,
            ErrorCategory::Commit,
            ErrorCategory::Checkpoint,
            ErrorCategory::Timeout,
            ErrorCategory::State,
            ErrorCategory::Config,
        ] {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{category}\""));
        }
    }
}
