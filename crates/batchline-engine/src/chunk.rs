//! Per-chunk phase state machine and chunk bookkeeping.

use std::fmt;

use batchline_types::position::ReadPosition;
use batchline_types::state::StepCounters;

use crate::errors::StepError;

/// Phase of one chunk cycle.
///
/// `Reading -> Processing -> Writing -> Committing -> Checkpointed`, with
/// `Failed` reachable from the four working phases and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    Reading,
    Processing,
    Writing,
    Committing,
    Checkpointed,
    Failed,
}

impl ChunkPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Processing => "processing",
            Self::Writing => "writing",
            Self::Committing => "committing",
            Self::Checkpointed => "checkpointed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Reading, Self::Processing)
                | (Self::Processing, Self::Writing)
                | (Self::Writing, Self::Committing)
                | (Self::Committing, Self::Checkpointed)
                | (
                    Self::Reading | Self::Processing | Self::Writing | Self::Committing,
                    Self::Failed
                )
        )
    }
}

impl fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the phase of the chunk currently in flight.
#[derive(Debug)]
pub(crate) struct ChunkCycle {
    index: u64,
    phase: ChunkPhase,
}

impl ChunkCycle {
    pub(crate) fn start(index: u64) -> Self {
        Self {
            index,
            phase: ChunkPhase::Reading,
        }
    }

    pub(crate) fn phase(&self) -> ChunkPhase {
        self.phase
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub(crate) fn enter(&mut self, next: ChunkPhase) -> Result<(), StepError> {
        if !self.phase.can_transition_to(next) {
            return Err(StepError::IllegalPhase {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(chunk = self.index, from = %self.phase, to = %next, "Chunk phase");
        self.phase = next;
        Ok(())
    }

    /// Enter `Failed` from wherever the cycle is. Idempotent.
    pub(crate) fn fail(&mut self) {
        if self.phase != ChunkPhase::Failed {
            tracing::debug!(chunk = self.index, from = %self.phase, "Chunk phase failed");
            self.phase = ChunkPhase::Failed;
        }
    }
}

/// What one committed chunk contributed to its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSummary {
    /// 1-based chunk number within this execution attempt.
    pub index: u64,
    /// Raw items consumed by this chunk.
    pub read: u64,
    /// Items handed to the writer.
    pub written: u64,
    /// Items skipped (filtered or on error).
    pub skipped: u64,
    /// Subset of `skipped` caused by processing errors.
    pub skipped_on_error: u64,
    /// Position reached after the chunk, as checkpointed.
    pub position: ReadPosition,
}

impl ChunkSummary {
    pub(crate) fn counters(&self) -> StepCounters {
        StepCounters {
            read: self.read,
            written: self.written,
            skipped: self.skipped,
            skipped_on_error: self.skipped_on_error,
        }
    }
}

/// Result of driving one chunk cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A chunk was committed and checkpointed.
    Committed(ChunkSummary),
    /// The reader was exhausted before any item of a new chunk.
    EndOfInput,
}
