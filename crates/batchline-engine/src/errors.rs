//! Step error model and retry backoff policy helpers.

use std::time::Duration;

use batchline_state::StateError;
use batchline_types::error::ErrorCategory;
use batchline_types::position::ReadPosition;

use crate::chunk::ChunkPhase;

const BACKOFF_MAX_MS: u64 = 60_000;

/// Failure of a chunk cycle or of the step driving it.
///
/// Reader, processor and writer implementations report plain
/// [`anyhow::Error`]s; the engine wraps them according to the stage that
/// produced them so the step can decide between rollback, retry and skip.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The reader failed (I/O, corrupt input, unreachable checkpoint).
    #[error("source read failed at position {position}: {source:#}")]
    SourceRead {
        position: ReadPosition,
        #[source]
        source: anyhow::Error,
    },

    /// The processor failed and no skip policy absorbed the failure.
    #[error("processing failed for item at position {position}: {source:#}")]
    Process {
        position: ReadPosition,
        #[source]
        source: anyhow::Error,
    },

    /// A processing failure would push error-skips past the policy limit.
    #[error("skip limit of {limit} exceeded at position {position}: {source:#}")]
    SkipLimitExceeded {
        limit: u64,
        position: ReadPosition,
        #[source]
        source: anyhow::Error,
    },

    /// The writer rejected the batch or could not open a transaction.
    #[error("sink write failed: {source:#}")]
    SinkWrite {
        #[source]
        source: anyhow::Error,
    },

    /// The writer failed to commit the chunk transaction.
    #[error("commit failed: {source:#}")]
    Commit {
        #[source]
        source: anyhow::Error,
    },

    /// Rolling back after `original` failed as well.
    #[error("{original} (rollback also failed: {source:#})")]
    Rollback {
        original: Box<StepError>,
        #[source]
        source: anyhow::Error,
    },

    /// Recording the chunk's skip records or checkpoint failed after the
    /// chunk was committed.
    #[error("checkpoint failed after commit: {0}")]
    Checkpoint(#[source] StateError),

    /// The chunk ran past its time budget and was rolled back.
    #[error("chunk exceeded timeout of {limit_ms} ms after {elapsed_ms} ms")]
    Timeout { limit_ms: u64, elapsed_ms: u64 },

    /// State store failure outside the checkpoint write.
    #[error(transparent)]
    State(#[from] StateError),

    /// A chunk cycle attempted a phase change its state machine forbids.
    #[error("illegal chunk phase transition {from} -> {to}")]
    IllegalPhase { from: ChunkPhase, to: ChunkPhase },

    /// Step or job configuration could not be turned into runtime settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StepError {
    /// Failure classification persisted with the failed status.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceRead { .. } => ErrorCategory::SourceRead,
            Self::Process { .. } | Self::SkipLimitExceeded { .. } => ErrorCategory::Process,
            Self::SinkWrite { .. } => ErrorCategory::SinkWrite,
            Self::Commit { .. } => ErrorCategory::Commit,
            Self::Rollback { original, .. } => original.category(),
            Self::Checkpoint(_) => ErrorCategory::Checkpoint,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::State(_) | Self::IllegalPhase { .. } => ErrorCategory::State,
            Self::InvalidConfig(_) => ErrorCategory::Config,
        }
    }

    /// Whether the source-read retry policy applies to this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceRead { .. })
    }
}

/// Compute the delay before retry `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at 60 seconds.
pub(crate) fn compute_backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
