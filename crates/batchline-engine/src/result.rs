//! Step and job execution reports.

use batchline_types::error::ErrorCategory;
use batchline_types::position::ReadPosition;
use batchline_types::state::{
    BatchStatus, ExecutionState, JobInstanceId, JobName, StepCounters, StepName,
};

use crate::errors::StepError;

/// Item counts of a step. `read == written + skipped + failed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub read: u64,
    pub written: u64,
    pub skipped: u64,
    /// Items read by a chunk that was rolled back.
    pub failed: u64,
}

impl ItemCounts {
    pub(crate) fn from_counters(counters: &StepCounters, failed: u64) -> Self {
        Self {
            read: counters.read + failed,
            written: counters.written,
            skipped: counters.skipped,
            failed,
        }
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.read == self.written + self.skipped + self.failed
    }
}

/// Why a step did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub category: ErrorCategory,
    pub message: String,
}

/// Result of one step execution attempt.
///
/// Counts are cumulative over every attempt of the step within its job
/// instance, so a restarted step reports the whole input.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: StepName,
    pub status: BatchStatus,
    pub counts: ItemCounts,
    /// Chunks committed by this attempt.
    pub chunks_committed: u64,
    pub last_checkpoint: Option<ReadPosition>,
    pub error: Option<StepFailure>,
    pub duration_secs: f64,
}

impl StepReport {
    pub(crate) fn failed_before_start(step: StepName, error: &StepError, duration_secs: f64) -> Self {
        Self {
            step,
            status: BatchStatus::Failed,
            counts: ItemCounts::default(),
            chunks_committed: 0,
            last_checkpoint: None,
            error: Some(StepFailure::from(error)),
            duration_secs,
        }
    }

    /// Report for a step that a resumed job instance had already completed.
    pub(crate) fn already_completed(state: &ExecutionState) -> Self {
        let counters = state
            .checkpoint
            .as_ref()
            .map(|cp| cp.counters)
            .unwrap_or_default();
        Self {
            step: state.step.clone(),
            status: BatchStatus::Completed,
            counts: ItemCounts::from_counters(&counters, 0),
            chunks_committed: 0,
            last_checkpoint: state.checkpoint.as_ref().map(|cp| cp.position),
            error: None,
            duration_secs: 0.0,
        }
    }
}

impl From<&StepError> for StepFailure {
    fn from(err: &StepError) -> Self {
        Self {
            category: err.category(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Result of a job run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: JobName,
    pub instance: JobInstanceId,
    /// `true` when this run continued a failed or stopped instance.
    pub resumed: bool,
    pub status: BatchStatus,
    pub steps: Vec<StepReport>,
    pub duration_secs: f64,
}

impl JobReport {
    /// First step that did not complete, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|s| s.status != BatchStatus::Completed)
    }
}
