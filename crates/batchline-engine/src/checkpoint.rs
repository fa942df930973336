//! Resume-point derivation and checkpoint persistence.

use batchline_state::ExecutionStateStore;
use batchline_types::position::ReadPosition;
use batchline_types::state::{ExecutionState, StepCounters, StepExecutionId, StepName};

use crate::errors::StepError;

/// Where a step execution starts reading and which totals it carries over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumePoint {
    pub position: ReadPosition,
    pub counters: StepCounters,
}

impl ResumePoint {
    /// Resume point of an execution attempt: its inherited checkpoint, or
    /// the start of input.
    #[must_use]
    pub fn of(state: &ExecutionState) -> Self {
        state.checkpoint.as_ref().map_or_else(Self::default, |cp| Self {
            position: cp.position,
            counters: cp.counters,
        })
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        self.position == ReadPosition::START
    }
}

/// Persist the position and counters of a committed chunk.
pub(crate) fn save_checkpoint(
    store: &dyn ExecutionStateStore,
    step: &StepName,
    execution: StepExecutionId,
    position: ReadPosition,
    counters: &StepCounters,
) -> Result<(), StepError> {
    store
        .save_checkpoint(execution, position, counters)
        .map_err(|e| {
            tracing::error!(
                step = step.as_str(),
                execution = %execution,
                position = %position,
                error = %e,
                "Checkpoint write failed after commit"
            );
            StepError::Checkpoint(e)
        })?;
    tracing::debug!(
        step = step.as_str(),
        position = %position,
        written = counters.written,
        "Checkpoint saved"
    );
    Ok(())
}
