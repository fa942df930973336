//! Execution state store trait definition.
//!
//! [`ExecutionStateStore`] is the durable record of job instances, step
//! execution attempts, their checkpoints and status history. Model types
//! live in [`batchline_types::state`].

use batchline_types::position::ReadPosition;
use batchline_types::skip::SkippedItem;
use batchline_types::state::{
    BatchStatus, ExecutionState, JobInstanceId, JobInstanceState, JobName, StepCounters,
    StepExecutionId, StepName,
};

use crate::error;

/// Storage contract for execution state.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn ExecutionStateStore>`. Status history is append-only: no method
/// rewrites or deletes a recorded transition.
pub trait ExecutionStateStore: Send + Sync {
    /// Register a new instance of `job` in `Pending` status.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn create_job_instance(&self, job: &JobName) -> error::Result<JobInstanceId>;

    /// Most recently created instance of `job`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_job_instance(&self, job: &JobName) -> error::Result<Option<JobInstanceState>>;

    /// Set the status of a job instance.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownId`](crate::error::StateError::UnknownId)
    /// if the instance does not exist, or a backend error.
    fn record_job_status(
        &self,
        instance: JobInstanceId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> error::Result<()>;

    /// Open a new execution attempt for `step` within `instance`.
    ///
    /// The attempt inherits the checkpoint of the previous attempt of the
    /// same step (if any) and starts its history with `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_step_execution(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> error::Result<StepExecutionId>;

    /// Latest execution attempt of `step` within `instance`.
    ///
    /// Returns `Ok(None)` when the step has never been started.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load_state(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> error::Result<Option<ExecutionState>>;

    /// Persist the position and counters reached by a committed chunk.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::CheckpointRegression`](crate::error::StateError::CheckpointRegression)
    /// if `position` is behind the stored position; the stored checkpoint is
    /// left untouched in that case.
    fn save_checkpoint(
        &self,
        execution: StepExecutionId,
        position: ReadPosition,
        counters: &StepCounters,
    ) -> error::Result<()>;

    /// Append a status transition to an execution's history.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn record_status(
        &self,
        execution: StepExecutionId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> error::Result<()>;

    /// Persist records of items skipped on error. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_skipped_items(
        &self,
        execution: StepExecutionId,
        items: &[SkippedItem],
    ) -> error::Result<u64>;

    /// Latest execution attempt of every step started within `instance`,
    /// in the order the steps were first started.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_step_states(&self, instance: JobInstanceId) -> error::Result<Vec<ExecutionState>>;
}
