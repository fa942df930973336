//! Execution state persistence for the Batchline engine.
//!
//! Provides the [`ExecutionStateStore`] trait and a [`SqliteStateStore`]
//! implementation for job instances, step checkpoints, status history and
//! skipped-item records.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::ExecutionStateStore;
pub use error::StateError;
pub use sqlite::SqliteStateStore;

/// Common imports for state store users.
pub mod prelude {
    pub use crate::backend::ExecutionStateStore;
    pub use crate::error::StateError;
    pub use crate::sqlite::SqliteStateStore;
    pub use batchline_types::position::ReadPosition;
    pub use batchline_types::state::{
        BatchStatus, Checkpoint, ExecutionState, JobInstanceId, JobName, StepCounters,
        StepExecutionId, StepName,
    };
}
