//! State store error types.

use batchline_types::position::ReadPosition;
use batchline_types::state::StepExecutionId;

/// Errors produced by [`ExecutionStateStore`](crate::ExecutionStateStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying storage failure, optionally tagged with the operation.
    #[error("state backend error{}: {source}", context_suffix(.context))]
    Backend {
        context: Option<&'static str>,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,

    /// A checkpoint tried to move the read position backwards.
    #[error("checkpoint regression for execution {execution}: stored position {stored}, attempted {attempted}")]
    CheckpointRegression {
        execution: StepExecutionId,
        stored: ReadPosition,
        attempted: ReadPosition,
    },

    /// The referenced step execution or job instance does not exist.
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: i64 },

    /// A value is too large for its `INTEGER` column.
    #[error("{column} value {value} exceeds the storable range")]
    OutOfRange { column: &'static str, value: u64 },

    /// A stored value could not be decoded.
    #[error("corrupt state row: {0}")]
    Corrupt(String),
}

impl StateError {
    pub(crate) fn backend(source: rusqlite::Error) -> Self {
        Self::Backend {
            context: None,
            source,
        }
    }

    pub(crate) fn backend_context(context: &'static str, source: rusqlite::Error) -> Self {
        Self::Backend {
            context: Some(context),
            source,
        }
    }
}

fn context_suffix(context: &Option<&'static str>) -> String {
    context.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
