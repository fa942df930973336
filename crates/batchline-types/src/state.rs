//! Execution state model types.
//!
//! Pure data types used by `ExecutionStateStore` implementations and the
//! engine's job/step controllers.

use serde::{Deserialize, Serialize};

use crate::position::ReadPosition;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a job definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of a step, unique within its job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Store-assigned identifier of one job instance (a job run plus its restarts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobInstanceId(pub i64);

impl std::fmt::Display for JobInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of one step execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepExecutionId(pub i64);

impl std::fmt::Display for StepExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status shared by jobs and steps.
///
/// `Pending → Running → {Completed, Failed, Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl BatchStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Whether a run ending in this status may be resumed from its checkpoint.
    #[must_use]
    pub fn is_restartable(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }

    /// Whether `self → next` is a legal lifecycle move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Stopped)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Counters and checkpoints
// ---------------------------------------------------------------------------

/// Cumulative item counters of a step, as of its last committed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    pub read: u64,
    pub written: u64,
    /// Items excluded from writes, whether filtered by the processor or
    /// skipped after a processing error.
    pub skipped: u64,
    /// Subset of `skipped` caused by processing errors; bounded by the
    /// skip policy's `max_skip_count`.
    pub skipped_on_error: u64,
}

impl StepCounters {
    /// Add another chunk's counters to these.
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            read: self.read + other.read,
            written: self.written + other.written,
            skipped: self.skipped + other.skipped,
            skipped_on_error: self.skipped_on_error + other.skipped_on_error,
        }
    }
}

/// Durable progress marker written after a chunk commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Reader position reached by the last committed chunk.
    pub position: ReadPosition,
    /// Counters as of that chunk.
    pub counters: StepCounters,
    /// ISO-8601 UTC timestamp of the checkpoint write.
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Execution state
// ---------------------------------------------------------------------------

/// One entry of a step execution's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub status: BatchStatus,
    /// ISO-8601 UTC timestamp.
    pub at: String,
    /// Failure cause or other diagnostic detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Persisted state of a single step execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: StepExecutionId,
    pub job_instance: JobInstanceId,
    pub step: StepName,
    /// 1 for the first attempt, incremented on every restart.
    pub attempt: u32,
    /// Last committed position, inherited from earlier attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    /// Status transitions in the order they were recorded.
    pub history: Vec<StatusTransition>,
}

impl ExecutionState {
    /// Current status, derived from the history alone.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.history
            .last()
            .map_or(BatchStatus::Pending, |transition| transition.status)
    }

    /// Message recorded with the most recent failed or stopped transition.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| matches!(t.status, BatchStatus::Failed | BatchStatus::Stopped))
            .and_then(|t| t.message.as_deref())
    }

    /// Position a restart of this step resumes from.
    #[must_use]
    pub fn resume_position(&self) -> ReadPosition {
        self.checkpoint
            .as_ref()
            .map_or(ReadPosition::START, |cp| cp.position)
    }
}

/// Persisted state of a job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstanceState {
    pub id: JobInstanceId,
    pub job: JobName,
    pub status: BatchStatus,
    /// ISO-8601 UTC timestamp.
    pub created_at: String,
}
