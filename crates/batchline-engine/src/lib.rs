//! Chunk-oriented batch processing engine.
//!
//! A [`Job`] runs [`Step`]s in order. A [`ChunkStep`] reads raw items through
//! an [`ItemReader`], transforms them with an [`ItemProcessor`] and writes
//! them with an [`ItemWriter`], one transaction per chunk, checkpointing the
//! read position after every commit so a failed or stopped job resumes where
//! it left off.

pub mod checkpoint;
pub mod chunk;
pub mod config;
pub mod errors;
pub mod item;
pub mod job;
pub mod orchestrator;
pub(crate) mod processing;
pub mod reader;
pub mod result;
pub mod settings;
pub(crate) mod skips;
pub mod step;
pub mod stop;

// Re-export public API for convenience
pub use chunk::{ChunkOutcome, ChunkPhase, ChunkSummary};
pub use errors::StepError;
pub use item::{
    FnProcessor, ItemProcessor, ItemReader, ItemWriter, PassThroughProcessor, ProcessOutcome,
    Resume,
};
pub use job::Job;
pub use orchestrator::ChunkOrchestrator;
pub use reader::ChunkReader;
pub use result::{ItemCounts, JobReport, StepFailure, StepReport};
pub use settings::{RetryPolicy, SkipPolicy, StepSettings};
pub use step::{ChunkStep, Step, StepContext};
pub use stop::StopHandle;
