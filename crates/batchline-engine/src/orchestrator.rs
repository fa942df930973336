//! Chunk orchestrator: the read → process → write → commit → checkpoint loop.
//!
//! Each call to [`ChunkOrchestrator::run_chunk`] drives exactly one chunk
//! cycle inside its own writer transaction. A cycle either ends
//! `Checkpointed` with its items committed and the read position persisted,
//! or ends `Failed` with the transaction rolled back and the stored
//! checkpoint untouched.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use batchline_state::ExecutionStateStore;
use batchline_types::position::ReadPosition;
use batchline_types::skip::SkippedItem;
use batchline_types::state::{StepCounters, StepExecutionId, StepName};

use crate::checkpoint::{self, ResumePoint};
use crate::chunk::{ChunkCycle, ChunkOutcome, ChunkPhase, ChunkSummary};
use crate::errors::{compute_backoff, StepError};
use crate::item::{ItemProcessor, ItemReader, ItemWriter};
use crate::processing::ProcessingPool;
use crate::reader::ChunkReader;
use crate::settings::StepSettings;
use crate::skips;

/// Upper bound on the read buffer reserved up front for one chunk.
const MAX_PREALLOCATED_ITEMS: usize = 4_096;

/// Everything a chunk produced before commit.
struct StagedChunk {
    read: u64,
    written: u64,
    skipped: u64,
    skipped_on_error: u64,
    records: Vec<SkippedItem>,
}

/// Drives chunk cycles for one step execution attempt.
pub struct ChunkOrchestrator<'a, R, P, W> {
    store: &'a dyn ExecutionStateStore,
    execution: StepExecutionId,
    step: StepName,
    settings: StepSettings,
    reader: &'a mut ChunkReader<R>,
    processor: P,
    writer: W,
    pool: ProcessingPool,
    committed: ReadPosition,
    last_checkpoint: Option<ReadPosition>,
    counters: StepCounters,
    chunks_committed: u64,
}

impl<'a, R, P, W> ChunkOrchestrator<'a, R, P, W>
where
    R: ItemReader,
    P: ItemProcessor<Input = R::Item>,
    P::Input: Debug,
    W: ItemWriter<Item = P::Output>,
{
    /// Build an orchestrator over `reader`. Call
    /// [`resume_from`](Self::resume_from) before the first chunk to place the
    /// reader where this attempt starts.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidConfig`] if the processing pool cannot
    /// be created.
    pub fn new(
        store: &'a dyn ExecutionStateStore,
        execution: StepExecutionId,
        step: StepName,
        settings: StepSettings,
        reader: &'a mut ChunkReader<R>,
        processor: P,
        writer: W,
    ) -> Result<Self, StepError> {
        let pool = ProcessingPool::new(settings.workers)?;
        Ok(Self {
            store,
            execution,
            step,
            settings,
            reader,
            processor,
            writer,
            pool,
            committed: ReadPosition::START,
            last_checkpoint: None,
            counters: StepCounters::default(),
            chunks_committed: 0,
        })
    }

    /// Place the reader at `resume.position` and carry the checkpoint's
    /// counters over. The reader is seeked even for a fresh start, since a
    /// step reuses its reader across executions.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::SourceRead`] if the reader cannot reach the
    /// position, e.g. an unseekable reader that has already read past it.
    pub fn resume_from(mut self, resume: ResumePoint) -> Result<Self, StepError> {
        if !resume.is_start() {
            tracing::info!(
                step = self.step.as_str(),
                position = %resume.position,
                written = resume.counters.written,
                "Resuming from checkpoint"
            );
        }
        self.reader.seek(resume.position)?;
        self.committed = resume.position;
        self.last_checkpoint = (!resume.is_start()).then_some(resume.position);
        self.counters = resume.counters;
        Ok(self)
    }

    /// Run one chunk cycle, retrying it from its start after a source read
    /// failure when the retry policy allows.
    ///
    /// # Errors
    ///
    /// Returns the [`StepError`] that failed the chunk. The writer
    /// transaction has been rolled back, except for
    /// [`StepError::Checkpoint`] where the chunk stays committed.
    pub fn run_chunk(&mut self) -> Result<ChunkOutcome, StepError> {
        let max_retries = self.settings.retry.max_retries;
        let mut retries = 0u32;

        loop {
            match self.run_cycle() {
                Err(err) if err.is_retryable() && retries < max_retries => {
                    retries += 1;
                    let delay = compute_backoff(self.settings.retry.backoff_ms, retries);
                    let delay_ms = millis(delay);
                    tracing::warn!(
                        step = self.step.as_str(),
                        retry = retries,
                        max_retries,
                        delay_ms,
                        error = %err,
                        "Source read failed, retrying chunk"
                    );
                    std::thread::sleep(delay);
                    if let Err(seek_err) = self.reader.seek(self.committed) {
                        tracing::error!(
                            step = self.step.as_str(),
                            error = %seek_err,
                            "Cannot rewind reader to chunk start, giving up retries"
                        );
                        return Err(err);
                    }
                }
                other => return other,
            }
        }
    }

    fn run_cycle(&mut self) -> Result<ChunkOutcome, StepError> {
        let started = Instant::now();
        let index = self.chunks_committed + 1;
        let chunk_start = self.reader.current_position();
        let mut cycle = ChunkCycle::start(index);

        if let Err(source) = self.writer.begin() {
            cycle.fail();
            return Err(StepError::SinkWrite { source });
        }

        let staged = match self.stage(&mut cycle, started, chunk_start) {
            Ok(Some(staged)) => staged,
            Ok(None) => {
                self.writer
                    .rollback()
                    .map_err(|source| StepError::SinkWrite { source })?;
                return Ok(ChunkOutcome::EndOfInput);
            }
            Err(err) => return Err(self.abort(&mut cycle, err)),
        };

        if let Err(err) = cycle
            .enter(ChunkPhase::Committing)
            .and_then(|()| self.check_deadline(started))
        {
            return Err(self.abort(&mut cycle, err));
        }
        if let Err(source) = self.writer.commit() {
            return Err(self.abort(&mut cycle, StepError::Commit { source }));
        }

        let summary = ChunkSummary {
            index,
            read: staged.read,
            written: staged.written,
            skipped: staged.skipped,
            skipped_on_error: staged.skipped_on_error,
            position: self.reader.current_position(),
        };
        self.counters = self.counters.merged(summary.counters());
        self.committed = summary.position;
        self.chunks_committed += 1;

        if let Err(err) =
            skips::persist_skipped_items(self.store, &self.step, self.execution, &staged.records)
                .and_then(|()| {
                    checkpoint::save_checkpoint(
                        self.store,
                        &self.step,
                        self.execution,
                        summary.position,
                        &self.counters,
                    )
                })
        {
            cycle.fail();
            return Err(err);
        }
        self.last_checkpoint = Some(summary.position);
        cycle.enter(ChunkPhase::Checkpointed)?;

        tracing::info!(
            step = self.step.as_str(),
            chunk = index,
            read = summary.read,
            written = summary.written,
            skipped = summary.skipped,
            position = %summary.position,
            elapsed_ms = millis(started.elapsed()),
            "Chunk committed"
        );
        Ok(ChunkOutcome::Committed(summary))
    }

    /// READING, PROCESSING and WRITING. `None` when the reader was already
    /// exhausted.
    fn stage(
        &mut self,
        cycle: &mut ChunkCycle,
        started: Instant,
        chunk_start: ReadPosition,
    ) -> Result<Option<StagedChunk>, StepError> {
        let chunk_size = self.settings.chunk_size.get();
        let mut raw = Vec::with_capacity(chunk_size.min(MAX_PREALLOCATED_ITEMS));
        while raw.len() < chunk_size {
            match self.reader.next_item()? {
                Some(item) => raw.push(item),
                None => break,
            }
        }
        if raw.is_empty() {
            return Ok(None);
        }
        self.check_deadline(started)?;

        cycle.enter(ChunkPhase::Processing)?;
        let outcomes = self.pool.process_all(&self.processor, &raw);
        let sorted = skips::sort_outcomes(
            &self.step,
            self.settings.skip_policy,
            self.counters.skipped_on_error,
            chunk_start,
            &raw,
            outcomes,
        )?;
        self.check_deadline(started)?;

        cycle.enter(ChunkPhase::Writing)?;
        if !sorted.items.is_empty() {
            self.writer
                .write_batch(&sorted.items)
                .map_err(|source| StepError::SinkWrite { source })?;
        }

        Ok(Some(StagedChunk {
            read: raw.len() as u64,
            written: sorted.items.len() as u64,
            skipped: sorted.skipped,
            skipped_on_error: sorted.skipped_on_error,
            records: sorted.records,
        }))
    }

    /// Fail the cycle and roll the writer back.
    fn abort(&mut self, cycle: &mut ChunkCycle, err: StepError) -> StepError {
        let phase = cycle.phase();
        cycle.fail();
        tracing::warn!(
            step = self.step.as_str(),
            phase = %phase,
            chunk_start = %self.committed,
            error = %err,
            "Chunk failed, rolling back"
        );
        match self.writer.rollback() {
            Ok(()) => err,
            Err(source) => {
                tracing::error!(
                    step = self.step.as_str(),
                    error = %format!("{source:#}"),
                    "Rollback failed"
                );
                StepError::Rollback {
                    original: Box::new(err),
                    source,
                }
            }
        }
    }

    fn check_deadline(&self, started: Instant) -> Result<(), StepError> {
        let Some(limit) = self.settings.chunk_timeout else {
            return Ok(());
        };
        let elapsed = started.elapsed();
        if elapsed > limit {
            return Err(StepError::Timeout {
                limit_ms: millis(limit),
                elapsed_ms: millis(elapsed),
            });
        }
        Ok(())
    }

    /// Cumulative counters as of the last committed chunk.
    pub fn counters(&self) -> StepCounters {
        self.counters
    }

    /// Position of the last committed chunk.
    pub fn committed_position(&self) -> ReadPosition {
        self.committed
    }

    /// Position most recently persisted to the state store, if any.
    pub fn last_checkpoint(&self) -> Option<ReadPosition> {
        self.last_checkpoint
    }

    pub fn chunks_committed(&self) -> u64 {
        self.chunks_committed
    }

    /// Items consumed from the reader but not part of a committed chunk.
    pub fn uncommitted_items(&self) -> u64 {
        self.reader.current_position().distance_from(self.committed)
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
