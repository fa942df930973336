//! Fault-injecting readers, writers and stores for engine tests.

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use batchline_engine::item::{ItemReader, ItemWriter, Resume};
use batchline_engine::StepSettings;
use batchline_state::error::Result as StateResult;
use batchline_state::{ExecutionStateStore, SqliteStateStore, StateError};
use batchline_types::position::ReadPosition;
use batchline_types::skip::SkippedItem;
use batchline_types::state::{
    BatchStatus, ExecutionState, JobInstanceId, JobInstanceState, JobName, StepCounters,
    StepExecutionId, StepName,
};

pub fn settings(chunk_size: usize) -> StepSettings {
    StepSettings::new(NonZeroUsize::new(chunk_size).unwrap())
}

pub fn ids(n: u32) -> Vec<u32> {
    (1..=n).collect()
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// In-memory reader with optional seeking and an injectable read failure.
pub struct VecReader<T> {
    items: Vec<T>,
    cursor: usize,
    seekable: bool,
    fail_at: Option<usize>,
    fail_times: u32,
}

impl<T: Clone + Send> VecReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: 0,
            seekable: true,
            fail_at: None,
            fail_times: 0,
        }
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Fail `times` reads of the item at zero-based `index`.
    pub fn fail_at(mut self, index: usize, times: u32) -> Self {
        self.fail_at = Some(index);
        self.fail_times = times;
        self
    }
}

impl<T: Clone + Send> ItemReader for VecReader<T> {
    type Item = T;

    fn read(&mut self) -> anyhow::Result<Option<T>> {
        if self.fail_at == Some(self.cursor) && self.fail_times > 0 {
            self.fail_times -= 1;
            anyhow::bail!("injected read failure at index {}", self.cursor);
        }
        let item = self.items.get(self.cursor).cloned();
        if item.is_some() {
            self.cursor += 1;
        }
        Ok(item)
    }

    fn seek(&mut self, position: ReadPosition) -> anyhow::Result<Resume> {
        if !self.seekable {
            return Ok(Resume::Unsupported);
        }
        self.cursor = usize::try_from(position.get())?;
        Ok(Resume::Seeked)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Destination contents shared between a test and the writers it hands out.
#[derive(Debug)]
pub struct SinkState<T> {
    pub committed: Vec<T>,
    pub committed_batches: Vec<usize>,
    pub pending: Vec<T>,
    pub discarded_items: usize,
    pub in_transaction: bool,
}

#[derive(Clone)]
pub struct SharedSink<T> {
    state: Arc<Mutex<SinkState<T>>>,
}

impl<T: Clone + Send> SharedSink<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                committed: Vec::new(),
                committed_batches: Vec::new(),
                pending: Vec::new(),
                discarded_items: 0,
                in_transaction: false,
            })),
        }
    }

    pub fn writer(&self) -> RecordingWriter<T> {
        RecordingWriter {
            sink: self.clone(),
            writes: 0,
            commits: 0,
            fail_write_on: None,
            fail_commit_on: None,
        }
    }

    pub fn committed(&self) -> Vec<T> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.state.lock().unwrap().committed_batches.clone()
    }

    pub fn discarded_items(&self) -> usize {
        self.state.lock().unwrap().discarded_items
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_transaction
    }
}

/// Transactional in-memory writer. Failing writes stage half the batch
/// first so rollback has something to discard.
pub struct RecordingWriter<T> {
    sink: SharedSink<T>,
    writes: usize,
    commits: usize,
    fail_write_on: Option<usize>,
    fail_commit_on: Option<usize>,
}

impl<T> RecordingWriter<T> {
    /// Fail the `n`th (1-based) `write_batch` call of this writer.
    pub fn fail_write_on(mut self, n: usize) -> Self {
        self.fail_write_on = Some(n);
        self
    }

    /// Fail the `n`th (1-based) `commit` call of this writer.
    pub fn fail_commit_on(mut self, n: usize) -> Self {
        self.fail_commit_on = Some(n);
        self
    }
}

impl<T: Clone + Send> ItemWriter for RecordingWriter<T> {
    type Item = T;

    fn begin(&mut self) -> anyhow::Result<()> {
        let mut state = self.sink.state.lock().unwrap();
        anyhow::ensure!(!state.in_transaction, "transaction already open");
        state.in_transaction = true;
        Ok(())
    }

    fn write_batch(&mut self, items: &[T]) -> anyhow::Result<()> {
        self.writes += 1;
        let mut state = self.sink.state.lock().unwrap();
        anyhow::ensure!(state.in_transaction, "write outside transaction");
        if self.fail_write_on == Some(self.writes) {
            let half = items.len() / 2;
            state.pending.extend_from_slice(&items[..half]);
            anyhow::bail!("injected write failure on batch {}", self.writes);
        }
        state.pending.extend_from_slice(items);
        Ok(())
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.commits += 1;
        let mut state = self.sink.state.lock().unwrap();
        anyhow::ensure!(state.in_transaction, "commit outside transaction");
        if self.fail_commit_on == Some(self.commits) {
            anyhow::bail!("injected commit failure on commit {}", self.commits);
        }
        let batch: Vec<T> = state.pending.drain(..).collect();
        state.committed_batches.push(batch.len());
        state.committed.extend(batch);
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        let mut state = self.sink.state.lock().unwrap();
        let discarded = state.pending.len();
        state.pending.clear();
        state.discarded_items += discarded;
        state.in_transaction = false;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// `SQLite` store that records skipped items and can fail a checkpoint or
/// skip-record write.
pub struct TestStore {
    inner: SqliteStateStore,
    checkpoint_calls: AtomicUsize,
    fail_checkpoint_on: Option<usize>,
    fail_skip_inserts: bool,
    skipped: Mutex<Vec<SkippedItem>>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStateStore::in_memory().unwrap(),
            checkpoint_calls: AtomicUsize::new(0),
            fail_checkpoint_on: None,
            fail_skip_inserts: false,
            skipped: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `n`th (1-based) `save_checkpoint` call.
    pub fn fail_checkpoint_on(mut self, n: usize) -> Self {
        self.fail_checkpoint_on = Some(n);
        self
    }

    /// Fail every `insert_skipped_items` call.
    pub fn fail_skip_inserts(mut self) -> Self {
        self.fail_skip_inserts = true;
        self
    }

    pub fn skipped_items(&self) -> Vec<SkippedItem> {
        self.skipped.lock().unwrap().clone()
    }

    pub fn statuses(&self, job: &str, step: &str) -> Vec<BatchStatus> {
        let instance = self
            .latest_job_instance(&JobName::new(job))
            .unwrap()
            .unwrap();
        self.load_state(instance.id, &StepName::new(step))
            .unwrap()
            .unwrap()
            .history
            .iter()
            .map(|t| t.status)
            .collect()
    }
}

impl ExecutionStateStore for TestStore {
    fn create_job_instance(&self, job: &JobName) -> StateResult<JobInstanceId> {
        self.inner.create_job_instance(job)
    }

    fn latest_job_instance(&self, job: &JobName) -> StateResult<Option<JobInstanceState>> {
        self.inner.latest_job_instance(job)
    }

    fn record_job_status(
        &self,
        instance: JobInstanceId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> StateResult<()> {
        self.inner.record_job_status(instance, status, message)
    }

    fn start_step_execution(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> StateResult<StepExecutionId> {
        self.inner.start_step_execution(instance, step)
    }

    fn load_state(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> StateResult<Option<ExecutionState>> {
        self.inner.load_state(instance, step)
    }

    fn save_checkpoint(
        &self,
        execution: StepExecutionId,
        position: ReadPosition,
        counters: &StepCounters,
    ) -> StateResult<()> {
        let call = self.checkpoint_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_checkpoint_on == Some(call) {
            return Err(StateError::LockPoisoned);
        }
        self.inner.save_checkpoint(execution, position, counters)
    }

    fn record_status(
        &self,
        execution: StepExecutionId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> StateResult<()> {
        self.inner.record_status(execution, status, message)
    }

    fn insert_skipped_items(
        &self,
        execution: StepExecutionId,
        items: &[SkippedItem],
    ) -> StateResult<u64> {
        if self.fail_skip_inserts {
            return Err(StateError::LockPoisoned);
        }
        self.skipped.lock().unwrap().extend_from_slice(items);
        self.inner.insert_skipped_items(execution, items)
    }

    fn list_step_states(&self, instance: JobInstanceId) -> StateResult<Vec<ExecutionState>> {
        self.inner.list_step_states(instance)
    }
}
