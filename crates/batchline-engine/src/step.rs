//! Steps: one chunk-oriented read/process/write loop with status tracking.

use std::fmt::Debug;
use std::time::Instant;

use batchline_state::ExecutionStateStore;
use batchline_types::state::{BatchStatus, JobInstanceId, JobName, StepExecutionId, StepName};

use crate::checkpoint::ResumePoint;
use crate::chunk::ChunkOutcome;
use crate::errors::StepError;
use crate::item::{ItemProcessor, ItemReader, ItemWriter};
use crate::orchestrator::ChunkOrchestrator;
use crate::reader::ChunkReader;
use crate::result::{ItemCounts, StepFailure, StepReport};
use crate::settings::StepSettings;
use crate::stop::StopHandle;

const STOPPED_MESSAGE: &str = "stop requested";

/// What a job hands each step it runs.
pub struct StepContext<'a> {
    pub store: &'a dyn ExecutionStateStore,
    pub job: &'a JobName,
    pub instance: JobInstanceId,
    pub stop: &'a StopHandle,
}

/// A unit of work sequenced by a [`Job`](crate::Job).
pub trait Step: Send {
    fn name(&self) -> &StepName;

    /// Run one execution attempt within `ctx.instance`.
    ///
    /// Failures are reported through [`StepReport::status`] and
    /// [`StepReport::error`], and recorded in the state store.
    fn execute(&mut self, ctx: &StepContext<'_>) -> StepReport;
}

/// Chunk-oriented step over a reader, processor and writer.
///
/// The reader keeps its position between executions, so a rerun of the same
/// step seeks back to its checkpoint (or the start) instead of continuing
/// wherever the previous attempt stopped reading.
pub struct ChunkStep<R, P, W> {
    name: StepName,
    settings: StepSettings,
    reader: ChunkReader<R>,
    processor: P,
    writer: W,
}

impl<R, P, W> ChunkStep<R, P, W> {
    pub fn new(
        name: impl Into<StepName>,
        settings: StepSettings,
        reader: R,
        processor: P,
        writer: W,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            reader: ChunkReader::new(reader),
            processor,
            writer,
        }
    }

    pub fn settings(&self) -> &StepSettings {
        &self.settings
    }

    /// Give back the reader, processor and writer (e.g. to inspect a sink in tests).
    pub fn into_parts(self) -> (R, P, W) {
        (self.reader.into_inner(), self.processor, self.writer)
    }
}

impl<R, P, W> Step for ChunkStep<R, P, W>
where
    R: ItemReader,
    P: ItemProcessor<Input = R::Item>,
    P::Input: Debug,
    W: ItemWriter<Item = P::Output>,
{
    fn name(&self) -> &StepName {
        &self.name
    }

    fn execute(&mut self, ctx: &StepContext<'_>) -> StepReport {
        let started = Instant::now();
        let execution = match ctx.store.start_step_execution(ctx.instance, &self.name) {
            Ok(id) => id,
            Err(e) => {
                let err = StepError::from(e);
                tracing::error!(step = self.name.as_str(), error = %err, "Step could not start");
                return StepReport::failed_before_start(
                    self.name.clone(),
                    &err,
                    started.elapsed().as_secs_f64(),
                );
            }
        };

        let resume = match ctx.store.load_state(ctx.instance, &self.name) {
            Ok(state) => state.as_ref().map(ResumePoint::of).unwrap_or_default(),
            Err(e) => {
                let err = StepError::from(e);
                record_failure(ctx.store, &self.name, execution, &err);
                return StepReport::failed_before_start(
                    self.name.clone(),
                    &err,
                    started.elapsed().as_secs_f64(),
                );
            }
        };

        if let Err(e) = ctx
            .store
            .record_status(execution, BatchStatus::Running, None)
        {
            let err = StepError::from(e);
            record_failure(ctx.store, &self.name, execution, &err);
            return StepReport::failed_before_start(
                self.name.clone(),
                &err,
                started.elapsed().as_secs_f64(),
            );
        }

        tracing::info!(
            job = ctx.job.as_str(),
            step = self.name.as_str(),
            execution = %execution,
            chunk_size = self.settings.chunk_size.get(),
            workers = self.settings.workers.get(),
            resume_position = %resume.position,
            "Step started"
        );

        let built = ChunkOrchestrator::new(
            ctx.store,
            execution,
            self.name.clone(),
            self.settings.clone(),
            &mut self.reader,
            &self.processor,
            &mut self.writer,
        )
        .and_then(|orchestrator| orchestrator.resume_from(resume));

        let mut orchestrator = match built {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                record_failure(ctx.store, &self.name, execution, &err);
                return StepReport {
                    step: self.name.clone(),
                    status: BatchStatus::Failed,
                    counts: ItemCounts::from_counters(&resume.counters, 0),
                    chunks_committed: 0,
                    last_checkpoint: (!resume.is_start()).then_some(resume.position),
                    error: Some(StepFailure::from(&err)),
                    duration_secs: started.elapsed().as_secs_f64(),
                };
            }
        };

        let outcome = loop {
            if ctx.stop.is_stop_requested() {
                break Ok(BatchStatus::Stopped);
            }
            match orchestrator.run_chunk() {
                Ok(ChunkOutcome::Committed(_)) => {}
                Ok(ChunkOutcome::EndOfInput) => break Ok(BatchStatus::Completed),
                Err(err) => break Err(err),
            }
        };

        let mut report = StepReport {
            step: self.name.clone(),
            status: BatchStatus::Failed,
            counts: ItemCounts::from_counters(
                &orchestrator.counters(),
                orchestrator.uncommitted_items(),
            ),
            chunks_committed: orchestrator.chunks_committed(),
            last_checkpoint: orchestrator.last_checkpoint(),
            error: None,
            duration_secs: 0.0,
        };

        match outcome {
            Ok(status) => {
                let message = (status == BatchStatus::Stopped).then_some(STOPPED_MESSAGE);
                match ctx.store.record_status(execution, status, message) {
                    Ok(()) => report.status = status,
                    Err(e) => {
                        let err = StepError::from(e);
                        record_failure(ctx.store, &self.name, execution, &err);
                        report.error = Some(StepFailure::from(&err));
                    }
                }
            }
            Err(err) => {
                record_failure(ctx.store, &self.name, execution, &err);
                report.error = Some(StepFailure::from(&err));
            }
        }
        report.duration_secs = started.elapsed().as_secs_f64();

        let error_text = report.error.as_ref().map(ToString::to_string);
        match report.status {
            BatchStatus::Completed => tracing::info!(
                step = self.name.as_str(),
                read = report.counts.read,
                written = report.counts.written,
                skipped = report.counts.skipped,
                chunks = report.chunks_committed,
                duration_secs = report.duration_secs,
                "Step completed"
            ),
            BatchStatus::Stopped => tracing::warn!(
                step = self.name.as_str(),
                position = ?report.last_checkpoint.map(|p| p.get()),
                "Step stopped"
            ),
            _ => tracing::error!(
                step = self.name.as_str(),
                failed = report.counts.failed,
                last_checkpoint = ?report.last_checkpoint.map(|p| p.get()),
                error = error_text.as_deref(),
                "Step failed"
            ),
        }
        report
    }
}

/// Append a `Failed` transition carrying the error. A store failure here is
/// logged; the caller already has an error to report.
fn record_failure(
    store: &dyn ExecutionStateStore,
    step: &StepName,
    execution: StepExecutionId,
    err: &StepError,
) {
    let message = StepFailure::from(err).to_string();
    if let Err(e) = store.record_status(execution, BatchStatus::Failed, Some(&message)) {
        tracing::error!(
            step = step.as_str(),
            execution = %execution,
            error = %e,
            "Failed to record step failure"
        );
    }
}
