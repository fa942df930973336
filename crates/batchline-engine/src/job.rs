//! Job controller: sequences steps within a job instance.

use std::collections::HashSet;
use std::time::Instant;

use batchline_state::ExecutionStateStore;
use batchline_types::state::{BatchStatus, JobInstanceId, JobName};

use crate::errors::StepError;
use crate::result::{JobReport, StepReport};
use crate::step::{Step, StepContext};
use crate::stop::StopHandle;

/// An ordered sequence of steps executed as one unit of work.
pub struct Job {
    name: JobName,
    steps: Vec<Box<dyn Step>>,
    restart_enabled: bool,
    stop: StopHandle,
}

impl Job {
    pub fn new(name: impl Into<JobName>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            restart_enabled: true,
            stop: StopHandle::new(),
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn add_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    /// When enabled (the default), a run continues the latest instance if
    /// it ended `Failed` or `Stopped`; otherwise every run starts fresh.
    #[must_use]
    pub fn restart_enabled(mut self, enabled: bool) -> Self {
        self.restart_enabled = enabled;
        self
    }

    /// Use an externally created stop handle (e.g. one wired to a signal).
    #[must_use]
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn name(&self) -> &JobName {
        &self.name
    }

    /// Run the job's steps in order.
    ///
    /// Steps already completed by a resumed instance are not re-run. The
    /// first step that ends `Failed` or `Stopped` ends the job with that
    /// status; later steps are not started.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidConfig`] for duplicate step names and
    /// [`StepError::State`] when the job instance itself cannot be
    /// created or updated. Step failures are reported in the [`JobReport`].
    pub fn run(&mut self, store: &dyn ExecutionStateStore) -> Result<JobReport, StepError> {
        let started = Instant::now();
        self.check_step_names()?;

        let (instance, resumed) = self.open_instance(store)?;
        store.record_job_status(instance, BatchStatus::Running, None)?;
        tracing::info!(
            job = self.name.as_str(),
            instance = %instance,
            resumed,
            steps = self.steps.len(),
            "Job started"
        );

        let ctx = StepContext {
            store,
            job: &self.name,
            instance,
            stop: &self.stop,
        };
        let mut reports: Vec<StepReport> = Vec::with_capacity(self.steps.len());
        let mut status = BatchStatus::Completed;

        for step in &mut self.steps {
            if resumed {
                if let Some(state) = store.load_state(instance, step.name())? {
                    if state.status() == BatchStatus::Completed {
                        tracing::info!(
                            job = ctx.job.as_str(),
                            step = step.name().as_str(),
                            "Step already completed in this instance, skipping"
                        );
                        reports.push(StepReport::already_completed(&state));
                        continue;
                    }
                }
            }

            let report = step.execute(&ctx);
            let step_status = report.status;
            reports.push(report);
            if step_status != BatchStatus::Completed {
                status = step_status;
                break;
            }
        }

        let message = match status {
            BatchStatus::Completed => None,
            _ => reports.last().map(|r| match &r.error {
                Some(failure) => format!("step '{}' {}: {failure}", r.step, r.status.as_str()),
                None => format!("step '{}' {}", r.step, r.status.as_str()),
            }),
        };
        store.record_job_status(instance, status, message.as_deref())?;

        let duration_secs = started.elapsed().as_secs_f64();
        match status {
            BatchStatus::Completed => tracing::info!(
                job = self.name.as_str(),
                instance = %instance,
                duration_secs,
                "Job completed"
            ),
            _ => tracing::error!(
                job = self.name.as_str(),
                instance = %instance,
                status = status.as_str(),
                message = message.as_deref(),
                "Job did not complete"
            ),
        }

        Ok(JobReport {
            job: self.name.clone(),
            instance,
            resumed,
            status,
            steps: reports,
            duration_secs,
        })
    }

    fn check_step_names(&self) -> Result<(), StepError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name().as_str()) {
                return Err(StepError::InvalidConfig(format!(
                    "job '{}' has more than one step named '{}'",
                    self.name,
                    step.name()
                )));
            }
        }
        Ok(())
    }

    /// Continue the latest instance when it is restartable, else create one.
    fn open_instance(
        &self,
        store: &dyn ExecutionStateStore,
    ) -> Result<(JobInstanceId, bool), StepError> {
        if let Some(latest) = store.latest_job_instance(&self.name)? {
            if latest.status.is_restartable() {
                if self.restart_enabled {
                    tracing::info!(
                        job = self.name.as_str(),
                        instance = %latest.id,
                        previous_status = latest.status.as_str(),
                        "Restarting job instance"
                    );
                    return Ok((latest.id, true));
                }
                tracing::info!(
                    job = self.name.as_str(),
                    instance = %latest.id,
                    "Restart disabled, starting a new job instance"
                );
            }
        }
        Ok((store.create_job_instance(&self.name)?, false))
    }
}
