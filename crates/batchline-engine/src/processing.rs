//! PROCESSING stage executor: inline or on a bounded worker pool.

use std::num::NonZeroUsize;

use rayon::prelude::*;

use crate::errors::StepError;
use crate::item::{ItemProcessor, ProcessOutcome};

/// Runs a processor over one chunk's raw items.
///
/// Results always come back in read order, whichever executor ran them.
pub(crate) enum ProcessingPool {
    Inline,
    Workers(rayon::ThreadPool),
}

impl ProcessingPool {
    /// Build an executor with `workers` threads (`1` runs inline on the
    /// step thread).
    pub(crate) fn new(workers: NonZeroUsize) -> Result<Self, StepError> {
        if workers.get() == 1 {
            return Ok(Self::Inline);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.get())
            .thread_name(|i| format!("batchline-process-{i}"))
            .build()
            .map_err(|e| StepError::InvalidConfig(format!("processing pool: {e}")))?;
        Ok(Self::Workers(pool))
    }

    pub(crate) fn workers(&self) -> usize {
        match self {
            Self::Inline => 1,
            Self::Workers(pool) => pool.current_num_threads(),
        }
    }

    pub(crate) fn process_all<P: ItemProcessor>(
        &self,
        processor: &P,
        items: &[P::Input],
    ) -> Vec<anyhow::Result<ProcessOutcome<P::Output>>> {
        match self {
            Self::Inline => items.iter().map(|item| processor.process(item)).collect(),
            Self::Workers(pool) => {
                pool.install(|| items.par_iter().map(|item| processor.process(item)).collect())
            }
        }
    }
}
