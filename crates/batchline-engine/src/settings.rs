//! Runtime settings of a chunk-oriented step.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether processing errors become skips, and how many are tolerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Upper bound on error-skips across all attempts of the step.
    /// `None` means unbounded.
    #[serde(default)]
    pub max_skip_count: Option<u64>,
}

impl SkipPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn up_to(max_skip_count: u64) -> Self {
        Self {
            enabled: true,
            max_skip_count: Some(max_skip_count),
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            enabled: true,
            max_skip_count: None,
        }
    }
}

/// Chunk retries after a source read failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt; `0` disables retrying.
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay, doubled on every retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Everything a step needs beyond its reader, processor and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSettings {
    pub chunk_size: NonZeroUsize,
    pub skip_policy: SkipPolicy,
    pub retry: RetryPolicy,
    /// Time budget of one chunk cycle, from opening the transaction to commit.
    pub chunk_timeout: Option<Duration>,
    /// Processing workers per chunk; `1` processes inline.
    pub workers: NonZeroUsize,
}

impl StepSettings {
    #[must_use]
    pub fn new(chunk_size: NonZeroUsize) -> Self {
        Self {
            chunk_size,
            skip_policy: SkipPolicy::disabled(),
            retry: RetryPolicy::default(),
            chunk_timeout: None,
            workers: NonZeroUsize::MIN,
        }
    }

    #[must_use]
    pub fn with_skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.skip_policy = policy;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }
}
