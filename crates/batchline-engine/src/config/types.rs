//! Serde types for job YAML files.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::StepError;
use crate::settings::{RetryPolicy, SkipPolicy, StepSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub version: String,
    pub job: String,
    #[serde(default = "default_restart_enabled")]
    pub restart_enabled: bool,
    #[serde(default)]
    pub state: StateConfig,
    pub steps: Vec<StepConfig>,
}

fn default_restart_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database path; defaults to `~/.batchline/state.db`.
    pub connection: Option<String>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub chunk_size: usize,
    pub reader: ComponentConfig,
    pub writer: ComponentConfig,
    #[serde(default)]
    pub skip_policy: SkipPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub chunk_timeout_secs: Option<u64>,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl StepConfig {
    /// Runtime settings for this step.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidConfig`] if `chunk_size` or
    /// `processing.workers` is zero.
    pub fn settings(&self) -> Result<StepSettings, StepError> {
        let chunk_size = NonZeroUsize::new(self.chunk_size).ok_or_else(|| {
            StepError::InvalidConfig(format!("step '{}': chunk_size must be >= 1", self.name))
        })?;
        let workers = NonZeroUsize::new(self.processing.workers).ok_or_else(|| {
            StepError::InvalidConfig(format!(
                "step '{}': processing.workers must be >= 1",
                self.name
            ))
        })?;

        let mut settings = StepSettings::new(chunk_size)
            .with_skip_policy(self.skip_policy)
            .with_retry(self.retry)
            .with_workers(workers);
        if let Some(secs) = self.chunk_timeout_secs {
            settings = settings.with_chunk_timeout(Duration::from_secs(secs));
        }
        Ok(settings)
    }
}

/// A reader or writer reference plus its free-form settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "use")]
    pub use_ref: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}
