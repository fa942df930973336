//! Semantic validation for parsed job configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::config::types::{JobConfig, StepConfig};

const SUPPORTED_STATE_BACKENDS: &[&str] = &["sqlite"];

fn validate_step(index: usize, step: &StepConfig, errors: &mut Vec<String>) {
    let label = if step.name.trim().is_empty() {
        errors.push(format!("Step {index} has an empty name"));
        format!("steps[{index}]")
    } else {
        format!("Step '{}'", step.name)
    };

    if step.chunk_size == 0 {
        errors.push(format!("{label}: chunk_size must be at least 1"));
    }
    if step.processing.workers == 0 {
        errors.push(format!("{label}: processing.workers must be at least 1"));
    }
    if step.chunk_timeout_secs == Some(0) {
        errors.push(format!("{label}: chunk_timeout_secs must be > 0"));
    }
    if step.reader.use_ref.trim().is_empty() {
        errors.push(format!("{label}: reader reference (use) must not be empty"));
    }
    if step.writer.use_ref.trim().is_empty() {
        errors.push(format!("{label}: writer reference (use) must not be empty"));
    }
}

/// Validate a parsed job configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the job config.
pub fn validate_job(config: &JobConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported job version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.job.trim().is_empty() {
        errors.push("Job name must not be empty".to_string());
    }

    if !SUPPORTED_STATE_BACKENDS.contains(&config.state.backend.as_str()) {
        errors.push(format!(
            "Unsupported state backend '{}', expected one of: {}",
            config.state.backend,
            SUPPORTED_STATE_BACKENDS.join(", ")
        ));
    }

    if config.steps.is_empty() {
        errors.push("Job must define at least one step".to_string());
    }

    let mut seen = HashSet::new();
    for (i, step) in config.steps.iter().enumerate() {
        validate_step(i, step, &mut errors);
        let name = step.name.trim();
        if !name.is_empty() && !seen.insert(name) {
            errors.push(format!("Duplicate step name '{name}'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Job validation failed:\n  - {}", errors.join("\n  - "));
    }
}
