//! Turns a validated job config into a runnable [`Job`] and its state store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use batchline_dest_sqlite::{SqliteItemWriter, SqliteWriterConfig};
use batchline_engine::config::{
    parse_job, validate_job, ComponentConfig, JobConfig, StateConfig, StepConfig,
};
use batchline_engine::{ChunkStep, Job, Step};
use batchline_source_csv::{CsvItemReader, CsvReaderConfig};
use batchline_state::SqliteStateStore;

use crate::customer::{Customer, CustomerProcessor, CustomerRowMapper};

/// Readers this binary knows how to build.
pub const READERS: &[&str] = &["csv"];
/// Writers this binary knows how to build.
pub const WRITERS: &[&str] = &["sqlite"];

/// Parse and validate a job file. Relative paths inside it are resolved
/// against the file's directory.
pub fn load_job(job_path: &Path) -> Result<JobConfig> {
    let mut config = parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;
    validate_job(&config)?;
    if let Some(base) = job_path.parent() {
        rebase_paths(&mut config, base);
    }
    Ok(config)
}

/// Where the state database lives: `state.connection`, else
/// `~/.batchline/state.db`.
pub fn state_path(config: &StateConfig) -> PathBuf {
    match &config.connection {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".batchline").join("state.db")
        }
    }
}

pub fn open_state_store(config: &StateConfig) -> Result<SqliteStateStore> {
    if config.backend != "sqlite" {
        bail!("Unsupported state backend '{}'", config.backend);
    }
    let path = state_path(config);
    SqliteStateStore::open(&path)
        .with_context(|| format!("Failed to open state DB: {}", path.display()))
}

/// Build every step of the job, opening its input and output.
pub fn build_job(config: &JobConfig) -> Result<Job> {
    let mut job = Job::new(config.job.as_str()).restart_enabled(config.restart_enabled);
    for step in &config.steps {
        job.add_step(build_step(step)?);
    }
    Ok(job)
}

fn build_step(step: &StepConfig) -> Result<Box<dyn Step>> {
    let settings = step.settings()?;
    let reader = customer_reader(&step.reader)
        .with_context(|| format!("step '{}': cannot open reader", step.name))?;
    let writer = customer_writer(&step.writer)
        .with_context(|| format!("step '{}': cannot open writer", step.name))?;

    tracing::debug!(
        step = step.name.as_str(),
        reader = step.reader.use_ref.as_str(),
        writer = step.writer.use_ref.as_str(),
        "Step resolved"
    );
    Ok(Box::new(ChunkStep::new(
        step.name.as_str(),
        settings,
        reader,
        CustomerProcessor,
        writer,
    )))
}

/// Decode a step's component configs without opening anything.
///
/// # Errors
///
/// Fails on an unknown `use`, an invalid config block, or a missing input file.
pub fn check_step(step: &StepConfig) -> Result<()> {
    step.settings()?;
    let reader = csv_config(&step.reader)?;
    if !reader.path.is_file() {
        bail!("input file {} does not exist", reader.path.display());
    }
    sqlite_config(&step.writer)?;
    Ok(())
}

fn customer_reader(component: &ComponentConfig) -> Result<CsvItemReader<CustomerRowMapper>> {
    CsvItemReader::open(csv_config(component)?, CustomerRowMapper)
}

fn customer_writer(component: &ComponentConfig) -> Result<SqliteItemWriter<Customer>> {
    SqliteItemWriter::from_config(&sqlite_config(component)?)
}

fn csv_config(component: &ComponentConfig) -> Result<CsvReaderConfig> {
    match component.use_ref.as_str() {
        "csv" => CsvReaderConfig::from_value(component.config.clone()),
        other => bail!(
            "Unknown reader '{other}' (available: {})",
            READERS.join(", ")
        ),
    }
}

fn sqlite_config(component: &ComponentConfig) -> Result<SqliteWriterConfig> {
    match component.use_ref.as_str() {
        "sqlite" => SqliteWriterConfig::from_value(component.config.clone()),
        other => bail!(
            "Unknown writer '{other}' (available: {})",
            WRITERS.join(", ")
        ),
    }
}

/// Resolve relative component paths against `base`, typically the job
/// file's directory.
pub fn rebase_paths(config: &mut JobConfig, base: &Path) {
    for step in &mut config.steps {
        for component in [&mut step.reader, &mut step.writer] {
            if let Some(serde_json::Value::String(path)) = component.config.get_mut("path") {
                let candidate = Path::new(path.as_str());
                if candidate.is_relative() {
                    *path = base.join(candidate).to_string_lossy().into_owned();
                }
            }
        }
    }
    if let Some(connection) = config.state.connection.as_mut() {
        if Path::new(connection.as_str()).is_relative() {
            *connection = base.join(connection.as_str()).to_string_lossy().into_owned();
        }
    }
}
