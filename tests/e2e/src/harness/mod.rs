//! Scratch job workspaces for end-to-end runs.
//!
//! A [`Workspace`] mirrors the `tests/fixtures` layout (`jobs/`, `data/`,
//! `out/`, `state/`) inside a temporary directory, so the relative paths in
//! job files resolve the same way they do for the `batchline` binary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use batchline_cli::resolve;
use batchline_engine::{Job, JobReport};
use batchline_state::{ExecutionStateStore, SqliteStateStore};
use batchline_types::state::{BatchStatus, JobName};
use rusqlite::Connection;
use tempfile::TempDir;

pub const FIXTURE_JOB: &str = "customer_import";

const JOB_FILE: &str = "jobs/customer_import.yaml";
const FIXTURE_FILES: [&str; 2] = [JOB_FILE, "data/customers.csv"];

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("fixtures")
}

/// A customer row as stored by the sqlite writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCustomer {
    pub id: i64,
    pub first_name: Option<String>,
    pub email: Option<String>,
}

/// A skip record as persisted in the state database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSkip {
    pub position: u64,
    pub item_repr: String,
    pub error_message: String,
}

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create workspace")?;
        for sub in ["jobs", "data"] {
            fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    /// A workspace holding copies of the fixture job and its input.
    pub fn from_fixtures() -> Result<Self> {
        let workspace = Self::new()?;
        let fixtures = fixtures_dir();
        for rel in FIXTURE_FILES {
            fs::copy(fixtures.join(rel), workspace.root().join(rel))
                .with_context(|| format!("failed to copy fixture {rel}"))?;
        }
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn job_path(&self) -> PathBuf {
        self.root().join(JOB_FILE)
    }

    pub fn output_db(&self) -> PathBuf {
        self.root().join("out").join("customers.db")
    }

    pub fn state_db(&self) -> PathBuf {
        self.root().join("state").join("state.db")
    }

    /// Write an input file under `data/`.
    pub fn write_data(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root().join("data").join(name);
        fs::write(&path, contents).with_context(|| format!("failed to write {name}"))?;
        Ok(path)
    }

    /// Replace the job file with `job`.
    pub fn write_job(&self, job: &JobFile) -> Result<PathBuf> {
        let path = self.job_path();
        fs::write(&path, job.render()).context("failed to write job file")?;
        Ok(path)
    }

    pub fn run(&self) -> Result<JobReport> {
        self.run_with(|job| job)
    }

    /// Load, build and run the job file, letting `prepare` adjust the job
    /// before it starts.
    pub fn run_with(&self, prepare: impl FnOnce(Job) -> Job) -> Result<JobReport> {
        let config = resolve::load_job(&self.job_path())?;
        let store = resolve::open_state_store(&config.state)?;
        let mut job = prepare(resolve::build_job(&config)?);
        Ok(job.run(&store)?)
    }

    /// Imported customers ordered by id; empty when nothing was written.
    pub fn customers(&self) -> Result<Vec<StoredCustomer>> {
        let path = self.output_db();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let conn = Connection::open(&path)?;
        let mut stmt = conn.prepare("SELECT id, first_name, email FROM customers ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredCustomer {
                id: row.get(0)?,
                first_name: row.get(1)?,
                email: row.get(2)?,
            })
        })?;
        let customers = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(customers)
    }

    pub fn customer_ids(&self) -> Result<Vec<i64>> {
        Ok(self.customers()?.into_iter().map(|c| c.id).collect())
    }

    /// Every skip record of the workspace, in insertion order.
    pub fn skipped_items(&self) -> Result<Vec<StoredSkip>> {
        let conn = Connection::open(self.state_db())?;
        let mut stmt = conn.prepare(
            "SELECT read_position, item_repr, error_message FROM skipped_items ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredSkip {
                position: row.get::<_, i64>(0)?.unsigned_abs(),
                item_repr: row.get(1)?,
                error_message: row.get(2)?,
            })
        })?;
        let skips = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(skips)
    }

    pub fn latest_status(&self, job: &str) -> Result<Option<BatchStatus>> {
        let store = SqliteStateStore::open(&self.state_db())?;
        Ok(store
            .latest_job_instance(&JobName::new(job))?
            .map(|instance| instance.status))
    }
}

/// Knobs of a generated single-step customer import job.
#[derive(Debug, Clone)]
pub struct JobFile {
    pub job: String,
    pub input: String,
    pub chunk_size: usize,
    pub skip_enabled: bool,
    pub max_skip_count: Option<u64>,
    pub workers: usize,
    pub strict: bool,
    pub restart_enabled: bool,
}

impl Default for JobFile {
    fn default() -> Self {
        Self {
            job: FIXTURE_JOB.to_string(),
            input: "customers.csv".to_string(),
            chunk_size: 10,
            skip_enabled: false,
            max_skip_count: None,
            workers: 1,
            strict: false,
            restart_enabled: true,
        }
    }
}

impl JobFile {
    #[must_use]
    pub fn with_skips(mut self, max_skip_count: Option<u64>) -> Self {
        self.skip_enabled = true;
        self.max_skip_count = max_skip_count;
        self
    }

    pub fn render(&self) -> String {
        let max_skip = self
            .max_skip_count
            .map(|n| format!("\n      max_skip_count: {n}"))
            .unwrap_or_default();
        format!(
            r#"version: "1.0"
job: {job}
restart_enabled: {restart}
state:
  connection: ../state/state.db
steps:
  - name: import_customers
    chunk_size: {chunk}
    reader:
      use: csv
      config:
        path: ../data/{input}
        strict: {strict}
        columns: [id, first_name, last_name, email, gender, contact_no, country, dob]
    writer:
      use: sqlite
      config:
        path: ../out/customers.db
        table: customers
    skip_policy:
      enabled: {skip}{max_skip}
    processing:
      workers: {workers}
"#,
            job = self.job,
            restart = self.restart_enabled,
            chunk = self.chunk_size,
            input = self.input,
            strict = self.strict,
            skip = self.skip_enabled,
            workers = self.workers,
        )
    }
}
