//! `SQLite`-backed implementation of [`ExecutionStateStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use batchline_types::position::ReadPosition;
use batchline_types::skip::SkippedItem;
use batchline_types::state::{
    BatchStatus, Checkpoint, ExecutionState, JobInstanceId, JobInstanceState, JobName,
    StatusTransition, StepCounters, StepExecutionId, StepName,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::ExecutionStateStore;
use crate::error::{self, StateError};
use crate::schema::CREATE_TABLES;

/// Raw `step_executions` row before history is attached.
struct ExecutionRow {
    id: i64,
    step_name: String,
    attempt: i64,
    read_position: Option<i64>,
    read_count: i64,
    write_count: i64,
    skip_count: i64,
    error_skip_count: i64,
    checkpointed_at: Option<String>,
}

const EXECUTION_COLUMNS: &str = "id, step_name, attempt, read_position, read_count, \
     write_count, skip_count, error_skip_count, checkpointed_at";

fn execution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        step_name: row.get(1)?,
        attempt: row.get(2)?,
        read_position: row.get(3)?,
        read_count: row.get(4)?,
        write_count: row.get(5)?,
        skip_count: row.get(6)?,
        error_skip_count: row.get(7)?,
        checkpointed_at: row.get(8)?,
    })
}

fn to_u64(value: i64, column: &str) -> error::Result<u64> {
    u64::try_from(value).map_err(|_| StateError::Corrupt(format!("negative {column}: {value}")))
}

fn to_i64(value: u64, column: &'static str) -> error::Result<i64> {
    i64::try_from(value).map_err(|_| StateError::OutOfRange { column, value })
}

/// `SQLite`-backed execution state storage.
///
/// Create with [`SqliteStateStore::open`] for file-backed persistence
/// or [`SqliteStateStore::in_memory`] for tests.
#[derive(Debug)]
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Current UTC time as ISO-8601.
    fn now_iso8601() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn ensure_execution(conn: &Connection, execution: StepExecutionId) -> error::Result<()> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM step_executions WHERE id = ?1",
                [execution.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::backend)?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StateError::UnknownId {
                kind: "step execution",
                id: execution.0,
            }),
        }
    }

    fn load_history(conn: &Connection, execution: i64) -> error::Result<Vec<StatusTransition>> {
        let mut stmt = conn
            .prepare(
                "SELECT status, message, recorded_at FROM step_status_history \
                 WHERE step_execution_id = ?1 ORDER BY id",
            )
            .map_err(|e| StateError::backend_context("load_history: prepare", e))?;
        let rows = stmt
            .query_map([execution], |row| {
                let status: String = row.get(0)?;
                let message: Option<String> = row.get(1)?;
                let at: String = row.get(2)?;
                Ok((status, message, at))
            })
            .map_err(|e| StateError::backend_context("load_history: query", e))?;

        let mut history = Vec::new();
        for row in rows {
            let (raw_status, message, at) = row.map_err(StateError::backend)?;
            let status = BatchStatus::parse(&raw_status)
                .ok_or_else(|| StateError::Corrupt(format!("unknown status '{raw_status}'")))?;
            history.push(StatusTransition {
                status,
                at,
                message,
            });
        }
        Ok(history)
    }

    fn assemble_state(
        conn: &Connection,
        instance: JobInstanceId,
        row: ExecutionRow,
    ) -> error::Result<ExecutionState> {
        let checkpoint = match (row.read_position, row.checkpointed_at) {
            (Some(position), Some(updated_at)) => Some(Checkpoint {
                position: ReadPosition::new(to_u64(position, "read_position")?),
                counters: StepCounters {
                    read: to_u64(row.read_count, "read_count")?,
                    written: to_u64(row.write_count, "write_count")?,
                    skipped: to_u64(row.skip_count, "skip_count")?,
                    skipped_on_error: to_u64(row.error_skip_count, "error_skip_count")?,
                },
                updated_at,
            }),
            _ => None,
        };
        let attempt = u32::try_from(row.attempt)
            .map_err(|_| StateError::Corrupt(format!("invalid attempt {}", row.attempt)))?;
        Ok(ExecutionState {
            execution_id: StepExecutionId(row.id),
            job_instance: instance,
            step: StepName::new(row.step_name),
            attempt,
            checkpoint,
            history: Self::load_history(conn, row.id)?,
        })
    }

    fn load_state_locked(
        conn: &Connection,
        instance: JobInstanceId,
        step: &StepName,
    ) -> error::Result<Option<ExecutionState>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {EXECUTION_COLUMNS} FROM step_executions \
                     WHERE job_instance_id = ?1 AND step_name = ?2 \
                     ORDER BY attempt DESC LIMIT 1"
                ),
                rusqlite::params![instance.0, step.as_str()],
                execution_row,
            )
            .optional()
            .map_err(|e| StateError::backend_context("load_state", e))?;

        row.map(|row| Self::assemble_state(conn, instance, row))
            .transpose()
    }

    #[cfg(test)]
    fn count_skipped_items(&self, execution: StepExecutionId) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM skipped_items WHERE step_execution_id = ?1",
            [execution.0],
            |row| row.get(0),
        )
        .map_err(StateError::backend)
    }

    #[cfg(test)]
    fn first_skipped_item(&self, execution: StepExecutionId) -> error::Result<(i64, String)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT read_position, error_message FROM skipped_items \
             WHERE step_execution_id = ?1 ORDER BY id LIMIT 1",
            [execution.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(StateError::backend)
    }
}

impl ExecutionStateStore for SqliteStateStore {
    fn create_job_instance(&self, job: &JobName) -> error::Result<JobInstanceId> {
        let conn = self.lock_conn()?;
        let now = Self::now_iso8601();
        conn.execute(
            "INSERT INTO job_instances (job_name, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![job.as_str(), BatchStatus::Pending.as_str(), now],
        )
        .map_err(|e| StateError::backend_context("create_job_instance", e))?;
        Ok(JobInstanceId(conn.last_insert_rowid()))
    }

    fn latest_job_instance(&self, job: &JobName) -> error::Result<Option<JobInstanceState>> {
        let conn = self.lock_conn()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, status, created_at FROM job_instances \
                 WHERE job_name = ?1 ORDER BY id DESC LIMIT 1",
                [job.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| StateError::backend_context("latest_job_instance", e))?;

        row.map(|(id, raw_status, created_at)| {
            let status = BatchStatus::parse(&raw_status)
                .ok_or_else(|| StateError::Corrupt(format!("unknown status '{raw_status}'")))?;
            Ok(JobInstanceState {
                id: JobInstanceId(id),
                job: job.clone(),
                status,
                created_at,
            })
        })
        .transpose()
    }

    fn record_job_status(
        &self,
        instance: JobInstanceId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE job_instances SET status = ?1, message = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                rusqlite::params![status.as_str(), message, Self::now_iso8601(), instance.0],
            )
            .map_err(|e| StateError::backend_context("record_job_status", e))?;
        if updated == 0 {
            return Err(StateError::UnknownId {
                kind: "job instance",
                id: instance.0,
            });
        }
        Ok(())
    }

    fn start_step_execution(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> error::Result<StepExecutionId> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("start_step_execution: begin tx", e))?;

        let previous = tx
            .query_row(
                &format!(
                    "SELECT {EXECUTION_COLUMNS} FROM step_executions \
                     WHERE job_instance_id = ?1 AND step_name = ?2 \
                     ORDER BY attempt DESC LIMIT 1"
                ),
                rusqlite::params![instance.0, step.as_str()],
                execution_row,
            )
            .optional()
            .map_err(|e| StateError::backend_context("start_step_execution: previous", e))?;

        let now = Self::now_iso8601();
        let (attempt, position, read, written, skipped, error_skipped, checkpointed_at) =
            match previous {
                Some(prev) => (
                    prev.attempt + 1,
                    prev.read_position,
                    prev.read_count,
                    prev.write_count,
                    prev.skip_count,
                    prev.error_skip_count,
                    prev.checkpointed_at,
                ),
                None => (1, None, 0, 0, 0, 0, None),
            };

        tx.execute(
            "INSERT INTO step_executions \
             (job_instance_id, step_name, attempt, read_position, read_count, write_count, \
              skip_count, error_skip_count, checkpointed_at, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                instance.0,
                step.as_str(),
                attempt,
                position,
                read,
                written,
                skipped,
                error_skipped,
                checkpointed_at,
                now,
            ],
        )
        .map_err(|e| StateError::backend_context("start_step_execution: insert", e))?;
        let execution = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO step_status_history (step_execution_id, status, recorded_at) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![execution, BatchStatus::Pending.as_str(), now],
        )
        .map_err(|e| StateError::backend_context("start_step_execution: history", e))?;

        tx.commit()
            .map_err(|e| StateError::backend_context("start_step_execution: commit", e))?;
        Ok(StepExecutionId(execution))
    }

    fn load_state(
        &self,
        instance: JobInstanceId,
        step: &StepName,
    ) -> error::Result<Option<ExecutionState>> {
        let conn = self.lock_conn()?;
        Self::load_state_locked(&conn, instance, step)
    }

    fn save_checkpoint(
        &self,
        execution: StepExecutionId,
        position: ReadPosition,
        counters: &StepCounters,
    ) -> error::Result<()> {
        let read_position = to_i64(position.get(), "read_position")?;
        let read_count = to_i64(counters.read, "read_count")?;
        let write_count = to_i64(counters.written, "write_count")?;
        let skip_count = to_i64(counters.skipped, "skip_count")?;
        let error_skip_count = to_i64(counters.skipped_on_error, "error_skip_count")?;
        let conn = self.lock_conn()?;
        // Single guarded UPDATE: the row is only touched when the position
        // does not move backwards.
        let updated = conn
            .execute(
                "UPDATE step_executions SET read_position = ?1, read_count = ?2, \
                 write_count = ?3, skip_count = ?4, error_skip_count = ?5, checkpointed_at = ?6 \
                 WHERE id = ?7 AND (read_position IS NULL OR read_position <= ?1)",
                rusqlite::params![
                    read_position,
                    read_count,
                    write_count,
                    skip_count,
                    error_skip_count,
                    Self::now_iso8601(),
                    execution.0,
                ],
            )
            .map_err(|e| StateError::backend_context("save_checkpoint", e))?;
        if updated > 0 {
            return Ok(());
        }

        let stored: Option<Option<i64>> = conn
            .query_row(
                "SELECT read_position FROM step_executions WHERE id = ?1",
                [execution.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StateError::backend_context("save_checkpoint: inspect", e))?;
        match stored {
            None => Err(StateError::UnknownId {
                kind: "step execution",
                id: execution.0,
            }),
            Some(stored) => Err(StateError::CheckpointRegression {
                execution,
                stored: ReadPosition::new(to_u64(stored.unwrap_or(0), "read_position")?),
                attempted: position,
            }),
        }
    }

    fn record_status(
        &self,
        execution: StepExecutionId,
        status: BatchStatus,
        message: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        Self::ensure_execution(&conn, execution)?;
        conn.execute(
            "INSERT INTO step_status_history (step_execution_id, status, message, recorded_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![execution.0, status.as_str(), message, Self::now_iso8601()],
        )
        .map_err(|e| StateError::backend_context("record_status", e))?;
        Ok(())
    }

    fn insert_skipped_items(
        &self,
        execution: StepExecutionId,
        items: &[SkippedItem],
    ) -> error::Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("insert_skipped_items: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO skipped_items \
                 (step_execution_id, step_name, read_position, item_repr, error_message, \
                  error_category, skipped_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| StateError::backend_context("insert_skipped_items: prepare", e))?;

        let mut count = 0u64;
        for item in items {
            stmt.execute(rusqlite::params![
                execution.0,
                item.step,
                to_i64(item.position.get(), "read_position")?,
                item.item_repr,
                item.error_message,
                item.category.as_str(),
                item.skipped_at.as_str(),
            ])
            .map_err(|e| StateError::backend_context("insert_skipped_items: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::backend_context("insert_skipped_items: commit", e))?;

        Ok(count)
    }

    fn list_step_states(&self, instance: JobInstanceId) -> error::Result<Vec<ExecutionState>> {
        let conn = self.lock_conn()?;
        let step_names: Vec<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT step_name FROM step_executions WHERE job_instance_id = ?1 \
                     GROUP BY step_name ORDER BY MIN(id)",
                )
                .map_err(|e| StateError::backend_context("list_step_states: prepare", e))?;
            let rows = stmt
                .query_map([instance.0], |row| row.get(0))
                .map_err(|e| StateError::backend_context("list_step_states: query", e))?;
            rows.collect::<rusqlite::Result<_>>()
                .map_err(StateError::backend)?
        };

        let mut states = Vec::with_capacity(step_names.len());
        for name in step_names {
            if let Some(state) = Self::load_state_locked(&conn, instance, &StepName::new(name))? {
                states.push(state);
            }
        }
        Ok(states)
    }
}
