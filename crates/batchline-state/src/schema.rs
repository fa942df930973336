//! `SQLite` schema for execution state.

/// Idempotent DDL for state tables.
pub const CREATE_TABLES: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS job_instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_instances_name ON job_instances (job_name, id);

CREATE TABLE IF NOT EXISTS step_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_instance_id INTEGER NOT NULL REFERENCES job_instances(id),
    step_name TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    read_position INTEGER,
    read_count INTEGER NOT NULL DEFAULT 0,
    write_count INTEGER NOT NULL DEFAULT 0,
    skip_count INTEGER NOT NULL DEFAULT 0,
    error_skip_count INTEGER NOT NULL DEFAULT 0,
    checkpointed_at TEXT,
    started_at TEXT NOT NULL,
    UNIQUE (job_instance_id, step_name, attempt)
);

CREATE TABLE IF NOT EXISTS step_status_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    step_execution_id INTEGER NOT NULL REFERENCES step_executions(id),
    status TEXT NOT NULL,
    message TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_status_history_execution
    ON step_status_history (step_execution_id, id);

CREATE TABLE IF NOT EXISTS skipped_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    step_execution_id INTEGER NOT NULL REFERENCES step_executions(id),
    step_name TEXT NOT NULL,
    read_position INTEGER NOT NULL,
    item_repr TEXT NOT NULL,
    error_message TEXT NOT NULL,
    error_category TEXT NOT NULL,
    skipped_at TEXT NOT NULL
);
";
