//! [`ItemWriter`] that saves records into one `SQLite` table.

use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use batchline_engine::item::ItemWriter;
use rusqlite::{params_from_iter, Connection};

use crate::config::SqliteWriterConfig;
use crate::identifier::{quote_identifier, validate_identifier};
use crate::record::SqliteRecord;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes `T` rows inside the engine's per-chunk transaction.
pub struct SqliteItemWriter<T> {
    conn: Connection,
    table: String,
    insert_sql: String,
    in_transaction: bool,
    _record: PhantomData<fn(&T)>,
}

impl<T: SqliteRecord> SqliteItemWriter<T> {
    /// Open (or create) the database file and the destination table.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened, the table name is not a plain
    /// identifier, or the table cannot be created.
    pub fn open(path: impl AsRef<Path>, table: &str) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::info!(path = %path.display(), table, "SQLite writer opened");
        Self::with_connection(conn, table)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory(table: &str) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite")?;
        Self::with_connection(conn, table)
    }

    pub fn from_config(config: &SqliteWriterConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Self::open(&config.path, &config.table)
    }

    fn with_connection(conn: Connection, table: &str) -> anyhow::Result<Self> {
        ensure!(
            !T::TABLE_COLUMNS.is_empty(),
            "record type declares no columns"
        );
        validate_identifier(table).map_err(|e| anyhow::anyhow!("invalid table name: {e}"))?;
        for (column, _) in T::TABLE_COLUMNS {
            validate_identifier(column)
                .map_err(|e| anyhow::anyhow!("invalid column name: {e}"))?;
        }

        conn.execute_batch(&create_table_sql(table, T::TABLE_COLUMNS))
            .with_context(|| format!("failed to create table {table}"))?;

        Ok(Self {
            insert_sql: insert_sql(table, T::TABLE_COLUMNS),
            table: table.to_string(),
            conn,
            in_transaction: false,
            _record: PhantomData,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows currently visible in the destination table.
    pub fn count(&self) -> anyhow::Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table));
        let rows: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(rows)?)
    }

    /// The underlying connection, for queries outside a chunk.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl<T: SqliteRecord> ItemWriter for SqliteItemWriter<T> {
    type Item = T;

    fn begin(&mut self) -> anyhow::Result<()> {
        if self.in_transaction {
            bail!("transaction already open on table {}", self.table);
        }
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("BEGIN failed")?;
        self.in_transaction = true;
        Ok(())
    }

    fn write_batch(&mut self, items: &[T]) -> anyhow::Result<()> {
        ensure!(self.in_transaction, "write outside a transaction");
        let mut stmt = self
            .conn
            .prepare_cached(&self.insert_sql)
            .context("failed to prepare insert")?;
        for (index, item) in items.iter().enumerate() {
            let values = item.values();
            ensure!(
                values.len() == T::TABLE_COLUMNS.len(),
                "record {index} has {} values for {} columns",
                values.len(),
                T::TABLE_COLUMNS.len()
            );
            stmt.execute(params_from_iter(values))
                .with_context(|| format!("insert into {} failed for record {index}", self.table))?;
        }
        tracing::debug!(table = self.table.as_str(), rows = items.len(), "Batch staged");
        Ok(())
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        ensure!(self.in_transaction, "commit outside a transaction");
        self.conn.execute_batch("COMMIT").context("COMMIT failed")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        self.in_transaction = false;
        // A failed COMMIT may already have ended the transaction.
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK").context("ROLLBACK failed")
    }
}

fn create_table_sql(table: &str, columns: &[(&str, &str)]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (name, sql_type))| {
            let key = if i == 0 { " PRIMARY KEY" } else { "" };
            format!("{} {sql_type}{key}", quote_identifier(name))
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table),
        defs.join(", ")
    )
}

fn insert_sql(table: &str, columns: &[(&str, &str)]) -> String {
    let names: Vec<String> = columns.iter().map(|(n, _)| quote_identifier(n)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    )
}
