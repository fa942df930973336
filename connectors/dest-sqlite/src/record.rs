//! Records that map onto a `SQLite` table row.

use rusqlite::types::Value;

/// A row type the writer can persist.
pub trait SqliteRecord: Send {
    /// `(column, SQL type)` pairs in insert order. The first column is the
    /// primary key, so saving a record twice replaces the earlier row.
    const TABLE_COLUMNS: &'static [(&'static str, &'static str)];

    /// Column values, aligned with [`Self::TABLE_COLUMNS`].
    fn values(&self) -> Vec<Value>;
}
