//! Transactional `SQLite` writer for the Batchline engine.
//!
//! Each chunk runs in one `BEGIN IMMEDIATE` .. `COMMIT` transaction and
//! rows are saved with `INSERT OR REPLACE`, so replaying a chunk after a
//! lost checkpoint leaves one row per primary key.

pub mod config;
pub mod identifier;
pub mod record;
pub mod writer;

pub use config::SqliteWriterConfig;
pub use record::SqliteRecord;
pub use writer::SqliteItemWriter;
