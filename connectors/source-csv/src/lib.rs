//! Delimited text reader for the Batchline engine.
//!
//! [`CsvItemReader`] tokenizes each record, aligns it with the declared
//! columns as a [`FieldSet`] and maps it to a typed item through a
//! [`FieldSetMapper`]. It can seek, so restarts resume without re-reading
//! committed records through the engine.

pub mod config;
pub mod fieldset;
pub mod mapper;
pub mod reader;

pub use config::CsvReaderConfig;
pub use fieldset::FieldSet;
pub use mapper::{FieldSetMapper, RawFieldSetMapper};
pub use reader::CsvItemReader;
