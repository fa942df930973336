//! SQLite writer configuration.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::identifier::validate_identifier;

/// Destination settings from the job YAML `writer.config` block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteWriterConfig {
    pub path: PathBuf,
    pub table: String,
}

impl SqliteWriterConfig {
    /// Decode the opaque `config` value of a job step component.
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_value(value).context("invalid sqlite writer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            anyhow::bail!("sqlite writer: path must not be empty");
        }
        validate_identifier(&self.table)
            .map_err(|e| anyhow::anyhow!("sqlite writer: invalid table name: {e}"))
    }
}
