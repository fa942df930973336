//! CSV reader configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Delimited file settings from the job YAML `reader.config` block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CsvReaderConfig {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Leading records discarded before the first item (the header row).
    #[serde(default = "default_lines_to_skip")]
    pub lines_to_skip: usize,
    /// Reject records whose field count differs from `columns`.
    #[serde(default)]
    pub strict: bool,
    /// Declared column names, in file order.
    pub columns: Vec<String>,
}

fn default_delimiter() -> char {
    ','
}

fn default_lines_to_skip() -> usize {
    1
}

impl CsvReaderConfig {
    /// Defaults for everything but the file and its columns.
    pub fn new(path: impl Into<PathBuf>, columns: &[&str]) -> Self {
        Self {
            path: path.into(),
            delimiter: default_delimiter(),
            lines_to_skip: default_lines_to_skip(),
            strict: false,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Decode the opaque `config` value of a job step component.
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_value(value).context("invalid csv reader config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            bail!("csv reader: path must not be empty");
        }
        if self.columns.is_empty() {
            bail!("csv reader: at least one column must be declared");
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.trim().is_empty() {
                bail!("csv reader: column names must not be empty");
            }
            if !seen.insert(column.as_str()) {
                bail!("csv reader: column '{column}' declared more than once");
            }
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// The delimiter as the single byte the tokenizer splits on.
    pub fn delimiter_byte(&self) -> anyhow::Result<u8> {
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            bail!(
                "csv reader: delimiter {:?} must be a single ASCII character other than a quote or line break",
                self.delimiter
            );
        }
        Ok(self.delimiter as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_a_headed_comma_file() {
        let config =
            CsvReaderConfig::from_value(json!({ "path": "in.csv", "columns": ["id", "name"] }))
                .unwrap();
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.lines_to_skip, 1);
        assert!(!config.strict);
        assert_eq!(config, CsvReaderConfig::new("in.csv", &["id", "name"]));
    }

    #[test]
    fn explicit_settings_override_defaults() {
        let config = CsvReaderConfig::from_value(json!({
            "path": "in.tsv",
            "delimiter": "\t",
            "lines_to_skip": 0,
            "strict": true,
            "columns": ["a"]
        }))
        .unwrap();
        assert_eq!(config.delimiter_byte().unwrap(), b'\t');
        assert_eq!(config.lines_to_skip, 0);
        assert!(config.strict);
    }

    #[test]
    fn columns_are_required() {
        let err = CsvReaderConfig::from_value(json!({ "path": "in.csv" })).unwrap_err();
        assert!(format!("{err:#}").contains("columns"));

        let err =
            CsvReaderConfig::from_value(json!({ "path": "in.csv", "columns": [] })).unwrap_err();
        assert!(err.to_string().contains("at least one column"));
    }

    #[test]
    fn duplicate_columns_rejected() {
        let err = CsvReaderConfig::new("in.csv", &["id", "id"])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("'id' declared more than once"));
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        let mut config = CsvReaderConfig::new("in.csv", &["id"]);
        config.delimiter = '§';
        assert!(config.validate().is_err());
        config.delimiter = '"';
        assert!(config.validate().is_err());
        config.delimiter = ';';
        assert!(config.validate().is_ok());
    }
}
