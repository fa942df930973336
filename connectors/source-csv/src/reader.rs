//! [`ItemReader`] over a delimited text file.

use std::fs::File;
use std::sync::Arc;

use anyhow::{bail, Context};
use batchline_engine::item::{ItemReader, Resume};
use batchline_types::position::ReadPosition;

use crate::config::CsvReaderConfig;
use crate::fieldset::FieldSet;
use crate::mapper::FieldSetMapper;

/// Reads one item per record, mapping each through `M`.
///
/// Quoted fields may contain the delimiter and line breaks. Blank lines
/// are ignored and do not count as records.
pub struct CsvItemReader<M> {
    config: CsvReaderConfig,
    columns: Arc<[String]>,
    delimiter: u8,
    mapper: M,
    inner: csv::Reader<File>,
    record: csv::StringRecord,
}

impl<M: FieldSetMapper> CsvItemReader<M> {
    /// Open the file and skip its header records.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or when the file cannot be opened.
    pub fn open(config: CsvReaderConfig, mapper: M) -> anyhow::Result<Self> {
        config.validate()?;
        let delimiter = config.delimiter_byte()?;
        let inner = open_positioned(&config, delimiter)?;
        tracing::info!(
            path = %config.path.display(),
            columns = config.columns.len(),
            lines_to_skip = config.lines_to_skip,
            strict = config.strict,
            "CSV reader opened"
        );
        Ok(Self {
            columns: config.columns.iter().cloned().collect(),
            config,
            delimiter,
            mapper,
            inner,
            record: csv::StringRecord::new(),
        })
    }

    pub fn config(&self) -> &CsvReaderConfig {
        &self.config
    }

    fn next_record(&mut self) -> anyhow::Result<bool> {
        self.inner
            .read_record(&mut self.record)
            .with_context(|| format!("failed to read {}", self.config.path.display()))
    }
}

impl<M: FieldSetMapper> ItemReader for CsvItemReader<M> {
    type Item = M::Item;

    fn read(&mut self) -> anyhow::Result<Option<M::Item>> {
        if !self.next_record()? {
            return Ok(None);
        }
        let line = self.record.position().map_or(0, csv::Position::line);
        let fields = FieldSet::from_tokens(
            Arc::clone(&self.columns),
            self.record.iter(),
            line,
            self.config.strict,
        )?;
        let item = self
            .mapper
            .map(&fields)
            .with_context(|| format!("line {line}: cannot map record"))?;
        Ok(Some(item))
    }

    /// Reopen the file and discard `position` records after the header.
    fn seek(&mut self, position: ReadPosition) -> anyhow::Result<Resume> {
        self.inner = open_positioned(&self.config, self.delimiter)?;
        for skipped in 0..position.get() {
            if !self.next_record()? {
                bail!(
                    "{} has only {skipped} records, cannot seek to position {position}",
                    self.config.path.display()
                );
            }
        }
        tracing::debug!(
            path = %self.config.path.display(),
            position = position.get(),
            "CSV reader repositioned"
        );
        Ok(Resume::Seeked)
    }
}

/// A tokenizer positioned after the configured header records.
fn open_positioned(config: &CsvReaderConfig, delimiter: u8) -> anyhow::Result<csv::Reader<File>> {
    let mut inner = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(&config.path)
        .with_context(|| format!("failed to open {}", config.path.display()))?;

    let mut header = csv::StringRecord::new();
    for _ in 0..config.lines_to_skip {
        let more = inner
            .read_record(&mut header)
            .with_context(|| format!("failed to read header of {}", config.path.display()))?;
        if !more {
            break;
        }
    }
    Ok(inner)
}
