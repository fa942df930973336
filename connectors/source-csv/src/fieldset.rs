//! One tokenized record addressed by declared column name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};

/// Values of one record, aligned with the reader's declared columns.
///
/// A value is `None` when the record ended before its column (lenient
/// mode only). Empty strings are kept as `Some("")`; [`FieldSet::parse`]
/// treats them as absent.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldSet {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
    line: u64,
}

impl FieldSet {
    /// Align `tokens` with `columns`.
    ///
    /// In strict mode the token count must equal the column count. In
    /// lenient mode missing trailing tokens become `None` and surplus
    /// tokens are dropped.
    pub fn from_tokens<'a>(
        columns: Arc<[String]>,
        tokens: impl IntoIterator<Item = &'a str>,
        line: u64,
        strict: bool,
    ) -> anyhow::Result<Self> {
        let mut values: Vec<Option<String>> = Vec::with_capacity(columns.len());
        let mut surplus = 0usize;
        for token in tokens {
            if values.len() < columns.len() {
                values.push(Some(token.to_string()));
            } else {
                surplus += 1;
            }
        }

        if strict && (values.len() != columns.len() || surplus > 0) {
            bail!(
                "line {line}: expected {} fields, found {}",
                columns.len(),
                values.len() + surplus
            );
        }
        values.resize(columns.len(), None);

        Ok(Self {
            columns,
            values,
            line,
        })
    }

    /// Raw value of `column`; `None` for a missing field or an undeclared column.
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values[index].as_deref()
    }

    /// Raw value of `column`, failing when it is absent.
    pub fn required(&self, column: &str) -> anyhow::Result<&str> {
        self.get(column)
            .ok_or_else(|| anyhow!("line {}: missing value for column '{column}'", self.line))
    }

    /// Parse the trimmed value of `column`. Absent and blank values are `None`.
    pub fn parse<T>(&self, column: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(column).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).with_context(|| {
                format!("line {}: invalid value {raw:?} for column '{column}'", self.line)
            }),
        }
    }

    /// Physical line of the record in its file (1-based).
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// `(column, value)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_deref))
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in self.iter() {
            map.entry(&column, &value);
        }
        map.finish()
    }
}
