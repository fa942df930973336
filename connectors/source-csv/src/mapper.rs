//! Typed mapping from a [`FieldSet`] to a reader item.

use crate::fieldset::FieldSet;

/// Turns one tokenized record into an item.
///
/// A mapping error fails the read of that record.
pub trait FieldSetMapper: Send {
    type Item: Send;

    fn map(&self, fields: &FieldSet) -> anyhow::Result<Self::Item>;
}

impl<T, F> FieldSetMapper for F
where
    T: Send,
    F: Fn(&FieldSet) -> anyhow::Result<T> + Send,
{
    type Item = T;

    fn map(&self, fields: &FieldSet) -> anyhow::Result<T> {
        self(fields)
    }
}

/// Yields the field set itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFieldSetMapper;

impl FieldSetMapper for RawFieldSetMapper {
    type Item = FieldSet;

    fn map(&self, fields: &FieldSet) -> anyhow::Result<FieldSet> {
        Ok(fields.clone())
    }
}
