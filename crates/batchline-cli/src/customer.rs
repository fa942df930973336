//! The customer import: CSV rows in, cleaned customers out.

use anyhow::Context;
use batchline_dest_sqlite::SqliteRecord;
use batchline_engine::{ItemProcessor, ProcessOutcome};
use batchline_source_csv::{FieldSet, FieldSetMapper};
use rusqlite::types::Value;

/// Column layout of the customers file.
pub const CUSTOMER_COLUMNS: [&str; 8] = [
    "id",
    "first_name",
    "last_name",
    "email",
    "gender",
    "contact_no",
    "country",
    "dob",
];

/// A customers file record as read, before any cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerRow {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub contact_no: Option<String>,
    pub country: Option<String>,
    pub dob: Option<String>,
}

/// Maps a field set onto a [`CustomerRow`] by column name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerRowMapper;

impl FieldSetMapper for CustomerRowMapper {
    type Item = CustomerRow;

    fn map(&self, fields: &FieldSet) -> anyhow::Result<CustomerRow> {
        let text = |column: &str| fields.get(column).map(str::to_string);
        Ok(CustomerRow {
            id: text("id"),
            first_name: text("first_name"),
            last_name: text("last_name"),
            email: text("email"),
            gender: text("gender"),
            contact_no: text("contact_no"),
            country: text("country"),
            dob: text("dob"),
        })
    }
}

/// A cleaned customer, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub contact_no: Option<String>,
    pub country: Option<String>,
    pub dob: Option<String>,
}

impl SqliteRecord for Customer {
    const TABLE_COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("id", "INTEGER"),
        ("first_name", "TEXT"),
        ("last_name", "TEXT"),
        ("email", "TEXT"),
        ("gender", "TEXT"),
        ("contact_no", "TEXT"),
        ("country", "TEXT"),
        ("dob", "TEXT"),
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.first_name.clone().into(),
            self.last_name.clone().into(),
            self.email.clone().into(),
            self.gender.clone().into(),
            self.contact_no.clone().into(),
            self.country.clone().into(),
            self.dob.clone().into(),
        ]
    }
}

/// Trims text fields and lower-cases the e-mail. Rows without an id are
/// filtered; a non-numeric id is a processing error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerProcessor;

impl ItemProcessor for CustomerProcessor {
    type Input = CustomerRow;
    type Output = Customer;

    fn process(&self, row: &CustomerRow) -> anyhow::Result<ProcessOutcome<Customer>> {
        let Some(raw_id) = clean(&row.id) else {
            return Ok(ProcessOutcome::Skip);
        };
        let id = raw_id
            .parse::<i64>()
            .with_context(|| format!("invalid customer id {raw_id:?}"))?;

        Ok(ProcessOutcome::Item(Customer {
            id,
            first_name: clean(&row.first_name),
            last_name: clean(&row.last_name),
            email: clean(&row.email).map(|e| e.to_lowercase()),
            gender: clean(&row.gender),
            contact_no: clean(&row.contact_no),
            country: clean(&row.country),
            dob: clean(&row.dob),
        }))
    }
}

/// Trimmed value, `None` when absent or blank.
fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
