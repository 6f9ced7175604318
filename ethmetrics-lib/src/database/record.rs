//! Generic key/value record flowing through the persistence engine.
//!
//! A [`Record`] knows nothing about a fixed schema, only about a table, its primary key column and an
//! arbitrary set of additional columns. Identifiers are validated on construction; values are always sent
//! as bound parameters (see [`crate::database::statement`]).

use crate::error::Error;
use chrono::DateTime;
use chrono::Utc;
use lazy_static::lazy_static;
use num_bigint::BigUint;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref REGEX_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A table or column name that is safe to emit (quoted) into a statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: &str) -> Result<Self, Error> {
        match REGEX_IDENTIFIER.is_match(name) {
            true => Ok(Identifier(name.to_string())),
            false => Err(Error::StorageInvalidIdentifier(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A column value. Numeric values are kept as their decimal digits and cast server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    BigInt(i64),
    Numeric(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn numeric(value: &BigUint) -> Self {
        Value::Numeric(value.to_str_radix(10))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(value) => f.write_str(value),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Numeric(value) => f.write_str(value),
            Value::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: Identifier,
    key_field: Identifier,
    key_value: Value,
    columns: BTreeMap<Identifier, Value>,
}

impl Record {
    /// Returns a record without additional columns.
    pub fn new(table: &str, key_field: &str, key_value: Value) -> Result<Self, Error> {
        Ok(Record {
            table: Identifier::new(table)?,
            key_field: Identifier::new(key_field)?,
            key_value,
            columns: BTreeMap::new(),
        })
    }

    /// Adds (or replaces) a column, rejecting invalid names and the primary key column itself.
    pub fn with(mut self, column: &str, value: Value) -> Result<Self, Error> {
        let column = Identifier::new(column)?;

        if column == self.key_field {
            return Err(Error::StorageDuplicateColumn(column.0, self.table.0));
        }

        self.columns.insert(column, value);
        Ok(self)
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    pub fn key_field(&self) -> &Identifier {
        &self.key_field
    }

    pub fn key_value(&self) -> &Value {
        &self.key_value
    }

    /// Additional columns, ordered by name.
    pub fn columns(&self) -> &BTreeMap<Identifier, Value> {
        &self.columns
    }
}
