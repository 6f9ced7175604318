//! Dynamic SQL statements built from a [`Record`].
//!
//! Diesel's DSL needs the schema at compile time, which the persistence engine doesn't have. Instead each
//! statement implements [`QueryFragment`] by hand, pushing quoted identifiers and typed bind parameters so
//! that no value is ever interpolated into the SQL text.

use crate::database::record::Identifier;
use crate::database::record::Record;
use crate::database::record::Value;
use diesel::pg::Pg;
use diesel::query_builder::AstPass;
use diesel::query_builder::Query;
use diesel::query_builder::QueryFragment;
use diesel::query_builder::QueryId;
use diesel::result::Error as DieselError;
use diesel::sql_types::BigInt;
use diesel::sql_types::Bool;
use diesel::sql_types::Text;
use diesel::sql_types::Timestamptz;
use diesel::QueryResult;
use diesel::RunQueryDsl;

/// `SELECT EXISTS(SELECT 1 FROM <table> WHERE <key> = $1)`
#[derive(Debug, Clone, Copy)]
pub struct Exists<'a>(pub &'a Record);

/// Statements changing a row.
#[derive(Debug, Clone, Copy)]
pub enum Write<'a> {
    Insert(&'a Record),
    Update(&'a Record),

    /// Single statement insert-or-update relying on `ON CONFLICT`.
    Upsert(&'a Record),
}

impl<'a> Write<'a> {
    pub fn record(&self) -> &'a Record {
        match self {
            Write::Insert(record) | Write::Update(record) | Write::Upsert(record) => record,
        }
    }
}

fn push_value(out: &mut AstPass<Pg>, value: &Value) -> QueryResult<()> {
    match value {
        Value::Text(value) => out.push_bind_param::<Text, _>(value),
        Value::BigInt(value) => out.push_bind_param::<BigInt, _>(value),
        Value::Numeric(value) => {
            out.push_bind_param::<Text, _>(value)?;
            out.push_sql("::numeric");
            Ok(())
        }
        Value::Timestamp(value) => out.push_bind_param::<Timestamptz, _>(value),
    }
}

/// Pushes `"a", "b", "c"`
fn push_identifiers<'b>(out: &mut AstPass<Pg>, identifiers: impl Iterator<Item = &'b Identifier>) -> QueryResult<()> {
    for (idx, identifier) in identifiers.enumerate() {
        if idx > 0 {
            out.push_sql(", ");
        }
        out.push_identifier(identifier.as_str())?;
    }

    Ok(())
}

fn push_insert(out: &mut AstPass<Pg>, record: &Record) -> QueryResult<()> {
    out.push_sql("INSERT INTO ");
    out.push_identifier(record.table().as_str())?;
    out.push_sql(" (");
    push_identifiers(out, std::iter::once(record.key_field()).chain(record.columns().keys()))?;
    out.push_sql(") VALUES (");

    push_value(out, record.key_value())?;
    for value in record.columns().values() {
        out.push_sql(", ");
        push_value(out, value)?;
    }
    out.push_sql(")");

    Ok(())
}

fn push_update(out: &mut AstPass<Pg>, record: &Record) -> QueryResult<()> {
    if record.columns().is_empty() {
        return Err(DieselError::QueryBuilderError(
            format!("Nothing to update in '{}'", record.table()).into(),
        ));
    }

    out.push_sql("UPDATE ");
    out.push_identifier(record.table().as_str())?;
    out.push_sql(" SET ");

    for (idx, (column, value)) in record.columns().iter().enumerate() {
        if idx > 0 {
            out.push_sql(", ");
        }
        out.push_identifier(column.as_str())?;
        out.push_sql(" = ");
        push_value(out, value)?;
    }

    out.push_sql(" WHERE ");
    out.push_identifier(record.key_field().as_str())?;
    out.push_sql(" = ");
    push_value(out, record.key_value())
}

fn push_upsert(out: &mut AstPass<Pg>, record: &Record) -> QueryResult<()> {
    push_insert(out, record)?;

    out.push_sql(" ON CONFLICT (");
    out.push_identifier(record.key_field().as_str())?;
    out.push_sql(")");

    if record.columns().is_empty() {
        out.push_sql(" DO NOTHING");
        return Ok(());
    }

    out.push_sql(" DO UPDATE SET ");
    for (idx, column) in record.columns().keys().enumerate() {
        if idx > 0 {
            out.push_sql(", ");
        }
        out.push_identifier(column.as_str())?;
        out.push_sql(" = EXCLUDED.");
        out.push_identifier(column.as_str())?;
    }

    Ok(())
}

impl QueryFragment<Pg> for Exists<'_> {
    fn walk_ast(&self, mut out: AstPass<Pg>) -> QueryResult<()> {
        out.unsafe_to_cache_prepared();

        out.push_sql("SELECT EXISTS(SELECT 1 FROM ");
        out.push_identifier(self.0.table().as_str())?;
        out.push_sql(" WHERE ");
        out.push_identifier(self.0.key_field().as_str())?;
        out.push_sql(" = ");
        push_value(&mut out, self.0.key_value())?;
        out.push_sql(")");

        Ok(())
    }
}

impl QueryFragment<Pg> for Write<'_> {
    fn walk_ast(&self, mut out: AstPass<Pg>) -> QueryResult<()> {
        out.unsafe_to_cache_prepared();

        match self {
            Write::Insert(record) => push_insert(&mut out, record),
            Write::Update(record) => push_update(&mut out, record),
            Write::Upsert(record) => push_upsert(&mut out, record),
        }
    }
}

impl QueryId for Exists<'_> {
    type QueryId = ();
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl QueryId for Write<'_> {
    type QueryId = ();
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl Query for Exists<'_> {
    type SqlType = Bool;
}

impl<Conn> RunQueryDsl<Conn> for Exists<'_> {}
impl<Conn> RunQueryDsl<Conn> for Write<'_> {}
