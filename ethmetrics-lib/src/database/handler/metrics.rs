//! Persistence engine for metric records.
//!
//! Writes an arbitrary [`Record`] into its table, inserting it if its primary key is unknown and updating
//! all supplied columns otherwise. Which SQL gets used for that is decided by the [`UpsertStrategy`].

use crate::database::handler::Executor;
use crate::database::record::Record;
use crate::database::record::Value;
use crate::database::statement::Exists;
use crate::database::statement::Write;
use crate::error::Error;
use crate::error::ExecutorError;
use log::debug;
use log::info;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// `INSERT .. ON CONFLICT .. DO UPDATE` in a single statement.
    Atomic,

    /// Existence check followed by either an `UPDATE` or an `INSERT`. Only safe with a single writer per key,
    /// which the scheduler guarantees; a lost insert race falls back to an update.
    CheckThenWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,

    /// Written by [`UpsertStrategy::Atomic`], which doesn't report which branch the database took.
    Written,
}

pub struct MetricsHandler<E> {
    executor: E,
    strategy: UpsertStrategy,
}

impl<E: Executor> MetricsHandler<E> {
    pub fn new(executor: E, strategy: UpsertStrategy) -> Self {
        MetricsHandler { executor, strategy }
    }

    /// Inserts or updates the row `key_field = key_value` in `table` with the given columns.
    pub fn upsert(
        &self,
        key_field: &str,
        key_value: Value,
        columns: BTreeMap<String, Value>,
        table: &str,
    ) -> Result<UpsertOutcome, Error> {
        let mut record = Record::new(table, key_field, key_value)?;
        for (column, value) in columns {
            record = record.with(&column, value)?;
        }

        self.upsert_record(&record)
    }

    /// Same as [`MetricsHandler::upsert`] for an already assembled record.
    pub fn upsert_record(&self, record: &Record) -> Result<UpsertOutcome, Error> {
        debug!("Upserting '{}' into '{}'", record.key_value(), record.table());

        let outcome = match self.strategy {
            UpsertStrategy::Atomic => self.upsert_atomic(record)?,
            UpsertStrategy::CheckThenWrite => self.upsert_check_then_write(record)?,
        };

        info!("{:?} '{}' in '{}'", outcome, record.key_value(), record.table());
        Ok(outcome)
    }

    fn upsert_atomic(&self, record: &Record) -> Result<UpsertOutcome, Error> {
        self.executor.execute(&Write::Upsert(record)).map_err(|why| {
            Error::StorageUpsert(record.table().to_string(), record.key_value().to_string(), why)
        })?;

        Ok(UpsertOutcome::Written)
    }

    fn upsert_check_then_write(&self, record: &Record) -> Result<UpsertOutcome, Error> {
        let exists = self.executor.exists(&Exists(record)).map_err(|why| {
            Error::StorageExists(record.table().to_string(), record.key_value().to_string(), why)
        })?;

        if exists {
            match self.update(record)? {
                true => return Ok(UpsertOutcome::Updated),
                false => debug!("Row '{}' vanished from '{}', inserting instead", record.key_value(), record.table()),
            }
        }

        match self.executor.execute(&Write::Insert(record)) {
            Ok(_) => Ok(UpsertOutcome::Inserted),

            // Someone else inserted the key between our existence check and insert
            Err(why) if why.is_unique_violation() => {
                debug!("Lost insert race for '{}' in '{}', updating instead", record.key_value(), record.table());

                match self.update(record)? {
                    true => Ok(UpsertOutcome::Updated),
                    false => Err(Error::StorageUpdate(
                        record.table().to_string(),
                        record.key_value().to_string(),
                        ExecutorError::Query(diesel::result::Error::NotFound),
                    )),
                }
            }

            Err(why) => Err(Error::StorageInsert(record.table().to_string(), record.key_value().to_string(), why)),
        }
    }

    /// Returns whether a row with the record's key was updated.
    fn update(&self, record: &Record) -> Result<bool, Error> {
        // The row is known to exist and there is nothing besides its key to write
        if record.columns().is_empty() {
            return Ok(true);
        }

        let affected = self.executor.execute(&Write::Update(record)).map_err(|why| {
            Error::StorageUpdate(record.table().to_string(), record.key_value().to_string(), why)
        })?;

        Ok(affected > 0)
    }
}
