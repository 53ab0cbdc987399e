//! Module: backend
//! Responsibility: the single read-write transaction primitive the bridge runs on.
//! Does not own: statement translation, recovery layout, or worker lifecycle.
//!
//! A backend runs a transaction closure to completion, re-invoking it from
//! scratch after every commit conflict. Closures handed to it must therefore
//! be idempotent: same inputs, same buffered writes.

mod memory;
mod schema;

#[cfg(test)]
mod tests;

use crate::{
    db::mutation::{ColumnValues, KeySet, Mutation},
    error::InternalError,
    types::Timestamp,
};

pub use memory::MemoryBackend;
pub use schema::TableSchema;

/// A stored row; every bound column including the key columns.
pub type Row = ColumnValues;

///
/// WorkOutcome
///
/// Terminal decision of one transaction closure invocation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkOutcome {
    Commit,
    Rollback,
}

///
/// ReadWriteContext
///
/// Per-attempt view handed to a transaction closure. Buffered writes become
/// visible to other transactions only when the attempt commits.
///

pub trait ReadWriteContext {
    /// Read committed rows addressed by `key_set`, in key order.
    fn read(&mut self, table: &str, key_set: &KeySet) -> Result<Vec<Row>, InternalError>;

    /// Stage one mutation for this attempt's commit.
    fn buffer(&mut self, mutation: Mutation) -> Result<(), InternalError>;
}

/// Closure type accepted by [`Backend::run_read_write`].
pub type TransactionWork<'a> =
    dyn FnMut(&mut dyn ReadWriteContext) -> Result<WorkOutcome, InternalError> + 'a;

///
/// Catalog
///
/// Schema lookup used by the statement translator.
///

pub trait Catalog {
    fn table(&self, name: &str) -> Option<TableSchema>;
}

///
/// Backend
///

pub trait Backend: Catalog + Send + Sync {
    /// Run `work` until it commits cleanly, rolls back, or fails terminally.
    ///
    /// Returns the commit timestamp, or `None` when the closure chose
    /// [`WorkOutcome::Rollback`]. Conflicts are retried internally and never
    /// surface; exhausting the retry budget is `TransactionFailed`.
    fn run_read_write(&self, work: &mut TransactionWork<'_>)
    -> Result<Option<Timestamp>, InternalError>;

    /// Create `schema` unless a table of that name already exists.
    fn create_table_if_missing(&self, schema: &TableSchema) -> Result<(), InternalError>;

    /// Keep idle sessions alive.
    fn keep_alive(&self) -> Result<(), InternalError> {
        Ok(())
    }
}
