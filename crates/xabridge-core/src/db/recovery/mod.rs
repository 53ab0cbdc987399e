//! Prepared-transaction recovery store.
//!
//! Contract:
//! - `prepare` stages one record per buffered mutation, keyed by
//!   `(xid key, sequence)` with sequence assigned in buffer order.
//! - Target tables are untouched until the second phase.
//! - The second phase reads, deletes and (for commit) re-applies the records
//!   inside a single backend transaction, so a crash at any point leaves the
//!   records either fully present or fully resolved.
//!
//! Records are never resolved automatically. Orphans stay until a caller
//! lists them and issues an explicit commit or rollback.

#[cfg(test)]
mod tests;

use crate::{
    config::DriverConfig,
    db::{
        backend::{Backend, ReadWriteContext, Row, TableSchema},
        codec::MutationCodec,
        mutation::{ColumnValues, Key, KeyRange, KeySet, Mutation},
    },
    error::InternalError,
    value::Value,
};
use std::collections::BTreeSet;

pub const XID_KEY_COLUMN: &str = "XID_KEY";
pub const SEQUENCE_COLUMN: &str = "SEQUENCE";
pub const MUTATION_COLUMN: &str = "MUTATION";

///
/// RecoveryRecord
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecoveryRecord {
    pub xid_key: String,
    pub sequence: i64,
    pub mutation: Mutation,
}

impl RecoveryRecord {
    #[must_use]
    pub fn key(&self) -> Key {
        record_key(&self.xid_key, self.sequence)
    }
}

///
/// RecoveryStore
///

#[derive(Clone, Debug)]
pub struct RecoveryStore {
    table: String,
    codec: MutationCodec,
}

impl RecoveryStore {
    #[must_use]
    pub fn new(table: impl Into<String>, codec: MutationCodec) -> Self {
        Self {
            table: table.into(),
            codec,
        }
    }

    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(
            config.recovery_table.clone(),
            MutationCodec::new(config.max_mutation_bytes),
        )
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Result<TableSchema, InternalError> {
        TableSchema::try_new(
            self.table.clone(),
            [XID_KEY_COLUMN, SEQUENCE_COLUMN, MUTATION_COLUMN],
            [XID_KEY_COLUMN, SEQUENCE_COLUMN],
        )
    }

    /// Create the recovery table on first use.
    pub fn ensure_table<B: Backend + ?Sized>(&self, backend: &B) -> Result<(), InternalError> {
        backend.create_table_if_missing(&self.schema()?)
    }

    /// Encode `mutations` as record inserts for `xid_key`, in buffer order.
    pub fn encode_records(
        &self,
        xid_key: &str,
        mutations: &[Mutation],
    ) -> Result<Vec<Mutation>, InternalError> {
        mutations
            .iter()
            .enumerate()
            .map(|(index, mutation)| {
                let sequence = i64::try_from(index).map_err(|_| {
                    InternalError::recovery_inconsistency(format!(
                        "prepared transaction '{xid_key}' exceeds the sequence range"
                    ))
                })?;
                let columns = ColumnValues::new()
                    .with(XID_KEY_COLUMN, xid_key)
                    .with(SEQUENCE_COLUMN, sequence)
                    .with(MUTATION_COLUMN, self.codec.encode(mutation)?);

                Ok(Mutation::insert(self.table.clone(), columns))
            })
            .collect()
    }

    /// Read every record for `xid_key`, ordered by sequence.
    ///
    /// Sequences must run `0..n` without gaps; anything else means records
    /// were resolved partially by someone bypassing this store.
    pub fn load(
        &self,
        ctx: &mut dyn ReadWriteContext,
        xid_key: &str,
    ) -> Result<Vec<RecoveryRecord>, InternalError> {
        let prefix = KeyRange::prefix(Key::single(xid_key));
        let rows = ctx.read(&self.table, &KeySet::Range(prefix))?;

        let mut records = Vec::with_capacity(rows.len());
        for (expected, row) in (0_i64..).zip(&rows) {
            let record = self.decode_row(row)?;
            if record.xid_key != xid_key {
                return Err(InternalError::recovery_corruption(format!(
                    "recovery row for '{}' returned while loading '{xid_key}'",
                    record.xid_key
                )));
            }
            if record.sequence != expected {
                return Err(InternalError::recovery_inconsistency(format!(
                    "prepared transaction '{xid_key}' is missing record {expected} (found {})",
                    record.sequence
                )));
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Delete mutations removing exactly `records`.
    #[must_use]
    pub fn delete_records(&self, records: &[RecoveryRecord]) -> Vec<Mutation> {
        records
            .iter()
            .map(|record| Mutation::delete(self.table.clone(), KeySet::key(record.key())))
            .collect()
    }

    /// Distinct xid keys that currently have staged records.
    pub fn pending_xid_keys(
        &self,
        ctx: &mut dyn ReadWriteContext,
    ) -> Result<Vec<String>, InternalError> {
        let rows = ctx.read(&self.table, &KeySet::All)?;
        let mut keys = BTreeSet::new();
        for row in &rows {
            match row.get(XID_KEY_COLUMN) {
                Some(Value::Text(key)) => {
                    keys.insert(key.clone());
                }
                _ => {
                    return Err(InternalError::recovery_corruption(format!(
                        "recovery row in '{}' has no text {XID_KEY_COLUMN}",
                        self.table
                    )));
                }
            }
        }

        Ok(keys.into_iter().collect())
    }

    fn decode_row(&self, row: &Row) -> Result<RecoveryRecord, InternalError> {
        let (Some(Value::Text(xid_key)), Some(Value::Int(sequence)), Some(Value::Text(encoded))) = (
            row.get(XID_KEY_COLUMN),
            row.get(SEQUENCE_COLUMN),
            row.get(MUTATION_COLUMN),
        ) else {
            return Err(InternalError::recovery_corruption(format!(
                "malformed recovery row in '{}'",
                self.table
            )));
        };

        let mutation = self.codec.decode(encoded).map_err(|err| {
            InternalError::recovery_corruption(format!(
                "recovery record '{xid_key}'#{sequence} does not decode: {err}"
            ))
        })?;

        Ok(RecoveryRecord {
            xid_key: xid_key.clone(),
            sequence: *sequence,
            mutation,
        })
    }
}

fn record_key(xid_key: &str, sequence: i64) -> Key {
    Key::new(vec![Value::from(xid_key), Value::Int(sequence)])
}
