//! Module: mutation
//! Responsibility: the in-memory write-intent value buffered by workers.
//! Does not own: how a backend applies a mutation, or how it is persisted.
//!
//! Mutations are plain values. A buffered list can be replayed any number of
//! times by a retrying backend without side effects.

mod key;

#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

pub use key::{BoundKind, Key, KeyRange, KeySet};

///
/// MutationError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum MutationError {
    #[error("mutation table name is empty")]
    EmptyTable,

    #[error("{kind} mutation on '{table}' binds no columns")]
    EmptyColumns { table: String, kind: MutationKind },

    #[error("column '{column}' is bound more than once")]
    DuplicateColumn { column: String },

    #[error("column name is empty")]
    EmptyColumnName,

    #[error("delete on '{table}' carries column values")]
    DeleteWithColumns { table: String },

    #[error("{kind} mutation on '{table}' must not carry a key set")]
    UnexpectedKeySet { table: String, kind: MutationKind },

    #[error("delete on '{table}' is missing its key set")]
    MissingKeySet { table: String },

    #[error("key range on '{table}' has an empty bound key")]
    EmptyRangeBound { table: String },

    #[error("key on '{table}' has no components")]
    EmptyKey { table: String },
}

impl From<MutationError> for InternalError {
    fn from(err: MutationError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Mutation, err.to_string())
    }
}

///
/// MutationKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MutationKind {
    Insert,
    Update,
    InsertOrUpdate,
    Delete,
}

impl MutationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::InsertOrUpdate => "insert_or_update",
            Self::Delete => "delete",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// ColumnValues
///
/// Insertion-ordered column → value bindings with unique column names.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColumnValues(Vec<(String, Value)>);

impl ColumnValues {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from pairs, rejecting empty or duplicate column names.
    pub fn try_from_pairs<I, C, V>(pairs: I) -> Result<Self, MutationError>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        let mut columns = Self::new();
        for (column, value) in pairs {
            columns.insert(column, value)?;
        }

        Ok(columns)
    }

    /// Bind one column; fails if the column is already bound.
    pub fn insert(
        &mut self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), MutationError> {
        let column = column.into();
        if column.is_empty() {
            return Err(MutationError::EmptyColumnName);
        }
        if self.get(&column).is_some() {
            return Err(MutationError::DuplicateColumn { column });
        }
        self.0.push((column, value.into()));

        Ok(())
    }

    /// Builder-style bind that replaces an existing binding in place.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }

        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Assemble the key for `key_columns` (in that order), if all are bound.
    #[must_use]
    pub fn key_for<S: AsRef<str>>(&self, key_columns: &[S]) -> Option<Key> {
        key_columns
            .iter()
            .map(|column| self.get(column.as_ref()).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Key::new)
    }

    // Reject duplicate names that bypassed `insert` (e.g. decoded payloads).
    fn validate(&self) -> Result<(), MutationError> {
        for (index, (column, _)) in self.0.iter().enumerate() {
            if column.is_empty() {
                return Err(MutationError::EmptyColumnName);
            }
            if self.0[..index].iter().any(|(prior, _)| prior == column) {
                return Err(MutationError::DuplicateColumn {
                    column: column.clone(),
                });
            }
        }

        Ok(())
    }
}

///
/// Mutation
///
/// One buffered write intent against one table.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Mutation {
    table: String,
    kind: MutationKind,
    columns: ColumnValues,
    key_set: Option<KeySet>,
}

impl Mutation {
    #[must_use]
    pub fn insert(table: impl Into<String>, columns: ColumnValues) -> Self {
        Self::write(MutationKind::Insert, table, columns)
    }

    #[must_use]
    pub fn update(table: impl Into<String>, columns: ColumnValues) -> Self {
        Self::write(MutationKind::Update, table, columns)
    }

    #[must_use]
    pub fn insert_or_update(table: impl Into<String>, columns: ColumnValues) -> Self {
        Self::write(MutationKind::InsertOrUpdate, table, columns)
    }

    #[must_use]
    pub fn delete(table: impl Into<String>, key_set: KeySet) -> Self {
        Self {
            table: table.into(),
            kind: MutationKind::Delete,
            columns: ColumnValues::new(),
            key_set: Some(key_set),
        }
    }

    fn write(kind: MutationKind, table: impl Into<String>, columns: ColumnValues) -> Self {
        Self {
            table: table.into(),
            kind,
            columns,
            key_set: None,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        self.kind
    }

    #[must_use]
    pub const fn columns(&self) -> &ColumnValues {
        &self.columns
    }

    #[must_use]
    pub const fn key_set(&self) -> Option<&KeySet> {
        self.key_set.as_ref()
    }

    /// Check structural invariants.
    ///
    /// Constructors cannot produce most violations; decoded payloads can.
    pub fn validate(&self) -> Result<(), MutationError> {
        if self.table.is_empty() {
            return Err(MutationError::EmptyTable);
        }

        match (self.kind, &self.key_set) {
            (MutationKind::Delete, None) => {
                return Err(MutationError::MissingKeySet {
                    table: self.table.clone(),
                });
            }
            (MutationKind::Delete, Some(key_set)) => {
                if !self.columns.is_empty() {
                    return Err(MutationError::DeleteWithColumns {
                        table: self.table.clone(),
                    });
                }
                key_set.validate(&self.table)?;
            }
            (kind, Some(_)) => {
                return Err(MutationError::UnexpectedKeySet {
                    table: self.table.clone(),
                    kind,
                });
            }
            (kind, None) => {
                if self.columns.is_empty() {
                    return Err(MutationError::EmptyColumns {
                        table: self.table.clone(),
                        kind,
                    });
                }
            }
        }

        self.columns.validate()
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.table)?;
        match &self.key_set {
            Some(key_set) => write!(f, " {key_set}"),
            None => {
                let names = self.columns.iter().map(|(name, _)| name).collect::<Vec<_>>();
                write!(f, " ({})", names.join(", "))
            }
        }
    }
}
