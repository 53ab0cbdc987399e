//! Module: sql
//! Responsibility: turn parsed single-row DML into at most one `Mutation`.
//! Does not own: SQL text parsing, query execution, or bulk DML.
//!
//! Translation runs in two steps. `analyze` checks statement shape against
//! the catalog with parameters still unresolved; `DmlPlan::bind` substitutes
//! parameter values at execute time.

mod ast;
mod plan;


use crate::{
    db::{backend::Catalog, mutation::Mutation},
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::Value,
};
use thiserror::Error as ThisError;

pub use ast::{CompareOp, Delete, Expr, Insert, Select, Statement, Update};
pub use plan::{DmlPlan, analyze};

/// Analyze and bind in one step.
pub fn translate<C: Catalog + ?Sized>(
    statement: &Statement,
    catalog: &C,
    params: &Parameters,
) -> Result<Option<Mutation>, InternalError> {
    analyze(statement, catalog)?.bind(params)
}

///
/// TranslateError
///
/// Shape errors carry the required form so callers can show it verbatim.
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum TranslateError {
    #[error("table '{table}' not found")]
    UnknownTable { table: String },

    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("unsupported {shape} in WHERE clause; expected {required}")]
    UnsupportedPredicate {
        shape: &'static str,
        required: String,
    },

    #[error("WHERE clause compares two columns; expected {required}")]
    ColumnComparison { required: String },

    #[error("WHERE clause filters on non-key column '{column}'; expected {required}")]
    NonKeyPredicate { column: String, required: String },

    #[error("key column '{column}' is constrained more than once; expected {required}")]
    DuplicateKeyColumn { column: String, required: String },

    #[error("WHERE clause is missing key column(s) {missing}; expected {required}")]
    MissingKeyColumns { missing: String, required: String },

    #[error("{statement} on '{table}' has no WHERE clause; expected {required}")]
    MissingWhere {
        statement: &'static str,
        table: String,
        required: String,
    },

    #[error("key column '{column}' cannot be assigned by UPDATE")]
    KeyAssignment { column: String },

    #[error("value for '{column}' must be a literal or parameter, found {shape}")]
    NonLiteralValue {
        column: String,
        shape: &'static str,
    },

    #[error("INSERT supports exactly one row of VALUES, found {rows}")]
    MultiRowInsert { rows: usize },

    #[error("INSERT lists {columns} column(s) but {values} value(s)")]
    ValueCountMismatch { columns: usize, values: usize },

    #[error("column '{column}' is listed more than once")]
    DuplicateColumn { column: String },

    #[error("INSERT into '{table}' must supply key column '{column}'")]
    InsertMissingKey { table: String, column: String },

    #[error("key column '{column}' cannot be NULL")]
    NullKey { column: String },

    #[error("parameter {index} is not bound")]
    UnboundParameter { index: usize },

    #[error("parameter indexes start at 1")]
    ZeroParameterIndex,

    #[error("parameter index {index} exceeds the maximum of {max}")]
    ParameterIndexTooLarge { index: usize, max: usize },
}

impl From<TranslateError> for InternalError {
    fn from(err: TranslateError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Sql, err.to_string())
    }
}

/// Highest placeholder index a statement may bind.
pub const MAX_PARAMETER_INDEX: usize = u16::MAX as usize;

///
/// Parameters
///
/// Positional statement parameters, 1-based like the `?` placeholders they fill.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Parameters(Vec<Option<Value>>);

impl Parameters {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Bind parameter `index` (1-based), replacing any previous binding.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<(), TranslateError> {
        let slot = index.checked_sub(1).ok_or(TranslateError::ZeroParameterIndex)?;
        if index > MAX_PARAMETER_INDEX {
            return Err(TranslateError::ParameterIndexTooLarge {
                index,
                max: MAX_PARAMETER_INDEX,
            });
        }
        if self.0.len() <= slot {
            self.0.resize(slot + 1, None);
        }
        self.0[slot] = Some(value.into());

        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        index
            .checked_sub(1)
            .and_then(|slot| self.0.get(slot))
            .and_then(Option::as_ref)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Into<Value>> FromIterator<V> for Parameters {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().map(|v| Some(v.into())).collect())
    }
}
