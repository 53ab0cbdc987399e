use crate::{
    db::{
        backend::{Catalog, TableSchema},
        mutation::{ColumnValues, Key, KeySet, Mutation, MutationKind},
        sql::{
            Parameters, TranslateError,
            ast::{CompareOp, Delete, Expr, Insert, Statement, Update},
        },
    },
    error::InternalError,
    value::Value,
};
use std::collections::BTreeSet;

///
/// Slot
///
/// A value position resolved at bind time.
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum Slot {
    Literal(Value),
    Parameter(usize),
}

impl Slot {
    fn from_expr(column: &str, expr: &Expr) -> Result<Self, TranslateError> {
        match expr {
            Expr::Literal(value) => Ok(Self::Literal(value.clone())),
            Expr::Parameter(0) => Err(TranslateError::ZeroParameterIndex),
            Expr::Parameter(index) => Ok(Self::Parameter(*index)),
            other => Err(TranslateError::NonLiteralValue {
                column: column.to_string(),
                shape: other.shape(),
            }),
        }
    }

    fn resolve(&self, params: &Parameters) -> Result<Value, TranslateError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Parameter(index) => params
                .get(*index)
                .cloned()
                .ok_or(TranslateError::UnboundParameter { index: *index }),
        }
    }

    const fn is_null_literal(&self) -> bool {
        matches!(self, Self::Literal(Value::Null))
    }
}

///
/// PlanTarget
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum PlanTarget {
    Write {
        kind: MutationKind,
        columns: Vec<(String, Slot)>,
        key_columns: BTreeSet<String>,
    },
    DeleteKey {
        key: Vec<(String, Slot)>,
    },
    DeleteAll,
    Query,
}

///
/// DmlPlan
///
/// Structurally validated statement awaiting parameter values.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DmlPlan {
    table: String,
    target: PlanTarget,
}

impl DmlPlan {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self.target, PlanTarget::Query)
    }

    /// Substitute parameters; queries produce no mutation.
    pub fn bind(&self, params: &Parameters) -> Result<Option<Mutation>, InternalError> {
        let mutation = match &self.target {
            PlanTarget::Query => return Ok(None),
            PlanTarget::DeleteAll => Mutation::delete(self.table.clone(), KeySet::All),
            PlanTarget::DeleteKey { key } => {
                let components = key
                    .iter()
                    .map(|(column, slot)| bind_key(column, slot, params))
                    .collect::<Result<Vec<_>, _>>()?;

                Mutation::delete(self.table.clone(), KeySet::key(Key::new(components)))
            }
            PlanTarget::Write {
                kind,
                columns,
                key_columns,
            } => {
                let mut values = ColumnValues::new();
                for (column, slot) in columns {
                    let value = if key_columns.contains(column) {
                        bind_key(column, slot, params)?
                    } else {
                        slot.resolve(params)?
                    };
                    values.insert(column.clone(), value)?;
                }

                match kind {
                    MutationKind::Insert => Mutation::insert(self.table.clone(), values),
                    MutationKind::InsertOrUpdate => {
                        Mutation::insert_or_update(self.table.clone(), values)
                    }
                    _ => Mutation::update(self.table.clone(), values),
                }
            }
        };

        Ok(Some(mutation))
    }
}

fn bind_key(column: &str, slot: &Slot, params: &Parameters) -> Result<Value, TranslateError> {
    let value = slot.resolve(params)?;
    if value.is_null() {
        return Err(TranslateError::NullKey {
            column: column.to_string(),
        });
    }

    Ok(value)
}

/// Validate `statement` against `catalog` without resolving parameters.
pub fn analyze<C: Catalog + ?Sized>(
    statement: &Statement,
    catalog: &C,
) -> Result<DmlPlan, TranslateError> {
    let table = statement.table();
    let schema = catalog
        .table(table)
        .ok_or_else(|| TranslateError::UnknownTable {
            table: table.to_string(),
        })?;

    let target = match statement {
        Statement::Insert(insert) => analyze_insert(insert, &schema)?,
        Statement::Update(update) => analyze_update(update, &schema)?,
        Statement::Delete(delete) => analyze_delete(delete, &schema)?,
        Statement::Select(_) => PlanTarget::Query,
    };

    Ok(DmlPlan {
        table: schema.name().to_string(),
        target,
    })
}

fn analyze_insert(insert: &Insert, schema: &TableSchema) -> Result<PlanTarget, TranslateError> {
    let [row] = insert.rows.as_slice() else {
        return Err(TranslateError::MultiRowInsert {
            rows: insert.rows.len(),
        });
    };
    let names = insert
        .columns
        .as_deref()
        .unwrap_or_else(|| schema.columns());
    if names.len() != row.len() {
        return Err(TranslateError::ValueCountMismatch {
            columns: names.len(),
            values: row.len(),
        });
    }

    let mut seen = BTreeSet::new();
    let mut columns = Vec::with_capacity(names.len());
    for (name, expr) in names.iter().zip(row) {
        check_column(schema, name)?;
        if !seen.insert(name.as_str()) {
            return Err(TranslateError::DuplicateColumn {
                column: name.clone(),
            });
        }
        columns.push((name.clone(), Slot::from_expr(name, expr)?));
    }

    if let Some(missing) = schema
        .primary_key()
        .iter()
        .find(|key| !seen.contains(key.as_str()))
    {
        return Err(TranslateError::InsertMissingKey {
            table: schema.name().to_string(),
            column: missing.clone(),
        });
    }
    reject_null_keys(schema, &columns)?;

    let kind = if insert.upsert {
        MutationKind::InsertOrUpdate
    } else {
        MutationKind::Insert
    };

    Ok(PlanTarget::Write {
        kind,
        columns,
        key_columns: schema.primary_key().iter().cloned().collect(),
    })
}

fn analyze_update(update: &Update, schema: &TableSchema) -> Result<PlanTarget, TranslateError> {
    let selection = update
        .selection
        .as_ref()
        .ok_or_else(|| TranslateError::MissingWhere {
            statement: "UPDATE",
            table: schema.name().to_string(),
            required: required_form(schema),
        })?;
    let mut columns = key_from_predicate(selection, schema)?;

    let mut seen = BTreeSet::new();
    for (name, expr) in &update.assignments {
        check_column(schema, name)?;
        if schema.is_key_column(name) {
            return Err(TranslateError::KeyAssignment {
                column: name.clone(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(TranslateError::DuplicateColumn {
                column: name.clone(),
            });
        }
        columns.push((name.clone(), Slot::from_expr(name, expr)?));
    }

    Ok(PlanTarget::Write {
        kind: MutationKind::Update,
        columns,
        key_columns: schema.primary_key().iter().cloned().collect(),
    })
}

fn analyze_delete(delete: &Delete, schema: &TableSchema) -> Result<PlanTarget, TranslateError> {
    match &delete.selection {
        None => Ok(PlanTarget::DeleteAll),
        Some(selection) => Ok(PlanTarget::DeleteKey {
            key: key_from_predicate(selection, schema)?,
        }),
    }
}

fn check_column(schema: &TableSchema, column: &str) -> Result<(), TranslateError> {
    if schema.has_column(column) {
        Ok(())
    } else {
        Err(TranslateError::UnknownColumn {
            table: schema.name().to_string(),
            column: column.to_string(),
        })
    }
}

fn reject_null_keys(schema: &TableSchema, columns: &[(String, Slot)]) -> Result<(), TranslateError> {
    match columns
        .iter()
        .find(|(name, slot)| schema.is_key_column(name) && slot.is_null_literal())
    {
        Some((name, _)) => Err(TranslateError::NullKey {
            column: name.clone(),
        }),
        None => Ok(()),
    }
}

// Human-readable form every UPDATE/DELETE predicate must take.
fn required_form(schema: &TableSchema) -> String {
    let terms = schema
        .primary_key()
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>();

    format!("an AND of exact key equalities `{}`", terms.join(" AND "))
}

///
/// Predicate walk
///
/// The WHERE tree is flattened into equality terms by structural recursion.
/// Only `AND` nodes and `column = value` leaves are accepted.
///

fn equality_terms<'e>(
    expr: &'e Expr,
    schema: &TableSchema,
) -> Result<Vec<(&'e str, Slot)>, TranslateError> {
    match expr {
        Expr::And(items) => items
            .iter()
            .map(|item| equality_terms(item, schema))
            .collect::<Result<Vec<_>, _>>()
            .map(|nested| nested.into_iter().flatten().collect()),
        Expr::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => equality_term(left, right, schema).map(|term| vec![term]),
        Expr::Compare { .. } => Err(TranslateError::UnsupportedPredicate {
            shape: "inequality",
            required: required_form(schema),
        }),
        other => Err(TranslateError::UnsupportedPredicate {
            shape: other.shape(),
            required: required_form(schema),
        }),
    }
}

fn equality_term<'e>(
    left: &'e Expr,
    right: &'e Expr,
    schema: &TableSchema,
) -> Result<(&'e str, Slot), TranslateError> {
    let (column, operand) = match (left, right) {
        (Expr::Column(_), Expr::Column(_)) => {
            return Err(TranslateError::ColumnComparison {
                required: required_form(schema),
            });
        }
        (Expr::Column(column), operand) | (operand, Expr::Column(column)) => (column, operand),
        _ => {
            return Err(TranslateError::UnsupportedPredicate {
                shape: "comparison without a column",
                required: required_form(schema),
            });
        }
    };

    Ok((column.as_str(), Slot::from_expr(column, operand)?))
}

// Assemble key slots in declared primary-key order.
fn key_from_predicate(
    expr: &Expr,
    schema: &TableSchema,
) -> Result<Vec<(String, Slot)>, TranslateError> {
    let mut key: Vec<Option<Slot>> = vec![None; schema.primary_key().len()];

    for (column, slot) in equality_terms(expr, schema)? {
        check_column(schema, column)?;
        let position = schema
            .key_position(column)
            .ok_or_else(|| TranslateError::NonKeyPredicate {
                column: column.to_string(),
                required: required_form(schema),
            })?;
        if slot.is_null_literal() {
            return Err(TranslateError::NullKey {
                column: column.to_string(),
            });
        }
        if key[position].replace(slot).is_some() {
            return Err(TranslateError::DuplicateKeyColumn {
                column: column.to_string(),
                required: required_form(schema),
            });
        }
    }

    let missing = schema
        .primary_key()
        .iter()
        .zip(&key)
        .filter(|(_, slot)| slot.is_none())
        .map(|(column, _)| column.as_str())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(TranslateError::MissingKeyColumns {
            missing: missing.join(", "),
            required: required_form(schema),
        });
    }

    Ok(schema
        .primary_key()
        .iter()
        .cloned()
        .zip(key.into_iter().flatten())
        .collect())
}
