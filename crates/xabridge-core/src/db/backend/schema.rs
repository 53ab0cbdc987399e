use crate::error::InternalError;
use std::collections::BTreeSet;

///
/// TableSchema
///
/// Column list plus declared primary-key order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
}

impl TableSchema {
    pub fn try_new<C, K>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = C>,
        primary_key: impl IntoIterator<Item = K>,
    ) -> Result<Self, InternalError>
    where
        C: Into<String>,
        K: Into<String>,
    {
        let name = name.into();
        let columns = columns.into_iter().map(Into::into).collect::<Vec<String>>();
        let primary_key = primary_key.into_iter().map(Into::into).collect::<Vec<String>>();

        if name.is_empty() {
            return Err(InternalError::backend_validation("table name is empty"));
        }
        if primary_key.is_empty() {
            return Err(InternalError::backend_validation(format!(
                "table '{name}' declares no primary key"
            )));
        }

        let mut seen = BTreeSet::new();
        for column in &columns {
            if column.is_empty() || !seen.insert(column.as_str()) {
                return Err(InternalError::backend_validation(format!(
                    "table '{name}' has an empty or duplicate column '{column}'"
                )));
            }
        }

        let mut seen_key = BTreeSet::new();
        for key in &primary_key {
            if !seen.contains(key.as_str()) || !seen_key.insert(key.as_str()) {
                return Err(InternalError::backend_validation(format!(
                    "table '{name}' key column '{key}' is unknown or repeated"
                )));
            }
        }

        Ok(Self {
            name,
            columns,
            primary_key,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    #[must_use]
    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Position of `column` within the primary key.
    #[must_use]
    pub fn key_position(&self, column: &str) -> Option<usize> {
        self.primary_key.iter().position(|c| c == column)
    }
}
