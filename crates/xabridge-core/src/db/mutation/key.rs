use crate::{db::mutation::MutationError, value::Value};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

///
/// Key
///
/// Composite primary-key value. Components are positional and follow the
/// table's declared key-column order.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Key(Vec<Value>);

impl Key {
    #[must_use]
    pub const fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    #[must_use]
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    #[must_use]
    pub fn components(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn into_components(self) -> Vec<Value> {
        self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Compare the leading components of `self` against a (possibly shorter) bound.
    fn cmp_prefix(&self, bound: &Self) -> Ordering {
        let width = bound.len().min(self.len());
        match self.0[..width].cmp(&bound.0[..width]) {
            Ordering::Equal if self.len() < bound.len() => Ordering::Less,
            ordering => ordering,
        }
    }
}

impl From<Vec<Value>> for Key {
    fn from(components: Vec<Value>) -> Self {
        Self(components)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "[{}]", parts.join(", "))
    }
}

///
/// BoundKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum BoundKind {
    Closed,
    Open,
}

///
/// KeyRange
///
/// Range over composite keys. Bounds may be key prefixes: a closed end bound
/// `[a]` includes every key starting with `a`.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRange {
    start: Key,
    start_bound: BoundKind,
    end: Key,
    end_bound: BoundKind,
}

impl KeyRange {
    #[must_use]
    pub const fn new(start: Key, start_bound: BoundKind, end: Key, end_bound: BoundKind) -> Self {
        Self {
            start,
            start_bound,
            end,
            end_bound,
        }
    }

    #[must_use]
    pub const fn closed_closed(start: Key, end: Key) -> Self {
        Self::new(start, BoundKind::Closed, end, BoundKind::Closed)
    }

    #[must_use]
    pub const fn closed_open(start: Key, end: Key) -> Self {
        Self::new(start, BoundKind::Closed, end, BoundKind::Open)
    }

    /// Every key whose leading components equal `prefix`.
    #[must_use]
    pub fn prefix(prefix: Key) -> Self {
        Self::closed_closed(prefix.clone(), prefix)
    }

    #[must_use]
    pub const fn start(&self) -> &Key {
        &self.start
    }

    #[must_use]
    pub const fn end(&self) -> &Key {
        &self.end
    }

    #[must_use]
    pub const fn start_bound(&self) -> BoundKind {
        self.start_bound
    }

    #[must_use]
    pub const fn end_bound(&self) -> BoundKind {
        self.end_bound
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        let after_start = match self.start_bound {
            BoundKind::Closed => key.cmp_prefix(&self.start) != Ordering::Less,
            BoundKind::Open => key.cmp_prefix(&self.start) == Ordering::Greater,
        };
        let before_end = match self.end_bound {
            BoundKind::Closed => key.cmp_prefix(&self.end) != Ordering::Greater,
            BoundKind::Open => key.cmp_prefix(&self.end) == Ordering::Less,
        };

        after_start && before_end
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = match self.start_bound {
            BoundKind::Closed => '[',
            BoundKind::Open => '(',
        };
        let close = match self.end_bound {
            BoundKind::Closed => ']',
            BoundKind::Open => ')',
        };
        write!(f, "{open}{}..{}{close}", self.start, self.end)
    }
}

///
/// KeySet
///
/// Rows addressed by a delete: one key, every row, or a key range.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum KeySet {
    Key(Key),
    All,
    Range(KeyRange),
}

impl KeySet {
    #[must_use]
    pub const fn key(key: Key) -> Self {
        Self::Key(key)
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            Self::Key(single) => single == key,
            Self::All => true,
            Self::Range(range) => range.contains(key),
        }
    }

    pub(super) fn validate(&self, table: &str) -> Result<(), MutationError> {
        match self {
            Self::Key(key) if key.is_empty() => Err(MutationError::EmptyKey {
                table: table.to_string(),
            }),
            Self::Range(range) if range.start.is_empty() && range.end.is_empty() => {
                Err(MutationError::EmptyRangeBound {
                    table: table.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key {key}"),
            Self::All => f.write_str("all rows"),
            Self::Range(range) => write!(f, "range {range}"),
        }
    }
}
