use crate::value::Value;
use std::{
    fmt,
    ops::{BitAnd, BitOr, Not},
};

///
/// Statement AST
///
/// Parsed DML as handed over by an external SQL parser. The shape is kept
/// close to the source text: no normalization happens here, and nothing is
/// checked against a catalog until `analyze`.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

///
/// Expr
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),

    /// Positional parameter, 1-based.
    Parameter(usize),

    Compare {
        op: CompareOp,
        left: Box<Self>,
        right: Box<Self>,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    InList {
        expr: Box<Self>,
        list: Vec<Self>,
        negated: bool,
    },
    Between {
        expr: Box<Self>,
        low: Box<Self>,
        high: Box<Self>,
        negated: bool,
    },
    IsNull {
        expr: Box<Self>,
        negated: bool,
    },
}

impl Expr {
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub const fn param(index: usize) -> Self {
        Self::Parameter(index)
    }

    #[must_use]
    pub fn compare(op: CompareOp, left: Self, right: Self) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `column = rhs`
    #[must_use]
    pub fn col_eq(column: impl Into<String>, rhs: Self) -> Self {
        Self::compare(CompareOp::Eq, Self::column(column), rhs)
    }

    #[must_use]
    pub fn in_list(expr: Self, list: Vec<Self>) -> Self {
        Self::InList {
            expr: Box::new(expr),
            list,
            negated: false,
        }
    }

    #[must_use]
    pub fn between(expr: Self, low: Self, high: Self) -> Self {
        Self::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_null(expr: Self) -> Self {
        Self::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    /// Short label of the expression kind, used in diagnostics.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Column(_) => "bare column",
            Self::Literal(_) => "bare literal",
            Self::Parameter(_) => "bare parameter",
            Self::Compare { .. } => "comparison",
            Self::And(_) => "AND",
            Self::Or(_) => "OR",
            Self::Not(_) => "NOT",
            Self::InList { .. } => "IN list",
            Self::Between { .. } => "BETWEEN",
            Self::IsNull { .. } => "IS NULL",
        }
    }
}

impl BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match self {
            Self::And(mut items) => {
                items.push(rhs);
                Self::And(items)
            }
            lhs => Self::And(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => f.write_str(name),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Parameter(index) => write!(f, "?{index}"),
            Self::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::And(items) => write_joined(f, items, " AND "),
            Self::Or(items) => write_joined(f, items, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
            Self::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr}{not} IN (")?;
                write_joined(f, list, ", ")?;
                f.write_str(")")
            }
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr}{not} BETWEEN {low} AND {high}")
            }
            Self::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{expr} IS{not} NULL")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({item})")?;
    }

    Ok(())
}

///
/// Insert
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Insert {
    pub table: String,

    /// Explicit column list; `None` means catalog column order.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Expr>>,

    /// `INSERT OR UPDATE` qualifier.
    pub upsert: bool,
}

///
/// Update
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub selection: Option<Expr>,
}

///
/// Delete
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delete {
    pub table: String,
    pub selection: Option<Expr>,
}

///
/// Select
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Select {
    pub table: String,
    pub selection: Option<Expr>,
}

///
/// Statement
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Statement {
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Select(Select),
}

impl Statement {
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert(s) => &s.table,
            Self::Update(s) => &s.table,
            Self::Delete(s) => &s.table,
            Self::Select(s) => &s.table,
        }
    }

    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Select(_))
    }
}
