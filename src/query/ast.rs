//! Query AST - SELECT statements over the single `data` table
//!
//! `Display` renders canonical query text, so an auto-fixed statement can be
//! handed back to the engine or shown to the user.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const TABLE_NAME: &str = "data";

const RESERVED: &[&str] = &[
    "select", "from", "where", "and", "or", "group", "order", "by", "asc", "desc", "limit", "as",
    "is", "not", "null", "sum", "avg", "count", "min", "max",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "COUNT" => Some(AggregateFunc::Count),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggregateArg {
    Star,
    Column(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Wildcard,
    Column {
        name: String,
        alias: Option<String>,
    },
    Aggregate {
        func: AggregateFunc,
        arg: AggregateArg,
        alias: Option<String>,
    },
}

impl SelectItem {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }

    /// Column name this item produces in result rows.
    ///
    /// Unaliased aggregates are named `sum_total`, `avg_price`, `count_id`,
    /// and `count` for `COUNT(*)`.
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::Column { name, alias } => alias.clone().unwrap_or_else(|| name.clone()),
            SelectItem::Aggregate { alias: Some(alias), .. } => alias.clone(),
            SelectItem::Aggregate { func, arg: AggregateArg::Star, .. } => func.as_str().to_lowercase(),
            SelectItem::Aggregate { func, arg: AggregateArg::Column(col), .. } => {
                format!("{}_{}", func.as_str().to_lowercase(), col)
            }
        }
    }

    /// Source column read by this item, if any.
    pub fn source_column(&self) -> Option<&str> {
        match self {
            SelectItem::Column { name, .. } => Some(name),
            SelectItem::Aggregate { arg: AggregateArg::Column(col), .. } => Some(col),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl CompareOp {
    pub fn is_range(&self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::NotEq)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::GtEq => ">=",
            CompareOp::LtEq => "<=",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Numeric literal, kept as written.
    Number(String),
    Text(String),
}

impl Literal {
    /// Literal text with the quotes already stripped.
    pub fn text(&self) -> &str {
        match self {
            Literal::Number(s) | Literal::Text(s) => s,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.text().trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare { op: CompareOp, value: Literal },
    IsNull,
    IsNotNull,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub predicate: Predicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

/// Conditions combined strictly left to right, without precedence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub first: Condition,
    pub rest: Vec<(Connective, Condition)>,
}

impl WhereClause {
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, c)| c))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub projections: Vec<SelectItem>,
    /// `None` when the query text had no FROM clause.
    pub from: Option<String>,
    pub filter: Option<WhereClause>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    pub fn has_aggregates(&self) -> bool {
        self.projections.iter().any(SelectItem::is_aggregate)
    }

    /// Projection is made only of aggregates (e.g. a bare `COUNT(*)`).
    pub fn is_purely_aggregate(&self) -> bool {
        !self.projections.is_empty() && self.projections.iter().all(SelectItem::is_aggregate)
    }

    /// Non-aggregated SELECT columns, in SELECT order.
    pub fn plain_columns(&self) -> Vec<String> {
        self.projections
            .iter()
            .filter_map(|item| match item {
                SelectItem::Column { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.projections
            .iter()
            .filter(|item| !matches!(item, SelectItem::Wildcard))
            .map(SelectItem::output_name)
            .collect()
    }

    /// Every source column referenced outside ORDER BY.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .projections
            .iter()
            .filter_map(|item| item.source_column().map(str::to_string))
            .collect();
        if let Some(filter) = &self.filter {
            columns.extend(filter.conditions().map(|c| c.column.clone()));
        }
        columns.extend(self.group_by.iter().cloned());
        columns
    }
}

fn write_ident(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let simple = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple && !RESERVED.contains(&name.to_ascii_lowercase().as_str()) {
        write!(f, "{}", name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alias = match self {
            SelectItem::Wildcard => return write!(f, "*"),
            SelectItem::Column { name, alias } => {
                write_ident(f, name)?;
                alias
            }
            SelectItem::Aggregate { func, arg, alias } => {
                write!(f, "{}(", func.as_str())?;
                match arg {
                    AggregateArg::Star => write!(f, "*")?,
                    AggregateArg::Column(col) => write_ident(f, col)?,
                }
                write!(f, ")")?;
                alias
            }
        };
        if let Some(alias) = alias {
            write!(f, " AS ")?;
            write_ident(f, alias)?;
        }
        Ok(())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ident(f, &self.column)?;
        match &self.predicate {
            Predicate::IsNull => write!(f, " IS NULL"),
            Predicate::IsNotNull => write!(f, " IS NOT NULL"),
            Predicate::Compare { op, value: Literal::Number(n) } => write!(f, " {} {}", op.symbol(), n),
            Predicate::Compare { op, value: Literal::Text(t) } => {
                write!(f, " {} '{}'", op.symbol(), t.replace('\'', "''"))
            }
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (i, item) in self.projections.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item)?;
        }
        if let Some(table) = &self.from {
            write!(f, " FROM ")?;
            write_ident(f, table)?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {}", filter.first)?;
            for (connective, condition) in &filter.rest {
                let word = match connective {
                    Connective::And => "AND",
                    Connective::Or => "OR",
                };
                write!(f, " {} {}", word, condition)?;
            }
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (i, col) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_ident(f, col)?;
            }
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_ident(f, &key.column)?;
                write!(f, " {}", if key.descending { "DESC" } else { "ASC" })?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}
