//! Filter and value builders.

use std::marker::PhantomData;

use wicket_types::{quote_ident, Value};

use super::Column;
use crate::dialect::Dialect;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Condition {
    Compare {
        column: &'static str,
        op: &'static str,
        value: Value,
    },
    IsNull(&'static str),
    NotNull(&'static str),
    Like {
        column: &'static str,
        pattern: String,
    },
    AnyOf {
        column: &'static str,
        values: Vec<Value>,
    },
}

impl Condition {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Compare { column, .. }
            | Self::Like { column, .. }
            | Self::AnyOf { column, .. } => column,
            Self::IsNull(column) | Self::NotNull(column) => column,
        }
    }

    /// Values this condition binds, in placeholder order.
    pub(crate) fn values(&self) -> Vec<Value> {
        match self {
            Self::Compare { value, .. } => vec![value.clone()],
            Self::Like { pattern, .. } => vec![Value::Text(pattern.clone())],
            Self::AnyOf { values, .. } => values.clone(),
            Self::IsNull(_) | Self::NotNull(_) => Vec::new(),
        }
    }

    fn render(&self, params: &mut Vec<Value>) -> String {
        let column = quote_ident(self.column());
        match self {
            Self::Compare { op, value, .. } => {
                format!("{column} {op} {}", bind(params, value.clone()))
            }
            Self::IsNull(_) => format!("{column} IS NULL"),
            Self::NotNull(_) => format!("{column} IS NOT NULL"),
            Self::Like { pattern, .. } => {
                format!("{column} LIKE {}", bind(params, Value::Text(pattern.clone())))
            }
            Self::AnyOf { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Self::AnyOf { values, .. } => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| bind(params, v.clone())).collect();
                format!("{column} IN ({})", placeholders.join(", "))
            }
        }
    }
}

/// Pushes `value` and returns its placeholder.
pub(crate) fn bind(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Row selection for entity columns `C`.
///
/// Conditions are ANDed. An empty filter matches every row.
///
/// ```ignore
/// let filter = Filter::new()
///     .eq(ProductColumn::Featured, true)
///     .lt(ProductColumn::Price, 100.0)
///     .order_by(ProductColumn::Name, Order::Asc)
///     .limit(8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<C> {
    pub(crate) conditions: Vec<Condition>,
    order: Vec<(&'static str, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    _columns: PhantomData<fn() -> C>,
}

impl<C> Default for Filter<C> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            _columns: PhantomData,
        }
    }
}

impl<C: Column> Filter<C> {
    /// A filter that matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    fn compare(mut self, column: C, op: &'static str, value: Value) -> Self {
        self.conditions.push(Condition::Compare {
            column: column.name(),
            op,
            value,
        });
        self
    }

    /// `column = value`
    pub fn eq(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, "=", value.into())
    }

    /// `column <> value`
    pub fn ne(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, "<>", value.into())
    }

    /// `column < value`
    pub fn lt(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, "<", value.into())
    }

    /// `column <= value`
    pub fn le(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, "<=", value.into())
    }

    /// `column > value`
    pub fn gt(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, ">", value.into())
    }

    /// `column >= value`
    pub fn ge(self, column: C, value: impl Into<Value>) -> Self {
        self.compare(column, ">=", value.into())
    }

    /// `column IS NULL`
    pub fn is_null(mut self, column: C) -> Self {
        self.conditions.push(Condition::IsNull(column.name()));
        self
    }

    /// `column IS NOT NULL`
    pub fn not_null(mut self, column: C) -> Self {
        self.conditions.push(Condition::NotNull(column.name()));
        self
    }

    /// `column LIKE pattern`, on text columns.
    pub fn like(mut self, column: C, pattern: impl Into<String>) -> Self {
        self.conditions.push(Condition::Like {
            column: column.name(),
            pattern: pattern.into(),
        });
        self
    }

    /// `column IN (values...)`. An empty list matches nothing.
    pub fn any_of<V: Into<Value>>(mut self, column: C, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::AnyOf {
            column: column.name(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Appends a sort key.
    pub fn order_by(mut self, column: C, order: Order) -> Self {
        self.order.push((column.name(), order));
        self
    }

    /// Caps the number of rows returned.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl<C> Filter<C> {
    pub(crate) fn eq_named(mut self, column: &'static str, value: Value) -> Self {
        self.conditions.push(Condition::Compare {
            column,
            op: "=",
            value,
        });
        self
    }

    pub(crate) fn order_by_named(mut self, column: &'static str, order: Order) -> Self {
        self.order.push((column, order));
        self
    }

    pub(crate) fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Renders ` WHERE ...`, or nothing for an empty filter.
    pub(crate) fn where_clause(&self, params: &mut Vec<Value>) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|condition| condition.render(params))
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    /// Renders ` ORDER BY ... LIMIT ... OFFSET ...`.
    pub(crate) fn tail_clause(&self, dialect: Dialect) -> String {
        let mut sql = String::new();
        if !self.order.is_empty() {
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|(column, order)| format!("{} {}", quote_ident(column), order.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        match (self.limit, self.offset, dialect) {
            (Some(limit), _, _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_), Dialect::Sqlite) => sql.push_str(" LIMIT -1"),
            (None, _, _) => {}
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}

/// Column assignments for inserts and updates.
///
/// Setting the same column twice keeps the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct Values<C> {
    pub(crate) assignments: Vec<(&'static str, Value)>,
    _columns: PhantomData<fn() -> C>,
}

impl<C> Default for Values<C> {
    fn default() -> Self {
        Self {
            assignments: Vec::new(),
            _columns: PhantomData,
        }
    }
}

impl<C: Column> Values<C> {
    /// No assignments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `column`.
    pub fn set(mut self, column: C, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self
            .assignments
            .iter_mut()
            .find(|(name, _)| *name == column.name())
        {
            Some((_, existing)) => *existing = value,
            None => self.assignments.push((column.name(), value)),
        }
        self
    }

    /// Whether nothing has been assigned.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
