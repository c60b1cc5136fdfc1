//! WHERE condition types.
//!
//! A [`Filter`] maps field names to conditions. Keys keep insertion order so the
//! generated clause (and its placeholder numbering) is deterministic.

use crate::value::Value;

/// Comparison operator applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Membership; an empty list matches nothing.
    In(Vec<Value>),
    /// Inclusive range, low then high.
    Between(Value, Value),
    /// SQL `LIKE` with a caller-supplied pattern.
    Like(String),
}

impl Operator {
    /// SQL comparison token for the binary operators.
    #[must_use]
    pub const fn sql_op(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "=",
            Operator::Ne(_) => "!=",
            Operator::Gt(_) => ">",
            Operator::Gte(_) => ">=",
            Operator::Lt(_) => "<",
            Operator::Lte(_) => "<=",
            Operator::In(_) => "IN",
            Operator::Between(_, _) => "BETWEEN",
            Operator::Like(_) => "LIKE",
        }
    }

    /// Number of bound parameters this operator consumes.
    #[must_use]
    pub fn param_count(&self) -> usize {
        match self {
            Operator::Eq(v) | Operator::Ne(v) if v.is_null() => 0,
            Operator::In(values) => values.len(),
            Operator::Between(_, _) => 2,
            _ => 1,
        }
    }
}

/// A condition on one field: a bare value (equality, `Null` for `IS NULL`) or
/// an explicit operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Value(Value),
    Op(Operator),
}

impl Condition {
    /// Normalize to an operator (`Value(v)` is `Eq(v)`).
    #[must_use]
    pub fn to_operator(&self) -> Operator {
        match self {
            Condition::Value(v) => Operator::Eq(v.clone()),
            Condition::Op(op) => op.clone(),
        }
    }
}

macro_rules! condition_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Condition {
                fn from(value: $ty) -> Self {
                    Condition::Value(Value::from(value))
                }
            }
        )*
    };
}

condition_from_value!(bool, i32, i64, u32, f64, &str, String);

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Condition::Value(value)
    }
}

impl From<Operator> for Condition {
    fn from(op: Operator) -> Self {
        Condition::Op(op)
    }
}

/// Ordered set of field conditions, joined with `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the condition on `field`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.insert(field, condition);
        self
    }

    /// Add a condition; a later condition on the same field replaces the
    /// earlier one in place.
    pub fn insert(&mut self, field: impl Into<String>, condition: impl Into<Condition>) {
        let field = field.into();
        let condition = condition.into();
        if let Some(slot) = self.conditions.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = condition;
        } else {
            self.conditions.push((field, condition));
        }
    }

    /// Convenience: `field = value` (or `IS NULL`).
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(field, Condition::Value(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.iter().find(|(f, _)| f == field).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(f, c)| (f.as_str(), c))
    }

    /// Append every condition of `other`; `other` wins on conflicts.
    #[must_use]
    pub fn merge(mut self, other: &Filter) -> Self {
        for (field, condition) in &other.conditions {
            self.insert(field.clone(), condition.clone());
        }
        self
    }
}

impl<K: Into<String>, C: Into<Condition>> FromIterator<(K, C)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (k, c) in iter {
            filter.insert(k, c);
        }
        filter
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` term: a field name (or storage column) and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}
