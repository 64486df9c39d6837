//! Shared query infrastructure: the [`Query`] trait, [`Filter`] predicates, and [`SortDirection`].

use std::fmt;
use std::str::FromStr;

use url::Url;

/// Trait implemented by all query builders. Provides URL serialization and
/// shared builder methods for row filters.
pub trait Query {
    /// Appends this query's parameters to the given URL, returning the modified URL.
    fn add_to_url(&self, url: &Url) -> Url;

    /// Returns a mutable reference to the filter list.
    fn filters_mut(&mut self) -> &mut Vec<Filter>;

    /// Adds an arbitrary filter predicate.
    fn with_filter(mut self, filter: Filter) -> Self
    where
        Self: Sized,
    {
        self.filters_mut().push(filter);
        self
    }

    /// Keeps rows where `column` equals `value`.
    fn eq(self, column: &str, value: impl ToString) -> Self
    where
        Self: Sized,
    {
        self.with_filter(Filter::new(column, Operator::Eq, value.to_string()))
    }

    /// Keeps rows where `column` is strictly less than `value`.
    fn lt(self, column: &str, value: impl ToString) -> Self
    where
        Self: Sized,
    {
        self.with_filter(Filter::new(column, Operator::Lt, value.to_string()))
    }

    /// Keeps rows where `column` is strictly greater than `value`.
    fn gt(self, column: &str, value: impl ToString) -> Self
    where
        Self: Sized,
    {
        self.with_filter(Filter::new(column, Operator::Gt, value.to_string()))
    }

    /// Keeps rows where `column` is greater than or equal to `value`.
    fn gte(self, column: &str, value: impl ToString) -> Self
    where
        Self: Sized,
    {
        self.with_filter(Filter::new(column, Operator::Gte, value.to_string()))
    }

    /// Keeps rows where `column` is one of `values`.
    fn is_in<I, V>(self, column: &str, values: I) -> Self
    where
        Self: Sized,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.with_filter(Filter::is_in(column, values))
    }
}

/// Comparison operators understood by the table store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::In => "in",
        };
        f.write_str(s)
    }
}

/// A single `column=op.value` row predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: Operator,
    /// Already rendered operand. For `in` this is the parenthesised list.
    pub value: String,
}

impl Filter {
    pub fn new(column: &str, op: Operator, value: String) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    /// Builds an `in.(a,b,c)` filter, quoting members that contain reserved characters.
    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let members: Vec<String> = values
            .into_iter()
            .map(|v| quote_list_member(&v.to_string()))
            .collect();
        Self::new(column, Operator::In, format!("({})", members.join(",")))
    }

    /// The query-string value, e.g. `lt.2024-01-01`.
    pub fn render(&self) -> String {
        format!("{}.{}", self.op, self.value)
    }
}

fn quote_list_member(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Sort order for ordered selects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (oldest/smallest first). This is the default.
    #[default]
    Asc,
    /// Descending order (newest/largest first).
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(()),
        }
    }
}

/// Appends every filter as its own query pair.
pub(crate) fn append_filters(url: &mut Url, filters: &[Filter]) {
    for filter in filters {
        url.query_pairs_mut()
            .append_pair(&filter.column, &filter.render());
    }
}
