//! `Request`: the programmatic input to `compile()` (§3 Request, §6 External
//! interfaces). Field IDs are bare names (unambiguous only) or
//! `view.field`/`view.field_timeframe`.

use chrono::NaiveDate;

use crate::filter::FilterExpr;
use crate::sql::dialect::Dialect;

/// Target SQL dialect (§6: "a dialect determines date-spine literal,
/// interval and truncation syntax, cast syntax, semicolon policy, ordering
/// defaults").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Snowflake,
    Redshift,
    Postgres,
    BigQuery,
    Druid,
}

impl QueryType {
    pub fn dialect(self) -> Dialect {
        match self {
            QueryType::Snowflake => Dialect::Snowflake,
            QueryType::Redshift => Dialect::Redshift,
            QueryType::Postgres => Dialect::Postgres,
            QueryType::BigQuery => Dialect::BigQuery,
            QueryType::Druid => Dialect::Druid,
        }
    }
}

/// A `where`/`having` clause: either a raw SQL string (tokenized for
/// identifier names by the resolver, §4.8) or a structured filter-object
/// list (§3 Request, §4.4).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterInput {
    #[default]
    None,
    Literal(String),
    Structured(Vec<FilterExpr>),
}

impl FilterInput {
    pub fn is_empty(&self) -> bool {
        matches!(self, FilterInput::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A requested sort key: a selected metric/dimension's field id.
#[derive(Debug, Clone, PartialEq)]
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

/// An analytic request: metrics + dimensions + filters + ordering + limit
/// (§3 Request).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub where_: FilterInput,
    pub having: FilterInput,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub query_type: QueryType,
    pub select_raw_sql: Vec<String>,
    /// Raw SQL appended unless the caller suppresses it (§4.5 "Semicolon").
    pub terminate_with_semicolon: bool,
    /// Explicit "today" for `matches` date filters, keeping `compile` pure
    /// (§8 Idempotence: "compile is a pure function of (project, request,
    /// dialect)" — the wall clock is not an implicit input).
    pub reference_date: NaiveDate,
    /// Force a `GROUP BY` even when `no_group_by` would otherwise apply
    /// (§4.3 step 5).
    pub force_group_by: bool,
}

impl Request {
    pub fn new(metrics: Vec<String>, query_type: QueryType, reference_date: NaiveDate) -> Self {
        Self {
            metrics,
            dimensions: Vec::new(),
            where_: FilterInput::None,
            having: FilterInput::None,
            order_by: Vec::new(),
            limit: None,
            query_type,
            select_raw_sql: Vec::new(),
            terminate_with_semicolon: true,
            reference_date,
            force_group_by: false,
        }
    }
}
