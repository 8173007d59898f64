//! Apache Druid SQL dialect.
//!
//! Druid's query engine differs from the warehouse dialects in ways that
//! matter to this compiler: no semicolon-terminated statements, no
//! `GENERATOR`/`GENERATE_DATE_ARRAY` date spine (cumulative metrics are
//! `NotImplemented` on Druid, §4.6/§7), and double-quoted identifiers like
//! ANSI/Postgres.

use super::helpers;
use super::SqlDialect;

#[derive(Debug, Clone, Copy)]
pub struct Druid;

impl SqlDialect for Druid {
    fn name(&self) -> &'static str {
        "druid"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn supports_merge(&self) -> bool {
        false
    }

    fn supports_materialized_view(&self) -> bool {
        false
    }

    fn supports_create_or_replace_view(&self) -> bool {
        false
    }
}
