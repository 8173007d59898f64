//! Semantic-compiler-specific dialect behavior (§4.1 time/duration
//! semantics, §4.6 cumulative date spine).
//!
//! Kept separate from [`super::SqlDialect`]: that trait is generic,
//! dialect-agnostic SQL-builder infrastructure carried over almost verbatim
//! from the teacher. Everything here is specific to this compiler's
//! semantics (timezone conversion, `DATE_TRUNC` argument order, symmetric
//! aggregates, the cumulative date spine) and is implemented directly on
//! the `Dialect` enum rather than added to the dyn-compatible trait.

use super::Dialect;
use crate::model::field::{DurationUnit, TimeDatatype};

pub trait SemanticDialectExt {
    fn cast_expr(&self, expr: &str, data_type: &str) -> String;
    fn convert_timezone(&self, expr: &str, tz: &str, datatype: TimeDatatype) -> String;
    fn date_trunc(&self, unit: &str, expr: &str) -> String;
    fn day_of_week(&self, expr: &str) -> String;
    fn day_of_month(&self, expr: &str) -> String;
    fn hour_of_day(&self, expr: &str) -> String;
    fn date_diff(&self, unit: DurationUnit, start: &str, end: &str) -> String;
    fn median(&self, expr: &str) -> String;
    fn symmetric_sum(&self, measure_expr: &str, primary_key_sql: &str) -> String;
    /// `CURRENT_DATE` (or dialect-specific call form) — the cumulative
    /// planner's upper bound (§4.6).
    fn current_date_expr(&self) -> &'static str;
    /// The `date_spine` CTE body: a dense daily series from `start_literal`
    /// spanning `days` days. `None` means the dialect cannot produce one
    /// (Druid — cumulative metrics are `NotImplemented` there, §7).
    fn date_spine_sql(&self, start_literal: &str, days: i64) -> Option<String>;
    /// Whether statements should be semicolon-terminated (Druid never is,
    /// §4.5 "Semicolon").
    fn terminates_with_semicolon(&self) -> bool;
    /// Whether a metric-only request gets a default `ORDER BY <metric> DESC`
    /// when the request supplies none (§4.5: Snowflake/Redshift only).
    fn default_metric_order_by(&self) -> bool;
}

impl SemanticDialectExt for Dialect {
    fn cast_expr(&self, expr: &str, data_type: &str) -> String {
        match self {
            Dialect::BigQuery => format!("CAST({expr} AS {data_type})"),
            _ => format!("CAST({expr} AS {data_type})"),
        }
    }

    fn convert_timezone(&self, expr: &str, tz: &str, datatype: TimeDatatype) -> String {
        match self {
            Dialect::Snowflake | Dialect::Redshift => {
                format!("CONVERT_TIMEZONE('{tz}', {expr})")
            }
            Dialect::Postgres => format!("({expr} AT TIME ZONE 'utc' AT TIME ZONE '{tz}')"),
            Dialect::BigQuery => {
                let converted = format!("DATETIME({expr}, '{tz}')");
                match datatype {
                    TimeDatatype::Timestamp => format!("CAST({converted} AS TIMESTAMP)"),
                    _ => converted,
                }
            }
            Dialect::Druid => expr.to_string(),
        }
    }

    fn date_trunc(&self, unit: &str, expr: &str) -> String {
        match self {
            Dialect::BigQuery => format!("DATE_TRUNC(CAST({expr} AS DATE), {unit})"),
            _ => format!("DATE_TRUNC('{unit}', {expr})"),
        }
    }

    fn day_of_week(&self, expr: &str) -> String {
        match self {
            Dialect::Snowflake => format!("DAYOFWEEK({expr})"),
            Dialect::BigQuery => format!("EXTRACT(DAYOFWEEK FROM {expr})"),
            _ => format!("EXTRACT(DOW FROM {expr})"),
        }
    }

    fn day_of_month(&self, expr: &str) -> String {
        match self {
            Dialect::Snowflake => format!("DAYOFMONTH({expr})"),
            _ => format!("EXTRACT(DAY FROM {expr})"),
        }
    }

    fn hour_of_day(&self, expr: &str) -> String {
        match self {
            Dialect::Snowflake => format!("HOUR({expr})"),
            _ => format!("EXTRACT(HOUR FROM {expr})"),
        }
    }

    fn date_diff(&self, unit: DurationUnit, start: &str, end: &str) -> String {
        let unit_name = unit.name().to_uppercase();
        match self {
            Dialect::Snowflake | Dialect::Redshift => {
                format!("DATEDIFF('{unit_name}', {start}, {end})")
            }
            Dialect::BigQuery => {
                let sql_unit = match unit {
                    DurationUnit::Week => "ISOWEEK".to_string(),
                    DurationUnit::Year => "ISOYEAR".to_string(),
                    _ => unit_name,
                };
                format!("DATE_DIFF(CAST({end} AS DATE), CAST({start} AS DATE), {sql_unit})")
            }
            Dialect::Postgres => {
                let seconds = format!("(EXTRACT(EPOCH FROM ({end}::timestamp - {start}::timestamp)))");
                let divisor: f64 = match unit {
                    DurationUnit::Second => 1.0,
                    DurationUnit::Minute => 60.0,
                    DurationUnit::Hour => 3600.0,
                    DurationUnit::Day => 86400.0,
                    DurationUnit::Week => 604800.0,
                    DurationUnit::Month => 2_629_800.0,
                    DurationUnit::Quarter => 7_889_400.0,
                    DurationUnit::Year => 31_557_600.0,
                };
                format!("FLOOR({seconds} / {divisor})")
            }
            Dialect::Druid => format!(
                "(EXTRACT(EPOCH FROM ({end}::timestamp - {start}::timestamp)) / {})",
                match unit {
                    DurationUnit::Second => 1,
                    DurationUnit::Minute => 60,
                    DurationUnit::Hour => 3600,
                    DurationUnit::Day => 86400,
                    DurationUnit::Week => 604800,
                    DurationUnit::Month => 2_629_800,
                    DurationUnit::Quarter => 7_889_400,
                    DurationUnit::Year => 31_557_600,
                }
            ),
        }
    }

    fn median(&self, expr: &str) -> String {
        match self {
            Dialect::BigQuery => format!("APPROX_QUANTILES({expr}, 2)[OFFSET(1)]"),
            Dialect::Druid => format!("APPROX_QUANTILE({expr}, 0.5)"),
            _ => format!("MEDIAN({expr})"),
        }
    }

    /// Canonical "symmetric aggregate" form: encode the measure value and a
    /// hash of the home view's primary key into a single distinct-summed
    /// integer, then recover the true sum by subtracting the (separately,
    /// distinctly summed) hash contribution. This keeps `SUM`/`AVG`
    /// arithmetically correct when a join fans out the measure's home view
    /// (§4.1, §9 glossary "Symmetric aggregate").
    fn symmetric_sum(&self, measure_expr: &str, primary_key_sql: &str) -> String {
        let hash = self.pk_hash(primary_key_sql);
        format!(
            "(SUM(DISTINCT (CAST(FLOOR(COALESCE({measure_expr}, 0) * 1000000) AS DECIMAL(38,0)) \
             + ({hash} * 1000000000000))) \
             - SUM(DISTINCT ({hash} * 1000000000000))) / 1000000.0"
        )
    }

    fn current_date_expr(&self) -> &'static str {
        match self {
            Dialect::Snowflake | Dialect::BigQuery => "CURRENT_DATE()",
            _ => "CURRENT_DATE",
        }
    }

    fn date_spine_sql(&self, start_literal: &str, days: i64) -> Option<String> {
        match self {
            Dialect::Snowflake | Dialect::Redshift => Some(format!(
                "SELECT DATEADD('day', SEQ4(), DATE '{start_literal}') AS date \
                 FROM TABLE(GENERATOR(rowcount => {days}))"
            )),
            Dialect::Postgres => Some(format!(
                "SELECT generate_series(DATE '{start_literal}', {cur} , INTERVAL '1 day')::date AS date",
                cur = self.current_date_expr()
            )),
            Dialect::BigQuery => Some(format!(
                "SELECT date FROM UNNEST(GENERATE_DATE_ARRAY(DATE '{start_literal}', {cur}, INTERVAL 1 DAY)) AS date",
                cur = self.current_date_expr()
            )),
            Dialect::Druid => None,
        }
    }

    fn terminates_with_semicolon(&self) -> bool {
        !matches!(self, Dialect::Druid)
    }

    fn default_metric_order_by(&self) -> bool {
        matches!(self, Dialect::Snowflake | Dialect::Redshift)
    }
}

impl Dialect {
    /// A stable integer hash of the home view's primary key, used as the
    /// low-order bits of the symmetric-aggregate encoding.
    fn pk_hash(&self, primary_key_sql: &str) -> String {
        match self {
            Dialect::Snowflake | Dialect::Redshift => format!("HASH({primary_key_sql})"),
            Dialect::BigQuery => format!("FARM_FINGERPRINT(CAST({primary_key_sql} AS STRING))"),
            _ => format!(
                "('x' || SUBSTR(MD5(CAST({primary_key_sql} AS TEXT)), 1, 15))::BIT(60)::BIGINT"
            ),
        }
    }
}
