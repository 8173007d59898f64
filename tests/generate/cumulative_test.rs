use chrono::NaiveDate;

use semantic_sql::model::field::{
    DimensionGroupKind, DimensionType, Field, FieldType, MeasureSpec, MeasureType, TimeDatatype,
    TimeDimensionGroup, Timeframe,
};
use semantic_sql::model::identifier::Identifier;
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::{Project, ProjectBuilder};
use semantic_sql::request::{QueryType, Request};
use semantic_sql::{compile, CompileError};

fn dimension(name: &str, view: &str, sql: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Dimension {
            sql: sql.to_string(),
            dimension_type: DimensionType::Number,
        },
        required_access_grants: vec![],
    }
}

fn measure(name: &str, view: &str, spec: MeasureSpec) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Measure(spec),
        required_access_grants: vec![],
    }
}

fn plain_sum(sql: &str) -> MeasureSpec {
    MeasureSpec {
        measure_type: MeasureType::Sum,
        sql: Some(sql.to_string()),
        measure_ref: None,
        canon_date: None,
        is_merged_result: false,
        cumulative_window_days: None,
    }
}

fn cumulative(measure_ref: &str, window_days: Option<u32>) -> MeasureSpec {
    MeasureSpec {
        measure_type: MeasureType::Cumulative,
        sql: None,
        measure_ref: Some(measure_ref.to_string()),
        canon_date: None,
        is_merged_result: false,
        cumulative_window_days: window_days,
    }
}

/// A single `orders` view with a `revenue` sum measure, a `cumulative_revenue`
/// measure wrapping it (unbounded), and a `trailing_7d_revenue` measure
/// wrapping it with a 7-day trailing window. No other view, so no fan-out.
fn orders_project() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.default_date = Some("order_date".to_string());
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dimension("order_id", "orders", "${TABLE}.id"));
    orders.fields.insert(
        "order_date".into(),
        Field {
            name: "order_date".into(),
            view: "orders".into(),
            field_type: FieldType::DimensionGroup {
                kind: DimensionGroupKind::Time(TimeDimensionGroup {
                    sql: "${TABLE}.created_at".into(),
                    timeframes: vec![Timeframe::Raw, Timeframe::Date],
                    datatype: TimeDatatype::Timestamp,
                    convert_timezone: false,
                }),
            },
            required_access_grants: vec![],
        },
    );
    orders.fields.insert("revenue".into(), measure("revenue", "orders", plain_sum("${TABLE}.revenue")));
    orders
        .fields
        .insert("cumulative_revenue".into(), measure("cumulative_revenue", "orders", cumulative("revenue", None)));
    orders.fields.insert(
        "trailing_7d_revenue".into(),
        measure("trailing_7d_revenue", "orders", cumulative("revenue", Some(7))),
    );
    orders.fields.insert(
        "double_cumulative".into(),
        measure("double_cumulative", "orders", cumulative("cumulative_revenue", None)),
    );
    orders.fields.insert(
        "cumulative_revenue_per_order".into(),
        measure(
            "cumulative_revenue_per_order",
            "orders",
            MeasureSpec {
                measure_type: MeasureType::Number,
                sql: Some("${cumulative_revenue} / NULLIF(${order_count}, 0)".into()),
                measure_ref: None,
                canon_date: None,
                is_merged_result: false,
                cumulative_window_days: None,
            },
        ),
    );
    orders.fields.insert(
        "order_count".into(),
        measure(
            "order_count",
            "orders",
            MeasureSpec {
                measure_type: MeasureType::Count,
                sql: None,
                measure_ref: None,
                canon_date: None,
                is_merged_result: false,
                cumulative_window_days: None,
            },
        ),
    );

    ProjectBuilder::new().view(orders).build()
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
}

#[test]
fn an_unbounded_cumulative_metric_builds_a_date_spine_pipeline() {
    let project = orders_project();
    let request = Request::new(vec!["orders.cumulative_revenue".to_string()], QueryType::Snowflake, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("date_spine AS ("));
    assert!(sql.contains("GENERATOR(rowcount =>"));
    assert!(sql.contains("subquery_orders_cumulative_revenue AS ("));
    assert!(sql.contains("aggregated_orders_cumulative_revenue AS ("));
    assert!(sql.contains("<= date_spine.date"));
}

#[test]
fn a_windowed_cumulative_metric_bounds_the_join_to_a_trailing_interval() {
    let project = orders_project();
    let request = Request::new(vec!["orders.trailing_7d_revenue".to_string()], QueryType::Snowflake, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("BETWEEN date_spine.date - INTERVAL '6 day' AND date_spine.date"));
}

#[test]
fn a_cumulative_metric_alongside_a_plain_metric_adds_a_base_cte_and_joins_on_it() {
    let project = orders_project();
    let request = Request::new(
        vec!["orders.cumulative_revenue".to_string(), "orders.revenue".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("base AS ("));
    assert!(sql.contains("aggregated_orders_cumulative_revenue"));
}

#[test]
fn cumulative_metrics_are_not_implemented_on_druid() {
    let project = orders_project();
    let request = Request::new(vec!["orders.cumulative_revenue".to_string()], QueryType::Druid, reference_date());

    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::NotImplemented(_)));
}

#[test]
fn a_number_metric_wrapping_a_cumulative_measure_is_routed_to_the_cumulative_generator() {
    let project = orders_project();
    let request = Request::new(
        vec!["orders.cumulative_revenue_per_order".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );

    let sql = compile(&project, &request).unwrap();
    // Routed through the cumulative planner, not silently resolved as a
    // plain aggregate by the single generator.
    assert!(sql.contains("date_spine AS ("));
    assert!(sql.contains("aggregated_orders_cumulative_revenue"));
    assert!(sql.contains("base AS ("));
    assert!(sql.contains("NULLIF(base.orders_order_count, 0)"));
    assert!(sql.contains("AS orders_cumulative_revenue_per_order"));
}

#[test]
fn a_cumulative_measure_cannot_reference_another_cumulative_measure() {
    let project = orders_project();
    let request = Request::new(vec!["orders.double_cumulative".to_string()], QueryType::Snowflake, reference_date());

    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::NotImplemented(_)));
}

#[test]
fn a_cumulative_measure_with_no_canon_date_anywhere_is_a_query_error() {
    let mut sessions = View::new("sessions", ViewSource::Table("analytics.sessions".into()));
    sessions.identifiers.push(Identifier::primary("session_id"));
    sessions
        .fields
        .insert("session_id".into(), dimension("session_id", "sessions", "${TABLE}.id"));
    sessions
        .fields
        .insert("hits".into(), measure("hits", "sessions", plain_sum("${TABLE}.hits")));
    sessions
        .fields
        .insert("cumulative_hits".into(), measure("cumulative_hits", "sessions", cumulative("hits", None)));
    let project = ProjectBuilder::new().view(sessions).build();

    let request = Request::new(vec!["sessions.cumulative_hits".to_string()], QueryType::Snowflake, reference_date());
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}
