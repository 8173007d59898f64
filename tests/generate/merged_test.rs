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
            dimension_type: DimensionType::String,
        },
        required_access_grants: vec![],
    }
}

fn date_group(name: &str, view: &str, sql: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::DimensionGroup {
            kind: DimensionGroupKind::Time(TimeDimensionGroup {
                sql: sql.to_string(),
                timeframes: vec![Timeframe::Raw, Timeframe::Date],
                datatype: TimeDatatype::Timestamp,
                convert_timezone: false,
            }),
        },
        required_access_grants: vec![],
    }
}

/// Two views with no join-graph relationship to each other at all: `orders`
/// and `sessions` are each their own single-node component.
fn orders_and_sessions() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.default_date = Some("order_date".to_string());
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dimension("order_id", "orders", "${TABLE}.id"));
    orders.fields.insert("channel".into(), dimension("channel", "orders", "${TABLE}.sales_channel"));
    orders.fields.insert("order_date".into(), date_group("order_date", "orders", "${TABLE}.created_at"));
    orders.fields.insert(
        "total_revenue".into(),
        Field {
            name: "total_revenue".into(),
            view: "orders".into(),
            field_type: FieldType::Measure(MeasureSpec {
                measure_type: MeasureType::Sum,
                sql: Some("${TABLE}.revenue".into()),
                measure_ref: None,
                canon_date: None,
                is_merged_result: false,
                cumulative_window_days: None,
            }),
            required_access_grants: vec![],
        },
    );
    orders.fields.insert(
        "revenue_per_hit".into(),
        Field {
            name: "revenue_per_hit".into(),
            view: "orders".into(),
            field_type: FieldType::Measure(MeasureSpec {
                measure_type: MeasureType::Number,
                sql: Some("${orders.total_revenue} / NULLIF(${sessions.hits}, 0)".into()),
                measure_ref: None,
                canon_date: None,
                is_merged_result: true,
                cumulative_window_days: None,
            }),
            required_access_grants: vec![],
        },
    );

    let mut sessions = View::new("sessions", ViewSource::Table("analytics.sessions".into()));
    sessions.default_date = Some("session_date".to_string());
    sessions.identifiers.push(Identifier::primary("session_id"));
    sessions
        .fields
        .insert("session_id".into(), dimension("session_id", "sessions", "${TABLE}.id"));
    sessions.fields.insert("channel".into(), dimension("channel", "sessions", "${TABLE}.utm_source"));
    sessions
        .fields
        .insert("session_date".into(), date_group("session_date", "sessions", "${TABLE}.started_at"));
    sessions.fields.insert(
        "hits".into(),
        Field {
            name: "hits".into(),
            view: "sessions".into(),
            field_type: FieldType::Measure(MeasureSpec {
                measure_type: MeasureType::Count,
                sql: None,
                measure_ref: None,
                canon_date: None,
                is_merged_result: false,
                cumulative_window_days: None,
            }),
            required_access_grants: vec![],
        },
    );

    ProjectBuilder::new().view(orders).view(sessions).build()
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
}

#[test]
fn metrics_spanning_two_disjoint_components_bucket_into_separate_ctes() {
    let project = orders_and_sessions();
    let request = Request::new(
        vec!["orders.total_revenue".to_string(), "sessions.hits".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("bucket_0 AS ("));
    assert!(sql.contains("bucket_1 AS ("));
    assert!(sql.contains("INNER JOIN"));
    assert!(sql.ends_with(';'));
}

#[test]
fn a_same_named_dimension_in_both_components_is_paired_on_the_stitch_join() {
    let project = orders_and_sessions();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string(), "sessions.hits".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("bucket_0.orders_channel = bucket_1.sessions_channel"));
}

#[test]
fn an_author_defined_merged_metric_is_decomposed_into_its_referenced_buckets() {
    let project = orders_and_sessions();
    let request = Request::new(vec!["orders.revenue_per_hit".to_string()], QueryType::Snowflake, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("bucket_0 AS ("));
    assert!(sql.contains("bucket_1 AS ("));
    assert!(sql.contains("NULLIF("));
    assert!(sql.contains("AS orders_revenue_per_hit"));
}

#[test]
fn a_request_fitting_a_single_component_never_reaches_the_merged_planner_error() {
    let project = orders_and_sessions();
    let request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());

    // A single-component request routes to the single-query generator, so it
    // must never trip the merged planner's "fits a single join component"
    // guard.
    let sql = compile(&project, &request).unwrap();
    assert!(!sql.contains("bucket_0"));
}

#[test]
fn a_dimension_with_no_equivalent_in_the_other_bucket_is_a_join_error() {
    let mut project = orders_and_sessions();
    // Remove the shared "channel" field from sessions so the lookup can't
    // fall back to a same-named field across the bucket's component.
    if let Some(sessions) = project.views.get_mut("sessions") {
        sessions.fields.remove("channel");
    }
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string(), "sessions.hits".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];

    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Join(_)));
}
