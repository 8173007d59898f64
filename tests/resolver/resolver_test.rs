use chrono::NaiveDate;

use semantic_sql::model::field::{DimensionType, Field, FieldType, MeasureSpec, MeasureType};
use semantic_sql::model::identifier::Identifier;
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::{Project, ProjectBuilder};
use semantic_sql::request::{QueryType, Request};
use semantic_sql::{compile, CompileError};

fn dimension(name: &str, view: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Dimension {
            sql: "${TABLE}.x".to_string(),
            dimension_type: DimensionType::String,
        },
        required_access_grants: vec![],
    }
}

fn sum_measure(name: &str, view: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Measure(MeasureSpec {
            measure_type: MeasureType::Sum,
            sql: Some("${TABLE}.amount".to_string()),
            measure_ref: None,
            canon_date: None,
            is_merged_result: false,
            cumulative_window_days: None,
        }),
        required_access_grants: vec![],
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
}

/// A single `orders` view with an unambiguous `revenue` metric and a
/// `channel` dimension.
fn single_view_project() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dimension("order_id", "orders"));
    orders.fields.insert("channel".into(), dimension("channel", "orders"));
    orders.fields.insert("revenue".into(), sum_measure("revenue", "orders"));
    ProjectBuilder::new().view(orders).build()
}

#[test]
fn a_request_with_no_metrics_or_dimensions_is_a_query_error() {
    let project = single_view_project();
    let request = Request::new(vec![], QueryType::Snowflake, reference_date());
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}

#[test]
fn the_same_field_id_requested_as_both_metric_and_dimension_is_rejected_before_resolution() {
    let project = single_view_project();
    // "channel" is a dimension, not a metric, so if the duplicate check did
    // not run first this would instead fail resolution with a different
    // error; assert the duplicate check wins.
    let mut request = Request::new(vec!["orders.channel".to_string()], QueryType::Snowflake, reference_date());
    request.dimensions = vec!["orders.channel".to_string()];
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}

#[test]
fn an_unknown_field_reference_is_access_denied() {
    let project = single_view_project();
    let request = Request::new(vec!["orders.nonexistent".to_string()], QueryType::Snowflake, reference_date());
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::AccessDenied(_)));
}

#[test]
fn a_metric_requested_as_a_dimension_is_a_query_error() {
    let project = single_view_project();
    let request = Request {
        dimensions: vec!["orders.revenue".to_string()],
        ..Request::new(vec![], QueryType::Snowflake, reference_date())
    };
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}

#[test]
fn a_bare_field_name_ambiguous_across_two_views_is_a_query_error() {
    let mut a = View::new("a", ViewSource::Table("t_a".into()));
    a.fields.insert("status".into(), dimension("status", "a"));
    let mut b = View::new("b", ViewSource::Table("t_b".into()));
    b.fields.insert("status".into(), dimension("status", "b"));
    let project = ProjectBuilder::new().view(a).view(b).build();

    let request = Request {
        dimensions: vec!["status".to_string()],
        ..Request::new(vec![], QueryType::Snowflake, reference_date())
    };
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}

#[test]
fn a_bare_field_name_unambiguous_across_the_project_resolves() {
    let mut a = View::new("a", ViewSource::Table("t_a".into()));
    a.fields.insert("status".into(), dimension("status", "a"));
    let mut b = View::new("b", ViewSource::Table("t_b".into()));
    b.fields.insert("region".into(), dimension("region", "b"));
    let project = ProjectBuilder::new().view(a).view(b).build();

    let request = Request {
        dimensions: vec!["status".to_string()],
        ..Request::new(vec![], QueryType::Snowflake, reference_date())
    };
    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("t_a"));
}

#[test]
fn cumulative_metrics_cannot_be_combined_with_a_request_spanning_multiple_components() {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.default_date = Some("order_date".to_string());
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dimension("order_id", "orders"));
    orders.fields.insert("revenue".into(), sum_measure("revenue", "orders"));
    orders.fields.insert(
        "cumulative_revenue".into(),
        Field {
            name: "cumulative_revenue".into(),
            view: "orders".into(),
            field_type: FieldType::Measure(MeasureSpec {
                measure_type: MeasureType::Cumulative,
                sql: None,
                measure_ref: Some("revenue".to_string()),
                canon_date: None,
                is_merged_result: false,
                cumulative_window_days: None,
            }),
            required_access_grants: vec![],
        },
    );

    let mut sessions = View::new("sessions", ViewSource::Table("analytics.sessions".into()));
    sessions.identifiers.push(Identifier::primary("session_id"));
    sessions.fields.insert("session_id".into(), dimension("session_id", "sessions"));
    sessions.fields.insert("hits".into(), sum_measure("hits", "sessions"));

    let project = ProjectBuilder::new().view(orders).view(sessions).build();
    let request = Request::new(
        vec!["orders.cumulative_revenue".to_string(), "sessions.hits".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::NotImplemented(_)));
}

#[test]
fn a_request_referencing_a_view_not_in_the_project_is_access_denied() {
    let project = single_view_project();
    let request = Request::new(vec!["ghost.revenue".to_string()], QueryType::Snowflake, reference_date());
    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::AccessDenied(_)));
}
