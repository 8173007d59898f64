use chrono::NaiveDate;

use semantic_sql::model::field::{
    DimensionGroupKind, DimensionType, Field, FieldType, MeasureSpec, MeasureType, TimeDatatype,
    TimeDimensionGroup, Timeframe,
};
use semantic_sql::model::identifier::Identifier;
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::ProjectBuilder;
use semantic_sql::request::{FilterInput, OrderBy, QueryType, Request};
use semantic_sql::{compile, CompileError};

fn orders_with_line_items() -> semantic_sql::model::Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert(
        "order_id".into(),
        Field {
            name: "order_id".into(),
            view: "orders".into(),
            field_type: FieldType::Dimension {
                sql: "${TABLE}.id".into(),
                dimension_type: DimensionType::Number,
            },
            required_access_grants: vec![],
        },
    );
    orders.fields.insert(
        "channel".into(),
        Field {
            name: "channel".into(),
            view: "orders".into(),
            field_type: FieldType::Dimension {
                sql: "${TABLE}.sales_channel".into(),
                dimension_type: DimensionType::String,
            },
            required_access_grants: vec![],
        },
    );
    orders.fields.insert(
        "order_date".into(),
        Field {
            name: "order_date".into(),
            view: "orders".into(),
            field_type: FieldType::DimensionGroup {
                kind: DimensionGroupKind::Time(TimeDimensionGroup {
                    sql: "${TABLE}.created_at".into(),
                    timeframes: vec![Timeframe::Raw, Timeframe::Date, Timeframe::Month],
                    datatype: TimeDatatype::Timestamp,
                    convert_timezone: false,
                }),
            },
            required_access_grants: vec![],
        },
    );
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

    let mut line_items = View::new("line_items", ViewSource::Table("analytics.line_items".into()));
    line_items.identifiers.push(Identifier::primary("line_item_id"));
    line_items.identifiers.push(Identifier::foreign("order_id"));
    line_items.fields.insert(
        "line_item_id".into(),
        Field {
            name: "line_item_id".into(),
            view: "line_items".into(),
            field_type: FieldType::Dimension {
                sql: "${TABLE}.id".into(),
                dimension_type: DimensionType::Number,
            },
            required_access_grants: vec![],
        },
    );
    line_items.fields.insert(
        "order_id".into(),
        Field {
            name: "order_id".into(),
            view: "line_items".into(),
            field_type: FieldType::Dimension {
                sql: "${TABLE}.order_id".into(),
                dimension_type: DimensionType::Number,
            },
            required_access_grants: vec![],
        },
    );
    line_items.fields.insert(
        "item_count".into(),
        Field {
            name: "item_count".into(),
            view: "line_items".into(),
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

    ProjectBuilder::new().view(orders).view(line_items).build()
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
}

#[test]
fn a_single_view_metric_and_dimension_compiles_to_a_grouped_select() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("SUM("));
    assert!(sql.contains("GROUP BY"));
    assert!(sql.contains("analytics.orders"));
    assert!(sql.ends_with(';'));
}

#[test]
fn a_measure_homed_on_the_fanned_out_view_is_symmetrically_wrapped() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string(), "line_items.item_count".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];

    let sql = compile(&project, &request).unwrap();
    // orders is the base view and is never itself marked as fanned out, so
    // its own measure stays a plain SUM...
    assert!(sql.contains("SUM(orders.revenue)"));
    // ...while line_items is reached via the one_to_many hop and its COUNT
    // must be deduplicated against its own primary key (§4.1 "Symmetric
    // aggregate").
    assert!(sql.contains("COUNT(DISTINCT"));
    assert!(sql.contains("JOIN"));
}

#[test]
fn a_timeframe_expands_to_a_date_trunc_expression() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.order_date_month".to_string()];

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("DATE_TRUNC('MONTH'"));
}

#[test]
fn order_by_and_limit_are_honored() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];
    request.order_by = vec![OrderBy::desc("orders.total_revenue")];
    request.limit = Some(10);

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("ORDER BY"));
    assert!(sql.contains("DESC"));
    assert!(sql.contains("LIMIT 10"));
}

#[test]
fn druid_output_never_terminates_with_a_semicolon() {
    let project = orders_with_line_items();
    let request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Druid, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(!sql.trim_end().ends_with(';'));
}

#[test]
fn a_literal_where_clause_is_appended_verbatim_with_its_field_references_interpolated() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string()],
        QueryType::Snowflake,
        reference_date(),
    );
    request.where_ = FilterInput::Literal("${orders.channel} = 'web'".to_string());

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("WHERE"));
    assert!(sql.contains("sales_channel"));
}

#[test]
fn requesting_a_field_as_both_metric_and_dimension_is_a_query_error() {
    let project = orders_with_line_items();
    let mut request = Request::new(vec!["orders.channel".to_string()], QueryType::Snowflake, reference_date());
    request.dimensions = vec!["orders.channel".to_string()];

    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, CompileError::Query(_)));
}
