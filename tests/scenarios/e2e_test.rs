use chrono::NaiveDate;

use semantic_sql::filter::{FilterExpr, FilterOperator, FilterValue, LogicalOperator};
use semantic_sql::model::field::{
    DimensionGroupKind, DimensionType, Field, FieldType, MeasureSpec, MeasureType, TimeDatatype,
    TimeDimensionGroup, Timeframe,
};
use semantic_sql::model::identifier::Identifier;
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::{Project, ProjectBuilder};
use semantic_sql::request::{FilterInput, OrderBy, QueryType, Request};
use semantic_sql::compile;

/// `orders` (base, fans out to `line_items`) carrying a string dimension for
/// WHERE filters, a time dimension_group for `matches`, and measures on both
/// sides of the join so a full scenario exercises symmetric-aggregate
/// wrapping alongside filters, grouping, ordering and limiting together.
fn orders_with_line_items() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.default_date = Some("order_date".to_string());
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
        "status".into(),
        Field {
            name: "status".into(),
            view: "orders".into(),
            field_type: FieldType::Dimension {
                sql: "${TABLE}.status".into(),
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

fn eq_status(status: &str) -> FilterExpr {
    FilterExpr::Leaf {
        field: "orders.status".to_string(),
        expression: FilterOperator::EqualTo,
        value: FilterValue::String(status.to_string()),
    }
}

#[test]
fn a_where_filter_and_a_having_filter_land_in_their_own_clauses_on_snowflake() {
    let project = orders_with_line_items();
    let mut request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());
    request.dimensions = vec!["orders.channel".to_string()];
    request.where_ = FilterInput::Structured(vec![eq_status("completed")]);
    request.having = FilterInput::Structured(vec![FilterExpr::Leaf {
        field: "orders.total_revenue".to_string(),
        expression: FilterOperator::GreaterThan,
        value: FilterValue::Number(1000.0),
    }]);
    request.order_by = vec![OrderBy::desc("orders.total_revenue")];
    request.limit = Some(5);

    let sql = compile(&project, &request).unwrap();
    let where_idx = sql.find("WHERE").expect("a WHERE clause is present");
    let having_idx = sql.find("HAVING").expect("a HAVING clause is present");
    let group_idx = sql.find("GROUP BY").expect("a GROUP BY clause is present");
    assert!(where_idx < group_idx && group_idx < having_idx, "clauses are ordered WHERE, GROUP BY, HAVING");
    assert!(sql.contains("= 'completed'"));
    assert!(sql.contains("> 1000"));
    assert!(sql.contains("ORDER BY"));
    assert!(sql.contains("DESC"));
    assert!(sql.contains("LIMIT 5"));
    assert!(sql.ends_with(';'));
}

#[test]
fn a_fan_out_measure_on_bigquery_uses_farm_fingerprint_for_the_symmetric_hash() {
    let project = orders_with_line_items();
    let mut request = Request::new(
        vec!["orders.total_revenue".to_string(), "line_items.item_count".to_string()],
        QueryType::BigQuery,
        reference_date(),
    );
    request.dimensions = vec!["orders.channel".to_string()];

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("FARM_FINGERPRINT("));
    assert!(sql.ends_with(';'));
}

#[test]
fn an_or_group_filter_combines_its_leaves_with_or() {
    let project = orders_with_line_items();
    let mut request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());
    request.where_ = FilterInput::Structured(vec![FilterExpr::Group {
        logical_operator: LogicalOperator::Or,
        conditions: vec![eq_status("completed"), eq_status("refunded")],
    }]);

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("= 'completed'"));
    assert!(sql.contains("= 'refunded'"));
    assert!(sql.contains(" OR "));
}

#[test]
fn a_matches_filter_resolves_a_natural_language_phrase_into_a_literal_datetime_range() {
    let project = orders_with_line_items();
    let mut request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());
    request.where_ = FilterInput::Structured(vec![FilterExpr::Leaf {
        field: "orders.order_date".to_string(),
        expression: FilterOperator::Matches,
        value: FilterValue::String("last week".to_string()),
    }]);

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("'2026-07-20T00:00:00'"));
    assert!(sql.contains("'2026-07-26T23:59:59'"));
}

#[test]
fn a_malformed_matches_phrase_is_a_parse_error() {
    let project = orders_with_line_items();
    let mut request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());
    request.where_ = FilterInput::Structured(vec![FilterExpr::Leaf {
        field: "orders.order_date".to_string(),
        expression: FilterOperator::Matches,
        value: FilterValue::String("fortnight before last".to_string()),
    }]);

    let err = compile(&project, &request).unwrap_err();
    assert!(matches!(err, semantic_sql::CompileError::Parse(_)));
}

#[test]
fn druid_never_gets_a_default_order_by_or_a_trailing_semicolon() {
    let project = orders_with_line_items();
    let request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Druid, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(!sql.contains("ORDER BY"));
    assert!(!sql.trim_end().ends_with(';'));
}

#[test]
fn snowflake_gets_a_default_order_by_desc_on_the_sole_metric_when_none_is_requested() {
    let project = orders_with_line_items();
    let request = Request::new(vec!["orders.total_revenue".to_string()], QueryType::Snowflake, reference_date());

    let sql = compile(&project, &request).unwrap();
    assert!(sql.contains("ORDER BY"));
    assert!(sql.contains("DESC"));
}
