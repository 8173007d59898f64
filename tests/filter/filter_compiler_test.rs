use chrono::NaiveDate;

use semantic_sql::model::field::{DimensionType, Field, FieldType, MeasureSpec, MeasureType};
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::{Project, ProjectBuilder};
use semantic_sql::sql::dialect::Dialect;

use semantic_sql::filter::{FilterCompiler, FilterExpr, FilterOperator, FilterValue, LogicalOperator};

fn project() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
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
    ProjectBuilder::new().view(orders).build()
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
}

#[test]
fn a_dimension_leaf_routes_to_where() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Leaf {
        field: "orders.channel".into(),
        expression: FilterOperator::EqualTo,
        value: FilterValue::String("web".into()),
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    assert!(compiled.having_conditions.is_empty());
    assert_eq!(compiled.where_conditions.len(), 1);
}

#[test]
fn a_measure_leaf_routes_to_having() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Leaf {
        field: "orders.total_revenue".into(),
        expression: FilterOperator::GreaterThan,
        value: FilterValue::Number(1000.0),
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    assert!(compiled.where_conditions.is_empty());
    assert_eq!(compiled.having_conditions.len(), 1);
}

#[test]
fn a_mixed_group_routes_entirely_to_having_when_any_leaf_is_a_measure() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Group {
        logical_operator: LogicalOperator::And,
        conditions: vec![
            FilterExpr::Leaf {
                field: "orders.channel".into(),
                expression: FilterOperator::EqualTo,
                value: FilterValue::String("web".into()),
            },
            FilterExpr::Leaf {
                field: "orders.total_revenue".into(),
                expression: FilterOperator::GreaterThan,
                value: FilterValue::Number(1000.0),
            },
        ],
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    assert!(compiled.where_conditions.is_empty());
    assert_eq!(compiled.having_conditions.len(), 1);
}

#[test]
fn an_and_group_combines_with_parens_and_and() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Group {
        logical_operator: LogicalOperator::And,
        conditions: vec![
            FilterExpr::Leaf {
                field: "orders.channel".into(),
                expression: FilterOperator::EqualTo,
                value: FilterValue::String("web".into()),
            },
            FilterExpr::Leaf {
                field: "orders.channel".into(),
                expression: FilterOperator::NotEqualTo,
                value: FilterValue::String("spam".into()),
            },
        ],
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    let sql = compiled.where_expr().unwrap().to_tokens_for_dialect(Dialect::Snowflake).serialize(Dialect::Snowflake);
    assert!(sql.contains("AND"));
    assert!(sql.starts_with('('));
}

#[test]
fn an_or_group_combines_with_or() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Group {
        logical_operator: LogicalOperator::Or,
        conditions: vec![
            FilterExpr::Leaf {
                field: "orders.channel".into(),
                expression: FilterOperator::EqualTo,
                value: FilterValue::String("web".into()),
            },
            FilterExpr::Leaf {
                field: "orders.channel".into(),
                expression: FilterOperator::EqualTo,
                value: FilterValue::String("app".into()),
            },
        ],
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    let sql = compiled.where_expr().unwrap().to_tokens_for_dialect(Dialect::Snowflake).serialize(Dialect::Snowflake);
    assert!(sql.contains("OR"));
}

#[test]
fn funnel_only_operators_are_not_implemented() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Leaf {
        field: "orders.channel".into(),
        expression: FilterOperator::Converted,
        value: FilterValue::Bool(true),
    }];
    let err = compiler.compile(&exprs, "orders").unwrap_err();
    assert!(matches!(err, semantic_sql::CompileError::NotImplemented(_)));
}

#[test]
fn matches_expands_to_a_between_style_range() {
    let project = project();
    let mut orders_with_date = project.clone();
    {
        let view = orders_with_date.views.get_mut("orders").unwrap();
        view.fields.insert(
            "order_date".into(),
            Field {
                name: "order_date".into(),
                view: "orders".into(),
                field_type: FieldType::Dimension {
                    sql: "${TABLE}.created_at".into(),
                    dimension_type: DimensionType::Number,
                },
                required_access_grants: vec![],
            },
        );
    }
    let mut compiler = FilterCompiler::new(&orders_with_date, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Leaf {
        field: "orders.order_date".into(),
        expression: FilterOperator::Matches,
        value: FilterValue::String("last year".into()),
    }];
    let compiled = compiler.compile(&exprs, "orders").unwrap();
    let sql = compiled.where_expr().unwrap().to_tokens_for_dialect(Dialect::Snowflake).serialize(Dialect::Snowflake);
    assert!(sql.contains("2025-01-01T00:00:00"));
    assert!(sql.contains("2025-12-31T23:59:59"));
}

#[test]
fn an_unknown_field_is_access_denied() {
    let project = project();
    let mut compiler = FilterCompiler::new(&project, Dialect::Snowflake, reference_date());
    let exprs = vec![FilterExpr::Leaf {
        field: "orders.nonexistent".into(),
        expression: FilterOperator::EqualTo,
        value: FilterValue::String("x".into()),
    }];
    let err = compiler.compile(&exprs, "orders").unwrap_err();
    assert!(matches!(err, semantic_sql::CompileError::AccessDenied(_)));
}
