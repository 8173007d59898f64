use std::collections::HashSet;

use semantic_sql::model::field::{DimensionType, Field, FieldType, MeasureSpec, MeasureType};
use semantic_sql::model::identifier::Identifier;
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::ProjectBuilder;

use semantic_sql::design::{DesignResolver, FunctionalPk};

fn dim(view: &str, name: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Dimension {
            sql: format!("${{TABLE}}.{name}"),
            dimension_type: DimensionType::Number,
        },
        required_access_grants: vec![],
    }
}

fn sum_measure(view: &str, name: &str, sql: &str) -> Field {
    Field {
        name: name.to_string(),
        view: view.to_string(),
        field_type: FieldType::Measure(MeasureSpec {
            measure_type: MeasureType::Sum,
            sql: Some(sql.to_string()),
            measure_ref: None,
            canon_date: None,
            is_merged_result: false,
            cumulative_window_days: None,
        }),
        required_access_grants: vec![],
    }
}

fn fan_out_project() -> semantic_sql::model::Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dim("orders", "order_id"));
    orders.fields.insert("total_revenue".into(), sum_measure("orders", "total_revenue", "${TABLE}.revenue"));

    let mut line_items = View::new("line_items", ViewSource::Table("analytics.line_items".into()));
    line_items.identifiers.push(Identifier::foreign("order_id"));
    line_items.fields.insert("order_id".into(), dim("line_items", "order_id"));
    line_items.fields.insert("item_total".into(), sum_measure("line_items", "item_total", "${TABLE}.price"));

    let sessions = View::new("sessions", ViewSource::Table("analytics.sessions".into()));

    ProjectBuilder::new().view(orders).view(line_items).view(sessions).build()
}

#[test]
fn no_fan_out_keeps_the_base_primary_key() {
    let project = fan_out_project();
    let mut required = HashSet::new();
    required.insert("orders".to_string());

    let design = DesignResolver::resolve(
        &project,
        &["orders".to_string()],
        &[],
        &required,
        &[],
        false,
    )
    .unwrap();

    assert_eq!(design.base_view, "orders");
    assert_eq!(design.functional_pk, FunctionalPk::BasePrimaryKey);
    assert!(design.fan_out_views.is_empty());
}

#[test]
fn a_one_to_many_hop_produces_a_synthetic_functional_pk_and_marks_fan_out() {
    let project = fan_out_project();
    let mut required = HashSet::new();
    required.insert("orders".to_string());
    required.insert("line_items".to_string());

    let design = DesignResolver::resolve(
        &project,
        &["orders".to_string(), "line_items".to_string()],
        &[],
        &required,
        &[],
        false,
    )
    .unwrap();

    assert_eq!(design.functional_pk, FunctionalPk::Synthetic);
    assert!(design.fan_out_views.contains("line_items"));
    assert_eq!(design.joins.len(), 1);
    assert_eq!(design.joins[0].view, "line_items");
}

#[test]
fn no_group_by_when_the_base_primary_key_is_the_only_selected_dimension() {
    let project = fan_out_project();
    let mut required = HashSet::new();
    required.insert("orders".to_string());

    let design = DesignResolver::resolve(
        &project,
        &["orders".to_string()],
        &["orders".to_string()],
        &required,
        &["orders.order_id".to_string()],
        false,
    )
    .unwrap();

    assert!(design.no_group_by);
}

#[test]
fn force_group_by_overrides_no_group_by() {
    let project = fan_out_project();
    let mut required = HashSet::new();
    required.insert("orders".to_string());

    let design = DesignResolver::resolve(
        &project,
        &["orders".to_string()],
        &["orders".to_string()],
        &required,
        &["orders.order_id".to_string()],
        true,
    )
    .unwrap();

    assert!(!design.no_group_by);
}

#[test]
fn a_view_outside_the_base_components_connected_component_is_a_join_error() {
    let project = fan_out_project();
    let mut required = HashSet::new();
    required.insert("orders".to_string());
    required.insert("sessions".to_string());

    let err = DesignResolver::resolve(
        &project,
        &["orders".to_string()],
        &[],
        &required,
        &[],
        false,
    )
    .unwrap_err();

    assert!(matches!(err, semantic_sql::CompileError::Join(_)));
}

#[test]
fn an_unknown_base_view_is_access_denied() {
    let project = fan_out_project();
    let required = HashSet::new();

    let err = DesignResolver::resolve(
        &project,
        &["nonexistent".to_string()],
        &[],
        &required,
        &[],
        false,
    )
    .unwrap_err();

    assert!(matches!(err, semantic_sql::CompileError::AccessDenied(_)));
}
