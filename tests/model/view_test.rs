use semantic_sql::model::field::{DimensionType, Field, FieldType};
use semantic_sql::model::identifier::{Identifier, JoinType, Relationship};
use semantic_sql::model::view::{View, ViewSource};

fn dimension_field(view: &str, name: &str) -> Field {
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

#[test]
fn table_expr_uses_sql_table_name_for_table_sources() {
    let view = View::new("orders", ViewSource::Table("analytics.orders".to_string()));
    assert_eq!(view.table_expr(), "analytics.orders");
}

#[test]
fn table_expr_uses_the_inline_sql_for_derived_tables() {
    let view = View::new(
        "recent_orders",
        ViewSource::DerivedTable("SELECT * FROM analytics.orders WHERE created_at > '2020-01-01'".to_string()),
    );
    assert!(view.table_expr().starts_with("SELECT"));
}

#[test]
fn primary_identifier_and_primary_key_field_are_found() {
    let mut view = View::new("orders", ViewSource::Table("analytics.orders".to_string()));
    view.identifiers.push(Identifier::primary("order_id"));
    view.fields.insert("order_id".to_string(), dimension_field("orders", "order_id"));

    assert!(view.primary_identifier().is_some());
    assert_eq!(view.primary_key_field().unwrap().name, "order_id");
}

#[test]
fn a_view_with_no_primary_identifier_has_no_primary_key_field() {
    let mut view = View::new("line_items", ViewSource::Table("analytics.line_items".to_string()));
    view.identifiers.push(Identifier::foreign("order_id"));
    assert!(view.primary_identifier().is_none());
    assert!(view.primary_key_field().is_none());
}

#[test]
fn field_names_sorted_is_deterministic() {
    let mut view = View::new("orders", ViewSource::Table("analytics.orders".to_string()));
    view.fields.insert("zeta".to_string(), dimension_field("orders", "zeta"));
    view.fields.insert("alpha".to_string(), dimension_field("orders", "alpha"));
    view.fields.insert("mu".to_string(), dimension_field("orders", "mu"));

    assert_eq!(view.field_names_sorted(), vec!["alpha", "mu", "zeta"]);
}

#[test]
fn week_start_day_override_defaults_to_none() {
    let view = View::new("orders", ViewSource::Table("analytics.orders".to_string()));
    assert!(view.week_start_day.is_none());
}

#[test]
fn custom_join_identifier_carries_its_relationship_and_join_type() {
    let id = Identifier::custom_join(
        "fx_rate",
        "currencies",
        "${TABLE}.currency = currencies.code",
        JoinType::Inner,
        Relationship::ManyToOne,
    );
    match id.kind {
        semantic_sql::model::identifier::IdentifierKind::Join {
            reference,
            join_type,
            relationship,
            ..
        } => {
            assert_eq!(reference, "currencies");
            assert_eq!(join_type, JoinType::Inner);
            assert_eq!(relationship, Relationship::ManyToOne);
        }
        _ => panic!("expected a join identifier"),
    }
}
