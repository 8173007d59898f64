use semantic_sql::model::field::{DimensionType, Field, FieldType};
use semantic_sql::model::identifier::{Identifier, JoinType, Relationship};
use semantic_sql::model::view::{View, ViewSource};
use semantic_sql::model::{Project, ProjectBuilder};
use semantic_sql::sql::dialect::Dialect;

use semantic_sql::join_graph::{connected_component, join_graph_hash, JoinGraph};

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

/// orders (1) -> (many) line_items, via a shared `order_id` identifier, plus
/// a disconnected `sessions` view with no identifiers in common.
fn three_view_project() -> Project {
    let mut orders = View::new("orders", ViewSource::Table("analytics.orders".into()));
    orders.identifiers.push(Identifier::primary("order_id"));
    orders.fields.insert("order_id".into(), dim("orders", "order_id"));

    let mut line_items = View::new("line_items", ViewSource::Table("analytics.line_items".into()));
    line_items.identifiers.push(Identifier::foreign("order_id"));
    line_items.fields.insert("order_id".into(), dim("line_items", "order_id"));

    let sessions = View::new("sessions", ViewSource::Table("analytics.sessions".into()));

    ProjectBuilder::new()
        .view(orders)
        .view(line_items)
        .view(sessions)
        .build()
}

#[test]
fn foreign_to_primary_identifier_match_produces_an_edge() {
    let project = three_view_project();
    let graph = JoinGraph::build(&project).unwrap();
    assert!(graph.edge_between("orders", "line_items").is_some());
}

#[test]
fn views_with_no_shared_identifier_are_not_connected() {
    let project = three_view_project();
    let graph = JoinGraph::build(&project).unwrap();
    let component = connected_component(&graph, "orders");
    assert!(component.contains("orders"));
    assert!(component.contains("line_items"));
    assert!(!component.contains("sessions"));
}

#[test]
fn join_graph_hash_is_order_independent() {
    let project = three_view_project();
    let graph = JoinGraph::build(&project).unwrap();
    let from_orders = connected_component(&graph, "orders");
    let from_line_items = connected_component(&graph, "line_items");
    assert_eq!(join_graph_hash(&from_orders), join_graph_hash(&from_line_items));

    let sessions_component = connected_component(&graph, "sessions");
    assert_ne!(join_graph_hash(&from_orders), join_graph_hash(&sessions_component));
}

#[test]
fn neighbors_are_ordered_by_identifier_name() {
    let mut base = View::new("base", ViewSource::Table("t_base".into()));
    base.identifiers.push(Identifier::primary("zeta_id"));
    base.identifiers.push(Identifier::primary("alpha_id"));
    base.fields.insert("zeta_id".into(), dim("base", "zeta_id"));
    base.fields.insert("alpha_id".into(), dim("base", "alpha_id"));

    let mut zeta = View::new("zeta", ViewSource::Table("t_zeta".into()));
    zeta.identifiers.push(Identifier::foreign("zeta_id"));
    zeta.fields.insert("zeta_id".into(), dim("zeta", "zeta_id"));

    let mut alpha = View::new("alpha", ViewSource::Table("t_alpha".into()));
    alpha.identifiers.push(Identifier::foreign("alpha_id"));
    alpha.fields.insert("alpha_id".into(), dim("alpha", "alpha_id"));

    let project = ProjectBuilder::new().view(base).view(zeta).view(alpha).build();
    let graph = JoinGraph::build(&project).unwrap();
    let neighbors = graph.neighbors("base");
    let names: Vec<&str> = neighbors.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[test]
fn join_typed_identifier_to_an_unknown_view_is_a_join_error() {
    let mut view = View::new("orders", ViewSource::Table("analytics.orders".into()));
    view.identifiers.push(Identifier::custom_join(
        "fx",
        "currencies",
        "${TABLE}.ccy = currencies.code",
        JoinType::Inner,
        Relationship::ManyToOne,
    ));
    let project = ProjectBuilder::new().view(view).build();
    let err = JoinGraph::build(&project).unwrap_err();
    assert!(matches!(err, semantic_sql::CompileError::Join(_)));
}

#[test]
fn dialect_is_usable_alongside_join_graph_construction() {
    // sanity check the dialect enum is reachable from this test binary too.
    let _ = Dialect::Snowflake;
    let project = three_view_project();
    assert!(JoinGraph::build(&project).is_ok());
}
