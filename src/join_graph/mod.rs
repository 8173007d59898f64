//! The join graph: an undirected graph over views, built from declared
//! identifiers (§4.2). Implemented with `petgraph::graph::UnGraph`,
//! mirroring the teacher's `ModelGraph` (`src/semantic/model_graph/mod.rs`)
//! adapted from a directed dependency graph to an undirected joinability
//! graph, since this compiler only needs to know which views *can* be
//! joined, not a build order.

pub mod component;
pub mod relationship;

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

pub use component::{connected_component, join_graph_hash};
pub use relationship::JoinEdge;

use crate::error::{CompileError, CompileResult};
use crate::model::identifier::IdentifierKind;
use crate::model::Project;

#[derive(Debug, Clone)]
pub struct JoinGraph {
    pub graph: UnGraph<String, JoinEdge>,
    pub index: HashMap<String, NodeIndex>,
}

impl JoinGraph {
    /// Build the join graph from every view's declared identifiers:
    /// `foreign`-typed identifiers join to the view declaring a `primary`
    /// identifier of the same name; `join`-typed identifiers join explicitly
    /// to their declared `reference` view (§4.2, §3 Identifier).
    pub fn build(project: &Project) -> CompileResult<Self> {
        let mut graph = UnGraph::new_undirected();
        let mut index = HashMap::new();

        for name in project.view_names_sorted() {
            index.insert(name.to_string(), graph.add_node(name.to_string()));
        }

        let primary_owner: HashMap<&str, &str> = project
            .views
            .values()
            .filter_map(|v| v.primary_identifier().map(|id| (id.name.as_str(), v.name.as_str())))
            .collect();

        for view_name in project.view_names_sorted() {
            let view = project.view(view_name).unwrap();
            for identifier in &view.identifiers {
                match &identifier.kind {
                    IdentifierKind::Foreign => {
                        if let Some(&owner) = primary_owner.get(identifier.name.as_str()) {
                            if owner != view_name {
                                add_edge(
                                    &mut graph,
                                    &index,
                                    JoinEdge {
                                        from: view_name.to_string(),
                                        to: owner.to_string(),
                                        identifier_name: identifier.name.clone(),
                                        relationship: crate::model::identifier::Relationship::ManyToOne,
                                        join_type: crate::model::identifier::JoinType::LeftOuter,
                                        custom_sql_on: None,
                                    },
                                );
                            }
                        }
                    }
                    IdentifierKind::Join {
                        reference,
                        sql_on,
                        join_type,
                        relationship,
                    } => {
                        if !index.contains_key(reference) {
                            return Err(CompileError::Join(format!(
                                "'{view_name}.{}' joins to unknown view '{reference}'",
                                identifier.name
                            )));
                        }
                        add_edge(
                            &mut graph,
                            &index,
                            JoinEdge {
                                from: view_name.to_string(),
                                to: reference.clone(),
                                identifier_name: identifier.name.clone(),
                                relationship: *relationship,
                                join_type: *join_type,
                                custom_sql_on: Some(sql_on.clone()),
                            },
                        );
                    }
                    IdentifierKind::Primary { .. } => {}
                }
            }
        }

        Ok(Self { graph, index })
    }

    /// Neighbors of `view`, ordered deterministically by identifier name
    /// (§4.3 step 3: "ordering children by identifier name").
    pub fn neighbors(&self, view: &str) -> Vec<(&str, &JoinEdge)> {
        let Some(&idx) = self.index.get(view) else {
            return Vec::new();
        };
        let mut out: Vec<(&str, &JoinEdge)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let edge = e.weight();
                let oriented = edge.oriented(view);
                (oriented.to, edge)
            })
            .collect();
        out.sort_by(|a, b| a.1.identifier_name.cmp(&b.1.identifier_name));
        out
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&JoinEdge> {
        let ia = *self.index.get(a)?;
        let ib = *self.index.get(b)?;
        self.graph.find_edge(ia, ib).and_then(|e| self.graph.edge_weight(e))
    }
}

fn add_edge(
    graph: &mut UnGraph<String, JoinEdge>,
    index: &HashMap<String, NodeIndex>,
    edge: JoinEdge,
) {
    if let (Some(&a), Some(&b)) = (index.get(&edge.from), index.get(&edge.to)) {
        if graph.find_edge(a, b).is_none() {
            graph.add_edge(a, b, edge);
        }
    }
}
