//! Design resolver (§4.3): picks a base view and join plan for a set of
//! required fields, and computes the functional primary key that drives
//! symmetric-aggregate wrapping and `no_group_by`.

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, CompileResult};
use crate::join_graph::{connected_component, JoinGraph};
use crate::model::identifier::{JoinType, Relationship};
use crate::model::Project;

/// One step of the DFS join plan: join `view` in via `edge`, from `parent`.
#[derive(Debug, Clone)]
pub struct JoinStep {
    pub view: String,
    pub parent: String,
    pub identifier_name: String,
    pub join_type: JoinType,
    /// `Some` for a `join`-typed identifier's bespoke ON clause (still
    /// containing unresolved `${...}` references); `None` means an equi-join
    /// on the identifier field on both sides.
    pub custom_sql_on: Option<String>,
    /// True when this view is reached from the base only after at least one
    /// `one_to_many`/`many_to_many` hop (so measures homed here need
    /// symmetric-aggregate wrapping, §4.1/§4.3 step 4).
    pub fans_out: bool,
}

/// The functional primary key of the joined result (§4.3 step 4, §9
/// glossary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionalPk {
    /// No fan-out anywhere in the join plan: the base view's own primary
    /// key still uniquely identifies a joined row.
    BasePrimaryKey,
    /// At least one fan-out edge: rows may repeat under the base's primary
    /// key and a synthetic composite key drives symmetric aggregates.
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct Design {
    pub base_view: String,
    pub joins: Vec<JoinStep>,
    pub functional_pk: FunctionalPk,
    /// Views reached only through fan-out edges from the base — measures
    /// homed on these views need symmetric-aggregate wrapping.
    pub fan_out_views: HashSet<String>,
    pub no_group_by: bool,
    pub views_used: HashSet<String>,
}

impl Design {
    pub fn join_graph_component(&self) -> &HashSet<String> {
        &self.views_used
    }
}

pub struct DesignResolver;

impl DesignResolver {
    /// Resolve a design for `required_views` (every view backing a
    /// requested metric, dimension, or filter reference), choosing the base
    /// view per §4.3 step 3: the home view of the first metric, or the
    /// first dimension if there are no metrics.
    pub fn resolve(
        project: &Project,
        metric_views_in_order: &[String],
        dimension_views_in_order: &[String],
        required_views: &HashSet<String>,
        selected_dimension_ids: &[String],
        force_group_by: bool,
    ) -> CompileResult<Design> {
        let base_view = metric_views_in_order
            .first()
            .or_else(|| dimension_views_in_order.first())
            .cloned()
            .ok_or_else(|| CompileError::Query("request has no metrics or dimensions".to_string()))?;

        if !project.views.contains_key(&base_view) {
            return Err(CompileError::AccessDenied(base_view));
        }

        let graph = JoinGraph::build(project)?;
        let component = connected_component(&graph, &base_view);

        let stray: Vec<&String> = required_views.iter().filter(|v| !component.contains(*v)).collect();
        if !stray.is_empty() {
            tracing::warn!(base_view = %base_view, stray = %stray[0], "request spans non-joinable views");
            return Err(CompileError::Join(format!(
                "fields span non-joinable views: {} is not reachable from base view '{base_view}'",
                stray[0]
            )));
        }

        let (parents, order) = dfs_spanning_tree(&graph, &base_view, &component);

        let needed: HashSet<&str> = required_views.iter().map(String::as_str).collect();
        let mut keep: HashSet<String> = HashSet::new();
        keep.insert(base_view.clone());
        for view in &needed {
            let mut cur = *view;
            while cur != base_view {
                keep.insert(cur.to_string());
                match parents.get(cur) {
                    Some((parent, _)) => cur = parent.as_str(),
                    None => break,
                }
            }
        }

        let mut fan_out_views: HashSet<String> = HashSet::new();
        let mut joins = Vec::new();
        for view in &order {
            if view == &base_view || !keep.contains(view) {
                continue;
            }
            let (parent, edge) = parents.get(view).expect("spanning tree has a parent for every non-root view");
            let oriented = edge.oriented(parent);
            let parent_fans_out = fan_out_views.contains(parent);
            let fans_out = parent_fans_out || oriented.relationship.fans_out();
            if fans_out {
                fan_out_views.insert(view.clone());
            }
            joins.push(JoinStep {
                view: view.clone(),
                parent: parent.clone(),
                identifier_name: edge.identifier_name.clone(),
                join_type: edge.join_type,
                custom_sql_on: edge.custom_sql_on.clone(),
                fans_out,
            });
        }

        let functional_pk = if fan_out_views.is_empty() {
            FunctionalPk::BasePrimaryKey
        } else {
            FunctionalPk::Synthetic
        };

        let base = project.view(&base_view).ok_or_else(|| CompileError::AccessDenied(base_view.clone()))?;
        let base_pk_id = base.primary_key_field().map(|f| format!("{base_view}.{}", f.name));
        let no_group_by = !force_group_by
            && base_pk_id
                .map(|pk| selected_dimension_ids.iter().any(|d| d == &pk))
                .unwrap_or(false);

        tracing::debug!(
            base_view = %base_view,
            joins = joins.len(),
            functional_pk = ?functional_pk,
            "resolved join design"
        );

        Ok(Design {
            base_view,
            joins,
            functional_pk,
            fan_out_views,
            no_group_by,
            views_used: keep,
        })
    }
}

/// DFS spanning tree over `component` rooted at `base`, children ordered by
/// identifier name (§4.3 step 3). Returns parent pointers (view -> (parent,
/// edge)) and the DFS preorder.
fn dfs_spanning_tree(
    graph: &JoinGraph,
    base: &str,
    component: &HashSet<String>,
) -> (HashMap<String, (String, crate::join_graph::JoinEdge)>, Vec<String>) {
    let mut parents = HashMap::new();
    let mut order = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack = vec![base.to_string()];
    visited.insert(base.to_string());

    while let Some(view) = stack.pop() {
        order.push(view.clone());
        let mut neighbors = graph.neighbors(&view);
        neighbors.reverse(); // stack pops reverse of push order
        for (neighbor, edge) in neighbors {
            if !component.contains(neighbor) || visited.contains(neighbor) {
                continue;
            }
            visited.insert(neighbor.to_string());
            parents.insert(neighbor.to_string(), (view.clone(), edge.clone()));
            stack.push(neighbor.to_string());
        }
    }

    (parents, order)
}

#[allow(dead_code)]
fn compose_path(rels: &[Relationship]) -> Relationship {
    rels.iter()
        .copied()
        .reduce(Relationship::compose)
        .unwrap_or(Relationship::OneToOne)
}
