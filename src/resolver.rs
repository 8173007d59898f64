//! Top-level resolver (§4.8): validates a [`Request`] against a [`Project`],
//! resolves every metric/dimension/filter field reference, classifies the
//! request into the single/cumulative/merged shape, and dispatches to the
//! matching generator.

use std::collections::HashSet;

use crate::design::DesignResolver;
use crate::error::{CompileError, CompileResult};
use crate::filter::FilterExpr;
use crate::generate::{cumulative, merged, resolve_field_ref, single};
use crate::join_graph::{connected_component, JoinGraph};
use crate::model::Project;
use crate::request::{FilterInput, Request};

type ResolvedField = (String, String, String);

/// Compile a [`Request`] against a [`Project`] into a single SQL string
/// (§4.8, §6 Output).
#[tracing::instrument(skip(project, request), fields(metrics = request.metrics.len(), dimensions = request.dimensions.len()))]
pub fn compile(project: &Project, request: &Request) -> CompileResult<String> {
    if request.metrics.is_empty() && request.dimensions.is_empty() {
        return Err(CompileError::Query(
            "request selects no metrics or dimensions".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for id in request.metrics.iter().chain(request.dimensions.iter()) {
        if !seen.insert(id.as_str()) {
            return Err(CompileError::Query(format!(
                "field '{id}' requested as both a metric and a dimension"
            )));
        }
    }

    let dialect = request.query_type.dialect();

    let metrics = resolve_fields(project, &request.metrics, true)?;
    let dimensions = resolve_fields(project, &request.dimensions, false)?;

    let where_filters = parse_filter_input(&request.where_);
    let having_filters = parse_filter_input(&request.having);

    let mut required_views: HashSet<String> = HashSet::new();
    for (view, _, _) in metrics.iter().chain(dimensions.iter()) {
        required_views.insert(view.clone());
    }
    for id in where_filters
        .iter()
        .chain(having_filters.iter())
        .flat_map(crate::filter::referenced_field_ids)
    {
        let (view, _) = resolve_field_ref(project, &id)?;
        required_views.insert(view);
    }

    let (merged_metrics, atomic_metrics): (Vec<ResolvedField>, Vec<ResolvedField>) = metrics
        .into_iter()
        .partition(|(view, field, _)| is_merged_result(project, view, field));

    let spans_single_component = views_share_component(project, &required_views)?;
    let needs_merged = !merged_metrics.is_empty() || !spans_single_component;
    let has_cumulative = atomic_metrics
        .iter()
        .any(|(view, field, _)| is_cumulative(project, view, field));

    if needs_merged {
        if has_cumulative {
            tracing::warn!("rejected request: cumulative metric mixed with a merged-results request");
            return Err(CompileError::NotImplemented(
                "cumulative metrics cannot be combined with a request spanning multiple join components".to_string(),
            ));
        }
        tracing::debug!(merged_metrics = merged_metrics.len(), "routing to merged-results generator");
        let input = merged::MergedInput {
            dialect,
            metrics: &atomic_metrics,
            merged_metrics: &merged_metrics,
            dimensions: &dimensions,
            where_filters: &where_filters,
            having_filters: &having_filters,
            select_raw_sql: &request.select_raw_sql,
            order_by: &request.order_by,
            limit: request.limit,
            reference_date: request.reference_date,
        };
        return merged::generate(project, &input, request.terminate_with_semicolon);
    }

    if has_cumulative {
        let (cumulative_metrics, plain_metrics): (Vec<ResolvedField>, Vec<ResolvedField>) = atomic_metrics
            .into_iter()
            .partition(|(view, field, _)| is_cumulative(project, view, field));

        tracing::debug!(cumulative_metrics = cumulative_metrics.len(), "routing to cumulative generator");
        let design = build_design(
            project,
            &cumulative_metrics,
            &plain_metrics,
            &dimensions,
            &required_views,
            request.force_group_by,
        )?;

        let input = cumulative::CumulativeInput {
            dialect,
            cumulative_metrics: &cumulative_metrics,
            plain_metrics: &plain_metrics,
            dimensions: &dimensions,
            where_filters: &where_filters,
            having_filters: &having_filters,
            select_raw_sql: &request.select_raw_sql,
            order_by: &request.order_by,
            limit: request.limit,
            reference_date: request.reference_date,
        };
        return cumulative::generate(project, &design, &input, request.terminate_with_semicolon);
    }

    tracing::debug!("routing to single-query generator");
    let design = build_design(
        project,
        &atomic_metrics,
        &[],
        &dimensions,
        &required_views,
        request.force_group_by,
    )?;

    let input = single::SingleQueryInput {
        dialect,
        metrics: &atomic_metrics,
        dimensions: &dimensions,
        where_filters: &where_filters,
        having_filters: &having_filters,
        select_raw_sql: &request.select_raw_sql,
        order_by: &request.order_by,
        limit: request.limit,
        reference_date: request.reference_date,
    };
    single::generate(project, &design, &input, request.terminate_with_semicolon)
}

fn build_design(
    project: &Project,
    primary_metrics: &[ResolvedField],
    secondary_metrics: &[ResolvedField],
    dimensions: &[ResolvedField],
    required_views: &HashSet<String>,
    force_group_by: bool,
) -> CompileResult<crate::design::Design> {
    let metric_views: Vec<String> = primary_metrics
        .iter()
        .chain(secondary_metrics.iter())
        .map(|(view, _, _)| view.clone())
        .collect();
    let dimension_views: Vec<String> = dimensions.iter().map(|(view, _, _)| view.clone()).collect();
    let selected_dimension_ids: Vec<String> = dimensions.iter().map(|(view, field, _)| format!("{view}.{field}")).collect();

    DesignResolver::resolve(
        project,
        &metric_views,
        &dimension_views,
        required_views,
        &selected_dimension_ids,
        force_group_by,
    )
}

fn resolve_fields(project: &Project, ids: &[String], expect_measure: bool) -> CompileResult<Vec<ResolvedField>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let (view, field) = resolve_field_ref(project, id)?;
        let is_measure = field_is_measure(project, &view, &field);
        if expect_measure && !is_measure {
            return Err(CompileError::Query(format!("'{id}' is a dimension, not a metric")));
        }
        if !expect_measure && is_measure {
            return Err(CompileError::Query(format!("'{id}' is a metric, not a dimension")));
        }
        out.push((view, field, id.clone()));
    }
    Ok(out)
}

fn parse_filter_input(input: &FilterInput) -> Vec<FilterExpr> {
    match input {
        FilterInput::None => Vec::new(),
        FilterInput::Literal(raw) => vec![FilterExpr::Literal(raw.clone())],
        FilterInput::Structured(exprs) => exprs.clone(),
    }
}

fn field_is_measure(project: &Project, view: &str, field: &str) -> bool {
    project
        .view(view)
        .and_then(|v| v.field(field))
        .map(|f| f.is_measure())
        .unwrap_or(false)
}

fn is_merged_result(project: &Project, view: &str, field: &str) -> bool {
    project
        .view(view)
        .and_then(|v| v.field(field))
        .and_then(|f| f.measure_spec())
        .map(|m| m.is_merged_result)
        .unwrap_or(false)
}

/// True for a `cumulative`-typed measure, or a `number` measure whose `sql`
/// transitively references one (§4.6).
fn is_cumulative(project: &Project, view: &str, field: &str) -> bool {
    crate::generate::measure_is_cumulative(project, view, field)
}

/// Whether every view in `required_views` lies in the same join-graph
/// connected component (§4.2, §4.8: a request spanning more than one
/// component routes to the merged-results planner).
fn views_share_component(project: &Project, required_views: &HashSet<String>) -> CompileResult<bool> {
    if required_views.len() <= 1 {
        return Ok(true);
    }
    let graph = JoinGraph::build(project)?;
    let first = required_views
        .iter()
        .next()
        .expect("len() > 1 checked above");
    let component = connected_component(&graph, first);
    Ok(required_views.iter().all(|v| component.contains(v)))
}
