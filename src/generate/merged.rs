//! Merged-results planner (§4.7): splits a request whose fields span more
//! than one join-graph component (or that requests an author-defined
//! merged metric) into one single-query CTE per `(canon_date,
//! join_graph_hash)` bucket, then stitches the per-bucket results together
//! on paired dimensions.
//!
//! Grounded on the spec's adopted Open Question resolution (§9): buckets
//! are keyed by join-graph-hash, not by "explore" — there is only one
//! bucketing strategy implemented here.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::design::DesignResolver;
use crate::error::{CompileError, CompileResult};
use crate::filter::{FilterExpr, FilterOperator, FilterValue, LogicalOperator};
use crate::generate::single::{self, SingleQueryInput};
use crate::generate::{alias_for, canon_date_field, field_exists, referenced_measures};
use crate::join_graph::{connected_component, join_graph_hash, JoinGraph};
use crate::model::field::MeasureType;
use crate::model::Project;
use crate::request::OrderBy;
use crate::sql::dialect::{Dialect, SemanticDialectExt};
use crate::sql::expr::raw_sql;
use crate::sql::query::{Cte, JoinType, Query, TableRef};

/// A resolved `view.field` triple carrying the request-level id it was
/// requested under (the id drives the final output alias, §4.5 SELECT
/// rules).
pub type ResolvedField = (String, String, String);

pub struct MergedInput<'a> {
    pub dialect: Dialect,
    /// Atomic (non-merged-result) metrics, each already resolved.
    pub metrics: &'a [ResolvedField],
    /// Author-defined merged metrics: cross-bucket expressions over other
    /// measures, decomposed into their referenced atomic measures before
    /// bucketing (§4.7 step 1).
    pub merged_metrics: &'a [ResolvedField],
    pub dimensions: &'a [ResolvedField],
    pub where_filters: &'a [FilterExpr],
    pub having_filters: &'a [FilterExpr],
    pub select_raw_sql: &'a [String],
    pub order_by: &'a [OrderBy],
    pub limit: Option<u64>,
    pub reference_date: NaiveDate,
}

/// One `(canon_date, join_graph_hash)` bucket: a disjoint set of views plus
/// the metrics homed there.
struct Bucket {
    component: std::collections::HashSet<String>,
    canon_date: Option<String>,
    metrics: Vec<ResolvedField>,
    /// bucket-local CTE name, e.g. `bucket_0`.
    name: String,
}

pub fn generate(
    project: &Project,
    input: &MergedInput,
    terminate_with_semicolon: bool,
) -> CompileResult<String> {
    let query = build(project, input)?;
    Ok(single::render(&query, input.dialect, terminate_with_semicolon))
}

pub fn build(project: &Project, input: &MergedInput) -> CompileResult<Query> {
    let graph = JoinGraph::build(project)?;

    let mut buckets: Vec<Bucket> = Vec::new();
    let mut hash_to_bucket: HashMap<u64, usize> = HashMap::new();

    for (view, field, id) in input.metrics {
        let bucket_idx = bucket_for(project, &graph, view, field, &mut buckets, &mut hash_to_bucket)?;
        buckets[bucket_idx].metrics.push((view.clone(), field.clone(), id.clone()));
    }

    // Decompose merged-result metrics into their referenced atomic measures
    // (§4.7 step 1) and assign each reference to its own bucket.
    let mut merged_refs: Vec<(ResolvedField, Vec<(String, String)>)> = Vec::new();
    for (view, field, id) in input.merged_metrics {
        let field_def = project
            .view(view)
            .and_then(|v| v.field(field))
            .ok_or_else(|| CompileError::AccessDenied(format!("{view}.{field}")))?;
        let spec = field_def.measure_spec().ok_or_else(|| {
            CompileError::Query(format!("'{view}.{field}' is not a measure"))
        })?;
        if spec.measure_type == MeasureType::Cumulative {
            return Err(CompileError::NotImplemented(
                "merged metrics may not reference cumulative metrics".to_string(),
            ));
        }
        let refs = referenced_measures(spec, view);
        if refs.is_empty() {
            return Err(CompileError::Query(format!(
                "merged metric '{view}.{field}' references no measures"
            )));
        }
        for (rv, rf) in &refs {
            let rspec = project
                .view(rv)
                .and_then(|v| v.field(rf))
                .and_then(|f| f.measure_spec())
                .ok_or_else(|| CompileError::AccessDenied(format!("{rv}.{rf}")))?;
            if rspec.measure_type == MeasureType::Cumulative {
                return Err(CompileError::NotImplemented(
                    "merged metrics may not reference cumulative metrics".to_string(),
                ));
            }
            let bucket_idx = bucket_for(project, &graph, rv, rf, &mut buckets, &mut hash_to_bucket)?;
            if !buckets[bucket_idx].metrics.iter().any(|(v, f, _)| v == rv && f == rf) {
                buckets[bucket_idx]
                    .metrics
                    .push((rv.clone(), rf.clone(), format!("{rv}.{rf}")));
            }
        }
        merged_refs.push(((view.clone(), field.clone(), id.clone()), refs));
    }

    if buckets.len() < 2 && merged_refs.is_empty() {
        return Err(CompileError::Query(
            "merged planner invoked for a request that fits a single join component".to_string(),
        ));
    }

    // §4.7 step 2: a bucket may not mix metrics with differing canon_date.
    for bucket in &buckets {
        let mut canon: Option<String> = None;
        for (view, field, _) in &bucket.metrics {
            if let Some(c) = canon_date_field(project, view, field)? {
                match &canon {
                    None => canon = Some(c),
                    Some(existing) if *existing != c => {
                        return Err(CompileError::NotImplemented(format!(
                            "bucket containing '{view}.{field}' mixes canonical dates '{existing}' and '{c}'"
                        )));
                    }
                    _ => {}
                }
            }
        }
    }
    for bucket in &mut buckets {
        if let Some((view, field, _)) = bucket.metrics.first() {
            bucket.canon_date = canon_date_field(project, view, field)?;
        }
    }

    // §4.7 step 3: resolve every requested dimension against every bucket.
    let mut bucket_dims: Vec<Vec<(ResolvedField, (String, String))>> = vec![Vec::new(); buckets.len()];
    for (req_view, req_field, req_id) in input.dimensions {
        for (idx, bucket) in buckets.iter().enumerate() {
            let local = resolve_local_field(project, bucket, req_view, req_field).ok_or_else(|| {
                CompileError::Join(format!(
                    "dimension '{req_id}' has no equivalent in join component '{}'",
                    bucket.name
                ))
            })?;
            bucket_dims[idx].push(((req_view.clone(), req_field.clone(), req_id.clone()), local));
        }
    }

    // Build each bucket's single-query CTE.
    let mut ctes = Vec::with_capacity(buckets.len());
    let mut bucket_select_items: Vec<Vec<single::SelectItem>> = Vec::with_capacity(buckets.len());
    for (idx, bucket) in buckets.iter().enumerate() {
        let base_view = bucket
            .metrics
            .first()
            .map(|(v, _, _)| v.clone())
            .ok_or_else(|| CompileError::Query("merged bucket has no metrics".to_string()))?;

        let required_views: std::collections::HashSet<String> = bucket
            .metrics
            .iter()
            .map(|(v, _, _)| v.clone())
            .chain(bucket_dims[idx].iter().map(|(_, (v, _))| v.clone()))
            .collect();

        let dims_for_design: Vec<String> = bucket_dims[idx]
            .iter()
            .map(|(_, (v, f))| format!("{v}.{f}"))
            .collect();

        let design = DesignResolver::resolve(
            project,
            &[base_view],
            &[],
            &required_views,
            &dims_for_design,
            false,
        )?;

        let (where_filters, having_filters) = translate_filters(project, bucket, input.where_filters, input.having_filters)?;

        let dim_triples: Vec<ResolvedField> = bucket_dims[idx]
            .iter()
            .map(|(req, (v, f))| (v.clone(), f.clone(), req.2.clone()))
            .collect();

        let single_input = SingleQueryInput {
            dialect: input.dialect,
            metrics: &bucket.metrics,
            dimensions: &dim_triples,
            where_filters: &where_filters,
            having_filters: &having_filters,
            select_raw_sql: &[],
            order_by: &[],
            limit: None,
            reference_date: input.reference_date,
        };
        let built = single::build(project, &design, &single_input)?;
        ctes.push(Cte::new(&bucket.name, built.query));
        bucket_select_items.push(built.select_items);
    }

    // §4.7 step 5: the first bucket is the anchor; every other bucket is
    // INNER JOINed on its paired dimension columns.
    let anchor = &buckets[0];
    let mut query = Query::new().from(TableRef::raw(&anchor.name));
    for (idx, bucket) in buckets.iter().enumerate().skip(1) {
        let on = join_condition(&buckets[0], &bucket_dims[0], bucket, &bucket_dims[idx]);
        query = query.join(JoinType::Inner, TableRef::raw(&bucket.name), raw_sql(&on));
    }
    query.with = ctes;

    let mut select_exprs = Vec::new();
    for (req_view, req_field, req_id) in input.dimensions {
        let local = &bucket_dims[0]
            .iter()
            .find(|(req, _)| &req.2 == req_id)
            .expect("every requested dimension was resolved into the anchor bucket above")
            .1;
        let local_alias = alias_for(&local.0, &local.1);
        let out_alias = alias_for(req_view, req_field);
        select_exprs.push(raw_sql(&format!("{}.{local_alias} AS {out_alias}", anchor.name)));
    }
    for (req_view, req_field, req_id) in input.metrics {
        let (bucket_idx, alias) = find_metric_alias(&buckets, &bucket_select_items, req_view, req_field, req_id)
            .ok_or_else(|| CompileError::Query(format!("metric '{req_id}' was not planned into any bucket")))?;
        let bucket_name = &buckets[bucket_idx].name;
        let out_alias = alias_for(req_view, req_field);
        select_exprs.push(raw_sql(&format!("{bucket_name}.{alias} AS {out_alias}")));
    }
    for ((view, field, id), refs) in &merged_refs {
        let mut expr_sql = project
            .view(view)
            .and_then(|v| v.field(field))
            .and_then(|f| f.measure_spec())
            .and_then(|m| m.sql.clone())
            .unwrap_or_default();
        for (rv, rf) in refs {
            let (bucket_idx, alias) = find_metric_alias(&buckets, &bucket_select_items, rv, rf, &format!("{rv}.{rf}"))
                .ok_or_else(|| CompileError::Query(format!("merged metric '{id}' references unplanned measure '{rv}.{rf}'")))?;
            let bucket_name = &buckets[bucket_idx].name;
            let qualified = format!("{bucket_name}.{alias}");
            expr_sql = expr_sql
                .replace(&format!("${{{rv}.{rf}}}"), &qualified)
                .replace(&format!("${{{rf}}}"), &qualified);
        }
        let out_alias = alias_for(view, field);
        select_exprs.push(raw_sql(&format!("({expr_sql}) AS {out_alias}")));
    }
    for raw in input.select_raw_sql {
        select_exprs.push(raw_sql(raw));
    }
    query = query.select(select_exprs);

    query = apply_order_by(project, query, input, &buckets)?;
    if let Some(limit) = input.limit {
        query = query.limit(limit);
    }

    Ok(query)
}

fn bucket_for(
    project: &Project,
    graph: &JoinGraph,
    view: &str,
    field: &str,
    buckets: &mut Vec<Bucket>,
    hash_to_bucket: &mut HashMap<u64, usize>,
) -> CompileResult<usize> {
    if !project.views.contains_key(view) {
        return Err(CompileError::AccessDenied(view.to_string()));
    }
    let _ = field;
    let component = connected_component(graph, view);
    let hash = join_graph_hash(&component);
    if let Some(&idx) = hash_to_bucket.get(&hash) {
        return Ok(idx);
    }
    let idx = buckets.len();
    buckets.push(Bucket {
        component,
        canon_date: None,
        metrics: Vec::new(),
        name: format!("bucket_{idx}"),
    });
    hash_to_bucket.insert(hash, idx);
    Ok(idx)
}

static REF_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?|TABLE)\}").unwrap());

/// Resolve a requested `(view, field)` to its local equivalent inside
/// `bucket`, trying, in order: a direct hit, a declared [`crate::model::Mapping`],
/// a same-named field on any view in the bucket's component, then a
/// canonical-date timeframe match against another view's `default_date`
/// (§4.7 step 3).
fn resolve_local_field(project: &Project, bucket: &Bucket, view: &str, field: &str) -> Option<(String, String)> {
    if bucket.component.contains(view) {
        return Some((view.to_string(), field.to_string()));
    }

    let req_id = format!("{view}.{field}");
    for mapping in project.mappings.values() {
        if mapping.contains(&req_id) {
            for candidate in &mapping.fields {
                if let Some((cv, cf)) = candidate.split_once('.') {
                    if bucket.component.contains(cv) && field_exists(project, cv, cf) {
                        return Some((cv.to_string(), cf.to_string()));
                    }
                }
            }
        }
    }

    let mut component_views: Vec<String> = bucket.component.iter().cloned().collect();
    component_views.sort();
    for cv in &component_views {
        if field_exists(project, cv, field) {
            return Some((cv.clone(), field.to_string()));
        }
    }

    if let Some((group, timeframe)) = field.rsplit_once('_') {
        if crate::model::field::Timeframe::parse(timeframe).is_some() {
            let _ = group;
            for cv in &component_views {
                if let Some(default_date) = project.view(cv).and_then(|v| v.default_date.clone()) {
                    let candidate = format!("{default_date}_{timeframe}");
                    if field_exists(project, cv, &candidate) {
                        return Some((cv.clone(), candidate));
                    }
                }
            }
        }
    }

    None
}

/// Translate the WHERE/HAVING filter trees into every bucket's local field
/// space (§4.7 step 4). A filter that cannot be translated for a bucket is
/// a hard error — merged filters are applied uniformly across buckets.
fn translate_filters(
    project: &Project,
    bucket: &Bucket,
    where_filters: &[FilterExpr],
    having_filters: &[FilterExpr],
) -> CompileResult<(Vec<FilterExpr>, Vec<FilterExpr>)> {
    let mut out_where = Vec::with_capacity(where_filters.len());
    for f in where_filters {
        out_where.push(translate_filter_expr(project, bucket, f)?);
    }
    let mut out_having = Vec::with_capacity(having_filters.len());
    for f in having_filters {
        out_having.push(translate_filter_expr(project, bucket, f)?);
    }
    Ok((out_where, out_having))
}

fn translate_filter_expr(project: &Project, bucket: &Bucket, expr: &FilterExpr) -> CompileResult<FilterExpr> {
    match expr {
        FilterExpr::Leaf { field, expression, value } => {
            let (view, field_name) = crate::generate::resolve_field_ref(project, field)?;
            let local = resolve_local_field(project, bucket, &view, &field_name).ok_or_else(|| {
                CompileError::Join(format!(
                    "filter on '{view}.{field_name}' has no equivalent in join component '{}'",
                    bucket.name
                ))
            })?;
            Ok(FilterExpr::Leaf {
                field: format!("{}.{}", local.0, local.1),
                expression: *expression,
                value: value.clone(),
            })
        }
        FilterExpr::Literal(raw) => {
            let mut out = raw.clone();
            for cap in REF_RE.captures_iter(raw) {
                let token = cap.get(0).unwrap().as_str();
                let reference = cap.get(1).unwrap().as_str();
                if reference == "TABLE" {
                    continue;
                }
                if let Some((v, f)) = reference.split_once('.') {
                    let local = resolve_local_field(project, bucket, v, f).ok_or_else(|| {
                        CompileError::Join(format!(
                            "literal filter reference '{reference}' has no equivalent in join component '{}'",
                            bucket.name
                        ))
                    })?;
                    out = out.replace(token, &format!("${{{}.{}}}", local.0, local.1));
                }
            }
            Ok(FilterExpr::Literal(out))
        }
        FilterExpr::Group { logical_operator, conditions } => {
            let mut out_conditions = Vec::with_capacity(conditions.len());
            for c in conditions {
                out_conditions.push(translate_filter_expr(project, bucket, c)?);
            }
            Ok(FilterExpr::Group {
                logical_operator: *logical_operator,
                conditions: out_conditions,
            })
        }
    }
}

fn find_metric_alias(
    buckets: &[Bucket],
    bucket_select_items: &[Vec<single::SelectItem>],
    view: &str,
    field: &str,
    id: &str,
) -> Option<(usize, String)> {
    for (idx, bucket) in buckets.iter().enumerate() {
        if bucket.metrics.iter().any(|(v, f, _)| v == view && f == field) {
            if let Some(item) = bucket_select_items[idx].iter().find(|i| i.id == id) {
                return Some((idx, item.alias.clone()));
            }
            return Some((idx, alias_for(view, field)));
        }
    }
    None
}

/// The outer stitching ON clause (§4.7 step 5): equality on every dimension
/// paired between `anchor` and `other`; `ON 1=1` when there is nothing to
/// pair on.
fn join_condition(
    anchor: &Bucket,
    anchor_dims: &[(ResolvedField, (String, String))],
    other: &Bucket,
    other_dims: &[(ResolvedField, (String, String))],
) -> String {
    let mut parts = Vec::new();
    for ((_, _, id), (av, af)) in anchor_dims {
        if let Some((_, (ov, of))) = other_dims.iter().find(|((_, _, oid), _)| oid == id) {
            let anchor_alias = alias_for(av, af);
            let other_alias = alias_for(ov, of);
            parts.push(format!(
                "{}.{anchor_alias} = {}.{other_alias}",
                anchor.name, other.name
            ));
        }
    }
    if parts.is_empty() {
        "1=1".to_string()
    } else {
        parts.join(" AND ")
    }
}

fn apply_order_by(
    project: &Project,
    mut query: Query,
    input: &MergedInput,
    buckets: &[Bucket],
) -> CompileResult<Query> {
    use crate::request::SortDirection;
    use crate::sql::query::OrderByExpr;

    let _ = project;
    let _ = buckets;

    if !input.order_by.is_empty() {
        let mut exprs = Vec::with_capacity(input.order_by.len());
        for ob in input.order_by {
            let alias = input
                .dimensions
                .iter()
                .chain(input.metrics.iter())
                .find(|(_, _, id)| id == &ob.field)
                .map(|(v, f, _)| alias_for(v, f))
                .or_else(|| {
                    input
                        .merged_metrics
                        .iter()
                        .find(|(_, _, id)| id == &ob.field)
                        .map(|(v, f, _)| alias_for(v, f))
                })
                .ok_or_else(|| {
                    CompileError::Query(format!("order_by references unselected field '{}'", ob.field))
                })?;
            let e = raw_sql(&alias);
            exprs.push(match ob.direction {
                SortDirection::Asc => OrderByExpr::asc(e),
                SortDirection::Desc => OrderByExpr::desc(e),
            });
        }
        query = query.order_by(exprs);
    } else if input.dialect.default_metric_order_by() {
        if let Some((v, f, _)) = input.metrics.first().or_else(|| input.merged_metrics.first()) {
            query = query.order_by(vec![OrderByExpr::desc(raw_sql(&alias_for(v, f)))]);
        }
    }
    Ok(query)
}
