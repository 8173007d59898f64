//! Cumulative-metric planner (§4.6): rewrites a request containing a
//! `cumulative`-typed metric into a `date_spine` CTE pipeline so the measure
//! accumulates up to (or within a trailing window of) each spine day.

use chrono::NaiveDate;

use std::collections::HashMap;

use crate::design::Design;
use crate::error::{CompileError, CompileResult};
use crate::filter::{FilterCompiler, FilterExpr};
use crate::generate::single::{self, SelectItem, SingleQueryInput};
use crate::generate::{alias_for, canon_date_field, referenced_measures, resolve_field_ref};
use crate::model::expr_engine::FieldResolver;
use crate::model::field::MeasureType;
use crate::model::Project;
use crate::request::OrderBy;
use crate::sql::dialect::{Dialect, SemanticDialectExt};
use crate::sql::expr::{raw_sql, Expr};
use crate::sql::query::{Cte, JoinType, OrderByExpr, Query, TableRef};

/// A single 40-year span (§4.6 step 1) starting 2000-01-01, matching the
/// original's `GENERATOR`/`GENERATE_DATE_ARRAY` spine: it must straddle
/// today's date, not merely span 40 years from any fixed epoch.
const DATE_SPINE_DAYS: i64 = 365 * 40;
const DATE_SPINE_START: &str = "2000-01-01";

/// Everything the cumulative generator needs beyond the design.
pub struct CumulativeInput<'a> {
    pub dialect: Dialect,
    /// `cumulative`-typed metrics, each a resolved (view, field, id) triple.
    pub cumulative_metrics: &'a [(String, String, String)],
    /// Non-cumulative metrics requested alongside them, if any (§4.6 step 4).
    pub plain_metrics: &'a [(String, String, String)],
    pub dimensions: &'a [(String, String, String)],
    pub where_filters: &'a [FilterExpr],
    pub having_filters: &'a [FilterExpr],
    pub select_raw_sql: &'a [String],
    pub order_by: &'a [OrderBy],
    pub limit: Option<u64>,
    pub reference_date: NaiveDate,
}

/// Build and render a full, terminated SQL statement (§4.5, §4.6, §6 Output).
pub fn generate(
    project: &Project,
    design: &Design,
    input: &CumulativeInput,
    terminate_with_semicolon: bool,
) -> CompileResult<String> {
    let query = build(project, design, input)?;
    Ok(single::render(&query, input.dialect, terminate_with_semicolon))
}

pub fn build(project: &Project, design: &Design, input: &CumulativeInput) -> CompileResult<Query> {
    let date_spine_body = input.dialect.date_spine_sql(DATE_SPINE_START, DATE_SPINE_DAYS).ok_or_else(|| {
        CompileError::NotImplemented(format!("cumulative metrics are not supported on {:?}", input.dialect))
    })?;

    let mut ctes = vec![Cte::new("date_spine", Query::raw(date_spine_body))];

    let dim_aliases: Vec<String> = input
        .dimensions
        .iter()
        .map(|(view, field, _)| alias_for(view, field))
        .collect();

    let mut aggregated_names = Vec::new();
    let mut outer_select: Vec<(String, String)> = Vec::new(); // (source expr, outer alias)
    // (view, field) -> its `aggregated_<prefix>` CTE, so a measure referenced
    // by more than one requested metric (directly, or via several `number`
    // wrappers) only gets one subquery/aggregated CTE pair.
    let mut planned: HashMap<(String, String), String> = HashMap::new();
    // Atomic measures a `number` metric's expression needs evaluated inside
    // `base`, beyond what was directly requested (§4.6, mirroring how a
    // merged metric's references are resolved against a bucket).
    let mut extra_plain_refs: Vec<(String, String, String)> = Vec::new();

    for (view, field, id) in input.cumulative_metrics {
        let spec = project
            .view(view)
            .and_then(|v| v.field(field))
            .and_then(|f| f.measure_spec())
            .ok_or_else(|| CompileError::Query(format!("'{view}.{field}' is not a measure")))?;

        match spec.measure_type {
            MeasureType::Cumulative => {
                let prefix = ensure_cumulative_cte(
                    project,
                    design,
                    input,
                    view,
                    field,
                    &mut ctes,
                    &mut aggregated_names,
                    &mut planned,
                )?;
                outer_select.push((format!("aggregated_{prefix}.{prefix}_agg"), id.clone()));
            }
            MeasureType::Number => {
                let refs = referenced_measures(spec, view);
                if refs.is_empty() {
                    return Err(CompileError::Query(format!(
                        "cumulative number metric '{view}.{field}' references no measures"
                    )));
                }
                let mut expr_sql = spec.sql.clone().unwrap_or_default();
                for (rv, rf) in &refs {
                    let ref_spec = project
                        .view(rv)
                        .and_then(|v| v.field(rf))
                        .and_then(|f| f.measure_spec())
                        .ok_or_else(|| CompileError::AccessDenied(format!("{rv}.{rf}")))?;
                    let qualified = if ref_spec.measure_type == MeasureType::Cumulative {
                        let prefix = ensure_cumulative_cte(
                            project,
                            design,
                            input,
                            rv,
                            rf,
                            &mut ctes,
                            &mut aggregated_names,
                            &mut planned,
                        )?;
                        format!("aggregated_{prefix}.{prefix}_agg")
                    } else {
                        let alias = alias_for(rv, rf);
                        let already_requested = input.plain_metrics.iter().any(|(v, f, _)| v == rv && f == rf)
                            || extra_plain_refs.iter().any(|(v, f, _)| v == rv && f == rf);
                        if !already_requested {
                            extra_plain_refs.push((rv.clone(), rf.clone(), format!("{rv}.{rf}")));
                        }
                        format!("base.{alias}")
                    };
                    expr_sql = expr_sql
                        .replace(&format!("${{{rv}.{rf}}}"), &qualified)
                        .replace(&format!("${{{rf}}}"), &qualified);
                }
                outer_select.push((format!("({expr_sql})"), id.clone()));
            }
            _ => {
                return Err(CompileError::Query(format!(
                    "'{view}.{field}' is not a cumulative metric"
                )))
            }
        }
    }

    let mut base_metrics: Vec<(String, String, String)> = input.plain_metrics.to_vec();
    base_metrics.extend(extra_plain_refs);
    let requested_plain_ids: std::collections::HashSet<&str> =
        input.plain_metrics.iter().map(|(_, _, id)| id.as_str()).collect();

    let has_base = !base_metrics.is_empty();
    if has_base {
        let base_input = SingleQueryInput {
            dialect: input.dialect,
            metrics: &base_metrics,
            dimensions: input.dimensions,
            where_filters: input.where_filters,
            having_filters: input.having_filters,
            select_raw_sql: &[],
            order_by: &[],
            limit: None,
            reference_date: input.reference_date,
        };
        let built = single::build(project, design, &base_input)?;
        ctes.push(Cte::new("base", built.query));
        // Internal-only references stay inside `base` for the `number`
        // expressions above to qualify against; only metrics the caller
        // actually requested become top-level output columns.
        for item in built.select_items.into_iter().filter(|i| i.is_measure) {
            if requested_plain_ids.contains(item.id.as_str()) {
                outer_select.push((format!("base.{}", item.alias), item.id));
            }
        }
    }

    let anchor = if has_base {
        "base".to_string()
    } else {
        aggregated_names[0].clone()
    };

    // Every aggregated CTE (besides the anchor itself, if it is one) joins
    // to the anchor on the dimension tuple plus the shared `date_spine` day
    // (§4.6 step 5). `base` has no date column, so it only pairs on dims.
    let mut query = Query::new().from(TableRef::raw(&anchor));
    for other in &aggregated_names {
        if other == &anchor {
            continue;
        }
        let on = join_condition(&anchor, other, &dim_aliases);
        query = query.join(JoinType::Inner, TableRef::raw(other), raw_sql(&on));
    }
    query.with = ctes;

    let mut select_exprs = Vec::new();
    let mut select_items = Vec::new();
    for (alias, (_view, _field, id)) in dim_aliases.iter().zip(input.dimensions.iter()) {
        select_exprs.push(raw_sql(&format!("{anchor}.{alias} AS {alias}")));
        select_items.push(SelectItem {
            id: id.clone(),
            alias: alias.clone(),
            sql: alias.clone(),
            is_measure: false,
        });
    }
    for (source, id) in &outer_select {
        let alias = id.replace('.', "_");
        select_exprs.push(raw_sql(&format!("{source} AS {alias}")));
        select_items.push(SelectItem {
            id: id.clone(),
            alias,
            sql: source.clone(),
            is_measure: true,
        });
    }
    for raw in input.select_raw_sql {
        let mut resolver = FieldResolver::new(project, input.dialect);
        let sql = resolver.interpolate_text(&design.base_view, raw)?;
        select_exprs.push(raw_sql(&sql));
    }
    query = query.select(select_exprs);

    query = apply_order_by(query, input.order_by, &select_items, input.dialect)?;
    if let Some(limit) = input.limit {
        query = query.limit(limit);
    }

    Ok(query)
}

struct MeasurePlan {
    subquery: Query,
    aggregated: Query,
}

/// Plan a cumulative measure's `subquery_<prefix>`/`aggregated_<prefix>` CTE
/// pair once and cache its prefix in `planned`, so a measure referenced by
/// several requested metrics (directly, or via more than one `number`
/// wrapper) doesn't get duplicate CTEs.
#[allow(clippy::too_many_arguments)]
fn ensure_cumulative_cte(
    project: &Project,
    design: &Design,
    input: &CumulativeInput,
    view: &str,
    field: &str,
    ctes: &mut Vec<Cte>,
    aggregated_names: &mut Vec<String>,
    planned: &mut HashMap<(String, String), String>,
) -> CompileResult<String> {
    let key = (view.to_string(), field.to_string());
    if let Some(prefix) = planned.get(&key) {
        return Ok(prefix.clone());
    }
    let prefix = alias_for(view, field);
    let plan = plan_measure(project, design, input, view, field, &prefix)?;
    ctes.push(Cte::new(&format!("subquery_{prefix}"), plan.subquery));
    ctes.push(Cte::new(&format!("aggregated_{prefix}"), plan.aggregated));
    aggregated_names.push(format!("aggregated_{prefix}"));
    planned.insert(key, prefix.clone());
    Ok(prefix)
}

/// §4.6 steps 2-3 for a single cumulative measure: the non-aggregated
/// `subquery_<prefix>` and the date-spine-joined `aggregated_<prefix>`.
fn plan_measure(
    project: &Project,
    design: &Design,
    input: &CumulativeInput,
    view_name: &str,
    field_name: &str,
    prefix: &str,
) -> CompileResult<MeasurePlan> {
    let view = project.view(view_name).ok_or_else(|| CompileError::AccessDenied(view_name.to_string()))?;
    let field = view
        .field(field_name)
        .ok_or_else(|| CompileError::AccessDenied(format!("{view_name}.{field_name}")))?;
    let spec = field.measure_spec().ok_or_else(|| {
        CompileError::Query(format!("'{view_name}.{field_name}' is not a measure"))
    })?;
    let referenced = spec.measure_ref.clone().ok_or_else(|| {
        CompileError::Query(format!("cumulative measure '{view_name}.{field_name}' has no measure_ref"))
    })?;
    let ref_field = view
        .field(&referenced)
        .ok_or_else(|| CompileError::AccessDenied(format!("{view_name}.{referenced}")))?;
    let ref_spec = ref_field.measure_spec().ok_or_else(|| {
        CompileError::Query(format!("'{view_name}.{referenced}' is not a measure"))
    })?;
    if ref_spec.measure_type.is_cumulative() {
        return Err(CompileError::NotImplemented(
            "a cumulative measure cannot reference another cumulative measure".to_string(),
        ));
    }

    let canon = canon_date_field(project, view_name, field_name)?.ok_or_else(|| {
        CompileError::Query(format!(
            "cumulative measure '{view_name}.{field_name}' has no canon_date and its view declares no default_date"
        ))
    })?;

    let mut resolver = FieldResolver::new(project, input.dialect);
    let value_sql = resolver.field_sql(view_name, &referenced)?;
    let symmetric = single::symmetric_context(project, &mut resolver, design, view_name)?;
    let needs_dedup = symmetric.is_some();

    let canon_sql = canon_date_sql(&mut resolver, view_name, &canon)?;

    let (date_filters, other_filters) = split_date_filters(project, view_name, &canon, input.where_filters);

    let mut select_exprs = Vec::new();
    for (d_view, d_field, _) in input.dimensions {
        let sql = resolver.field_sql(d_view, d_field)?;
        let alias = alias_for(d_view, d_field);
        select_exprs.push(raw_sql(&format!("{sql} AS {alias}")));
    }
    select_exprs.push(raw_sql(&format!("{canon_sql} AS {prefix}_date")));
    select_exprs.push(raw_sql(&format!("{value_sql} AS {prefix}_value")));

    if needs_dedup {
        let pk_field = view.primary_key_field().ok_or_else(|| {
            CompileError::Query(format!(
                "view '{view_name}' has a fan-out join but no primary key to dedup cumulative rows"
            ))
        })?;
        let sql = resolver.field_sql(view_name, &pk_field.name)?;
        select_exprs.push(raw_sql(&format!("{sql} AS {prefix}_pk")));
    }

    let mut subquery = single::build_from_and_joins(project, design, &mut resolver)?.select(select_exprs);
    if needs_dedup {
        subquery = subquery.distinct();
    }

    let mut where_conditions = single::always_filter_conditions(project, design, &mut resolver)?;
    let mut filter_compiler = FilterCompiler::new(project, input.dialect, input.reference_date);
    let other_compiled = filter_compiler.compile(&other_filters, view_name)?;
    where_conditions.extend(other_compiled.where_conditions);
    where_conditions.extend(other_compiled.having_conditions);
    if let Some(expr) = single::combine_and(where_conditions) {
        subquery = subquery.filter(expr);
    }

    let subquery_table = format!("subquery_{prefix}");
    let window_days = spec.cumulative_window_days;
    let join_on = match window_days {
        Some(days) => format!(
            "{subquery_table}.{prefix}_date BETWEEN date_spine.date - INTERVAL '{} day' AND date_spine.date",
            days.saturating_sub(1)
        ),
        None => format!("{subquery_table}.{prefix}_date <= date_spine.date"),
    };

    let mut aggregated = Query::new().from(TableRef::raw("date_spine")).join(
        JoinType::Inner,
        TableRef::raw(&subquery_table),
        raw_sql(&join_on),
    );

    let mut agg_select = Vec::new();
    for (d_view, d_field, _) in input.dimensions {
        let alias = alias_for(d_view, d_field);
        agg_select.push(raw_sql(&format!("{subquery_table}.{alias} AS {alias}")));
    }
    agg_select.push(raw_sql(&format!("date_spine.date AS {prefix}_date")));
    let value_col = format!("{subquery_table}.{prefix}_value");
    let agg_expr = aggregate_expr(input.dialect, ref_spec.measure_type, &value_col, needs_dedup);
    agg_select.push(raw_sql(&format!("{agg_expr} AS {prefix}_agg")));
    aggregated = aggregated.select(agg_select);

    let mut group_exprs = Vec::new();
    for (d_view, d_field, _) in input.dimensions {
        let alias = alias_for(d_view, d_field);
        group_exprs.push(raw_sql(&format!("{subquery_table}.{alias}")));
    }
    group_exprs.push(raw_sql("date_spine.date"));
    aggregated = aggregated.group_by(group_exprs);

    if !date_filters.is_empty() {
        let date_column = "date_spine.date";
        let mut having_conditions = Vec::new();
        for expr in &date_filters {
            having_conditions.push(compile_date_filter(&mut filter_compiler, view_name, date_column, expr)?);
        }
        if let Some(expr) = single::combine_and(having_conditions) {
            aggregated = aggregated.having(expr);
        }
    }

    Ok(MeasurePlan { subquery, aggregated })
}

/// Resolve a measure aggregate over an already-selected, non-aggregated
/// column, mirroring §4.1's measure-type dispatch but applied to
/// `subquery_<prefix>`'s materialized value column instead of the home
/// view's own field.
fn aggregate_expr(dialect: Dialect, measure_type: MeasureType, column: &str, distinct: bool) -> String {
    match measure_type {
        MeasureType::Count if distinct => format!("COUNT(DISTINCT {column})"),
        MeasureType::Count => format!("COUNT({column})"),
        MeasureType::CountDistinct => format!("COUNT(DISTINCT {column})"),
        MeasureType::Sum => format!("SUM({column})"),
        MeasureType::Average => format!("AVG({column})"),
        MeasureType::Median => dialect.median(column),
        MeasureType::Max => format!("MAX({column})"),
        MeasureType::Min => format!("MIN({column})"),
        MeasureType::Number | MeasureType::Cumulative => format!("SUM({column})"),
    }
}

fn canon_date_sql(resolver: &mut FieldResolver, view_name: &str, canon: &str) -> CompileResult<String> {
    let day_field = format!("{canon}_date");
    match resolver.field_sql(view_name, &day_field) {
        Ok(sql) => Ok(sql),
        Err(_) => resolver.field_sql(view_name, canon),
    }
}

/// Partition a flat WHERE list into ones targeting the canonical date
/// (deferred to `aggregated_<prefix>`'s HAVING, §4.6 step 3) and everything
/// else (applied directly inside `subquery_<prefix>`). Only top-level
/// `Leaf` expressions are recognized as date-targeting; `Group`/`Literal`
/// filters conservatively stay with the subquery.
fn split_date_filters(
    project: &Project,
    view_name: &str,
    canon: &str,
    filters: &[FilterExpr],
) -> (Vec<FilterExpr>, Vec<FilterExpr>) {
    let mut date_filters = Vec::new();
    let mut other = Vec::new();
    for expr in filters {
        if let FilterExpr::Leaf { field, .. } = expr {
            let resolved = resolve_field_ref(project, field)
                .or_else(|_| resolve_field_ref(project, &format!("{view_name}.{field}")));
            if let Ok((v, f)) = resolved {
                if v == view_name && (f == canon || f == format!("{canon}_date") || f.starts_with(&format!("{canon}_"))) {
                    date_filters.push(expr.clone());
                    continue;
                }
            }
        }
        other.push(expr.clone());
    }
    (date_filters, other)
}

fn compile_date_filter(compiler: &mut FilterCompiler, view_name: &str, date_column: &str, expr: &FilterExpr) -> CompileResult<Expr> {
    match expr {
        FilterExpr::Leaf { expression, value, .. } => {
            compiler.compile_against_column(view_name, date_column, *expression, value)
        }
        _ => Err(CompileError::NotImplemented(
            "only leaf filters on the canonical date can be retargeted onto the date spine".to_string(),
        )),
    }
}

/// The outer stitching `ON` clause (§4.6 step 5): equality on every shared
/// dimension, plus the `date_spine` day when both sides carry one (`base`
/// has no date column, so it pairs on dimensions only). `ON 1=1` when there
/// is nothing to pair on.
fn join_condition(anchor: &str, other: &str, dim_aliases: &[String]) -> String {
    let mut parts: Vec<String> = dim_aliases
        .iter()
        .map(|alias| format!("{anchor}.{alias} = {other}.{alias}"))
        .collect();
    if let Some(anchor_prefix) = anchor.strip_prefix("aggregated_") {
        if let Some(other_prefix) = other.strip_prefix("aggregated_") {
            parts.push(format!("{anchor}.{anchor_prefix}_date = {other}.{other_prefix}_date"));
        }
    }
    if parts.is_empty() {
        "1=1".to_string()
    } else {
        parts.join(" AND ")
    }
}

fn apply_order_by(
    mut query: Query,
    order_by: &[OrderBy],
    select_items: &[SelectItem],
    dialect: Dialect,
) -> CompileResult<Query> {
    use crate::request::SortDirection;

    if !order_by.is_empty() {
        let mut exprs = Vec::with_capacity(order_by.len());
        for ob in order_by {
            let item = select_items.iter().find(|i| i.id == ob.field).ok_or_else(|| {
                CompileError::Query(format!("order_by references unselected field '{}'", ob.field))
            })?;
            let e = raw_sql(&item.alias);
            exprs.push(match ob.direction {
                SortDirection::Asc => OrderByExpr::asc(e),
                SortDirection::Desc => OrderByExpr::desc(e),
            });
        }
        query = query.order_by(exprs);
    } else if dialect.default_metric_order_by() {
        if let Some(first_metric) = select_items.first() {
            query = query.order_by(vec![OrderByExpr::desc(raw_sql(&first_metric.alias))]);
        }
    }
    Ok(query)
}
