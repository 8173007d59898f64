//! Single-query generator (§4.5): assembles one `SELECT` statement from a
//! resolved [`Design`] and a flattened list of requested metrics/dimensions.
//!
//! Reused by the cumulative planner (for its `base` CTE and per-measure
//! `subquery_<prefix>` CTEs) and the merged-results planner (one call per
//! bucket), so this module exposes both a [`build`] entry point returning
//! the assembled [`Query`] (for embedding as a CTE body) and a [`generate`]
//! entry point that renders it to a terminated SQL string.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::design::{Design, FunctionalPk};
use crate::error::{CompileError, CompileResult};
use crate::filter::{FilterCompiler, FilterExpr};
use crate::generate::alias_for;
use crate::model::expr_engine::{FieldResolver, SymmetricContext};
use crate::model::identifier::JoinType as ModelJoinType;
use crate::model::view::ViewSource;
use crate::model::Project;
use crate::request::OrderBy;
use crate::sql::dialect::{Dialect, SemanticDialectExt};
use crate::sql::expr::{raw_sql, Expr};
use crate::sql::query::{JoinType, Query, TableRef};

/// A single resolved SELECT item, kept alongside its compiled SQL so the
/// merged planner can re-key dimensions across buckets by id.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub id: String,
    pub alias: String,
    pub sql: String,
    pub is_measure: bool,
}

/// Everything the single-query generator needs beyond the design: already
/// resolved (view, field, id) triples and structured filter/order/limit
/// input (the top-level resolver has already classified and parsed these).
pub struct SingleQueryInput<'a> {
    pub dialect: Dialect,
    pub metrics: &'a [(String, String, String)],
    pub dimensions: &'a [(String, String, String)],
    pub where_filters: &'a [FilterExpr],
    pub having_filters: &'a [FilterExpr],
    pub select_raw_sql: &'a [String],
    pub order_by: &'a [OrderBy],
    pub limit: Option<u64>,
    pub reference_date: NaiveDate,
}

/// The result of building a single query: the assembled builder plus the
/// resolved SELECT items (used by the merged planner to find paired
/// dimension aliases).
pub struct BuiltQuery {
    pub query: Query,
    pub select_items: Vec<SelectItem>,
}

/// Build the `Query` for a design + flattened request, without rendering to
/// a string (so cumulative/merged can wrap it in a CTE).
pub fn build(project: &Project, design: &Design, input: &SingleQueryInput) -> CompileResult<BuiltQuery> {
    let mut resolver = FieldResolver::new(project, input.dialect);
    let mut select_items = Vec::new();
    let mut select_exprs = Vec::new();

    for (view, field, id) in input.dimensions {
        let sql = resolver.field_sql(view, field)?;
        let alias = alias_for(view, field);
        select_exprs.push(raw_sql(&format!("{sql} AS {alias}")));
        select_items.push(SelectItem {
            id: id.clone(),
            alias,
            sql,
            is_measure: false,
        });
    }

    for (view, field, id) in input.metrics {
        let symmetric = symmetric_context(project, &mut resolver, design, view)?;
        let sql = resolver.measure_expr(view, field, symmetric.as_ref())?;
        let alias = alias_for(view, field);
        select_exprs.push(raw_sql(&format!("{sql} AS {alias}")));
        select_items.push(SelectItem {
            id: id.clone(),
            alias,
            sql,
            is_measure: true,
        });
    }

    for raw in input.select_raw_sql {
        let sql = resolver.interpolate_text(&design.base_view, raw)?;
        select_exprs.push(raw_sql(&sql));
    }

    if select_exprs.is_empty() {
        return Err(CompileError::Query("request selects no fields".to_string()));
    }

    let mut query = build_from_and_joins(project, design, &mut resolver)?.select(select_exprs);

    let mut where_conditions: Vec<Expr> = always_filter_conditions(project, design, &mut resolver)?;

    let mut filter_compiler = FilterCompiler::new(project, input.dialect, input.reference_date);
    let where_compiled = filter_compiler.compile(input.where_filters, &design.base_view)?;
    let having_compiled = filter_compiler.compile(input.having_filters, &design.base_view)?;
    where_conditions.extend(where_compiled.where_conditions);
    where_conditions.extend(having_compiled.where_conditions);

    if let Some(expr) = combine_and(where_conditions) {
        query = query.filter(expr);
    }

    if !design.no_group_by && !input.dimensions.is_empty() {
        let group_exprs = select_items
            .iter()
            .filter(|i| !i.is_measure)
            .map(|i| raw_sql(&i.sql))
            .collect();
        query = query.group_by(group_exprs);
    }

    let mut having_conditions = where_compiled.having_conditions;
    having_conditions.extend(having_compiled.having_conditions);
    if let Some(expr) = combine_and(having_conditions) {
        query = query.having(expr);
    }

    query = apply_order_by(query, input.order_by, &select_items, input.dialect)?;

    if let Some(limit) = input.limit {
        query = query.limit(limit);
    }

    Ok(BuiltQuery { query, select_items })
}

/// Build and render a full, terminated SQL statement (§4.5, §6 Output).
pub fn generate(
    project: &Project,
    design: &Design,
    input: &SingleQueryInput,
    terminate_with_semicolon: bool,
) -> CompileResult<String> {
    let built = build(project, design, input)?;
    Ok(render(&built.query, input.dialect, terminate_with_semicolon))
}

/// Render a built `Query` to a SQL string, applying the dialect's semicolon
/// policy (§4.5 "Semicolon": Druid never terminates).
pub fn render(query: &Query, dialect: Dialect, terminate_with_semicolon: bool) -> String {
    let mut sql = query.to_sql(dialect);
    if terminate_with_semicolon && dialect.terminates_with_semicolon() {
        sql.push(';');
    }
    sql
}

/// The `FROM <base> JOIN ...` skeleton shared by the single-query builder
/// and the cumulative planner's `subquery_<prefix>` CTEs (§4.6 step 2): same
/// design, same joins, just a different SELECT/aggregation on top.
pub(crate) fn build_from_and_joins(project: &Project, design: &Design, resolver: &mut FieldResolver) -> CompileResult<Query> {
    let base_view = project
        .view(&design.base_view)
        .ok_or_else(|| CompileError::AccessDenied(design.base_view.clone()))?;

    let mut query = Query::new().from(table_ref(base_view.table_expr(), &base_view.source, &design.base_view));

    for step in &design.joins {
        let view = project
            .view(&step.view)
            .ok_or_else(|| CompileError::AccessDenied(step.view.clone()))?;
        let on = match &step.custom_sql_on {
            Some(raw) => resolver.interpolate_text(&step.view, raw)?,
            None => {
                let parent_col = identifier_column_sql(project, resolver, &step.parent, &step.identifier_name)?;
                let child_col = identifier_column_sql(project, resolver, &step.view, &step.identifier_name)?;
                format!("{parent_col} = {child_col}")
            }
        };
        query = query.join(
            map_join_type(step.join_type),
            table_ref(view.table_expr(), &view.source, &step.view),
            raw_sql(&on),
        );
    }

    Ok(query)
}

/// Every view's `always_filter`, compiled against the views a design
/// actually touches (§3 View: "always_filter").
pub(crate) fn always_filter_conditions(project: &Project, design: &Design, resolver: &mut FieldResolver) -> CompileResult<Vec<Expr>> {
    let mut conditions = Vec::new();
    for touched in std::iter::once(&design.base_view).chain(design.joins.iter().map(|j| &j.view)) {
        let view = project.view(touched).ok_or_else(|| CompileError::AccessDenied(touched.clone()))?;
        if let Some(always_filter) = &view.always_filter {
            let sql = resolver.interpolate_text(touched, always_filter)?;
            conditions.push(raw_sql(&sql));
        }
    }
    Ok(conditions)
}

pub(crate) fn table_ref(table_expr: &str, source: &ViewSource, alias: &str) -> TableRef {
    let raw = match source {
        ViewSource::Table(_) => table_expr.to_string(),
        ViewSource::DerivedTable(sql) => format!("({sql})"),
    };
    TableRef::raw(&raw).with_alias(alias)
}

fn map_join_type(t: ModelJoinType) -> JoinType {
    match t {
        ModelJoinType::LeftOuter => JoinType::Left,
        ModelJoinType::Inner => JoinType::Inner,
        ModelJoinType::FullOuter => JoinType::Full,
        ModelJoinType::Cross => JoinType::Cross,
    }
}

/// Column SQL for a join identifier: the matching field's compiled SQL if
/// the view declares a field of that name, else the bare `view.identifier`
/// column reference (the common case where the identifier name is itself
/// the physical join column, §3 Identifier).
fn identifier_column_sql(
    project: &Project,
    resolver: &mut FieldResolver,
    view_name: &str,
    identifier_name: &str,
) -> CompileResult<String> {
    let view = project.view(view_name).ok_or_else(|| CompileError::AccessDenied(view_name.to_string()))?;
    if view.field(identifier_name).is_some() {
        resolver.field_sql(view_name, identifier_name)
    } else {
        Ok(format!("{view_name}.{identifier_name}"))
    }
}

/// Build the [`SymmetricContext`] for a measure homed on `measure_view`,
/// `None` when the design's join plan doesn't fan out that view (§4.1,
/// §4.3 step 4).
pub fn symmetric_context(
    project: &Project,
    resolver: &mut FieldResolver,
    design: &Design,
    measure_view: &str,
) -> CompileResult<Option<SymmetricContext>> {
    if design.functional_pk == FunctionalPk::BasePrimaryKey {
        return Ok(None);
    }
    let needs_wrapping = design.fan_out_views.contains(measure_view);
    if !needs_wrapping {
        return Ok(None);
    }
    let home_view = project
        .view(measure_view)
        .ok_or_else(|| CompileError::AccessDenied(measure_view.to_string()))?;
    let pk_field = home_view.primary_key_field().ok_or_else(|| {
        CompileError::Query(format!(
            "view '{measure_view}' has a fan-out join but no primary key to hash for symmetric aggregation"
        ))
    })?;
    let primary_key_sql = resolver.field_sql(measure_view, &pk_field.name)?;
    Ok(Some(SymmetricContext {
        primary_key_sql,
        needs_wrapping: true,
    }))
}

pub(crate) fn combine_and(conditions: Vec<Expr>) -> Option<Expr> {
    let mut it = conditions.into_iter();
    let first = it.next()?;
    Some(it.fold(first, |acc, next| acc.and(next)))
}

fn apply_order_by(
    mut query: Query,
    order_by: &[OrderBy],
    select_items: &[SelectItem],
    dialect: Dialect,
) -> CompileResult<Query> {
    use crate::request::SortDirection;
    use crate::sql::query::OrderByExpr;

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
        if let Some(first_metric) = select_items.iter().find(|i| i.is_measure) {
            query = query.order_by(vec![crate::sql::query::OrderByExpr::desc(raw_sql(&first_metric.alias))]);
        }
    }
    Ok(query)
}

/// Every view touched by a built design (base + joins), used by the
/// cumulative/merged planners to scope `always_filter`/access checks.
pub fn views_touched(design: &Design) -> HashSet<String> {
    design.views_used.clone()
}
