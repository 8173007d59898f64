//! Shared SELECT-list / alias / field-reference helpers used by all three
//! generators (single, cumulative, merged).

pub mod cumulative;
pub mod merged;
pub mod single;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::model::field::{MeasureSpec, MeasureType};
use crate::model::Project;

/// `view_field` aliasing rule: dots replaced by underscores (§4.5 SELECT
/// rules).
pub fn alias_for(view: &str, field: &str) -> String {
    format!("{view}_{field}").replace('.', "_")
}

/// Resolve a request field id (`view.field`, `view.field_timeframe`, or a
/// bare name unambiguous across the project) to its owning view and field
/// name (§6: "Field IDs are either bare names (unambiguous only) or
/// view.field / view.field_timeframe").
pub fn resolve_field_ref(project: &Project, id: &str) -> CompileResult<(String, String)> {
    if let Some((view, field)) = id.split_once('.') {
        if !project.views.contains_key(view) {
            return Err(CompileError::AccessDenied(id.to_string()));
        }
        if !field_exists(project, view, field) {
            return Err(CompileError::AccessDenied(id.to_string()));
        }
        return Ok((view.to_string(), field.to_string()));
    }

    let matches: Vec<&str> = project
        .view_names_sorted()
        .into_iter()
        .filter(|v| field_exists(project, v, id))
        .collect();

    match matches.len() {
        0 => Err(CompileError::AccessDenied(id.to_string())),
        1 => Ok((matches[0].to_string(), id.to_string())),
        _ => Err(CompileError::Query(format!(
            "field '{id}' is ambiguous across views: {}",
            matches.join(", ")
        ))),
    }
}

pub(crate) fn field_exists(project: &Project, view: &str, field: &str) -> bool {
    let Some(view) = project.view(view) else {
        return false;
    };
    if view.fields.contains_key(field) {
        return true;
    }
    view.fields
        .values()
        .any(|f| f.is_dimension_group() && f.expand_timeframes().iter().any(|n| n == field))
}

/// The canonical date field name for a measure: its own `canon_date` if
/// declared, else the home view's `default_date` (§3, §4.7 step 1).
pub fn canon_date_field(project: &Project, view_name: &str, field_name: &str) -> CompileResult<Option<String>> {
    let view = project.view(view_name).ok_or_else(|| CompileError::AccessDenied(view_name.to_string()))?;
    if let Some(canon) = view
        .field(field_name)
        .and_then(|f| f.measure_spec())
        .and_then(|m| m.canon_date.clone())
    {
        return Ok(Some(canon));
    }
    Ok(view.default_date.clone())
}

/// Every view referenced, directly or via a filter, by a set of field ids.
pub fn views_of(project: &Project, ids: &[String]) -> CompileResult<HashSet<String>> {
    let mut out = HashSet::new();
    for id in ids {
        let (view, _) = resolve_field_ref(project, id)?;
        out.insert(view);
    }
    Ok(out)
}

static REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?|TABLE)\}").unwrap());

/// Referenced measures inside a `number`/`cumulative`-wrapping measure's
/// `sql` (`${view.measure}` or `${measure}` relative to `home_view`), used
/// both to decompose merged metrics (§4.7 step 1) and to detect a `number`
/// metric that transitively wraps a cumulative measure (§4.6).
pub fn referenced_measures(spec: &MeasureSpec, home_view: &str) -> Vec<(String, String)> {
    let raw = spec.sql.clone().unwrap_or_default();
    let mut out = Vec::new();
    for cap in REF_RE.captures_iter(&raw) {
        let reference = cap.get(1).unwrap().as_str();
        if reference == "TABLE" {
            continue;
        }
        let (v, f) = match reference.split_once('.') {
            Some((v, f)) => (v.to_string(), f.to_string()),
            None => (home_view.to_string(), reference.to_string()),
        };
        if !out.contains(&(v.clone(), f.clone())) {
            out.push((v, f));
        }
    }
    out
}

/// Whether a measure is `cumulative` directly, or a `number` measure that
/// transitively references one (§4.6: "Active when any requested metric is
/// typed `cumulative` (or is a `number` metric whose `sql` references a
/// cumulative measure)"). Cycle-safe: a reference chain revisiting a field
/// is treated as non-cumulative rather than looping.
pub fn measure_is_cumulative(project: &Project, view: &str, field: &str) -> bool {
    let mut seen = HashSet::new();
    measure_is_cumulative_inner(project, view, field, &mut seen)
}

fn measure_is_cumulative_inner(
    project: &Project,
    view: &str,
    field: &str,
    seen: &mut HashSet<(String, String)>,
) -> bool {
    if !seen.insert((view.to_string(), field.to_string())) {
        return false;
    }
    let Some(spec) = project.view(view).and_then(|v| v.field(field)).and_then(|f| f.measure_spec()) else {
        return false;
    };
    match spec.measure_type {
        MeasureType::Cumulative => true,
        MeasureType::Number => referenced_measures(spec, view)
            .iter()
            .any(|(rv, rf)| measure_is_cumulative_inner(project, rv, rf, seen)),
        _ => false,
    }
}
