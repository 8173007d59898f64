//! Field & expression engine (§4.1): `${...}`/`${TABLE}` interpolation,
//! dimension-group SQL emission, measure aggregate wrapping and symmetric
//! aggregates.
//!
//! `sql`/`sql_start`/`sql_end` on a field are opaque text containing
//! `${view.field}`, `${field}` (current view) and `${TABLE}` references.
//! This engine resolves those references to the target's compiled SQL (or
//! the view's alias for `${TABLE}`), recursively, with cycle detection and
//! per-`(field_id, dialect)` memoization (§9 design note).

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::model::field::{
    DimensionGroupKind, FieldType, MeasureType, TimeDatatype, Timeframe,
};
use crate::model::Project;
use crate::sql::dialect::{Dialect, SemanticDialectExt};

static REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?|TABLE)\}").unwrap());

/// Bare field names referenced by `raw` via `${field}` (same-view only;
/// `${view.field}` and `${TABLE}` references don't participate in a
/// same-view `sql` cycle check). Used by `model::validate`.
pub fn referenced_field_names(raw: &str) -> Vec<String> {
    REF_RE
        .captures_iter(raw)
        .filter_map(|cap| {
            let reference = cap.get(1)?.as_str();
            if reference == "TABLE" || reference.contains('.') {
                None
            } else {
                Some(reference.to_string())
            }
        })
        .collect()
}

/// The home view's functional primary key, threaded into the measure
/// wrapper so it can decide whether (and how) to apply a symmetric
/// aggregate (§4.1, §4.3 step 4).
#[derive(Debug, Clone)]
pub struct SymmetricContext {
    /// Compiled SQL for the primary key column on the measure's home view.
    pub primary_key_sql: String,
    /// True when the design's join plan fans out rows of this measure's
    /// home view (so plain `SUM`/`AVG`/`COUNT` would double count).
    pub needs_wrapping: bool,
}

/// Resolves `${...}` references and emits field SQL, memoizing per
/// `(field_id, dialect)` within a single compilation.
pub struct FieldResolver<'p> {
    project: &'p Project,
    dialect: Dialect,
    memo: HashMap<String, String>,
    visiting: HashSet<String>,
}

impl<'p> FieldResolver<'p> {
    pub fn new(project: &'p Project, dialect: Dialect) -> Self {
        Self {
            project,
            dialect,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    pub fn project(&self) -> &'p Project {
        self.project
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Interpolate a standalone `${...}` string that isn't a declared
    /// field's `sql` (e.g. a literal filter or an `always_filter`), relative
    /// to `current_view` for bare `${field}` references (§4.4 "Literal
    /// filters").
    pub fn interpolate_text(&mut self, current_view: &str, raw: &str) -> CompileResult<String> {
        self.interpolate(current_view, raw)
    }

    /// Resolve the base (non-aggregated) SQL for `view.field`: for a
    /// dimension, its `sql`; for a time/duration dimension_group timeframe
    /// (`field` may be `<group>_<timeframe>`), the matching fragment; for a
    /// measure, its un-aggregated source expression.
    pub fn field_sql(&mut self, view_name: &str, field_name: &str) -> CompileResult<String> {
        let memo_key = format!("{view_name}.{field_name}");
        if let Some(sql) = self.memo.get(&memo_key) {
            return Ok(sql.clone());
        }
        if !self.visiting.insert(memo_key.clone()) {
            return Err(CompileError::Query(format!(
                "circular field reference involving '{memo_key}'"
            )));
        }

        let sql = self.compute_field_sql(view_name, field_name)?;

        self.visiting.remove(&memo_key);
        self.memo.insert(memo_key, sql.clone());
        Ok(sql)
    }

    fn compute_field_sql(&mut self, view_name: &str, field_name: &str) -> CompileResult<String> {
        let view = self.project.view(view_name).ok_or_else(|| {
            CompileError::AccessDenied(view_name.to_string())
        })?;

        if let Some(field) = view.field(field_name) {
            return match &field.field_type {
                FieldType::Dimension { sql, .. } => self.interpolate(view_name, sql),
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Time(t),
                } => {
                    // Bare reference to the group name means the `raw` timeframe.
                    self.time_timeframe_sql(view_name, t, Timeframe::Raw)
                }
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Duration(_),
                } => Err(CompileError::Query(format!(
                    "'{view_name}.{field_name}' is a duration dimension_group; reference a specific interval"
                ))),
                FieldType::Measure(m) => {
                    let base = m
                        .sql
                        .clone()
                        .unwrap_or_else(|| format!("${{{field_name}}}"));
                    self.interpolate(view_name, &base)
                }
            };
        }

        // Not a declared field verbatim: try `<group>_<timeframe>` or
        // `<group>_<interval>` expansion.
        for (fname, field) in &view.fields {
            match &field.field_type {
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Time(t),
                } => {
                    for tf in &t.timeframes {
                        if format!("{fname}_{}", tf.name()) == field_name {
                            return self.time_timeframe_sql(view_name, t, *tf);
                        }
                    }
                }
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Duration(d),
                } => {
                    for unit in &d.intervals {
                        if format!("{fname}_{}", unit.name()) == field_name {
                            return self.duration_sql(view_name, d, *unit);
                        }
                    }
                }
                _ => {}
            }
        }

        Err(CompileError::AccessDenied(format!(
            "{view_name}.{field_name}"
        )))
    }

    /// Replace every `${...}` reference in `raw` with the target's compiled
    /// SQL (or the view alias for `${TABLE}`).
    fn interpolate(&mut self, current_view: &str, raw: &str) -> CompileResult<String> {
        // Collect replacements first (can't mutate self while borrowing the
        // regex captures iterator over `raw`).
        let mut replacements: Vec<(String, String, bool)> = Vec::new();
        for cap in REF_RE.captures_iter(raw) {
            let token = cap.get(0).unwrap().as_str().to_string();
            let reference = cap.get(1).unwrap().as_str();
            if replacements.iter().any(|(t, _, _)| t == &token) {
                continue;
            }
            let (replacement, is_table) = if reference == "TABLE" {
                (current_view.to_string(), true)
            } else if let Some((v, f)) = reference.split_once('.') {
                (self.field_sql(v, f)?, false)
            } else {
                (self.field_sql(current_view, reference)?, false)
            };
            replacements.push((token, replacement, is_table));
        }

        let mut out = raw.to_string();
        for (token, replacement, is_table) in replacements {
            // `${TABLE}` stands for a bare table alias, not a value
            // expression: wrapping it in parens would turn `${TABLE}.col`
            // into the invalid `(alias).col`. Only field/measure
            // replacements need the parens to stay a single syntactic unit
            // when substituted into a larger expression.
            let replaced = if is_table {
                replacement
            } else {
                format!("({replacement})")
            };
            out = out.replace(&token, &replaced);
        }
        Ok(out)
    }

    fn time_timeframe_sql(
        &mut self,
        view_name: &str,
        t: &crate::model::field::TimeDimensionGroup,
        timeframe: Timeframe,
    ) -> CompileResult<String> {
        let raw = self.interpolate(view_name, &t.sql)?;
        let raw = if t.convert_timezone {
            self.apply_timezone(&raw, t.datatype)
        } else {
            raw
        };

        Ok(match timeframe {
            Timeframe::Raw => raw,
            Timeframe::Time => self.dialect.cast_expr(&raw, "TIMESTAMP"),
            Timeframe::Date | Timeframe::Month | Timeframe::Quarter | Timeframe::Year => {
                self.date_trunc(&raw, timeframe)
            }
            Timeframe::Week => self.week_trunc(view_name, &raw),
            Timeframe::DayOfWeek => self.dialect.day_of_week(&raw),
            Timeframe::DayOfMonth => self.dialect.day_of_month(&raw),
            Timeframe::HourOfDay => self.dialect.hour_of_day(&raw),
        })
    }

    fn apply_timezone(&self, raw: &str, datatype: TimeDatatype) -> String {
        let tz = &self.project.timezone;
        self.dialect.convert_timezone(raw, tz, datatype)
    }

    fn date_trunc(&self, raw: &str, timeframe: Timeframe) -> String {
        let unit = timeframe.trunc_unit().unwrap_or("DAY");
        self.dialect.date_trunc(unit, raw)
    }

    fn week_trunc(&self, view_name: &str, raw: &str) -> String {
        // Honor week_start_day (default Monday): DATE_TRUNC('WEEK', ...) is
        // ISO (Monday-start) in every supported dialect, so non-Monday
        // starts shift by the day offset (§4.1). A view's own
        // week_start_day overrides the project-wide default (§9 Open
        // Question).
        let start = self
            .project
            .view(view_name)
            .and_then(|v| v.week_start_day)
            .unwrap_or(self.project.week_start_day);
        let offset = (start.num_days_from_monday() as i64 + 6) % 7 + 1;
        if offset == 1 {
            self.dialect.date_trunc("WEEK", raw)
        } else {
            let shifted = format!("{raw} + INTERVAL '{} day'", offset - 1);
            let trunc = self.dialect.date_trunc("WEEK", &shifted);
            format!("{trunc} - INTERVAL '{} day'", offset - 1)
        }
    }

    fn duration_sql(
        &mut self,
        view_name: &str,
        d: &crate::model::field::DurationDimensionGroup,
        unit: crate::model::field::DurationUnit,
    ) -> CompileResult<String> {
        let start = self.interpolate(view_name, &d.sql_start)?;
        let end = self.interpolate(view_name, &d.sql_end)?;
        Ok(self.dialect.date_diff(unit, &start, &end))
    }

    /// Emit the fully aggregate-wrapped expression for a measure, applying
    /// symmetric-aggregate wrapping when `symmetric` demands it (§4.1).
    pub fn measure_expr(
        &mut self,
        view_name: &str,
        field_name: &str,
        symmetric: Option<&SymmetricContext>,
    ) -> CompileResult<String> {
        let view = self.project.view(view_name).ok_or_else(|| {
            CompileError::AccessDenied(view_name.to_string())
        })?;
        let field = view.field(field_name).ok_or_else(|| {
            CompileError::AccessDenied(format!("{view_name}.{field_name}"))
        })?;
        let m = field.measure_spec().ok_or_else(|| {
            CompileError::Query(format!("'{view_name}.{field_name}' is not a measure"))
        })?;

        match m.measure_type {
            MeasureType::Count => Ok(self.wrap_count(symmetric)),
            MeasureType::CountDistinct => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(format!("COUNT(DISTINCT {inner})"))
            }
            MeasureType::Sum => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(self.wrap_sum(&inner, symmetric))
            }
            MeasureType::Average => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(self.wrap_average(&inner, symmetric))
            }
            MeasureType::Median => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(self.dialect.median(&inner))
            }
            MeasureType::Max => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(format!("MAX({inner})"))
            }
            MeasureType::Min => {
                let inner = self.field_sql(view_name, field_name)?;
                Ok(format!("MIN({inner})"))
            }
            MeasureType::Number => {
                // Recursive expansion of `sql` with inner measure references
                // kept aggregated (§4.1): substitute `${view.measure}` with
                // that measure's *aggregated* expression, not its raw sql.
                let raw = m.sql.clone().unwrap_or_default();
                self.interpolate_number(view_name, &raw, symmetric)
            }
            MeasureType::Cumulative => {
                // The cumulative planner (§4.6) emits this measure's
                // aggregate inside its own CTE; outside that context it
                // resolves to its referenced measure's plain aggregate.
                let referenced = m.measure_ref.clone().ok_or_else(|| {
                    CompileError::Query(format!(
                        "cumulative measure '{view_name}.{field_name}' has no measure_ref"
                    ))
                })?;
                self.measure_expr(view_name, &referenced, symmetric)
            }
        }
    }

    fn interpolate_number(
        &mut self,
        current_view: &str,
        raw: &str,
        symmetric: Option<&SymmetricContext>,
    ) -> CompileResult<String> {
        let mut replacements: Vec<(String, String, bool)> = Vec::new();
        for cap in REF_RE.captures_iter(raw) {
            let token = cap.get(0).unwrap().as_str().to_string();
            let reference = cap.get(1).unwrap().as_str();
            if replacements.iter().any(|(t, _, _)| t == &token) {
                continue;
            }
            let (replacement, is_table) = if reference == "TABLE" {
                (current_view.to_string(), true)
            } else {
                let (v, f) = match reference.split_once('.') {
                    Some((v, f)) => (v, f),
                    None => (current_view, reference),
                };
                let is_measure = self
                    .project
                    .view(v)
                    .and_then(|view| view.field(f))
                    .map(|field| field.is_measure())
                    .unwrap_or(false);
                let sql = if is_measure {
                    self.measure_expr(v, f, symmetric)?
                } else {
                    self.field_sql(v, f)?
                };
                (sql, false)
            };
            replacements.push((token, replacement, is_table));
        }

        let mut out = raw.to_string();
        for (token, replacement, is_table) in replacements {
            let replaced = if is_table {
                replacement
            } else {
                format!("({replacement})")
            };
            out = out.replace(&token, &replaced);
        }
        Ok(out)
    }

    fn wrap_count(&self, symmetric: Option<&SymmetricContext>) -> String {
        match symmetric.filter(|s| s.needs_wrapping) {
            Some(s) => format!("COUNT(DISTINCT {})", s.primary_key_sql),
            None => "COUNT(*)".to_string(),
        }
    }

    fn wrap_sum(&self, inner: &str, symmetric: Option<&SymmetricContext>) -> String {
        match symmetric.filter(|s| s.needs_wrapping) {
            Some(s) => self.dialect.symmetric_sum(inner, &s.primary_key_sql),
            None => format!("SUM({inner})"),
        }
    }

    fn wrap_average(&self, inner: &str, symmetric: Option<&SymmetricContext>) -> String {
        match symmetric.filter(|s| s.needs_wrapping) {
            Some(s) => {
                let sum = self.dialect.symmetric_sum(inner, &s.primary_key_sql);
                let count = format!("COUNT(DISTINCT {})", s.primary_key_sql);
                format!("(({sum}) / NULLIF({count}, 0))")
            }
            None => format!("AVG({inner})"),
        }
    }
}
