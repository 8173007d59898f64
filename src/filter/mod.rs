//! The filter compiler (§4.4): turns a [`FilterExpr`] tree into a SQL
//! boolean expression, routing measure-backed leaves to `HAVING` and
//! everything else to `WHERE`.

pub mod date_match;
pub mod expression;

pub use expression::{FilterExpr, FilterOperator, FilterValue, LogicalOperator};

use chrono::NaiveDate;

use crate::error::{CompileError, CompileResult};
use crate::model::expr_engine::FieldResolver;
use crate::model::field::{DimensionGroupKind, DimensionType, FieldType, TimeDatatype};
use crate::model::Project;
use crate::sql::dialect::{Dialect, SemanticDialectExt};
use crate::sql::expr::{raw_sql, Expr, ExprExt};

/// Split of a filter tree's compiled conditions into the clauses they
/// belong in (§4.4: "measure-backed conditions route to HAVING").
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    pub where_conditions: Vec<Expr>,
    pub having_conditions: Vec<Expr>,
}

impl CompiledFilter {
    pub fn where_expr(&self) -> Option<Expr> {
        combine(&self.where_conditions)
    }

    pub fn having_expr(&self) -> Option<Expr> {
        combine(&self.having_conditions)
    }
}

fn combine(conditions: &[Expr]) -> Option<Expr> {
    let mut it = conditions.iter().cloned();
    let first = it.next()?;
    Some(it.fold(first, |acc, next| acc.and(next)))
}

/// Every field id (`view.field` or bare) referenced by a filter tree, used
/// by the resolver to compute the design's `required_views` (§4.8).
pub fn referenced_field_ids(expr: &FilterExpr) -> Vec<String> {
    let mut out = Vec::new();
    collect_referenced(expr, &mut out);
    out
}

fn collect_referenced(expr: &FilterExpr, out: &mut Vec<String>) {
    match expr {
        FilterExpr::Leaf { field, .. } => out.push(field.clone()),
        FilterExpr::Literal(raw) => {
            for cap in LITERAL_REF_RE.captures_iter(raw) {
                let reference = cap.get(1).unwrap().as_str();
                if reference != "TABLE" {
                    out.push(reference.to_string());
                }
            }
        }
        FilterExpr::Group { conditions, .. } => {
            for c in conditions {
                collect_referenced(c, out);
            }
        }
    }
}

static LITERAL_REF_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?|TABLE)\}").unwrap());

pub struct FilterCompiler<'p> {
    resolver: FieldResolver<'p>,
    reference_date: NaiveDate,
}

impl<'p> FilterCompiler<'p> {
    pub fn new(project: &'p Project, dialect: crate::sql::dialect::Dialect, reference_date: NaiveDate) -> Self {
        Self {
            resolver: FieldResolver::new(project, dialect),
            reference_date,
        }
    }

    /// Compile a top-level list of filter expressions (implicitly ANDed,
    /// §4.4), splitting into WHERE and HAVING buckets.
    pub fn compile(&mut self, exprs: &[FilterExpr], default_view: &str) -> CompileResult<CompiledFilter> {
        let mut out = CompiledFilter::default();
        for expr in exprs {
            let (is_measure, compiled) = self.compile_expr(expr, default_view)?;
            if is_measure {
                out.having_conditions.push(compiled);
            } else {
                out.where_conditions.push(compiled);
            }
        }
        Ok(out)
    }

    /// Returns `(homed_on_a_measure, compiled_expression)`. A `Group`'s
    /// classification is "measure" if *any* leaf inside references a
    /// measure, so a mixed and/or group still lands in HAVING as a whole
    /// (§4.4: conditions cannot be split mid-group across WHERE/HAVING).
    fn compile_expr(&mut self, expr: &FilterExpr, default_view: &str) -> CompileResult<(bool, Expr)> {
        match expr {
            FilterExpr::Literal(raw) => {
                let sql = self.resolver.interpolate_text(default_view, raw)?;
                Ok((false, raw_sql(&sql)))
            }
            FilterExpr::Leaf { field, expression, value } => self.compile_leaf(field, *expression, value, default_view),
            FilterExpr::Group { logical_operator, conditions } => {
                let mut is_measure = false;
                let mut compiled = Vec::with_capacity(conditions.len());
                for c in conditions {
                    let (m, e) = self.compile_expr(c, default_view)?;
                    is_measure |= m;
                    compiled.push(e);
                }
                let combined = match logical_operator {
                    LogicalOperator::And => combine(&compiled),
                    LogicalOperator::Or => {
                        let mut it = compiled.into_iter();
                        it.next().map(|first| it.fold(first, |acc, next| acc.or(next)))
                    }
                };
                let combined = combined.ok_or_else(|| {
                    CompileError::Parse("filter group has no conditions".to_string())
                })?;
                Ok((is_measure, Expr::Paren(Box::new(combined))))
            }
        }
    }

    fn is_measure_field(&self, view: &str, field: &str) -> bool {
        self.resolver
            .project()
            .view(view)
            .and_then(|v| v.field(field))
            .map(|f| f.is_measure())
            .unwrap_or(false)
    }

    fn compile_leaf(
        &mut self,
        field: &str,
        op: FilterOperator,
        value: &FilterValue,
        default_view: &str,
    ) -> CompileResult<(bool, Expr)> {
        if op.is_funnel_only() {
            return Err(CompileError::NotImplemented(
                "funnel filter expressions (converted/dropped_off) have no funnel planner".to_string(),
            ));
        }

        let (view, field_name) = crate::generate::resolve_field_ref(self.resolver.project(), field)
            .or_else(|_| crate::generate::resolve_field_ref(self.resolver.project(), &format!("{default_view}.{field}")))?;
        let is_measure = self.is_measure_field(&view, &field_name);
        let column_sql = if is_measure {
            self.resolver.measure_expr(&view, &field_name, None)?
        } else {
            self.resolver.field_sql(&view, &field_name)?
        };
        let (op, value) = self.normalize_yesno(&view, &field_name, op, value);
        let cast_hint = self.cast_hint(&view, &field_name);
        let expr = self.compile_against_column_impl(&view, &column_sql, op, &value, cast_hint)?;
        Ok((is_measure, expr))
    }

    /// Apply a filter operator against an already-compiled column SQL
    /// fragment, with no dialect-cast hint for value substitution. Exposed
    /// to the cumulative planner, which re-targets a WHERE on a view's
    /// default date against `date_spine`'s date column instead (§4.6 step 3:
    /// "WHEREs on the default date become HAVING on `date_spine.date`").
    pub(crate) fn compile_against_column(&mut self, view_name: &str, column_sql: &str, op: FilterOperator, value: &FilterValue) -> CompileResult<Expr> {
        self.compile_against_column_impl(view_name, column_sql, op, value, None)
    }

    fn compile_against_column_impl(
        &mut self,
        view_name: &str,
        column_sql: &str,
        op: FilterOperator,
        value: &FilterValue,
        cast_hint: Option<&'static str>,
    ) -> CompileResult<Expr> {
        if op.is_funnel_only() {
            return Err(CompileError::NotImplemented(
                "funnel filter expressions (converted/dropped_off) have no funnel planner".to_string(),
            ));
        }
        let column = raw_sql(column_sql);

        let expr = match op {
            FilterOperator::EqualTo => column.eq(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::NotEqualTo => column.ne(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::LessThan => column.lt(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::LessOrEqualThan => column.lte(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::GreaterThan => column.gt(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::GreaterOrEqualThan => column.gte(self.value_expr(view_name, cast_hint, value)?),
            FilterOperator::Contains => column.like_escape(Self::like_pattern(value, true, true), '\\'),
            FilterOperator::DoesNotContain => column.not_like_escape(Self::like_pattern(value, true, true), '\\'),
            FilterOperator::ContainsCaseInsensitive => {
                Self::upper(column).like_escape(Self::like_pattern_upper(value, true, true), '\\')
            }
            FilterOperator::DoesNotContainCaseInsensitive => {
                Self::upper(column).not_like_escape(Self::like_pattern_upper(value, true, true), '\\')
            }
            FilterOperator::StartsWith => column.like_escape(Self::like_pattern(value, false, true), '\\'),
            FilterOperator::DoesNotStartWith => column.not_like_escape(Self::like_pattern(value, false, true), '\\'),
            FilterOperator::EndsWith => column.like_escape(Self::like_pattern(value, true, false), '\\'),
            FilterOperator::DoesNotEndWith => column.not_like_escape(Self::like_pattern(value, true, false), '\\'),
            FilterOperator::StartsWithCaseInsensitive => {
                Self::upper(column).like_escape(Self::like_pattern_upper(value, false, true), '\\')
            }
            FilterOperator::DoesNotStartWithCaseInsensitive => {
                Self::upper(column).not_like_escape(Self::like_pattern_upper(value, false, true), '\\')
            }
            FilterOperator::EndsWithCaseInsensitive => {
                Self::upper(column).like_escape(Self::like_pattern_upper(value, true, false), '\\')
            }
            FilterOperator::DoesNotEndWithCaseInsensitive => {
                Self::upper(column).not_like_escape(Self::like_pattern_upper(value, true, false), '\\')
            }
            FilterOperator::IsNull => column.is_null(),
            FilterOperator::IsNotNull => column.is_not_null(),
            FilterOperator::BooleanTrue => column.eq(crate::sql::expr::lit_bool(true)),
            FilterOperator::BooleanFalse => column.eq(crate::sql::expr::lit_bool(false)),
            FilterOperator::IsIn => {
                let values = match value {
                    FilterValue::List(items) => items
                        .iter()
                        .map(|v| self.value_expr(view_name, cast_hint, v))
                        .collect::<CompileResult<Vec<_>>>()?,
                    other => vec![self.value_expr(view_name, cast_hint, other)?],
                };
                column.in_list(values)
            }
            FilterOperator::Matches => {
                let phrase = value.as_str().ok_or_else(|| {
                    CompileError::Parse("'matches' requires a string value".to_string())
                })?;
                let week_start_day = self
                    .resolver
                    .project()
                    .view(view_name)
                    .and_then(|v| v.week_start_day)
                    .unwrap_or(self.resolver.project().week_start_day);
                let (start, end) = date_match::resolve(phrase, self.reference_date, week_start_day)?;
                let start_lit = crate::sql::expr::lit_str(&start.format("%Y-%m-%dT%H:%M:%S").to_string());
                let end_lit = crate::sql::expr::lit_str(&end.format("%Y-%m-%dT%H:%M:%S").to_string());
                column.clone().gte(start_lit).and(column.lte(end_lit))
            }
            FilterOperator::Converted | FilterOperator::DroppedOff => unreachable!("handled above"),
        };

        Ok(expr)
    }

    /// Rewrite an `equal_to`/`not_equal_to`-style comparison of a `yesno`
    /// dimension against the string `"True"`/`"False"` into the dedicated
    /// `boolean_true`/`boolean_false` operators (§4.4 "Value substitution").
    fn normalize_yesno(&self, view: &str, field: &str, op: FilterOperator, value: &FilterValue) -> (FilterOperator, FilterValue) {
        let is_yesno = self
            .resolver
            .project()
            .view(view)
            .and_then(|v| v.field(field))
            .map(|f| matches!(&f.field_type, FieldType::Dimension { dimension_type: DimensionType::Yesno, .. }))
            .unwrap_or(false);
        if is_yesno {
            if let FilterValue::String(s) = value {
                match s.to_ascii_lowercase().as_str() {
                    "true" => return (FilterOperator::BooleanTrue, FilterValue::Bool(true)),
                    "false" => return (FilterOperator::BooleanFalse, FilterValue::Bool(false)),
                    _ => {}
                }
            }
        }
        (op, value.clone())
    }

    /// Whether a value substituted against `field` needs an explicit
    /// `CAST(... AS <datatype>)` wrapper on this dialect (§4.4: "when the
    /// target dialect needs casts (e.g., Redshift on dates)"). Redshift's
    /// query planner doesn't always coerce a joined-in date expression
    /// against another field's SQL without an explicit cast.
    fn cast_hint(&self, view: &str, field: &str) -> Option<&'static str> {
        if self.resolver.dialect() != Dialect::Redshift {
            return None;
        }
        let datatype = self.resolver.project().view(view)?.time_dimension_group_for(field)?.0;
        let datatype = match &datatype.field_type {
            FieldType::DimensionGroup { kind: DimensionGroupKind::Time(t) } => t.datatype,
            _ => return None,
        };
        Some(match datatype {
            TimeDatatype::Date => "DATE",
            TimeDatatype::Datetime | TimeDatatype::Timestamp => "TIMESTAMP",
        })
    }

    fn upper(e: Expr) -> Expr {
        crate::sql::expr::func("UPPER", vec![e])
    }

    /// Escape literal `%`/`_`/`\` in a user-supplied value so it can be
    /// embedded in a LIKE pattern without acting as a wildcard (paired with
    /// `like_escape`/`not_like_escape`'s `ESCAPE '\'`).
    fn escape_like_literal(raw: &str) -> String {
        raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    }

    fn like_pattern(value: &FilterValue, leading: bool, trailing: bool) -> Expr {
        let raw = Self::escape_like_literal(value.as_str().unwrap_or_default());
        let mut pattern = String::new();
        if leading {
            pattern.push('%');
        }
        pattern.push_str(&raw);
        if trailing {
            pattern.push('%');
        }
        crate::sql::expr::lit_str(&pattern)
    }

    fn like_pattern_upper(value: &FilterValue, leading: bool, trailing: bool) -> Expr {
        let raw = Self::escape_like_literal(&value.as_str().unwrap_or_default().to_ascii_uppercase());
        let mut pattern = String::new();
        if leading {
            pattern.push('%');
        }
        pattern.push_str(&raw);
        if trailing {
            pattern.push('%');
        }
        crate::sql::expr::lit_str(&pattern)
    }

    /// Resolve a filter value into its SQL expression. A string value that
    /// names another field is substituted with that field's SQL, optionally
    /// wrapped in a dialect-specific `CAST` (§4.4 "Value substitution");
    /// anything else falls back to a literal.
    fn value_expr(&mut self, view_name: &str, cast_hint: Option<&'static str>, value: &FilterValue) -> CompileResult<Expr> {
        let expr = match value {
            FilterValue::String(s) => match self.resolve_value_field(view_name, s)? {
                Some(field_sql) => {
                    let field_expr = raw_sql(&field_sql);
                    match cast_hint {
                        Some(datatype) => crate::sql::expr::cast(field_expr, datatype),
                        None => field_expr,
                    }
                }
                None => crate::sql::expr::lit_str(s),
            },
            FilterValue::Number(n) => crate::sql::expr::lit_float(*n),
            FilterValue::Bool(b) => crate::sql::expr::lit_bool(*b),
            FilterValue::Null => crate::sql::expr::lit_null(),
            FilterValue::List(items) => match items.first() {
                Some(v) => self.value_expr(view_name, cast_hint, v)?,
                None => crate::sql::expr::lit_null(),
            },
        };
        Ok(expr)
    }

    /// Try to resolve `s` as a reference to another field (bare or
    /// `view.field`), returning its compiled SQL. Returns `Ok(None)` when `s`
    /// does not name a field, so the caller can fall back to a literal.
    fn resolve_value_field(&mut self, view_name: &str, s: &str) -> CompileResult<Option<String>> {
        let resolved = crate::generate::resolve_field_ref(self.resolver.project(), s)
            .or_else(|_| crate::generate::resolve_field_ref(self.resolver.project(), &format!("{view_name}.{s}")));
        let (view, field_name) = match resolved {
            Ok(pair) => pair,
            Err(_) => return Ok(None),
        };
        let sql = if self.is_measure_field(&view, &field_name) {
            self.resolver.measure_expr(&view, &field_name, None)?
        } else {
            self.resolver.field_sql(&view, &field_name)?
        };
        Ok(Some(sql))
    }
}
