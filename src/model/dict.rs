//! `serde_json::Value` → [`Project`] construction: the single seam where
//! "already parsed" external model definitions plug in (§3, §6 Non-goal:
//! this crate never parses YAML/LookML surface syntax itself, mirroring the
//! teacher's `src/model/loader/mod.rs` building a `Model` from dictionaries).

use serde_json::Value;

use crate::model::field::{
    DimensionGroupKind, DimensionType, DurationDimensionGroup, DurationUnit, Field, FieldType,
    MeasureSpec, MeasureType, TimeDatatype, TimeDimensionGroup, Timeframe,
};
use crate::model::identifier::{Identifier, IdentifierKind, JoinType, Relationship};
use crate::model::mapping::Mapping;
use crate::model::set::Set;
use crate::model::validate::{collect_errors, ModelError};
use crate::model::view::{AccessFilter, View, ViewSource};
use crate::model::Project;

impl Project {
    /// Build a `Project` from an already-parsed dict, collecting every
    /// structural problem instead of failing on the first one (§3
    /// Construction boundary).
    pub fn from_dict(value: &Value) -> Result<Project, Vec<ModelError>> {
        let mut errors = Vec::new();
        let mut project = Project::new();

        if let Some(tz) = value.get("timezone").and_then(Value::as_str) {
            project.timezone = tz.to_string();
        }
        if let Some(day) = value.get("week_start_day").and_then(Value::as_str) {
            match parse_weekday(day) {
                Some(d) => project.week_start_day = d,
                None => errors.push(ModelError::Malformed(format!(
                    "unrecognized week_start_day '{day}'"
                ))),
            }
        }

        let views = value.get("views").and_then(Value::as_array);
        match views {
            Some(views) => {
                for v in views {
                    match parse_view(v) {
                        Ok(view) => project.add_view(view),
                        Err(mut e) => errors.append(&mut e),
                    }
                }
            }
            None => errors.push(ModelError::Malformed("missing 'views' array".to_string())),
        }

        if let Some(mappings) = value.get("mappings").and_then(Value::as_array) {
            for m in mappings {
                match parse_mapping(m) {
                    Ok(mapping) => project.add_mapping(mapping),
                    Err(e) => errors.push(e),
                }
            }
        }

        errors.extend(collect_errors(&project));

        if errors.is_empty() {
            tracing::info!(views = project.views.len(), mappings = project.mappings.len(), "loaded project model");
            Ok(project)
        } else {
            tracing::warn!(error_count = errors.len(), "project model failed validation");
            Err(errors)
        }
    }
}

fn parse_weekday(s: &str) -> Option<chrono::Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(chrono::Weekday::Mon),
        "tuesday" | "tue" => Some(chrono::Weekday::Tue),
        "wednesday" | "wed" => Some(chrono::Weekday::Wed),
        "thursday" | "thu" => Some(chrono::Weekday::Thu),
        "friday" | "fri" => Some(chrono::Weekday::Fri),
        "saturday" | "sat" => Some(chrono::Weekday::Sat),
        "sunday" | "sun" => Some(chrono::Weekday::Sun),
        _ => None,
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn parse_view(v: &Value) -> Result<View, Vec<ModelError>> {
    let mut errors = Vec::new();
    let name = match str_field(v, "name") {
        Some(n) => n.to_string(),
        None => {
            return Err(vec![ModelError::Malformed(
                "view missing 'name'".to_string(),
            )])
        }
    };

    let source = match (str_field(v, "sql_table_name"), str_field(v, "derived_table_sql")) {
        (Some(t), _) => ViewSource::Table(t.to_string()),
        (None, Some(d)) => ViewSource::DerivedTable(d.to_string()),
        (None, None) => ViewSource::Table(name.clone()),
    };

    let mut view = View::new(name.clone(), source);
    view.default_date = str_field(v, "default_date").map(str::to_string);
    view.always_filter = str_field(v, "always_filter").map(str::to_string);
    if let Some(day) = str_field(v, "week_start_day") {
        view.week_start_day = parse_weekday(day);
    }
    if let Some(grants) = v.get("required_access_grants").and_then(Value::as_array) {
        view.required_access_grants = grants
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(filters) = v.get("access_filters").and_then(Value::as_array) {
        for f in filters {
            if let (Some(field), Some(attr)) = (
                str_field(f, "field"),
                str_field(f, "user_attribute"),
            ) {
                view.access_filters.push(AccessFilter {
                    field: field.to_string(),
                    user_attribute: attr.to_string(),
                });
            } else {
                errors.push(ModelError::Malformed(format!(
                    "'{name}' access_filters entry missing field/user_attribute"
                )));
            }
        }
    }

    if let Some(identifiers) = v.get("identifiers").and_then(Value::as_array) {
        for i in identifiers {
            match parse_identifier(i) {
                Ok(id) => view.identifiers.push(id),
                Err(e) => errors.push(e),
            }
        }
    } else {
        errors.push(ModelError::NoIdentifiers(name.clone()));
    }

    if let Some(fields) = v.get("fields").and_then(Value::as_array) {
        for f in fields {
            match parse_field(&name, f) {
                Ok(field) => {
                    if view.fields.insert(field.name.clone(), field).is_some() {
                        errors.push(ModelError::DuplicateField(format!(
                            "{name}.{}",
                            str_field(f, "name").unwrap_or("?")
                        )));
                    }
                }
                Err(e) => errors.push(e),
            }
        }
    }

    if let Some(sets) = v.get("sets").and_then(Value::as_array) {
        for s in sets {
            if let (Some(set_name), Some(entries)) =
                (str_field(s, "name"), s.get("entries").and_then(Value::as_array))
            {
                let entries = entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                view.sets
                    .insert(set_name.to_string(), Set::new(set_name, entries));
            } else {
                errors.push(ModelError::Malformed(format!(
                    "'{name}' set entry missing name/entries"
                )));
            }
        }
    }

    if errors.is_empty() {
        Ok(view)
    } else {
        Err(errors)
    }
}

fn parse_identifier(v: &Value) -> Result<Identifier, ModelError> {
    let name = str_field(v, "name")
        .ok_or_else(|| ModelError::Malformed("identifier missing 'name'".to_string()))?;
    let kind = str_field(v, "type").unwrap_or("foreign");
    match kind {
        "primary" => {
            let subs = v
                .get("sub_identifiers")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Identifier::composite_primary(name, subs))
        }
        "foreign" => Ok(Identifier::foreign(name)),
        "join" => {
            let reference = str_field(v, "reference")
                .ok_or_else(|| ModelError::Malformed(format!("identifier '{name}' missing 'reference'")))?;
            let sql_on = str_field(v, "sql_on")
                .ok_or_else(|| ModelError::Malformed(format!("identifier '{name}' missing 'sql_on'")))?;
            let relationship = parse_relationship(str_field(v, "relationship").unwrap_or("many_to_one"))
                .ok_or_else(|| ModelError::Malformed(format!("identifier '{name}' has unknown relationship")))?;
            let join_type = parse_join_type(str_field(v, "join_type").unwrap_or("left_outer"))
                .ok_or_else(|| ModelError::Malformed(format!("identifier '{name}' has unknown join_type")))?;
            Ok(Identifier::custom_join(name, reference, sql_on, join_type, relationship))
        }
        other => Err(ModelError::Malformed(format!(
            "identifier '{name}' has unknown type '{other}'"
        ))),
    }
}

fn parse_relationship(s: &str) -> Option<Relationship> {
    match s {
        "one_to_one" => Some(Relationship::OneToOne),
        "one_to_many" => Some(Relationship::OneToMany),
        "many_to_one" => Some(Relationship::ManyToOne),
        "many_to_many" => Some(Relationship::ManyToMany),
        _ => None,
    }
}

fn parse_join_type(s: &str) -> Option<JoinType> {
    match s {
        "left_outer" => Some(JoinType::LeftOuter),
        "inner" => Some(JoinType::Inner),
        "full_outer" => Some(JoinType::FullOuter),
        "cross" => Some(JoinType::Cross),
        _ => None,
    }
}

fn parse_field(view_name: &str, v: &Value) -> Result<Field, ModelError> {
    let name = str_field(v, "name")
        .ok_or_else(|| ModelError::Malformed(format!("'{view_name}' field missing 'name'")))?
        .to_string();
    let grants = v
        .get("required_access_grants")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let kind = str_field(v, "kind").unwrap_or("dimension");
    let field_type = match kind {
        "dimension" => {
            let sql = str_field(v, "sql")
                .ok_or_else(|| ModelError::Malformed(format!("'{view_name}.{name}' missing 'sql'")))?
                .to_string();
            let dimension_type = match str_field(v, "type").unwrap_or("string") {
                "string" => DimensionType::String,
                "number" => DimensionType::Number,
                "yesno" => DimensionType::Yesno,
                "tier" => DimensionType::Tier,
                other => {
                    return Err(ModelError::Malformed(format!(
                        "'{view_name}.{name}' has unknown dimension type '{other}'"
                    )))
                }
            };
            FieldType::Dimension { sql, dimension_type }
        }
        "dimension_group" => parse_dimension_group(view_name, &name, v)?,
        "measure" => parse_measure(view_name, &name, v)?,
        other => {
            return Err(ModelError::Malformed(format!(
                "'{view_name}.{name}' has unknown field kind '{other}'"
            )))
        }
    };

    Ok(Field {
        name,
        view: view_name.to_string(),
        field_type,
        required_access_grants: grants,
    })
}

fn parse_dimension_group(view_name: &str, name: &str, v: &Value) -> Result<FieldType, ModelError> {
    let group_type = str_field(v, "group_type").unwrap_or("time");
    match group_type {
        "time" => {
            let sql = str_field(v, "sql")
                .ok_or_else(|| ModelError::Malformed(format!("'{view_name}.{name}' missing 'sql'")))?
                .to_string();
            let timeframes = v
                .get("timeframes")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .filter_map(Timeframe::parse)
                        .collect()
                })
                .unwrap_or_else(|| vec![Timeframe::Raw, Timeframe::Date]);
            let datatype = match str_field(v, "datatype") {
                Some("date") => TimeDatatype::Date,
                Some("datetime") => TimeDatatype::Datetime,
                _ => TimeDatatype::Timestamp,
            };
            let convert_timezone = v
                .get("convert_timezone")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            Ok(FieldType::DimensionGroup {
                kind: DimensionGroupKind::Time(TimeDimensionGroup {
                    sql,
                    timeframes,
                    datatype,
                    convert_timezone,
                }),
            })
        }
        "duration" => {
            let sql_start = str_field(v, "sql_start")
                .ok_or_else(|| ModelError::Malformed(format!("'{view_name}.{name}' missing 'sql_start'")))?
                .to_string();
            let sql_end = str_field(v, "sql_end")
                .ok_or_else(|| ModelError::Malformed(format!("'{view_name}.{name}' missing 'sql_end'")))?
                .to_string();
            let intervals: Vec<DurationUnit> = v
                .get("intervals")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .filter_map(DurationUnit::parse)
                        .collect()
                })
                .unwrap_or_else(|| vec![DurationUnit::Day]);
            Ok(FieldType::DimensionGroup {
                kind: DimensionGroupKind::Duration(DurationDimensionGroup {
                    sql_start,
                    sql_end,
                    intervals,
                }),
            })
        }
        other => Err(ModelError::Malformed(format!(
            "'{view_name}.{name}' has unknown group_type '{other}'"
        ))),
    }
}

fn parse_measure(view_name: &str, name: &str, v: &Value) -> Result<FieldType, ModelError> {
    let measure_type = match str_field(v, "measure_type").unwrap_or("sum") {
        "count" => MeasureType::Count,
        "count_distinct" => MeasureType::CountDistinct,
        "sum" => MeasureType::Sum,
        "average" => MeasureType::Average,
        "median" => MeasureType::Median,
        "max" => MeasureType::Max,
        "min" => MeasureType::Min,
        "number" => MeasureType::Number,
        "cumulative" => MeasureType::Cumulative,
        other => {
            return Err(ModelError::Malformed(format!(
                "'{view_name}.{name}' has unknown measure_type '{other}'"
            )))
        }
    };
    Ok(FieldType::Measure(MeasureSpec {
        measure_type,
        sql: str_field(v, "sql").map(str::to_string),
        measure_ref: str_field(v, "measure_ref").map(str::to_string),
        canon_date: str_field(v, "canon_date").map(str::to_string),
        is_merged_result: v.get("is_merged_result").and_then(Value::as_bool).unwrap_or(false),
        cumulative_window_days: v.get("cumulative_window_days").and_then(Value::as_u64).map(|n| n as u32),
    }))
}

fn parse_mapping(v: &Value) -> Result<Mapping, ModelError> {
    let name = str_field(v, "name")
        .ok_or_else(|| ModelError::Malformed("mapping missing 'name'".to_string()))?;
    let fields = v
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::Malformed(format!("mapping '{name}' missing 'fields'")))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    Ok(Mapping::new(name, fields))
}
