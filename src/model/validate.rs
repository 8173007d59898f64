//! Model validation: `collect_errors`-style checking of an assembled
//! [`crate::model::Project`], mirroring the teacher's
//! `ValidationError`/`collect_errors` idiom (`src/validation/mod.rs`) —
//! every problem found is collected rather than raised on the first one.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::model::field::{DimensionGroupKind, FieldType};
use crate::model::identifier::IdentifierKind;
use crate::model::Project;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("view '{0}' declares no identifiers")]
    NoIdentifiers(String),

    #[error("view '{view}' has more than one primary identifier")]
    MultiplePrimaryIdentifiers { view: String },

    #[error("'{view}.{field}' has a circular sql reference")]
    CircularSql { view: String, field: String },

    #[error("duplicate field id '{0}'")]
    DuplicateField(String),

    #[error("'{view}.{identifier}' composite primary key references undeclared identifier '{sub}'")]
    UndeclaredSubIdentifier {
        view: String,
        identifier: String,
        sub: String,
    },

    #[error("'{view}.{field}' timeframe expansion collides with an existing field name")]
    DuplicateTimeframeField { view: String, field: String },

    #[error("set '{view}.{set}' is defined in terms of itself")]
    SetCycle { view: String, set: String },

    #[error("join identifier '{view}.{identifier}' references unknown view '{reference}'")]
    UnknownJoinTarget {
        view: String,
        identifier: String,
        reference: String,
    },

    #[error("malformed model dict: {0}")]
    Malformed(String),

    #[error("project timezone '{0}' is not a recognized IANA timezone")]
    UnknownTimezone(String),
}

/// Validate an assembled `Project`, returning every problem found rather
/// than failing on the first one.
pub fn collect_errors(project: &Project) -> Vec<ModelError> {
    let mut errors = Vec::new();

    if project.timezone.parse::<chrono_tz::Tz>().is_err() {
        errors.push(ModelError::UnknownTimezone(project.timezone.clone()));
    }

    for view in project.views.values() {
        let primary_count = view.identifiers.iter().filter(|i| i.is_primary()).count();
        if primary_count > 1 {
            errors.push(ModelError::MultiplePrimaryIdentifiers {
                view: view.name.clone(),
            });
        }

        let declared: HashSet<&str> = view.identifiers.iter().map(|i| i.name.as_str()).collect();
        for identifier in &view.identifiers {
            match &identifier.kind {
                IdentifierKind::Primary { sub_identifiers } => {
                    for sub in sub_identifiers {
                        if !declared.contains(sub.as_str()) {
                            errors.push(ModelError::UndeclaredSubIdentifier {
                                view: view.name.clone(),
                                identifier: identifier.name.clone(),
                                sub: sub.clone(),
                            });
                        }
                    }
                }
                IdentifierKind::Join { reference, .. } => {
                    if !project.views.contains_key(reference) {
                        errors.push(ModelError::UnknownJoinTarget {
                            view: view.name.clone(),
                            identifier: identifier.name.clone(),
                            reference: reference.clone(),
                        });
                    }
                }
                IdentifierKind::Foreign => {}
            }
        }

        let mut expanded_names: HashMap<String, usize> = HashMap::new();
        for field in view.fields.values() {
            *expanded_names.entry(field.name.clone()).or_default() += 1;
            if matches!(field.field_type, FieldType::DimensionGroup { .. }) {
                for derived in field.expand_timeframes() {
                    *expanded_names.entry(derived).or_default() += 1;
                }
            }
        }
        for (name, count) in expanded_names {
            if count > 1 {
                errors.push(ModelError::DuplicateTimeframeField {
                    view: view.name.clone(),
                    field: name,
                });
            }
        }

        for (set_name, set) in &view.sets {
            if has_set_cycle(set_name, &view.sets, &mut HashSet::new()) {
                errors.push(ModelError::SetCycle {
                    view: view.name.clone(),
                    set: set_name.clone(),
                });
            }
        }

        for (field_name, field) in &view.fields {
            if has_sql_cycle(view, field_name, &mut HashSet::new()) {
                errors.push(ModelError::CircularSql {
                    view: view.name.clone(),
                    field: field_name.clone(),
                });
            }
            let _ = field;
        }
    }

    errors
}

fn has_set_cycle(
    name: &str,
    sets: &HashMap<String, crate::model::set::Set>,
    visiting: &mut HashSet<String>,
) -> bool {
    if !visiting.insert(name.to_string()) {
        return true;
    }
    let cyclic = match sets.get(name) {
        Some(set) => set.entries.iter().any(|entry| {
            let target = entry.trim_start_matches('-').strip_prefix('*');
            match target {
                Some(inner) => has_set_cycle(inner, sets, visiting),
                None => false,
            }
        }),
        None => false,
    };
    visiting.remove(name);
    cyclic
}

fn has_sql_cycle(view: &crate::model::View, field_name: &str, visiting: &mut HashSet<String>) -> bool {
    if !visiting.insert(field_name.to_string()) {
        return true;
    }
    let cyclic = match view.field(field_name) {
        Some(field) => {
            let raw = match &field.field_type {
                FieldType::Dimension { sql, .. } => sql.clone(),
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Time(t),
                } => t.sql.clone(),
                FieldType::DimensionGroup {
                    kind: DimensionGroupKind::Duration(d),
                } => format!("{} {}", d.sql_start, d.sql_end),
                FieldType::Measure(m) => m.sql.clone().unwrap_or_default(),
            };
            super::expr_engine::referenced_field_names(&raw)
                .into_iter()
                .any(|name| has_sql_cycle(view, &name, visiting))
        }
        None => false,
    };
    visiting.remove(field_name);
    cyclic
}
