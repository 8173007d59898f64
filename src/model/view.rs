//! Views: logical tables (§3 View).

use std::collections::HashMap;

use crate::model::field::Field;
use crate::model::identifier::Identifier;
use crate::model::set::Set;

/// A view's physical source: either a plain table name or an inline derived
/// table (`derived_table.sql`).
#[derive(Debug, Clone, PartialEq)]
pub enum ViewSource {
    Table(String),
    DerivedTable(String),
}

/// An access filter: a dimension/value pair applied unconditionally to every
/// query touching the view, gated on a grant (§3 View `access_filters`).
#[derive(Debug, Clone, PartialEq)]
pub struct AccessFilter {
    pub field: String,
    pub user_attribute: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub source: ViewSource,
    /// Name of the `time` dimension_group used as this view's default date
    /// (e.g. for cumulative planning and merged canonical-date alignment).
    pub default_date: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub fields: HashMap<String, Field>,
    pub sets: HashMap<String, Set>,
    /// SQL fragment ANDed into every query touching this view.
    pub always_filter: Option<String>,
    pub access_filters: Vec<AccessFilter>,
    pub required_access_grants: Vec<String>,
    /// Per-view override of the project's week_start_day (§9 Open Question:
    /// view setting overrides model setting).
    pub week_start_day: Option<chrono::Weekday>,
}

impl View {
    pub fn new(name: impl Into<String>, source: ViewSource) -> Self {
        Self {
            name: name.into(),
            source,
            default_date: None,
            identifiers: Vec::new(),
            fields: HashMap::new(),
            sets: HashMap::new(),
            always_filter: None,
            access_filters: Vec::new(),
            required_access_grants: Vec::new(),
            week_start_day: None,
        }
    }

    pub fn table_expr(&self) -> &str {
        match &self.source {
            ViewSource::Table(t) => t,
            ViewSource::DerivedTable(sql) => sql,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// The view's single primary identifier, if declared (§3: "A view has
    /// at most one primary_key field").
    pub fn primary_identifier(&self) -> Option<&Identifier> {
        self.identifiers.iter().find(|i| i.is_primary())
    }

    /// The dimension/dimension_group field backing the primary identifier,
    /// used to detect `no_group_by` (§4.3 step 5) and to drive symmetric
    /// aggregate hashing (§4.1, §4.3 step 4).
    pub fn primary_key_field(&self) -> Option<&Field> {
        let pk = self.primary_identifier()?;
        self.fields.get(&pk.name)
    }

    pub fn identifier(&self, name: &str) -> Option<&Identifier> {
        self.identifiers.iter().find(|i| i.name == name)
    }

    /// All field names declared directly on the view (not expanded
    /// timeframes), in a deterministic order for `ALL_FIELDS` expansion.
    pub fn field_names_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// The `time` dimension_group and timeframe that `field_name` derives
    /// from, whether `field_name` names the group directly (`raw`) or one
    /// of its expanded `<group>_<timeframe>` fields. Used by the filter
    /// compiler to decide whether a dialect-specific CAST is needed when
    /// substituting another field's SQL as a filter value (§4.4 "Value
    /// substitution").
    pub fn time_dimension_group_for(&self, field_name: &str) -> Option<(&Field, crate::model::field::Timeframe)> {
        use crate::model::field::{DimensionGroupKind, FieldType, Timeframe};
        for f in self.fields.values() {
            if let FieldType::DimensionGroup {
                kind: DimensionGroupKind::Time(t),
            } = &f.field_type
            {
                if f.name == field_name {
                    return Some((f, Timeframe::Raw));
                }
                for tf in &t.timeframes {
                    if format!("{}_{}", f.name, tf.name()) == field_name {
                        return Some((f, *tf));
                    }
                }
            }
        }
        None
    }
}
