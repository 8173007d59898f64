//! Mappings: equivalence classes of dimension references used to align
//! dimensions across join-graph components in the merged-results planner
//! (§3 Mapping, §4.7 step 3).

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub name: String,
    /// Field ids (`view.field` or `view.field_timeframe`) considered
    /// equivalent for the purposes of cross-bucket pairing.
    pub fields: Vec<String>,
}

impl Mapping {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.iter().any(|f| f == field_id)
    }

    /// Find the mapped field id in `other_fields` that is equivalent to
    /// `field_id`, if any field of this mapping is present in `other_fields`.
    pub fn translate<'a>(&self, field_id: &str, other_fields: &'a [String]) -> Option<&'a String> {
        if !self.contains(field_id) {
            return None;
        }
        other_fields.iter().find(|f| self.fields.iter().any(|m| m == *f))
    }
}
