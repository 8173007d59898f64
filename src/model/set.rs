//! Sets: ordered, deterministic field-list expansion (§3 Set).
//!
//! A set's raw entries support include (`name` or `*set_name`), exclude
//! (`-name`, `-*set_name`), and the magic name `ALL_FIELDS`. Expansion is
//! deterministic and preserves insertion order of includes minus excludes.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub name: String,
    /// Raw, unexpanded entries exactly as declared.
    pub entries: Vec<String>,
}

impl Set {
    pub fn new(name: impl Into<String>, entries: Vec<String>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// Expand this set's entries against a view's full field-name list and
    /// any sibling sets declared on the same view, producing an
    /// order-preserving field-name list with excludes applied.
    pub fn expand(&self, all_fields: &[String], sets: &HashMap<String, Set>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut included: Vec<String> = Vec::new();
        let mut excluded: std::collections::HashSet<String> = std::collections::HashSet::new();

        for raw in &self.entries {
            if let Some(rest) = raw.strip_prefix('-') {
                if let Some(set_name) = rest.strip_prefix('*') {
                    if let Some(inner) = sets.get(set_name) {
                        for f in inner.expand(all_fields, sets) {
                            excluded.insert(f);
                        }
                    }
                } else {
                    excluded.insert(rest.to_string());
                }
                continue;
            }

            if raw == "ALL_FIELDS" {
                for f in all_fields {
                    if seen.insert(f.clone()) {
                        included.push(f.clone());
                    }
                }
                continue;
            }

            if let Some(set_name) = raw.strip_prefix('*') {
                if let Some(inner) = sets.get(set_name) {
                    for f in inner.expand(all_fields, sets) {
                        if seen.insert(f.clone()) {
                            included.push(f);
                        }
                    }
                }
                continue;
            }

            if seen.insert(raw.clone()) {
                included.push(raw.clone());
            }
        }

        included.into_iter().filter(|f| !excluded.contains(f)).collect()
    }
}
