//! Identifiers: the keys views declare for join inference (§3, §4.2).

use serde::{Deserialize, Serialize};

/// Join cardinality, declared on `join`-typed identifiers and inferred for
/// identifier-name joins (§3 Join, §4.2 relationship composition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Relationship {
    /// Compose two relationships along a path (§4.2): a `many` on either
    /// side of the composition dominates, producing a fan-out once any hop
    /// downstream of a `one_to_many` introduces one.
    pub fn compose(self, next: Relationship) -> Relationship {
        use Relationship::*;
        match (self, next) {
            (OneToOne, other) => other,
            (other, OneToOne) => other,
            (ManyToOne, ManyToOne) => ManyToOne,
            (ManyToOne, OneToMany) => ManyToMany,
            (OneToMany, ManyToOne) => ManyToMany,
            (OneToMany, OneToMany) => OneToMany,
            (ManyToMany, _) | (_, ManyToMany) => ManyToMany,
        }
    }

    /// Whether following this relationship from the base view fans out rows
    /// (i.e. one base row may match more than one row on the other side).
    pub fn fans_out(self) -> bool {
        matches!(self, Relationship::OneToMany | Relationship::ManyToMany)
    }
}

/// Default join type for identifier-based joins; `join`-typed identifiers
/// may override it (§3 Identifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    LeftOuter,
    Inner,
    FullOuter,
    Cross,
}

impl Default for JoinType {
    fn default() -> Self {
        JoinType::LeftOuter
    }
}

/// An identifier's role on a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// A single-column (or composite) primary key. `sub_identifiers` names
    /// other identifiers declared on the same view that make up a composite
    /// key (§3: "composite primary key must resolve to declared identifiers
    /// on the same view").
    Primary { sub_identifiers: Vec<String> },
    /// A foreign key: joins to another view's identifier of the same name.
    Foreign,
    /// A bespoke custom join (§3 Identifier, `join`-typed).
    Join {
        reference: String,
        sql_on: String,
        join_type: JoinType,
        relationship: Relationship,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub kind: IdentifierKind,
}

impl Identifier {
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IdentifierKind::Primary {
                sub_identifiers: Vec::new(),
            },
        }
    }

    pub fn composite_primary(name: impl Into<String>, sub_identifiers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: IdentifierKind::Primary { sub_identifiers },
        }
    }

    pub fn foreign(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IdentifierKind::Foreign,
        }
    }

    pub fn custom_join(
        name: impl Into<String>,
        reference: impl Into<String>,
        sql_on: impl Into<String>,
        join_type: JoinType,
        relationship: Relationship,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IdentifierKind::Join {
                reference: reference.into(),
                sql_on: sql_on.into(),
                join_type,
                relationship,
            },
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, IdentifierKind::Primary { .. })
    }
}
