//! A single join edge: the relationship/join-type/ON-clause data attached
//! to each edge of the [`super::JoinGraph`] (§4.2).

use crate::model::identifier::{JoinType, Relationship};

/// An edge of the join graph, oriented `from -> to` for the direction it was
/// declared in (the graph itself is undirected — `design` walks edges in
/// either direction using [`JoinEdge::oriented`]).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub from: String,
    pub to: String,
    pub identifier_name: String,
    pub relationship: Relationship,
    pub join_type: JoinType,
    /// `Some` for `join`-typed identifiers with a bespoke ON clause;
    /// `None` means "equi-join on the identifier's field on both sides".
    pub custom_sql_on: Option<String>,
}

impl JoinEdge {
    /// This edge's relationship/sql_on as seen when traversing from `from`
    /// to `to`; flips the relationship direction when traversed backwards.
    pub fn oriented(&self, from: &str) -> OrientedEdge<'_> {
        if self.from == from {
            OrientedEdge {
                edge: self,
                to: &self.to,
                relationship: self.relationship,
            }
        } else {
            OrientedEdge {
                edge: self,
                to: &self.from,
                relationship: flip(self.relationship),
            }
        }
    }
}

fn flip(r: Relationship) -> Relationship {
    use Relationship::*;
    match r {
        OneToOne => OneToOne,
        OneToMany => ManyToOne,
        ManyToOne => OneToMany,
        ManyToMany => ManyToMany,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrientedEdge<'a> {
    pub edge: &'a JoinEdge,
    pub to: &'a str,
    pub relationship: Relationship,
}
