//! Connected components and the `join_graph_hash` bucketing key used by the
//! merged-results planner (§4.2, §4.7 step 2).

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use super::JoinGraph;

/// The set of view names reachable from `start` (§4.2: "a connected
/// component is the maximal set of views reachable from one another").
pub fn connected_component(graph: &JoinGraph, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    if !graph.index.contains_key(start) {
        return seen;
    }
    queue.push_back(start.to_string());
    seen.insert(start.to_string());
    while let Some(view) = queue.pop_front() {
        for (neighbor, _) in graph.neighbors(&view) {
            if seen.insert(neighbor.to_string()) {
                queue.push_back(neighbor.to_string());
            }
        }
    }
    seen
}

/// A stable hash identifying a connected component, used as half of the
/// merged planner's `(canon_date, join_graph_hash)` bucket key (§4.7 step 2)
/// — order-independent, so the same set of views always hashes the same.
pub fn join_graph_hash(component: &HashSet<String>) -> u64 {
    let sorted: BTreeSet<&str> = component.iter().map(String::as_str).collect();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for view in sorted {
        view.hash(&mut hasher);
        0u8.hash(&mut hasher);
    }
    hasher.finish()
}
