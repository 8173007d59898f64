use std::collections::HashMap;

use semantic_sql::model::set::Set;

fn sets_map(sets: Vec<Set>) -> HashMap<String, Set> {
    sets.into_iter().map(|s| (s.name.clone(), s)).collect()
}

#[test]
fn all_fields_expands_to_the_full_list_in_order() {
    let set = Set::new("default", vec!["ALL_FIELDS".to_string()]);
    let all = vec!["channel".to_string(), "total_revenue".to_string(), "order_id".to_string()];
    assert_eq!(set.expand(&all, &HashMap::new()), all);
}

#[test]
fn explicit_excludes_remove_entries_after_all_fields_expansion() {
    let set = Set::new("default", vec!["ALL_FIELDS".to_string(), "-order_id".to_string()]);
    let all = vec!["channel".to_string(), "total_revenue".to_string(), "order_id".to_string()];
    assert_eq!(set.expand(&all, &HashMap::new()), vec!["channel", "total_revenue"]);
}

#[test]
fn includes_preserve_declaration_order_not_all_fields_order() {
    let set = Set::new("picked", vec!["total_revenue".to_string(), "channel".to_string()]);
    let all = vec!["channel".to_string(), "total_revenue".to_string(), "order_id".to_string()];
    assert_eq!(set.expand(&all, &HashMap::new()), vec!["total_revenue", "channel"]);
}

#[test]
fn nested_set_reference_expands_recursively() {
    let inner = Set::new("core", vec!["channel".to_string(), "order_id".to_string()]);
    let outer = Set::new("default", vec!["*core".to_string(), "total_revenue".to_string()]);
    let all = vec!["channel".to_string(), "total_revenue".to_string(), "order_id".to_string()];
    let sets = sets_map(vec![inner]);
    assert_eq!(outer.expand(&all, &sets), vec!["channel", "order_id", "total_revenue"]);
}

#[test]
fn excluding_a_nested_set_removes_every_field_it_contains() {
    let inner = Set::new("pii", vec!["email".to_string(), "phone".to_string()]);
    let outer = Set::new(
        "default",
        vec!["ALL_FIELDS".to_string(), "-*pii".to_string()],
    );
    let all = vec!["email".to_string(), "phone".to_string(), "order_id".to_string()];
    let sets = sets_map(vec![inner]);
    assert_eq!(outer.expand(&all, &sets), vec!["order_id"]);
}

#[test]
fn duplicate_includes_are_deduplicated_keeping_first_position() {
    let set = Set::new(
        "default",
        vec!["channel".to_string(), "order_id".to_string(), "channel".to_string()],
    );
    let all = vec!["channel".to_string(), "order_id".to_string()];
    assert_eq!(set.expand(&all, &HashMap::new()), vec!["channel", "order_id"]);
}
