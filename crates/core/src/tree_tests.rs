// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn p(s: &str) -> StorePath {
    s.parse().unwrap()
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[test]
fn set_creates_intermediates() {
    let mut tree = Tree::new();
    tree.set(&p("a/b/c"), json!(1)).unwrap();
    assert_eq!(tree.get(&p("a/b/c")), Some(&json!(1)));
    assert_eq!(tree.read(&p("a")), Some(json!({ "b": { "c": 1 } })));
}

#[test]
fn set_replaces_scalar_parent() {
    let mut tree = Tree::new();
    tree.set(&p("a"), json!("leaf")).unwrap();
    tree.set(&p("a/b"), json!(2)).unwrap();
    assert_eq!(tree.read(&p("a")), Some(json!({ "b": 2 })));
}

#[test]
fn null_deletes_and_prunes_empty_parents() {
    let mut tree = Tree::new();
    tree.set(&p("a/b/c"), json!(1)).unwrap();
    tree.set(&p("a/x"), json!(2)).unwrap();
    tree.set(&p("a/b/c"), Value::Null).unwrap();
    assert_eq!(tree.read(&p("a/b")), None);
    assert_eq!(tree.read(&p("a")), Some(json!({ "x": 2 })));

    tree.set(&p("a/x"), Value::Null).unwrap();
    assert_eq!(tree.read(&p("a")), None);
    assert_eq!(tree.read(&StorePath::root()), None);
}

#[test]
fn deleting_missing_path_is_noop() {
    let mut tree = Tree::new();
    tree.set(&p("a/b"), json!(1)).unwrap();
    tree.set(&p("a/zzz/y"), Value::Null).unwrap();
    assert_eq!(tree.read(&p("a/b")), Some(json!(1)));
}

#[test]
fn merge_is_shallow() {
    let mut tree = Tree::new();
    tree.set(&p("u/c1"), json!({ "name": "A", "unreadCount": 3, "nested": { "keep": true } }))
        .unwrap();
    tree.merge(&p("u/c1"), fields(json!({ "unreadCount": 0, "nested": { "new": 1 } })))
        .unwrap();
    assert_eq!(
        tree.read(&p("u/c1")),
        Some(json!({ "name": "A", "unreadCount": 0, "nested": { "new": 1 } }))
    );
}

#[test]
fn merge_null_field_deletes_child() {
    let mut tree = Tree::new();
    tree.set(&p("u/c1"), json!({ "a": 1, "b": 2 })).unwrap();
    tree.merge(&p("u/c1"), fields(json!({ "a": null }))).unwrap();
    assert_eq!(tree.read(&p("u/c1")), Some(json!({ "b": 2 })));
}

#[test]
fn merge_creates_missing_entry() {
    let mut tree = Tree::new();
    tree.merge(&p("users/u1/online"), fields(json!({ "status": "online", "lastSeen": 5 })))
        .unwrap();
    assert_eq!(tree.read(&p("users/u1/online/status")), Some(json!("online")));
}

#[test]
fn increment_counts_from_zero() {
    let mut tree = Tree::new();
    let meta = p("conversations/c1/meta");
    assert_eq!(tree.increment(&meta, "lastSequence", 1).unwrap(), 1);
    assert_eq!(tree.increment(&meta, "lastSequence", 1).unwrap(), 2);
    assert_eq!(tree.increment(&meta, "lastSequence", 5).unwrap(), 7);
    assert_eq!(tree.read(&p("conversations/c1/meta/lastSequence")), Some(json!(7)));
}

#[parameterized(
    string = { json!("three") },
    float = { json!(1.5) },
    object = { json!({ "n": 1 }) },
)]
fn increment_rejects_non_integer(existing: Value) {
    let mut tree = Tree::new();
    tree.set(&p("m/n"), existing.clone()).unwrap();
    let err = tree.increment(&p("m"), "n", 1).unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { .. }));
    assert_eq!(tree.read(&p("m/n")), Some(existing));
}

#[test]
fn root_round_trip() {
    let mut tree = Tree::new();
    tree.set(&p("a/b"), json!(true)).unwrap();
    let restored = Tree::from_value(tree.to_value());
    assert_eq!(restored, tree);
    assert_eq!(Tree::from_value(json!([1, 2])), Tree::new());
}

#[test]
fn root_rejects_scalar() {
    let mut tree = Tree::new();
    assert!(tree.set(&StorePath::root(), json!(3)).is_err());
    tree.set(&StorePath::root(), json!({ "a": 1 })).unwrap();
    assert_eq!(tree.read(&p("a")), Some(json!(1)));
}
