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

fn recorder() -> (Arc<Mutex<Vec<Option<Value>>>>, ChangeCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let callback: ChangeCallback = Arc::new(move |value| s.lock().unwrap().push(value));
    (seen, callback)
}

#[tokio::test]
async fn write_then_read() {
    let store = MemoryStore::new();
    store.write(&p("a/b"), json!(1)).await.unwrap();
    assert_eq!(store.read_once(&p("a/b")).await.unwrap(), Some(json!(1)));
    assert_eq!(store.read_once(&p("a/c")).await.unwrap(), None);
}

#[tokio::test]
async fn update_merges_fields() {
    let store = MemoryStore::new();
    store.write(&p("u/c"), json!({ "name": "A", "unreadCount": 2 })).await.unwrap();
    store.update(&p("u/c"), fields(json!({ "unreadCount": 0 }))).await.unwrap();
    assert_eq!(store.get(&p("u/c")), Some(json!({ "name": "A", "unreadCount": 0 })));
}

#[tokio::test]
async fn increment_is_sequential() {
    let store = MemoryStore::new();
    let meta = p("conversations/c1/meta");
    let mut values = Vec::new();
    for _ in 0..3 {
        values.push(store.increment(&meta, "lastSequence", 1).await.unwrap());
    }
    assert_eq!(values, [1, 2, 3]);
}

#[tokio::test]
async fn subscribe_delivers_current_then_changes() {
    let store = MemoryStore::new();
    store.seed(&p("c/m/1"), json!("first")).unwrap();
    let (seen, callback) = recorder();
    let subscription = store.subscribe(&p("c/m"), callback).await.unwrap();

    store.write(&p("c/m/2"), json!("second")).await.unwrap();
    store.write(&p("other"), json!(true)).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Some(json!({ "1": "first" })),
            Some(json!({ "1": "first", "2": "second" })),
        ]
    );

    drop(subscription);
    store.write(&p("c/m/3"), json!("third")).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn parent_write_notifies_child_watcher() {
    let store = MemoryStore::new();
    let (seen, callback) = recorder();
    let _subscription = store.subscribe(&p("a/b"), callback).await.unwrap();
    store.write(&p("a"), json!({ "b": 5 })).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![None, Some(json!(5))]);
}

#[parameterized(
    read = { "read" },
    write = { "write" },
    update = { "update" },
    increment = { "increment" },
    subscribe = { "subscribe" },
)]
fn offline_fails_every_call(call: &str) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(async {
        let store = MemoryStore::new();
        store.set_offline(true);
        let path = p("a/b");
        let err = match call {
            "read" => store.read_once(&path).await.err(),
            "write" => store.write(&path, json!(1)).await.err(),
            "update" => store.update(&path, Map::new()).await.err(),
            "increment" => store.increment(&path, "n", 1).await.err(),
            _ => store.subscribe(&path, Arc::new(|_| {})).await.err(),
        };
        assert!(err.unwrap().is_transient());
        assert!(store.mutations().is_empty());
    });
}

#[tokio::test]
async fn denied_prefix_rejects_writes_only() {
    let store = MemoryStore::new();
    store.seed(&p("users/bob/online"), json!({ "status": "online" })).unwrap();
    store.deny_writes(p("users/bob"));

    let err = store.update(&p("users/bob/online"), Map::new()).await.unwrap_err();
    assert!(err.is_permission_denied());
    assert!(store.read_once(&p("users/bob/online")).await.unwrap().is_some());
    store.write(&p("users/alice/online"), json!(1)).await.unwrap();

    store.clear_faults();
    store.update(&p("users/bob/online"), Map::new()).await.unwrap();
}

#[tokio::test]
async fn mutations_are_recorded() {
    let store = MemoryStore::new();
    store.write(&p("a"), json!(1)).await.unwrap();
    store.update(&p("b"), Map::new()).await.unwrap();
    store.seed(&p("c"), json!(1)).unwrap();
    assert_eq!(store.mutations(), vec![p("a"), p("b")]);
}
