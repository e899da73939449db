// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Presence scenarios between two signed-in users.

mod common;

use common::*;

fn fast() -> EngineConfig {
    EngineConfig {
        presence_poll_interval_ms: 10,
        heartbeat_interval_ms: 20,
        presence_ttl_ms: 1_000,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn online_then_offline() {
    let world = World::new();
    let renter = world.sign_in(renter()).await;
    let owner = world.sign_in(owner()).await;

    renter.set_online().await.unwrap();
    assert_eq!(owner.presence_status(RENTER).await.unwrap(), PresenceStatus::Online);

    renter.set_offline().await.unwrap();
    assert_eq!(owner.presence_status(RENTER).await.unwrap(), PresenceStatus::Offline);
}

#[tokio::test]
async fn never_seen_user_is_offline() {
    let world = World::new();
    let owner = world.sign_in(owner()).await;

    assert_eq!(owner.presence_status("renter-9").await.unwrap(), PresenceStatus::Offline);
}

#[tokio::test]
async fn stale_online_record_reads_offline() {
    let world = World::new();
    let renter = world.sign_in(renter()).await;
    let owner = world.sign_in(owner()).await;
    renter.set_online().await.unwrap();

    // Simulates a client that vanished without signing out.
    renter.sign_out().await.unwrap();
    world
        .store
        .seed(&StorePath::presence(RENTER).unwrap(), json!({"status": "online", "lastSeen": 1_700_000_000_000i64}))
        .unwrap();
    world.clock.advance(90_001);

    assert_eq!(owner.presence_status(RENTER).await.unwrap(), PresenceStatus::Offline);
}

#[tokio::test]
async fn heartbeat_keeps_user_online() {
    let world = World::new();
    let renter = world.sign_in_with(renter(), fast()).await;
    let owner = world.sign_in_with(owner(), fast()).await;
    renter.set_online().await.unwrap();

    world.clock.advance(5_000);

    let path = StorePath::presence(RENTER).unwrap();
    eventually(|| world.store.get(&path).is_some_and(|v| v["lastSeen"] == json!(1_700_000_005_000i64))).await;
    assert_eq!(owner.presence_status(RENTER).await.unwrap(), PresenceStatus::Online);
}

#[tokio::test]
async fn watcher_reports_transitions() {
    let world = World::new();
    let renter = world.sign_in_with(renter(), fast()).await;
    let owner = world.sign_in_with(owner(), fast()).await;
    let scope = Scope::new();
    let (seen, callback) = recorder::<PresenceStatus>();
    owner.watch_presence(&scope, RENTER, callback).unwrap();
    eventually(|| seen.lock().unwrap().len() == 1).await;

    renter.set_online().await.unwrap();
    eventually(|| seen.lock().unwrap().len() == 2).await;
    renter.set_offline().await.unwrap();
    eventually(|| seen.lock().unwrap().len() == 3).await;
    scope.dispose();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![PresenceStatus::Offline, PresenceStatus::Online, PresenceStatus::Offline]
    );
}
