// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation directory scenarios: creation, summaries, list order, and
//! access to another user's list.

mod common;

use common::*;

#[tokio::test]
async fn opening_creates_an_entry_for_each_side() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;

    assert_eq!(renter.list_conversations()[0].contact.id, OWNER);
    let theirs = owner.list_conversations();
    assert_eq!(theirs[0].id, id);
    assert_eq!(theirs[0].contact.id, RENTER);
    assert_eq!(theirs[0].listing_id.as_deref(), Some("listing-1"));
    assert_eq!(world.entry(OWNER, &id)["contactName"], json!("Rita"));
}

#[tokio::test]
async fn reopening_keeps_the_existing_conversation() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    renter.send_message(&id, text("hello")).await.unwrap();

    let again = owner.open_conversation(&common::renter().contact, Some("listing-1")).await.unwrap();

    assert_eq!(again, id);
    assert_eq!(world.entry(OWNER, &id)["lastMessage"], json!("hello"));
    assert_eq!(owner.list_conversations().len(), 1);
}

#[tokio::test]
async fn listings_get_separate_conversations() {
    let world = World::new();
    let renter = world.sign_in(renter()).await;

    let a = renter.open_conversation(&owner().contact, Some("listing-1")).await.unwrap();
    let b = renter.open_conversation(&owner().contact, Some("listing-2")).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(renter.list_conversations().len(), 2);
}

#[tokio::test]
async fn conversation_with_yourself_is_rejected() {
    let world = World::new();
    let renter = world.sign_in(renter()).await;

    let err = renter.open_conversation(&common::renter().contact, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn summaries_track_the_newest_message() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    renter.send_message(&id, text("first")).await.unwrap();
    world.clock.advance(1_000);
    owner.send_message(&id, text("second")).await.unwrap();

    for uid in [RENTER, OWNER] {
        let entry = world.entry(uid, &id);
        assert_eq!(entry["lastMessage"], json!("second"));
        assert_eq!(entry["lastMessageSenderId"], json!(OWNER));
        assert_eq!(entry["lastMessageSequence"], json!(2));
    }
    eventually(|| {
        renter
            .list_conversations()
            .first()
            .and_then(|c| c.last_message.clone())
            .is_some_and(|m| m.preview == "second")
    })
    .await;
}

#[tokio::test]
async fn malformed_entries_are_left_out_of_the_list() {
    let world = World::new();
    world
        .store
        .seed(&StorePath::conversation_entry(RENTER, "c-broken").unwrap(), json!({"unreadCount": "lots"}))
        .unwrap();
    let renter = world.sign_in(renter()).await;

    renter.open_conversation(&owner().contact, None).await.unwrap();

    let list = renter.list_conversations();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].contact.id, OWNER);
}

#[tokio::test]
async fn list_subscribers_follow_new_conversations() {
    let world = World::new();
    let owner = world.sign_in(owner()).await;
    let renter = world.sign_in(renter()).await;
    let scope = Scope::new();
    let (seen, callback) = recorder::<Vec<lc_core::Conversation>>();
    owner.subscribe_conversation_list(&scope, OWNER, callback).await.unwrap();

    renter.open_conversation(&common::owner().contact, None).await.unwrap();

    eventually(|| seen.lock().unwrap().last().is_some_and(|list| list.len() == 1)).await;
    let err = owner
        .subscribe_conversation_list(&scope, RENTER, recorder::<Vec<lc_core::Conversation>>().1)
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn sign_out_forgets_the_session() {
    let world = World::new();
    let (renter, _owner, _id) = world.pair().await;

    renter.sign_out().await.unwrap();

    assert!(renter.list_conversations().is_empty());
    assert!(renter.current_user().is_none());
    let err = renter.open_conversation(&owner().contact, None).await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
}
