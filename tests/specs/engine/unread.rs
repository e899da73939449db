// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Unread count scenarios for a reader who is idle, viewing, or switching
//! between the two.

mod common;

use common::*;

#[tokio::test]
async fn message_after_mark_as_read_counts_once() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    renter.send_message(&id, text("one")).await.unwrap();
    eventually(|| owner.unread_count(&id) == 1).await;

    owner.mark_as_read(&id).await.unwrap();
    assert_eq!(owner.unread_count(&id), 0);
    renter.send_message(&id, text("two")).await.unwrap();

    eventually(|| owner.unread_count(&id) == 1).await;
    eventually(|| world.entry(OWNER, &id)["unreadCount"] == json!(1)).await;
}

#[tokio::test]
async fn unread_conversation_is_listed_first() {
    let world = World::new();
    let owner = world.sign_in(owner()).await;
    let renter = world.sign_in(renter()).await;
    let quiet = owner
        .open_conversation(&Contact::new("renter-2", "Quentin"), None)
        .await
        .unwrap();
    let busy = renter.open_conversation(&common::owner().contact, None).await.unwrap();
    eventually(|| owner.list_conversations().len() == 2).await;

    renter.send_message(&busy, text("one")).await.unwrap();
    renter.send_message(&busy, text("two")).await.unwrap();
    world.clock.advance(60_000);
    owner.send_message(&quiet, text("newer, but already read")).await.unwrap();

    eventually(|| owner.unread_count(&busy) == 2).await;
    eventually(|| owner.list_conversations().first().is_some_and(|c| c.id == busy)).await;
    let list = owner.list_conversations();
    assert_eq!(list[0].unread_count, 2);
    assert_eq!(list[1].id, quiet);
    assert_eq!(list[1].unread_count, 0);
}

#[tokio::test]
async fn viewing_reader_never_accumulates_unread() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    owner.focus_conversation(&id).await.unwrap();

    let sent = renter.send_message(&id, text("are you there?")).await.unwrap();

    eventually(|| world.stored_message(&id, &sent)["isRead"] == json!(true)).await;
    assert_eq!(owner.unread_count(&id), 0);
    assert_eq!(owner.reader_state(&id), ReaderState::Viewing);
}

#[tokio::test]
async fn message_racing_blur_is_read() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    owner.focus_conversation(&id).await.unwrap();

    let sent = renter.send_message(&id, text("quick one")).await.unwrap();
    owner.blur_conversation(&id).await.unwrap();

    assert_eq!(owner.reader_state(&id), ReaderState::Idle);
    assert_eq!(owner.unread_count(&id), 0);
    assert_eq!(world.stored_message(&id, &sent)["isRead"], json!(true));
    assert_eq!(world.entry(OWNER, &id)["unreadCount"], json!(0));
}

#[tokio::test]
async fn read_receipt_reaches_the_sender() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    renter.send_message(&id, text("one")).await.unwrap();
    renter.send_message(&id, text("two")).await.unwrap();
    eventually(|| owner.unread_count(&id) == 2).await;

    owner.focus_conversation(&id).await.unwrap();

    assert_eq!(world.entry(RENTER, &id)["counterpartyReadSequence"], json!(2));
    eventually(|| {
        renter
            .list_conversations()
            .first()
            .is_some_and(|c| c.last_message_seen_by_counterparty())
    })
    .await;
}

#[tokio::test]
async fn own_messages_never_count_as_unread() {
    let world = World::new();
    let (renter, _owner, id) = world.pair().await;

    renter.send_message(&id, text("one")).await.unwrap();
    renter.send_message(&id, text("two")).await.unwrap();
    renter.refresh_conversation(&id).await.unwrap();

    assert_eq!(renter.unread_count(&id), 0);
}
