// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message log scenarios: optimistic sends, confirmation, ordering, resend.

mod common;

use common::*;

#[tokio::test]
async fn confirmed_send_leaves_exactly_one_entry() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;

    let sent = renter.send_message(&id, text("is the flat still free?")).await.unwrap();

    let mine = renter.messages(&id);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, sent.id);
    assert_eq!(mine[0].delivery, DeliveryState::Sent);
    eventually(|| owner.messages(&id).len() == 1).await;
    assert_eq!(owner.messages(&id)[0].id, sent.id);
}

#[tokio::test]
async fn both_sides_see_a_gap_free_sequence() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;

    for (i, body) in ["hi", "when can I visit?", "tomorrow works"].into_iter().enumerate() {
        world.clock.advance(1_000);
        let sender = if i % 2 == 0 { &renter } else { &owner };
        sender.send_message(&id, text(body)).await.unwrap();
    }

    eventually(|| renter.messages(&id).len() == 3 && owner.messages(&id).len() == 3).await;
    assert_eq!(sequences(&renter.messages(&id)), vec![1, 2, 3]);
    let ids = |log: Vec<Message>| log.into_iter().map(|m| m.id).collect::<Vec<_>>();
    assert_eq!(ids(renter.messages(&id)), ids(owner.messages(&id)));
}

#[tokio::test]
async fn repeated_refresh_is_idempotent() {
    let world = World::new();
    let (renter, _owner, id) = world.pair().await;
    renter.send_message(&id, text("one")).await.unwrap();
    renter.send_message(&id, text("two")).await.unwrap();

    let first = renter.refresh_conversation(&id).await.unwrap();
    let second = renter.refresh_conversation(&id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(sequences(&second), vec![1, 2]);
}

#[tokio::test]
async fn offline_send_fails_then_resend_takes_next_sequence() {
    let world = World::new();
    let (renter, _owner, id) = world.pair().await;
    renter.send_message(&id, text("first")).await.unwrap();
    let scope = Scope::new();
    let (seen, callback) = recorder::<Vec<Message>>();
    renter.subscribe_messages(&scope, &id, callback).await.unwrap();

    world.store.set_offline(true);
    let failed = renter.send_message(&id, text("second")).await.unwrap();
    world.store.set_offline(false);

    assert_eq!(failed.delivery, DeliveryState::Failed);
    let states: Vec<DeliveryState> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|log| log.iter().find(|m| m.id == failed.id).map(|m| m.delivery))
        .collect();
    assert_eq!(states.first(), Some(&DeliveryState::Sending));
    assert_eq!(states.last(), Some(&DeliveryState::Failed));

    let resent = renter.resend_message(&id, &failed.id).await.unwrap();

    assert_eq!(resent.delivery, DeliveryState::Sent);
    assert_eq!(resent.sequence, 2);
    let log = renter.messages(&id);
    assert_eq!(sequences(&log), vec![1, 2]);
    assert!(log.iter().all(|m| m.delivery == DeliveryState::Sent));
    assert_eq!(world.stored_message(&id, &resent)["text"], json!("second"));
}

#[tokio::test]
async fn scope_disposal_stops_updates() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    let scope = Scope::new();
    let (seen, callback) = recorder::<Vec<Message>>();
    owner.subscribe_messages(&scope, &id, callback).await.unwrap();

    renter.send_message(&id, text("one")).await.unwrap();
    eventually(|| seen.lock().unwrap().last().is_some_and(|log| log.len() == 1)).await;
    scope.dispose();
    let before = seen.lock().unwrap().len();
    renter.send_message(&id, text("two")).await.unwrap();
    eventually(|| owner.messages(&id).len() == 2).await;

    assert_eq!(seen.lock().unwrap().len(), before);
}

#[tokio::test]
async fn failed_repeat_of_identical_message_stays_resendable() {
    let world = World::new();
    let (renter, owner, id) = world.pair().await;
    renter.send_message(&id, text("ok")).await.unwrap();

    world.store.set_offline(true);
    let failed = renter.send_message(&id, text("ok")).await.unwrap();
    world.store.set_offline(false);
    owner.send_message(&id, text("got it")).await.unwrap();
    eventually(|| renter.messages(&id).len() == 3).await;

    let log = renter.messages(&id);
    assert!(log.iter().any(|m| m.id == failed.id && m.delivery == DeliveryState::Failed));

    let resent = renter.resend_message(&id, &failed.id).await.unwrap();
    assert_eq!(resent.delivery, DeliveryState::Sent);
    eventually(|| renter.messages(&id).iter().filter(|m| m.body == text("ok").body).count() == 2).await;
    assert!(renter.messages(&id).iter().all(|m| m.delivery == DeliveryState::Sent));
}
