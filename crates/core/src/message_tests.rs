// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::clock::from_millis;
use yare::parameterized;

fn attachment(name: &str) -> Attachment {
    Attachment {
        name: name.to_string(),
        url: format!("https://files.example/{name}"),
        mime_type: Some("application/pdf".to_string()),
        size_bytes: Some(1024),
    }
}

fn message(seq: u64, sender: &str, text: &str, ms: i64) -> Message {
    Message {
        id: MessageId::local(seq),
        conversation_id: ConversationId::new("c-1"),
        sequence: seq,
        sender_id: sender.to_string(),
        sender_role: SenderRole::Renter,
        receiver_id: "other".to_string(),
        body: MessageBody::text(text),
        created_at: from_millis(ms),
        delivery: DeliveryState::Sending,
        is_read: false,
    }
}

#[test]
fn local_ids_are_recognised() {
    assert!(MessageId::local(3).is_local());
    assert!(!MessageId::new("m00000003-abcd0123").is_local());
}

#[test]
fn permanent_id_is_deterministic_and_sortable() {
    let cid = ConversationId::new("c-1");
    let at = from_millis(1_000);
    let a = MessageId::permanent(&cid, 7, "u1", &at);
    let b = MessageId::permanent(&cid, 7, "u1", &at);
    assert_eq!(a, b);
    assert!(a.as_str().starts_with("m00000007-"));
    assert_eq!(a.as_str().len(), "m00000007-".len() + 8);

    let later = MessageId::permanent(&cid, 12, "u1", &at);
    assert!(later > a);
}

#[parameterized(
    renter = { "renter", SenderRole::Renter },
    owner = { "owner", SenderRole::Owner },
    mixed_case = { "Owner", SenderRole::Owner },
)]
fn parse_sender_role(input: &str, expected: SenderRole) {
    assert_eq!(input.parse::<SenderRole>().unwrap(), expected);
}

#[test]
fn parse_sender_role_invalid() {
    assert!("landlord".parse::<SenderRole>().is_err());
}

#[parameterized(
    text = { MessageBody::text("hello"), MessageType::Text },
    emoji = { MessageBody::emoji("👍"), MessageType::Emoji },
    file = { MessageBody::file(attachment("lease.pdf")), MessageType::File },
)]
fn body_kind(body: MessageBody, expected: MessageType) {
    assert_eq!(body.kind(), expected);
}

#[parameterized(
    short_text = { MessageBody::text("hi"), 10, "hi" },
    truncated = { MessageBody::text("abcdefghijkl"), 5, "abcd…" },
    newlines_flattened = { MessageBody::text("a\nb"), 10, "a b" },
    file = { MessageBody::file(attachment("lease.pdf")), 40, "[file] lease.pdf" },
)]
fn body_preview(body: MessageBody, max: usize, expected: &str) {
    assert_eq!(body.preview(max), expected);
}

#[test]
fn preview_counts_chars_not_bytes() {
    let body = MessageBody::text("ééééé");
    assert_eq!(body.preview(5), "ééééé");
    assert_eq!(body.preview(3), "éé…");
}

#[parameterized(
    empty_text = { MessageBody::text("   ") },
    empty_emoji = { MessageBody::emoji("") },
)]
fn draft_rejects_empty(body: MessageBody) {
    assert!(matches!(Draft::new(body), Err(Error::InvalidInput(_))));
}

#[test]
fn draft_rejects_attachment_without_url() {
    let mut file = attachment("x");
    file.url = String::new();
    assert!(Draft::new(MessageBody::file(file)).is_err());
}

#[test]
fn same_send_matches_sender_timestamp_body() {
    let a = message(1, "u1", "hi", 1_000);
    let mut b = message(9, "u1", "hi", 1_000);
    b.id = MessageId::new("m00000009-00000000");
    b.delivery = DeliveryState::Sent;
    assert!(a.same_send_as(&b));

    assert!(!a.same_send_as(&message(1, "u2", "hi", 1_000)));
    assert!(!a.same_send_as(&message(1, "u1", "hi", 1_001)));
    assert!(!a.same_send_as(&message(1, "u1", "hey", 1_000)));
}

#[test]
fn delivery_state_display() {
    assert_eq!(DeliveryState::Sending.to_string(), "sending");
    assert_eq!(DeliveryState::Failed.to_string(), "failed");
}
