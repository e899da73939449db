// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting() -> (Arc<AtomicUsize>, Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let subscription = Subscription::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, subscription)
}

#[test]
fn drop_cancels_once() {
    let (count, subscription) = counting();
    drop(subscription);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_cancels_once() {
    let (count, subscription) = counting();
    subscription.unsubscribe();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn noop_subscription() {
    let subscription = Subscription::noop();
    assert_eq!(format!("{subscription:?}"), "Subscription { active: false }");
    subscription.unsubscribe();
}
