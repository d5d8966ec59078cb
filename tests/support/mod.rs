//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

/// Collect everything a channel yields within `window`, without assuming
/// how many items arrive.
pub fn collect_within<T>(rx: &Receiver<T>, window: Duration) -> Vec<T> {
    let deadline = Instant::now() + window;
    let mut items = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            return items;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(item) => items.push(item),
            Err(_) => return items,
        }
    }
}

/// Receive exactly `n` items or panic with a helpful message.
pub fn recv_exactly<T>(rx: &Receiver<T>, n: usize, timeout: Duration) -> Vec<T> {
    let mut items = Vec::new();
    for i in 0..n {
        match rx.recv_timeout(timeout) {
            Ok(item) => items.push(item),
            Err(_) => panic!("expected {} items, got {}", n, i),
        }
    }
    items
}
