//! Batch window and keyed coalescing over the bus.

mod support;

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use procbus::ProcessContextFactory;

use support::collect_within;

// ============================================================================
// Test 1: batch window - N messages, one callback, arrival order
// ============================================================================

#[test]
fn one_callback_per_window_with_all_messages_in_order() {
    let factory = ProcessContextFactory::new();
    let consumer = factory.create("consumer");
    let producer = factory.create("producer");
    consumer.start();
    producer.start();

    let window_ms = 80;
    let (tx, rx) = mpsc::channel();
    let _sub = consumer.subscribe_to_batch("ticks", window_ms, move |batch| {
        let values: Vec<u32> = batch
            .iter()
            .map(|(_, payload)| *payload.downcast_ref::<u32>().unwrap())
            .collect();
        tx.send((Instant::now(), values)).unwrap();
    });

    let first_publish = Instant::now();
    for i in 0..5u32 {
        producer.publish("ticks", i).unwrap();
    }

    let (flushed_at, values) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    // The flush lands no earlier than the window after the first message.
    assert!(flushed_at.duration_since(first_publish) >= Duration::from_millis(window_ms - 10));

    // No second callback without new messages.
    assert!(collect_within(&rx, Duration::from_millis(200)).is_empty());

    consumer.stop();
    consumer.join();
    producer.stop();
    producer.join();
    factory.shutdown();
}

// ============================================================================
// Test 2: keyed batch - same key coalesces, last write wins
// ============================================================================

#[test]
fn keyed_batch_coalesces_within_the_window() {
    let factory = ProcessContextFactory::new();
    let consumer = factory.create("consumer");
    let producer = factory.create("producer");
    consumer.start();
    producer.start();

    let (tx, rx) = mpsc::channel();
    let _sub = consumer.subscribe_to_keyed_batch(
        "quotes",
        50,
        |_, payload| payload.downcast_ref::<(String, String)>().unwrap().0.clone(),
        move |batch| {
            let values: HashMap<String, String> = batch
                .into_iter()
                .map(|(key, (_, payload))| {
                    (
                        key,
                        payload.downcast_ref::<(String, String)>().unwrap().1.clone(),
                    )
                })
                .collect();
            tx.send(values).unwrap();
        },
    );

    for (key, value) in [("k", "a"), ("k", "b"), ("j", "c")] {
        producer
            .publish("quotes", (key.to_string(), value.to_string()))
            .unwrap();
    }

    let batch = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["k"], "b");
    assert_eq!(batch["j"], "c");

    consumer.stop();
    consumer.join();
    producer.stop();
    producer.join();
    factory.shutdown();
}

// ============================================================================
// Test 3: a new window opens after a flush
// ============================================================================

#[test]
fn later_messages_form_a_second_batch() {
    let factory = ProcessContextFactory::new();
    let consumer = factory.create("consumer");
    let producer = factory.create("producer");
    consumer.start();
    producer.start();

    let (tx, rx) = mpsc::channel();
    let _sub = consumer.subscribe_to_batch("logs", 40, move |batch| {
        let values: Vec<u32> = batch
            .iter()
            .map(|(_, payload)| *payload.downcast_ref::<u32>().unwrap())
            .collect();
        tx.send(values).unwrap();
    });

    producer.publish("logs", 1u32).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![1]);

    producer.publish("logs", 2u32).unwrap();
    producer.publish("logs", 3u32).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![2, 3]);

    consumer.stop();
    consumer.join();
    producer.stop();
    producer.join();
    factory.shutdown();
}

// ============================================================================
// Test 4: batch headers are preserved alongside the payloads
// ============================================================================

#[test]
fn batched_messages_keep_their_headers() {
    let factory = ProcessContextFactory::new();
    let consumer = factory.create("consumer");
    let producer = factory.create("producer");
    consumer.start();
    producer.start();

    let (tx, rx) = mpsc::channel();
    let _sub = consumer.subscribe_to_batch("audit", 30, move |batch| {
        let senders: Vec<Option<String>> = batch
            .iter()
            .map(|(header, _)| header.sender().map(String::from))
            .collect();
        tx.send(senders).unwrap();
    });

    producer.publish("audit", ()).unwrap();
    producer.publish("audit", ()).unwrap();

    let senders = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(senders.len(), 2);
    for sender in senders {
        assert_eq!(sender.as_deref(), Some("producer"));
    }

    consumer.stop();
    consumer.join();
    producer.stop();
    producer.join();
    factory.shutdown();
}
