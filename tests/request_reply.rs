//! Request/reply over ephemeral topics: one-shot completion, first-reply
//! wins, timeouts, and disposal.

mod support;

use std::sync::mpsc;
use std::time::Duration;

use procbus::ProcessContextFactory;

// ============================================================================
// Test 1: the handle completes with the first reply
// ============================================================================

#[test]
fn request_completes_with_the_reply() {
    let factory = ProcessContextFactory::new();
    let client = factory.create("client");
    let server = factory.create("server");
    client.start();
    server.start();

    // The server doubles whatever it is asked.
    let (reply_tx, reply_rx) = mpsc::channel();
    let _serve = server.subscribe("double", move |header, payload| {
        let value = *payload.downcast_ref::<u32>().unwrap();
        reply_tx
            .send((header.reply_to().map(String::from), value * 2))
            .unwrap();
    });

    let pending = client.send_request::<u32, _>("double", 21u32).unwrap();

    // Publish the reply from the server context once the request arrives.
    let (reply_topic, doubled) = reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    server.publish(&reply_topic.unwrap(), doubled).unwrap();

    let reply = pending.wait(Duration::from_secs(2));
    assert_eq!(reply.as_deref(), Some(&42));

    client.stop();
    client.join();
    server.stop();
    server.join();
    factory.shutdown();
}

// ============================================================================
// Test 2: only the first reply counts
// ============================================================================

#[test]
fn first_reply_wins() {
    let factory = ProcessContextFactory::new();
    let client = factory.create("client");
    let server = factory.create("server");
    client.start();
    server.start();

    let (reply_tx, reply_rx) = mpsc::channel();
    let _serve = server.subscribe("ask", move |header, _| {
        reply_tx.send(header.reply_to().map(String::from)).unwrap();
    });

    let pending = client.send_request::<u32, _>("ask", ()).unwrap();
    let reply_topic = reply_rx
        .recv_timeout(Duration::from_secs(2))
        .unwrap()
        .unwrap();

    server.publish(&reply_topic, 1u32).unwrap();
    server.publish(&reply_topic, 2u32).unwrap();

    assert_eq!(pending.wait(Duration::from_secs(2)).as_deref(), Some(&1));
    // The handle is terminal; the second publish went nowhere.
    assert_eq!(pending.try_reply().map(|(_, p)| *p.downcast_ref::<u32>().unwrap()), Some(1));

    client.stop();
    client.join();
    server.stop();
    server.join();
    factory.shutdown();
}

// ============================================================================
// Test 3: no responder - the wait times out cleanly
// ============================================================================

#[test]
fn wait_times_out_without_a_responder() {
    let factory = ProcessContextFactory::new();
    let client = factory.create("client");
    client.start();

    let pending = client.send_request::<u32, _>("void", ()).unwrap();
    assert!(pending.wait(Duration::from_millis(100)).is_none());
    assert!(!pending.is_done());

    client.stop();
    client.join();
    factory.shutdown();
}

// ============================================================================
// Test 4: cancelled handles ignore late replies
// ============================================================================

#[test]
fn cancelled_request_ignores_late_replies() {
    let factory = ProcessContextFactory::new();
    let client = factory.create("client");
    let server = factory.create("server");
    client.start();
    server.start();

    let (reply_tx, reply_rx) = mpsc::channel();
    let _serve = server.subscribe("slow", move |header, _| {
        reply_tx.send(header.reply_to().map(String::from)).unwrap();
    });

    let pending = client.send_request::<u32, _>("slow", ()).unwrap();
    let reply_topic = reply_rx
        .recv_timeout(Duration::from_secs(2))
        .unwrap()
        .unwrap();

    pending.cancel();
    server.publish(&reply_topic, 9u32).unwrap();

    assert!(pending.wait(Duration::from_millis(200)).is_none());
    assert!(pending.try_reply().is_none());

    client.stop();
    client.join();
    server.stop();
    server.join();
    factory.shutdown();
}

// ============================================================================
// Test 5: each request gets its own reply topic
// ============================================================================

#[test]
fn concurrent_requests_do_not_cross_wires() {
    let factory = ProcessContextFactory::new();
    let client = factory.create("client");
    let server = factory.create("server");
    client.start();
    server.start();

    let (reply_tx, reply_rx) = mpsc::channel();
    let _serve = server.subscribe("id", move |header, payload| {
        reply_tx
            .send((
                header.reply_to().map(String::from),
                *payload.downcast_ref::<u32>().unwrap(),
            ))
            .unwrap();
    });

    let first = client.send_request::<u32, _>("id", 1u32).unwrap();
    let second = client.send_request::<u32, _>("id", 2u32).unwrap();

    // Answer in reverse order of arrival.
    let (topic_one, value_one) = reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let (topic_two, value_two) = reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    server.publish(&topic_two.unwrap(), value_two * 10).unwrap();
    server.publish(&topic_one.unwrap(), value_one * 10).unwrap();

    assert_eq!(first.wait(Duration::from_secs(2)).as_deref(), Some(&10));
    assert_eq!(second.wait(Duration::from_secs(2)).as_deref(), Some(&20));

    client.stop();
    client.join();
    server.stop();
    server.join();
    factory.shutdown();
}
