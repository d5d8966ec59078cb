//! Timer guarantees: delays are honoured, earlier events fire first,
//! recurrence ticks until cancelled, cancellation is idempotent.

mod support;

use std::sync::mpsc;
use std::time::{Duration, Instant};

use procbus::ProcessContextFactory;

use support::{collect_within, recv_exactly};

// ============================================================================
// Test 1: scheduling monotonicity - never early
// ============================================================================

#[test]
fn scheduled_command_never_runs_early() {
    let factory = ProcessContextFactory::new();
    let ctx = factory.create("sched");
    ctx.start();

    let (tx, rx) = mpsc::channel();
    let scheduled_at = Instant::now();
    ctx.schedule(move || tx.send(Instant::now()).unwrap(), 60);

    let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(fired_at.duration_since(scheduled_at) >= Duration::from_millis(55));

    ctx.stop();
    ctx.join();
    factory.shutdown();
}

// ============================================================================
// Test 2: two one-shots - shorter delay runs first, both on the context
// ============================================================================

#[test]
fn shorter_delay_fires_before_longer() {
    let factory = ProcessContextFactory::new();
    let ctx = factory.create("sched");
    ctx.start();

    let (tx, rx) = mpsc::channel();
    let tx_slow = tx.clone();
    ctx.schedule(
        move || {
            tx_slow
                .send(("slow", std::thread::current().name().map(String::from)))
                .unwrap()
        },
        50,
    );
    ctx.schedule(
        move || {
            tx.send(("fast", std::thread::current().name().map(String::from)))
                .unwrap()
        },
        20,
    );

    let order = recv_exactly(&rx, 2, Duration::from_secs(2));
    assert_eq!(order[0].0, "fast");
    assert_eq!(order[1].0, "slow");
    for (_, thread_name) in &order {
        assert_eq!(thread_name.as_deref(), Some("sched"));
    }

    ctx.stop();
    ctx.join();
    factory.shutdown();
}

// ============================================================================
// Test 3: recurrence - ticks at first, first + n*interval, stops on cancel
// ============================================================================

#[test]
fn recurring_schedule_ticks_until_cancelled() {
    let factory = ProcessContextFactory::new();
    let ctx = factory.create("sched");
    ctx.start();

    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let control = ctx.schedule_on_interval(
        move || {
            let _ = tx.send(started.elapsed());
        },
        20,
        60,
    );

    let ticks = recv_exactly(&rx, 3, Duration::from_secs(2));
    control.cancel();

    // Ticks land no earlier than 20, 80, 140 ms.
    assert!(ticks[0] >= Duration::from_millis(15));
    assert!(ticks[1] >= Duration::from_millis(75));
    assert!(ticks[2] >= Duration::from_millis(135));

    // After cancel, silence.
    assert!(collect_within(&rx, Duration::from_millis(200)).is_empty());

    ctx.stop();
    ctx.join();
    factory.shutdown();
}

// ============================================================================
// Test 4: cancellation - idempotent from any point
// ============================================================================

#[test]
fn cancel_is_idempotent_and_total() {
    let factory = ProcessContextFactory::new();
    let ctx = factory.create("sched");
    ctx.start();

    let (tx, rx) = mpsc::channel::<()>();
    let control = ctx.schedule(move || tx.send(()).unwrap(), 40);
    control.cancel();
    control.cancel();
    assert!(control.is_canceled());

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    // Cancelling after the (suppressed) expiry is still safe.
    control.cancel();

    ctx.stop();
    ctx.join();
    factory.shutdown();
}

// ============================================================================
// Test 5: cancelled recurring schedule never ticks again
// ============================================================================

#[test]
fn cancelled_recurring_schedule_stays_silent() {
    let factory = ProcessContextFactory::new();
    let ctx = factory.create("sched");
    ctx.start();

    let (tx, rx) = mpsc::channel::<()>();
    let control = ctx.schedule_on_interval(
        move || {
            let _ = tx.send(());
        },
        10,
        20,
    );

    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    control.cancel();

    // One tick may already be in flight; after that, nothing.
    let _ = rx.recv_timeout(Duration::from_millis(60));
    assert!(collect_within(&rx, Duration::from_millis(200)).is_empty());

    ctx.stop();
    ctx.join();
    factory.shutdown();
}
