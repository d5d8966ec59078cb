//! Shared timer thread dispatching scheduled commands into command queues.
//!
//! One `TimerThread` serves the whole runtime. It owns a sorted index of
//! pending events keyed by absolute expiration (milliseconds on its own
//! monotonic clock, started at zero at construction) and arms exactly one
//! timed wait at a time, for the earliest future expiration. Expired events
//! enqueue their command into the target `CommandQueue`; recurring events
//! re-insert themselves with `expiration = now + interval`.
//!
//! Cancellation is a flag flip: the event stays in the index and its
//! execution becomes a no-op at expiry. That keeps `cancel` O(1) at the
//! cost of one wasted wake-up per cancelled schedule.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::queue::CommandQueue;

/// A command the timer can enqueue more than once. Recurring schedules
/// enqueue it every interval, so unlike a queue [`Command`](crate::Command)
/// it must be re-callable.
pub type ScheduledCommand = Arc<dyn Fn() + Send + Sync + 'static>;

/// Cancellation handle for a scheduled event.
///
/// `cancel` is idempotent and safe from any thread. It suppresses every
/// execution that has not already enqueued its command.
#[derive(Clone)]
pub struct TimerControl {
    canceled: Arc<AtomicBool>,
}

impl TimerControl {
    /// Suppress all subsequent executions of the scheduled event.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A scheduled unit: expiration instant, target queue, command, and the
/// cancellation flag shared with its [`TimerControl`].
struct PendingEvent {
    expiration: u64,
    interval: Option<u64>,
    target: Arc<CommandQueue>,
    command: ScheduledCommand,
    canceled: Arc<AtomicBool>,
}

impl PendingEvent {
    /// Enqueue the command into the target queue. Returns the successor
    /// event for recurring schedules, `None` for one-shots and cancelled
    /// events.
    fn execute(mut self, now: u64) -> Option<PendingEvent> {
        if self.canceled.load(Ordering::SeqCst) {
            return None;
        }
        let command = Arc::clone(&self.command);
        if let Err(err) = self.target.enqueue(Box::new(move || (*command)())) {
            // The timer is not backpressure-aware; the receive-side
            // QueueFullEvent pathway belongs to the ProcessBus.
            log::warn!("timer: dropping expired command: {}", err);
        }
        match self.interval {
            Some(interval) => {
                self.expiration = now + interval;
                Some(self)
            }
            None => None,
        }
    }
}

struct TimerState {
    /// expiration -> events, insertion order preserved within a key.
    index: BTreeMap<u64, Vec<PendingEvent>>,
    running: bool,
}

/// One scheduler per runtime.
///
/// The worker is spawned eagerly at construction and parks on a condvar
/// until an event is due or inserted. `stop` wakes it for the last time;
/// in-flight expirations complete but no new wait is armed.
pub struct TimerThread {
    state: Mutex<TimerState>,
    alarm: Condvar,
    started: Instant,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    /// Create the timer and spawn its worker thread.
    pub fn new() -> Arc<Self> {
        let timer = Arc::new(TimerThread {
            state: Mutex::new(TimerState {
                index: BTreeMap::new(),
                running: true,
            }),
            alarm: Condvar::new(),
            started: Instant::now(),
            handle: Mutex::new(None),
        });

        let worker = Arc::clone(&timer);
        let handle = thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn timer thread");
        *timer.handle.lock().unwrap() = Some(handle);

        timer
    }

    /// Milliseconds elapsed on the timer's monotonic clock.
    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Schedule `command` to be enqueued into `target` once, after
    /// `delay_ms` milliseconds.
    pub fn queue_event(
        &self,
        target: Arc<CommandQueue>,
        command: ScheduledCommand,
        delay_ms: u64,
    ) -> TimerControl {
        self.insert(target, command, delay_ms, None)
    }

    /// Schedule `command` to be enqueued into `target` after
    /// `first_delay_ms`, then every `interval_ms` until cancelled.
    pub fn queue_event_on_interval(
        &self,
        target: Arc<CommandQueue>,
        command: ScheduledCommand,
        first_delay_ms: u64,
        interval_ms: u64,
    ) -> TimerControl {
        self.insert(target, command, first_delay_ms, Some(interval_ms))
    }

    fn insert(
        &self,
        target: Arc<CommandQueue>,
        command: ScheduledCommand,
        delay_ms: u64,
        interval: Option<u64>,
    ) -> TimerControl {
        let canceled = Arc::new(AtomicBool::new(false));
        let control = TimerControl {
            canceled: Arc::clone(&canceled),
        };
        self.reinsert(PendingEvent {
            expiration: self.now_ms() + delay_ms,
            interval,
            target,
            command,
            canceled,
        });
        control
    }

    /// Insertion path shared with recurring successors: takes the lock,
    /// files the event, and signals the worker so an earlier expiration
    /// re-arms the wait.
    fn reinsert(&self, event: PendingEvent) {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return;
        }
        state.index.entry(event.expiration).or_default().push(event);
        self.alarm.notify_one();
    }

    fn run(&self) {
        let mut state = self.state.lock().unwrap();
        while state.running {
            let now = self.now_ms();
            match state.index.keys().next().copied() {
                None => {
                    state = self.alarm.wait(state).unwrap();
                }
                Some(earliest) if earliest > now => {
                    let (guard, _) = self
                        .alarm
                        .wait_timeout(state, Duration::from_millis(earliest - now))
                        .unwrap();
                    state = guard;
                }
                Some(_) => {
                    // Everything due up to `now` comes out in ascending key
                    // order, insertion order within a key.
                    let later = state.index.split_off(&(now + 1));
                    let expired = std::mem::replace(&mut state.index, later);
                    drop(state);

                    let mut successors = Vec::new();
                    for (_, events) in expired {
                        for event in events {
                            if let Some(successor) = event.execute(now) {
                                successors.push(successor);
                            }
                        }
                    }
                    for successor in successors {
                        self.reinsert(successor);
                    }

                    // Loop immediately: a successor may already be due.
                    state = self.state.lock().unwrap();
                }
            }
        }
    }

    /// Stop the scheduler and wake the worker. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        self.alarm.notify_all();
    }

    /// Wait for the worker thread to exit.
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}
