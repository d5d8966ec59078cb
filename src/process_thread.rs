//! Dedicated worker thread owning one command queue.
//!
//! A `ProcessThread` is the unit of serialisation for user code: every
//! callback handed to it runs on its single worker, one at a time, in
//! enqueue order. Scheduling delegates to the shared [`TimerThread`] with
//! this thread's queue as the target, so deferred commands land back on
//! the same serial queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::QueueFullError;
use crate::queue::{Command, CommandQueue};
use crate::timer::{ScheduledCommand, TimerControl, TimerThread};

/// A named worker running a [`CommandQueue`] loop.
///
/// Follows the spawn / stop / join lifecycle: `start` launches the worker,
/// `stop` halts the queue (the worker drains and exits), `join` waits for
/// it. Dropping the handle signals stop without joining.
pub struct ProcessThread {
    name: String,
    queue: Arc<CommandQueue>,
    timer: Arc<TimerThread>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessThread {
    /// Create a process thread with an unbounded queue.
    pub fn new(name: &str, timer: Arc<TimerThread>) -> Self {
        Self::with_queue(name, Arc::new(CommandQueue::new()), timer)
    }

    /// Create a process thread over an existing queue (bounded or not).
    pub fn with_queue(name: &str, queue: Arc<CommandQueue>, timer: Arc<TimerThread>) -> Self {
        ProcessThread {
            name: name.to_string(),
            queue,
            timer,
            handle: Mutex::new(None),
        }
    }

    /// The thread's name, also used as the OS thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this thread consumes.
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// Launch the worker. Idempotent: a second call is a no-op.
    ///
    /// The worker catches panics at the loop boundary: a panicking command
    /// is logged and the loop continues, so one bad callback cannot take
    /// down the whole context.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        let queue = Arc::clone(&self.queue);
        let name = self.name.clone();
        let worker = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                while let Some(command) = queue.dequeue() {
                    if panic::catch_unwind(AssertUnwindSafe(command)).is_err() {
                        log::error!("process thread '{}': command panicked, continuing", name);
                    }
                }
                log::trace!("process thread '{}': queue drained, exiting", name);
            })
            .expect("failed to spawn process thread");
        *handle = Some(worker);
    }

    /// Halt the queue; the worker drains and exits. Idempotent.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Wait for the worker to exit.
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Forward a command to the queue.
    pub fn enqueue(&self, command: Command) -> Result<(), QueueFullError> {
        self.queue.enqueue(command)
    }

    /// Schedule `command` to run on this thread after `delay_ms`.
    pub fn schedule(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        delay_ms: u64,
    ) -> TimerControl {
        self.schedule_command(Arc::new(command), delay_ms)
    }

    /// Schedule `command` to run on this thread after `first_delay_ms`,
    /// then every `interval_ms` until cancelled.
    pub fn schedule_on_interval(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        first_delay_ms: u64,
        interval_ms: u64,
    ) -> TimerControl {
        self.timer.queue_event_on_interval(
            Arc::clone(&self.queue),
            Arc::new(command),
            first_delay_ms,
            interval_ms,
        )
    }

    fn schedule_command(&self, command: ScheduledCommand, delay_ms: u64) -> TimerControl {
        self.timer
            .queue_event(Arc::clone(&self.queue), command, delay_ms)
    }
}

impl Drop for ProcessThread {
    fn drop(&mut self) {
        self.queue.stop();
    }
}
