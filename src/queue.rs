//! Single-consumer blocking command queue.
//!
//! A `CommandQueue` is the serial execution backbone of a process context:
//! many producers append commands, exactly one consumer (the owning worker
//! thread) pops and runs them in FIFO order. The consumer blocks while the
//! queue is empty and running; `stop` wakes it so it can drain whatever is
//! left and exit.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::QueueFullError;

/// A nullary action queued for serial execution on a process thread.
pub type Command = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    commands: VecDeque<Command>,
    running: bool,
}

/// Single-consumer, many-producer blocking FIFO of commands.
///
/// ## Example
///
/// ```
/// use procbus::CommandQueue;
///
/// let queue = CommandQueue::new();
/// queue.enqueue(Box::new(|| println!("hello"))).unwrap();
/// queue.stop();
/// queue.run(); // drains the one command, then exits
/// ```
pub struct CommandQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    max_depth: Option<usize>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_depth(None)
    }

    /// Create a queue that rejects commands once `max_depth` are pending.
    pub fn bounded(max_depth: usize) -> Self {
        Self::with_depth(Some(max_depth))
    }

    fn with_depth(max_depth: Option<usize>) -> Self {
        CommandQueue {
            state: Mutex::new(QueueState {
                commands: VecDeque::new(),
                running: true,
            }),
            ready: Condvar::new(),
            max_depth,
        }
    }

    /// Append a command and wake the consumer.
    ///
    /// Fails with [`QueueFullError`] when the queue is bounded and at
    /// capacity. Enqueueing after `stop` is a silent no-op: the command is
    /// dropped and `Ok(())` returned.
    pub fn enqueue(&self, command: Command) -> Result<(), QueueFullError> {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Ok(());
        }
        if let Some(depth) = self.max_depth {
            if state.commands.len() >= depth {
                return Err(QueueFullError { depth });
            }
        }
        state.commands.push_back(command);
        self.ready.notify_one();
        Ok(())
    }

    /// Pop the next command, blocking while the queue is empty and running.
    ///
    /// After `stop`, queued commands keep coming out until the queue is
    /// drained; then `None`.
    pub fn dequeue(&self) -> Option<Command> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(command) = state.commands.pop_front() {
                return Some(command);
            }
            if !state.running {
                return None;
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    /// Dequeue and invoke one command. Returns `false` once the queue is
    /// stopped and drained.
    pub fn execute_next(&self) -> bool {
        match self.dequeue() {
            Some(command) => {
                command();
                true
            }
            None => false,
        }
    }

    /// Loop `execute_next` until the queue is stopped and drained.
    pub fn run(&self) {
        while self.execute_next() {}
    }

    /// Mark the queue non-running and wake all waiters. Idempotent.
    ///
    /// Commands still queued at this point drain opportunistically; no new
    /// commands are admitted.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        self.ready.notify_all();
    }

    /// Whether `stop` has not been called yet.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Number of commands currently pending.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().commands.len()
    }

    /// Whether no commands are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
