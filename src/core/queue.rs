use std::fmt;

use super::circular_buffer::CircularBuffer;
use super::types::WebSocketError;
use super::wire::Command;

pub type SuccessCallback = Box<dyn FnOnce() + Send>;
pub type ErrorCallback = Box<dyn FnOnce(&WebSocketError) + Send>;

/// Per-message completion callbacks. Each fires at most once.
#[derive(Default)]
pub struct SendCallbacks {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl SendCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&WebSocketError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn succeed(self) {
        if let Some(f) = self.on_success {
            f();
        }
    }

    pub fn fail(self, error: &WebSocketError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for SendCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Options for a single `send`.
#[derive(Debug)]
pub struct SendOptions {
    /// Buffer the message while disconnected instead of rejecting it.
    pub queue_if_offline: bool,
    pub callbacks: SendCallbacks,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            queue_if_offline: true,
            callbacks: SendCallbacks::default(),
        }
    }
}

impl SendOptions {
    pub fn no_queue() -> Self {
        Self {
            queue_if_offline: false,
            ..Self::default()
        }
    }

    pub fn with_callbacks(mut self, callbacks: SendCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// Result of `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted immediately.
    Sent,
    /// Buffered until the next successful connection.
    Queued,
    Rejected { error: String },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, SendOutcome::Queued)
    }
}

/// A message waiting for a connection.
pub struct QueuedMessage {
    pub command: Command,
    /// Session clock time at enqueue, in milliseconds.
    pub enqueued_at: u64,
    pub attempts: u32,
    callbacks: SendCallbacks,
}

impl QueuedMessage {
    pub fn new(command: Command, enqueued_at: u64, callbacks: SendCallbacks) -> Self {
        Self {
            command,
            enqueued_at,
            attempts: 0,
            callbacks,
        }
    }

    pub fn succeed(self) {
        self.callbacks.succeed();
    }

    pub fn fail(self, error: &WebSocketError) {
        self.callbacks.fail(error);
    }
}

impl fmt::Debug for QueuedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMessage")
            .field("command", &self.command)
            .field("enqueued_at", &self.enqueued_at)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Bounded FIFO of outbound messages held while disconnected.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: CircularBuffer<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: CircularBuffer::new(capacity),
        }
    }

    /// Append `message` at the tail.
    ///
    /// At capacity the oldest entry is evicted first and its error callback fires with
    /// `QueueOverflow`; the evicted command is returned. A zero-capacity queue stores nothing
    /// and hands the message back as `Err`.
    pub fn enqueue(&mut self, message: QueuedMessage) -> Result<Option<Command>, QueuedMessage> {
        match self.entries.push(message) {
            None => Ok(None),
            Some(rejected) if self.entries.capacity() == 0 => Err(rejected),
            Some(evicted) => {
                let command = evicted.command.clone();
                evicted.fail(&WebSocketError::QueueOverflow);
                Ok(Some(command))
            }
        }
    }

    pub fn peek(&self) -> Option<&QueuedMessage> {
        self.entries.front()
    }

    pub fn dequeue(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Empty the queue, returning every entry in FIFO order.
    pub fn flush(&mut self) -> Vec<QueuedMessage> {
        self.entries.drain().collect()
    }

    /// Discard every entry, optionally failing each with `QueueCleared`. Returns the count.
    pub fn clear(&mut self, notify_errors: bool) -> usize {
        let drained = self.flush();
        let count = drained.len();
        if notify_errors {
            for message in drained {
                message.fail(&WebSocketError::QueueCleared);
            }
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}
