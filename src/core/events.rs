use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use sonic_rs::Value;
use tracing::error;

use super::types::{ConnectionState, DisconnectReason, ErrorKind};
use super::wire::Command;

/// Names of the events a session emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Message,
    Error,
    ReconnectAttempt,
    StateChange,
    MessageSent,
    AuthChange,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Message,
        EventKind::Error,
        EventKind::ReconnectAttempt,
        EventKind::StateChange,
        EventKind::MessageSent,
        EventKind::AuthChange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Message => "message",
            EventKind::Error => "error",
            EventKind::ReconnectAttempt => "reconnect_attempt",
            EventKind::StateChange => "state_change",
            EventKind::MessageSent => "message_sent",
            EventKind::AuthChange => "auth_change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload for each event kind. Timestamps are milliseconds on the session clock.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        timestamp: u64,
        /// Reconnect attempts consumed before this connection succeeded.
        attempts: u32,
    },
    Disconnected {
        reason: DisconnectReason,
        code: u16,
        reason_text: String,
        was_authenticated: bool,
        timestamp: u64,
    },
    Message {
        data: Value,
        raw: String,
        timestamp: u64,
    },
    Error {
        kind: ErrorKind,
        message: String,
        /// Set when the error also ends the connection or the backoff cycle.
        reason: Option<DisconnectReason>,
        timestamp: u64,
    },
    ReconnectAttempt {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        timestamp: u64,
    },
    StateChange {
        previous: ConnectionState,
        current: ConnectionState,
        timestamp: u64,
    },
    MessageSent {
        command: Command,
        serialized: String,
        timestamp: u64,
    },
    AuthChange {
        is_authenticated: bool,
        timestamp: u64,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connected { .. } => EventKind::Connected,
            SessionEvent::Disconnected { .. } => EventKind::Disconnected,
            SessionEvent::Message { .. } => EventKind::Message,
            SessionEvent::Error { .. } => EventKind::Error,
            SessionEvent::ReconnectAttempt { .. } => EventKind::ReconnectAttempt,
            SessionEvent::StateChange { .. } => EventKind::StateChange,
            SessionEvent::MessageSent { .. } => EventKind::MessageSent,
            SessionEvent::AuthChange { .. } => EventKind::AuthChange,
        }
    }
}

/// Event callback. Identity is the `Arc` allocation, so clone the same `Arc` to unsubscribe.
pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

pub fn listener(f: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Listener {
    Arc::new(f)
}

#[derive(Clone)]
struct Registration {
    listener: Listener,
    once: bool,
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Per-event, insertion-ordered listener sets.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: HashMap<EventKind, Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`. Registering an already-present listener is a no-op.
    pub fn on(&mut self, kind: EventKind, listener: Listener) {
        self.insert(kind, listener, false);
    }

    /// Register `listener` for a single delivery of `kind`.
    pub fn once(&mut self, kind: EventKind, listener: Listener) {
        self.insert(kind, listener, true);
    }

    /// Remove `listener` from `kind`. Returns whether it was registered.
    pub fn off(&mut self, kind: EventKind, listener: &Listener) -> bool {
        let Some(list) = self.entries.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| !same_listener(&entry.listener, listener));
        before != list.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.entries.get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Deliver `event` to every listener registered for its kind.
    ///
    /// Listeners run against a snapshot taken before dispatch. A panicking listener is logged
    /// and skipped.
    pub fn emit(&mut self, event: &SessionEvent) {
        let kind = event.kind();
        let Some(list) = self.entries.get_mut(&kind) else {
            return;
        };
        let snapshot: Vec<Registration> = list.clone();
        list.retain(|entry| !entry.once);

        for entry in snapshot {
            let listener = entry.listener;
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(event = %kind, "event listener panicked");
            }
        }
    }

    fn insert(&mut self, kind: EventKind, listener: Listener, once: bool) {
        let list = self.entries.entry(kind).or_default();
        if list
            .iter()
            .any(|entry| same_listener(&entry.listener, &listener))
        {
            return;
        }
        list.push(Registration { listener, once });
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            let count = self.listener_count(kind);
            if count > 0 {
                map.entry(&kind.as_str(), &count);
            }
        }
        map.finish()
    }
}
