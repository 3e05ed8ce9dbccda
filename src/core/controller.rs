use std::fmt;

use tracing::{info, warn};

use super::connector::{AddressResolver, ConnectionId, Connector, Transport, TransportEvent};
use super::events::{EventKind, Listener, ListenerRegistry, SessionEvent};
use super::heartbeat::{HeartbeatMonitor, HeartbeatSignal};
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::queue::{OutboundQueue, QueuedMessage, SendOptions, SendOutcome};
use super::reconnect::{ExponentialBackoff, ReconnectDecision, ReconnectionScheduler};
use super::timer::{TimerId, TimerScheduler, duration_ms};
use super::types::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_TIMEOUT, ConnectionState, DisconnectReason, ErrorKind,
    SessionConfig, WebSocketError, WebSocketResult,
};
use super::wire::{Command, Inbound, classify_inbound, ping_frame};

struct ActiveLink<L> {
    id: ConnectionId,
    handle: L,
}

/// Session lifecycle state machine.
///
/// Owns at most one transport handle and composes backoff, heartbeat, outbound buffering and
/// metrics. The controller is sans-IO: it never sleeps or spawns. Whoever drives it delivers
/// timer expirations through [`handle_timer`](Self::handle_timer) and transport callbacks
/// through [`handle_transport_event`](Self::handle_transport_event), one at a time.
pub struct ConnectionController<C: Connector, S: TimerScheduler> {
    config: SessionConfig,
    connector: C,
    timers: S,
    resolver: Option<Box<dyn AddressResolver + Send>>,
    state: ConnectionState,
    link: Option<ActiveLink<C::Link>>,
    next_connection_id: u64,
    target: Option<String>,
    connect_timer: Option<TimerId>,
    manual_disconnect: bool,
    authenticated: bool,
    destroyed: bool,
    reconnect: ReconnectionScheduler,
    heartbeat: HeartbeatMonitor,
    queue: OutboundQueue,
    metrics: MetricsCollector,
    listeners: ListenerRegistry,
}

macro_rules! detail {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

impl<C: Connector, S: TimerScheduler> ConnectionController<C, S> {
    pub fn new(config: SessionConfig, connector: C, timers: S) -> Self {
        let backoff = ExponentialBackoff::new(
            config.initial_reconnect_delay,
            config.max_reconnect_delay,
            config.reconnect_multiplier,
        );
        Self {
            reconnect: ReconnectionScheduler::new(config.max_reconnect_attempts, backoff),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval, config.heartbeat_timeout),
            queue: OutboundQueue::new(config.max_queue_size),
            metrics: MetricsCollector::new(config.latency_window),
            listeners: ListenerRegistry::new(),
            config,
            connector,
            timers,
            resolver: None,
            state: ConnectionState::Closed,
            link: None,
            next_connection_id: 0,
            target: None,
            connect_timer: None,
            manual_disconnect: false,
            authenticated: false,
            destroyed: false,
        }
    }

    /// Resolve the target address with `resolver` whenever the config carries no url.
    pub fn with_resolver(mut self, resolver: impl AddressResolver + Send + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_boxed_resolver(mut self, resolver: Box<dyn AddressResolver + Send>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    // ---------------------------------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------------------------------

    /// Open a transport. No-op while connecting or connected.
    ///
    /// Interrupts a pending reconnect delay, and starts a fresh backoff cycle when the previous
    /// one was exhausted. An address or open failure is reported through events and the
    /// reconnect path, and also returned.
    pub fn connect(&mut self) -> WebSocketResult<()> {
        if self.destroyed {
            return Err(WebSocketError::InvalidState(
                "session has been destroyed".to_string(),
            ));
        }
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Ok(());
        }

        self.manual_disconnect = false;
        self.reconnect.cancel(&mut self.timers);
        if self.reconnect.is_exhausted() {
            self.reconnect.reset(&mut self.timers);
            self.metrics.reset_reconnect_counters();
        }
        self.open_transport()
    }

    /// Close the session on purpose. Never followed by an automatic reconnect.
    pub fn disconnect(&mut self) {
        self.manual_disconnect = true;
        self.reconnect.cancel(&mut self.timers);
        self.heartbeat.stop(&mut self.timers);
        self.cancel_connect_timer();

        match self.link.as_mut() {
            Some(active) => {
                active.handle.close(CLOSE_NORMAL, "manual disconnect");
                self.finalize_close(CLOSE_NORMAL, "manual disconnect".to_string(), None);
            }
            None => self.transition(ConnectionState::Closed),
        }
    }

    /// Transmit now when connected, otherwise buffer (or reject) per `options`.
    ///
    /// Completion callbacks in `options` fire synchronously for immediate outcomes and later
    /// for buffered messages.
    pub fn send(&mut self, command: Command, options: SendOptions) -> SendOutcome {
        let SendOptions {
            queue_if_offline,
            callbacks,
        } = options;

        if self.destroyed {
            let error = WebSocketError::InvalidState("session has been destroyed".to_string());
            let outcome = SendOutcome::Rejected {
                error: error.to_string(),
            };
            callbacks.fail(&error);
            return outcome;
        }

        if self.state == ConnectionState::Connected {
            return match self.transmit(command) {
                Ok(()) => {
                    callbacks.succeed();
                    SendOutcome::Sent
                }
                Err(error) => {
                    let outcome = SendOutcome::Rejected {
                        error: error.to_string(),
                    };
                    callbacks.fail(&error);
                    outcome
                }
            };
        }

        if !queue_if_offline {
            let error = WebSocketError::NotQueued(format!("session is {}", self.state));
            let outcome = SendOutcome::Rejected {
                error: error.to_string(),
            };
            callbacks.fail(&error);
            return outcome;
        }

        let action = command.action.clone();
        let message = QueuedMessage::new(command, self.timers.now_ms(), callbacks);
        match self.queue.enqueue(message) {
            Ok(None) => {
                detail!(self.config.verbose, action = %action, queued = self.queue.len(), "message queued while offline");
                SendOutcome::Queued
            }
            Ok(Some(dropped)) => {
                warn!(dropped = %dropped.action, capacity = self.queue.capacity(), "outbound queue full, dropped oldest message");
                self.report_error(
                    WebSocketError::QueueOverflow.kind(),
                    format!("outbound queue full, dropped '{}'", dropped.action),
                    None,
                );
                SendOutcome::Queued
            }
            Err(rejected) => {
                let error = WebSocketError::NotQueued("outbound queue is full".to_string());
                let outcome = SendOutcome::Rejected {
                    error: error.to_string(),
                };
                rejected.fail(&error);
                outcome
            }
        }
    }

    pub fn on(&mut self, kind: EventKind, listener: Listener) {
        if !self.destroyed {
            self.listeners.on(kind, listener);
        }
    }

    pub fn once(&mut self, kind: EventKind, listener: Listener) {
        if !self.destroyed {
            self.listeners.once(kind, listener);
        }
    }

    pub fn off(&mut self, kind: EventKind, listener: &Listener) -> bool {
        self.listeners.off(kind, listener)
    }

    /// Update the authentication flag, emitting `auth_change` only on an actual change.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        if self.destroyed || self.authenticated == authenticated {
            return;
        }
        self.authenticated = authenticated;
        let timestamp = self.timers.now_ms();
        self.emit(SessionEvent::AuthChange {
            is_authenticated: authenticated,
            timestamp,
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.queue.len())
    }

    /// Discard buffered messages without notifying their callbacks. Returns the count.
    pub fn clear_queue(&mut self) -> usize {
        self.queue.clear(false)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// Disconnect and tear everything down. Later `connect` calls fail.
    ///
    /// Listeners still observe the final `disconnected`; buffered messages fail with
    /// `QueueCleared`.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.disconnect();
        self.destroyed = true;
        self.listeners.clear();
        let dropped = self.queue.clear(true);
        info!(connection = %self.label(), dropped, "session destroyed");
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    pub fn timers(&self) -> &S {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    // ---------------------------------------------------------------------------------------
    // Driver entry points
    // ---------------------------------------------------------------------------------------

    /// Deliver a timer expiry. Cancelled and unknown ids are ignored.
    pub fn handle_timer(&mut self, id: TimerId) {
        if self.connect_timer == Some(id) {
            self.connect_timer = None;
            if self.state == ConnectionState::Connecting {
                self.on_connect_timeout();
            }
            return;
        }

        if self.reconnect.take_due(id) {
            if self.state == ConnectionState::Reconnecting && !self.destroyed {
                detail!(self.config.verbose, connection = %self.label(), attempt = self.reconnect.attempts(), "reconnect delay elapsed");
                let _ = self.open_transport();
            }
            return;
        }

        match self.heartbeat.on_timer(id) {
            Some(HeartbeatSignal::Probe) => self.send_probe(),
            Some(HeartbeatSignal::Timeout) => self.on_heartbeat_timeout(),
            None => {
                detail!(self.config.verbose, timer = %id, "ignoring stale timer");
            }
        }
    }

    /// Deliver a transport callback. Events from a superseded handle are ignored.
    pub fn handle_transport_event(&mut self, id: ConnectionId, event: TransportEvent) {
        if self.link.as_ref().map(|active| active.id) != Some(id) {
            detail!(self.config.verbose, connection = %id, event = ?event, "ignoring event for stale connection");
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Frame(text) => self.on_frame(text),
            TransportEvent::Error(message) => {
                let kind = if self.state == ConnectionState::Connecting {
                    ErrorKind::ConnectFailure
                } else {
                    ErrorKind::Transport
                };
                warn!(connection = %self.label(), error = %message, "transport error");
                self.report_error(kind, message, None);
            }
            TransportEvent::Closed { code, reason } => self.finalize_close(code, reason, None),
        }
    }

    // ---------------------------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------------------------

    fn open_transport(&mut self) -> WebSocketResult<()> {
        self.transition(ConnectionState::Connecting);

        self.next_connection_id += 1;
        let id = ConnectionId(self.next_connection_id);

        let opened = self.resolve_target().and_then(|url| {
            info!(connection = %url, id = %id, "connecting");
            self.target = Some(url.clone());
            self.connector.open(id, &url)
        });

        match opened {
            Ok(handle) => {
                self.link = Some(ActiveLink { id, handle });
                if !self.config.connect_timeout.is_zero() {
                    self.connect_timer = Some(self.timers.schedule_once(self.config.connect_timeout));
                }
                Ok(())
            }
            Err(error) => {
                warn!(connection = %self.label(), error = %error, "failed to open transport");
                self.report_error(ErrorKind::ConnectFailure, error.to_string(), None);
                self.finalize_close(CLOSE_ABNORMAL, error.to_string(), None);
                Err(error)
            }
        }
    }

    fn resolve_target(&self) -> WebSocketResult<String> {
        if let Some(url) = &self.config.url {
            return Ok(url.clone());
        }
        match &self.resolver {
            Some(resolver) => resolver.resolve(),
            None => Err(WebSocketError::InvalidState(
                "no target address configured".to_string(),
            )),
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.cancel_connect_timer();

        let attempts = self.reconnect.attempts();
        self.reconnect.reset(&mut self.timers);
        self.metrics.reset_reconnect_counters();
        if attempts > 0 {
            self.metrics.record_reconnect_success();
        }
        let now = self.timers.now_ms();
        self.metrics.record_connected(now);

        self.transition(ConnectionState::Connected);
        info!(connection = %self.label(), attempts, "connected");
        self.emit(SessionEvent::Connected {
            timestamp: now,
            attempts,
        });

        self.heartbeat.start(&mut self.timers);
        self.flush_queue();
    }

    fn on_frame(&mut self, raw: String) {
        match classify_inbound(&raw) {
            Ok(Inbound::Ack) => {
                let now = self.timers.now_ms();
                if let Some(latency) = self.heartbeat.handle_probe_ack(now, &mut self.timers) {
                    self.metrics.record_latency(latency);
                    detail!(self.config.verbose, connection = %self.label(), latency_ms = duration_ms(latency), "heartbeat acknowledged");
                }
            }
            Ok(Inbound::Message(data)) => {
                self.metrics.record_received();
                let timestamp = self.timers.now_ms();
                detail!(self.config.verbose, connection = %self.label(), bytes = raw.len(), "message received");
                self.emit(SessionEvent::Message {
                    data,
                    raw,
                    timestamp,
                });
            }
            Err(error) => {
                warn!(connection = %self.label(), error = %error, "failed to parse inbound frame");
                self.report_error(ErrorKind::ParseFailure, error.to_string(), None);
            }
        }
    }

    /// Serialize and hand `command` to the live transport. Records the outcome.
    fn transmit(&mut self, command: Command) -> WebSocketResult<()> {
        let result = command.to_frame().and_then(|serialized| {
            let active = self.link.as_mut().ok_or_else(|| {
                WebSocketError::InvalidState("no live transport".to_string())
            })?;
            active.handle.send_text(&serialized)?;
            Ok(serialized)
        });

        match result {
            Ok(serialized) => {
                self.metrics.record_sent();
                detail!(self.config.verbose, connection = %self.label(), action = %command.action, "message sent");
                let timestamp = self.timers.now_ms();
                self.emit(SessionEvent::MessageSent {
                    command,
                    serialized,
                    timestamp,
                });
                Ok(())
            }
            Err(error) => {
                warn!(connection = %self.label(), action = %command.action, error = %error, "send failed");
                self.report_error(ErrorKind::SendFailure, error.to_string(), None);
                Err(error)
            }
        }
    }

    /// Re-send everything buffered while offline, oldest first. A message that fails here is
    /// reported to its callback and dropped.
    fn flush_queue(&mut self) {
        let pending = self.queue.flush();
        if pending.is_empty() {
            return;
        }
        info!(connection = %self.label(), count = pending.len(), "flushing outbound queue");

        for mut message in pending {
            message.attempts += 1;
            let command = message.command.clone();
            let action = command.action.clone();
            match self.transmit(command) {
                Ok(()) => message.succeed(),
                Err(error) => {
                    warn!(action = %action, attempts = message.attempts, error = %error, "queued message failed to send, not re-queued");
                    message.fail(&error);
                }
            }
        }
    }

    fn send_probe(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let now = self.timers.now_ms();
        let sent = ping_frame(now).and_then(|frame| match self.link.as_mut() {
            Some(active) => active.handle.send_text(&frame),
            None => Err(WebSocketError::InvalidState("no live transport".to_string())),
        });
        match sent {
            Ok(()) => {
                self.heartbeat.probe_sent(now, &mut self.timers);
                detail!(self.config.verbose, connection = %self.label(), "heartbeat probe sent");
            }
            Err(error) => {
                detail!(self.config.verbose, connection = %self.label(), error = %error, "heartbeat probe not sent, skipping tick");
            }
        }
    }

    fn on_connect_timeout(&mut self) {
        let timeout_ms = duration_ms(self.config.connect_timeout);
        warn!(connection = %self.label(), timeout_ms, "connect timed out");
        let error = WebSocketError::Timeout {
            context: format!("connect did not complete within {timeout_ms}ms"),
        };
        self.close_with_timeout(error);
    }

    fn on_heartbeat_timeout(&mut self) {
        let timeout_ms = duration_ms(self.heartbeat.timeout());
        warn!(connection = %self.label(), timeout_ms, "heartbeat timed out");
        self.close_with_timeout(WebSocketError::HeartbeatTimeout { timeout_ms });
    }

    fn close_with_timeout(&mut self, error: WebSocketError) {
        self.report_error(
            error.kind(),
            error.to_string(),
            Some(DisconnectReason::Timeout),
        );
        let reason = error.to_string();
        if let Some(active) = self.link.as_mut() {
            active.handle.close(CLOSE_TIMEOUT, &reason);
        }
        self.finalize_close(CLOSE_TIMEOUT, reason, Some(DisconnectReason::Timeout));
    }

    /// Terminal step for a connection: release the handle, stop its timers, classify the
    /// close, emit `disconnected` and hand over to the reconnect path.
    fn finalize_close(&mut self, code: u16, reason_text: String, forced: Option<DisconnectReason>) {
        self.cancel_connect_timer();
        self.heartbeat.stop(&mut self.timers);
        self.link = None;

        let reason = if self.manual_disconnect {
            DisconnectReason::Manual
        } else {
            forced.unwrap_or_else(|| DisconnectReason::from_close_code(code))
        };

        let timestamp = self.timers.now_ms();
        self.metrics.record_disconnected(timestamp);
        self.transition(ConnectionState::Closed);
        info!(connection = %self.label(), code, reason = %reason, "disconnected");
        self.emit(SessionEvent::Disconnected {
            reason,
            code,
            reason_text,
            was_authenticated: self.authenticated,
            timestamp,
        });

        if !self.manual_disconnect && !self.destroyed && self.config.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.schedule(&mut self.timers) {
            ReconnectDecision::Scheduled {
                attempt,
                max_attempts,
                delay,
            } => {
                self.metrics.record_reconnect_attempt(delay);
                self.transition(ConnectionState::Reconnecting);
                warn!(connection = %self.label(), attempt, max_attempts, delay_ms = duration_ms(delay), "scheduling reconnect");
                let timestamp = self.timers.now_ms();
                self.emit(SessionEvent::ReconnectAttempt {
                    attempt,
                    max_attempts,
                    delay,
                    timestamp,
                });
            }
            ReconnectDecision::Exhausted { attempts } => {
                let error = WebSocketError::ReconnectExhausted { attempts };
                warn!(connection = %self.label(), attempts, "reconnect attempts exhausted");
                self.report_error(
                    error.kind(),
                    error.to_string(),
                    Some(DisconnectReason::MaxRetriesExceeded),
                );
            }
        }
    }

    /// The only mutator of `state`. Emits one `state_change` per actual change.
    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        let previous = self.state;
        self.state = next;
        detail!(self.config.verbose, connection = %self.label(), from = %previous, to = %next, "state change");
        let timestamp = self.timers.now_ms();
        self.emit(SessionEvent::StateChange {
            previous,
            current: next,
            timestamp,
        });
    }

    fn report_error(&mut self, kind: ErrorKind, message: String, reason: Option<DisconnectReason>) {
        self.metrics.record_error();
        let timestamp = self.timers.now_ms();
        self.emit(SessionEvent::Error {
            kind,
            message,
            reason,
            timestamp,
        });
    }

    fn cancel_connect_timer(&mut self) {
        if let Some(id) = self.connect_timer.take() {
            self.timers.cancel(id);
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.listeners.emit(&event);
    }

    fn label(&self) -> &str {
        self.target.as_deref().unwrap_or("<unresolved>")
    }
}

impl<C: Connector, S: TimerScheduler> fmt::Debug for ConnectionController<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionController")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("connection", &self.link.as_ref().map(|active| active.id))
            .field("authenticated", &self.authenticated)
            .field("destroyed", &self.destroyed)
            .field("reconnect_attempts", &self.reconnect.attempts())
            .field("queued", &self.queue.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
