use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience result alias for session operations.
pub type WebSocketResult<T> = Result<T, WebSocketError>;

/// Close code used for caller-initiated disconnects.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when a connect or heartbeat timeout tears the socket down.
pub const CLOSE_TIMEOUT: u16 = 4000;
/// Close code reported when the transport vanished without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Canonical error surface shared across the engine and the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {context}")]
    Timeout { context: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("Backpressure: outbound queue full, oldest message dropped")]
    QueueOverflow,

    #[error("Outbound queue cleared before the message could be sent")]
    QueueCleared,

    #[error("Heartbeat timeout: no acknowledgment within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    #[error("Reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Not connected and message was not queued: {0}")]
    NotQueued(String),

    #[error("Transport error ({context}): {error}")]
    TransportError {
        context: &'static str,
        error: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Actor error: {0}")]
    ActorError(String),
}

impl WebSocketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebSocketError::ConnectionFailed(_) => ErrorKind::ConnectFailure,
            WebSocketError::Timeout { .. } => ErrorKind::ConnectTimeout,
            WebSocketError::SendFailed(_) | WebSocketError::NotQueued(_) => ErrorKind::SendFailure,
            WebSocketError::ParseFailed(_) => ErrorKind::ParseFailure,
            WebSocketError::QueueOverflow | WebSocketError::QueueCleared => {
                ErrorKind::QueueOverflow
            }
            WebSocketError::HeartbeatTimeout { .. } => ErrorKind::HeartbeatTimeout,
            WebSocketError::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            WebSocketError::TransportError { .. } => ErrorKind::Transport,
            WebSocketError::InvalidState(_) | WebSocketError::ActorError(_) => ErrorKind::Internal,
        }
    }
}

/// Classification carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectFailure,
    ConnectTimeout,
    SendFailure,
    ParseFailure,
    QueueOverflow,
    HeartbeatTimeout,
    ReconnectExhausted,
    Transport,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectFailure => "connect_failure",
            ErrorKind::ConnectTimeout => "connect_timeout",
            ErrorKind::SendFailure => "send_failure",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::QueueOverflow => "queue_overflow",
            ErrorKind::HeartbeatTimeout => "heartbeat_timeout",
            ErrorKind::ReconnectExhausted => "reconnect_exhausted",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of the session. Owned exclusively by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Closed,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Reconnecting => "RECONNECTING",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended. Attached to every `disconnected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Manual,
    NetworkError,
    ServerClosed,
    Timeout,
    MaxRetriesExceeded,
    Unknown,
}

impl DisconnectReason {
    /// Classify a transport close code.
    ///
    /// `1005`, `1006` and `1011..=1015` signal that the socket died without a clean
    /// handshake; `1000..=1003` and the application range `4000..=4999` are
    /// deliberate closes by the peer.
    pub fn from_close_code(code: u16) -> Self {
        match code {
            1005 | 1006 | 1011..=1015 => DisconnectReason::NetworkError,
            1000..=1003 | 4000..=4999 => DisconnectReason::ServerClosed,
            _ => DisconnectReason::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Manual => "MANUAL",
            DisconnectReason::NetworkError => "NETWORK_ERROR",
            DisconnectReason::ServerClosed => "SERVER_CLOSED",
            DisconnectReason::Timeout => "TIMEOUT",
            DisconnectReason::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            DisconnectReason::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session configuration. Every field has a default.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Target address. When `None` the controller asks its `AddressResolver`.
    pub url: Option<String>,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub reconnect_multiplier: f64,
    /// Zero disables the connect timer.
    pub connect_timeout: Duration,
    /// Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub auto_reconnect: bool,
    pub max_queue_size: usize,
    /// Number of latency samples kept for the rolling average.
    pub latency_window: usize,
    /// Promotes per-frame and per-timer logs from `debug` to `info`.
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_reconnect_attempts: 10,
            initial_reconnect_delay: Duration::from_millis(1_000),
            max_reconnect_delay: Duration::from_millis(30_000),
            reconnect_multiplier: 1.5,
            connect_timeout: Duration::from_millis(10_000),
            heartbeat_interval: Duration::ZERO,
            heartbeat_timeout: Duration::from_millis(10_000),
            auto_reconnect: true,
            max_queue_size: 100,
            latency_window: 10,
            verbose: false,
        }
    }
}

impl SessionConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_reconnect(
        mut self,
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.initial_reconnect_delay = initial_delay;
        self.max_reconnect_delay = max_delay;
        self.reconnect_multiplier = multiplier;
        self
    }

    /// Enable the heartbeat with the given probe interval and acknowledgment timeout.
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        Self {
            write_buffer_bytes: 128 << 10,
            max_write_buffer_bytes: 256 << 10,
            max_message_bytes: 16 * 1024 * 1024,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}
