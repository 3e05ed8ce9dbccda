use std::fmt;

use super::types::{WebSocketError, WebSocketResult};

/// Identifies one transport handle opened by the controller.
///
/// Every `open` gets a fresh id, so callbacks from a superseded handle can be recognised and
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Lifecycle callback from a transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// An open (or opening) transport handle.
pub trait Transport {
    /// Queue one text frame for transmission. Must not block.
    fn send_text(&mut self, text: &str) -> WebSocketResult<()>;

    /// Begin closing. Safe to call more than once.
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens transport handles. Callbacks for the returned handle are delivered to
/// `ConnectionController::handle_transport_event` tagged with `id`.
pub trait Connector {
    type Link: Transport;

    fn open(&mut self, id: ConnectionId, url: &str) -> WebSocketResult<Self::Link>;
}

/// Supplies the target address when the configuration carries none.
pub trait AddressResolver {
    fn resolve(&self) -> WebSocketResult<String>;
}

impl<F> AddressResolver for F
where
    F: Fn() -> WebSocketResult<String>,
{
    fn resolve(&self) -> WebSocketResult<String> {
        self()
    }
}

/// Always resolves to the same address.
#[derive(Debug, Clone)]
pub struct FixedAddress(pub String);

impl AddressResolver for FixedAddress {
    fn resolve(&self) -> WebSocketResult<String> {
        Ok(self.0.clone())
    }
}

/// Derives a websocket address from a page origin, mapping `https` to `wss` and `http` to `ws`.
#[derive(Debug, Clone)]
pub struct OriginResolver {
    origin: String,
    path: String,
}

impl OriginResolver {
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
        }
    }
}

impl AddressResolver for OriginResolver {
    fn resolve(&self) -> WebSocketResult<String> {
        let origin = self.origin.trim_end_matches('/');
        let (scheme, host) = origin.split_once("://").ok_or_else(|| {
            WebSocketError::InvalidState(format!("origin has no scheme: {origin}"))
        })?;
        let ws_scheme = match scheme {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(WebSocketError::InvalidState(format!(
                    "unsupported origin scheme: {other}"
                )));
            }
        };
        if host.is_empty() {
            return Err(WebSocketError::InvalidState(format!(
                "origin has no host: {origin}"
            )));
        }
        let path = if self.path.starts_with('/') || self.path.is_empty() {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(format!("{ws_scheme}://{host}{path}"))
    }
}
