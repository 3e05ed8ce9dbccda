//! Reusable test utilities.
//!
//! - [`VirtualTimers`] + [`MockConnector`] drive a [`ConnectionController`] deterministically,
//!   with no runtime at all.
//! - [`MockTransport`] + [`MockServer`] stand in for a real socket under the
//!   [`SessionActor`](crate::ws::SessionActor), including refused connects and server-side drops.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use tokio::sync::mpsc;

use crate::core::{
    ConnectionController, ConnectionId, Connector, TimerId, TimerScheduler, Transport,
    TransportEvent, WebSocketBufferConfig, WebSocketError, WebSocketResult, WsFrame, duration_ms,
};
use crate::transport::{WsTransport, WsTransportConnectFuture};

// -------------------------------------------------------------------------------------------
// Virtual clock
// -------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct VirtualTimer {
    due: u64,
    period: Option<u64>,
}

/// Manually advanced clock implementing [`TimerScheduler`].
///
/// Timers fire in due-time order (ties by id). Repeating timers re-arm themselves when they
/// fire.
#[derive(Debug, Default)]
pub struct VirtualTimers {
    now: u64,
    next_id: u64,
    armed_total: u64,
    timers: BTreeMap<TimerId, VirtualTimer>,
}

impl VirtualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers currently armed.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Timers armed since construction, including cancelled and fired ones.
    pub fn armed_total(&self) -> u64 {
        self.armed_total
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Milliseconds until `id` fires, if armed.
    pub fn remaining(&self, id: TimerId) -> Option<Duration> {
        self.timers
            .get(&id)
            .map(|timer| Duration::from_millis(timer.due.saturating_sub(self.now)))
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to its due time.
    pub fn next_due(&mut self, until: u64) -> Option<TimerId> {
        let (id, timer) = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= until)
            .min_by_key(|(id, timer)| (timer.due, **id))
            .map(|(id, timer)| (*id, *timer))?;

        self.now = self.now.max(timer.due);
        match timer.period {
            Some(period) => {
                if let Some(entry) = self.timers.get_mut(&id) {
                    entry.due = timer.due + period;
                }
            }
            None => {
                self.timers.remove(&id);
            }
        }
        Some(id)
    }

    /// Move the clock forward by `by`, returning every expiry in firing order.
    pub fn advance_due(&mut self, by: Duration) -> Vec<TimerId> {
        let until = self.now.saturating_add(duration_ms(by));
        let mut fired = Vec::new();
        while let Some(id) = self.next_due(until) {
            fired.push(id);
        }
        self.now = until;
        fired
    }

    fn arm(&mut self, delay: Duration, period: Option<u64>) -> TimerId {
        self.next_id += 1;
        self.armed_total += 1;
        let id = TimerId(self.next_id);
        self.timers.insert(
            id,
            VirtualTimer {
                due: self.now.saturating_add(duration_ms(delay)),
                period,
            },
        );
        id
    }
}

impl TimerScheduler for VirtualTimers {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        self.arm(delay, None)
    }

    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        let period_ms = duration_ms(period).max(1);
        self.arm(Duration::from_millis(period_ms), Some(period_ms))
    }

    fn cancel(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }
}

impl<C: Connector> ConnectionController<C, VirtualTimers> {
    /// Advance virtual time by `by`, delivering each expiry to the controller as it comes due.
    ///
    /// Timers armed while handling an expiry fire within the same call if they fall inside the
    /// window.
    pub fn advance(&mut self, by: Duration) {
        let until = self.timers().now_ms().saturating_add(duration_ms(by));
        while let Some(id) = self.timers_mut().next_due(until) {
            self.handle_timer(id);
        }
        let timers = self.timers_mut();
        timers.now = timers.now.max(until);
    }
}

// -------------------------------------------------------------------------------------------
// Sans-IO connector
// -------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockWire {
    opened: Vec<(ConnectionId, String)>,
    sent: Vec<(ConnectionId, String)>,
    closed: Vec<(ConnectionId, u16, String)>,
    refuse_opens: u32,
    fail_sends: bool,
}

/// Recording [`Connector`] for controller tests.
///
/// Opens succeed immediately (deliver `TransportEvent::Opened` yourself) unless refused with
/// [`refuse_next_opens`](Self::refuse_next_opens). Clones share the same recording.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    wire: Arc<Mutex<MockWire>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn wire(&self) -> MutexGuard<'_, MockWire> {
        self.wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` opens fail synchronously.
    pub fn refuse_next_opens(&self, count: u32) {
        self.wire().refuse_opens = count;
    }

    /// Make every `send_text` fail until switched off.
    pub fn fail_sends(&self, fail: bool) {
        self.wire().fail_sends = fail;
    }

    pub fn opened(&self) -> Vec<(ConnectionId, String)> {
        self.wire().opened.clone()
    }

    pub fn open_count(&self) -> usize {
        self.wire().opened.len()
    }

    /// Id handed out by the latest successful open.
    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.wire().opened.last().map(|(id, _)| *id)
    }

    /// Every frame written, in order.
    pub fn sent(&self) -> Vec<String> {
        self.wire().sent.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn sent_on(&self, id: ConnectionId) -> Vec<String> {
        self.wire()
            .sent
            .iter()
            .filter(|(conn, _)| *conn == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn closed(&self) -> Vec<(ConnectionId, u16, String)> {
        self.wire().closed.clone()
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn open(&mut self, id: ConnectionId, url: &str) -> WebSocketResult<MockLink> {
        let mut wire = self.wire();
        if wire.refuse_opens > 0 {
            wire.refuse_opens -= 1;
            return Err(WebSocketError::ConnectionFailed(format!(
                "connection to {url} refused"
            )));
        }
        wire.opened.push((id, url.to_string()));
        Ok(MockLink {
            id,
            wire: self.wire.clone(),
        })
    }
}

/// Transport handle produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockLink {
    id: ConnectionId,
    wire: Arc<Mutex<MockWire>>,
}

impl Transport for MockLink {
    fn send_text(&mut self, text: &str) -> WebSocketResult<()> {
        let mut wire = self.wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if wire.fail_sends {
            return Err(WebSocketError::SendFailed("mock link rejected write".to_string()));
        }
        wire.sent.push((self.id, text.to_string()));
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut wire = self.wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        wire.closed.push((self.id, code, reason.to_string()));
    }
}

/// Deliver `event` for the connector's latest connection.
pub fn deliver<S: TimerScheduler>(
    controller: &mut ConnectionController<MockConnector, S>,
    event: TransportEvent,
) {
    if let Some(id) = controller.connector().last_connection() {
        controller.handle_transport_event(id, event);
    }
}

// -------------------------------------------------------------------------------------------
// In-memory WsTransport
// -------------------------------------------------------------------------------------------

/// A transport backed by in-memory channels so tests can play the server.
///
/// Every successful connect hands a fresh [`MockSocket`] to the paired [`MockServer`].
#[derive(Clone)]
pub struct MockTransport {
    accepted: mpsc::UnboundedSender<MockSocket>,
    refuse: Arc<AtomicU32>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicU32::new(0));
        (
            Self {
                accepted,
                refuse: refuse.clone(),
            },
            MockServer { incoming, refuse },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let accepted = self.accepted.clone();
        let refuse = self.refuse.clone();
        Box::pin(async move {
            let refused = refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(WebSocketError::ConnectionFailed(format!(
                    "mock server refused {url}"
                )));
            }

            let (sent_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, rx) = mpsc::unbounded_channel();
            accepted
                .send(MockSocket {
                    url,
                    outbound_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| WebSocketError::ConnectionFailed("mock server is gone".to_string()))?;
            Ok((MockReader { rx }, MockWriter { sent_tx }))
        })
    }
}

/// Error surface for operations on [`MockSocket`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The client side is no longer reading.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server side paired with [`MockTransport`]: accepts connections.
pub struct MockServer {
    incoming: mpsc::UnboundedReceiver<MockSocket>,
    refuse: Arc<AtomicU32>,
}

impl MockServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MockSocket> {
        self.incoming.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockSocket> {
        tokio::time::timeout(timeout, self.incoming.recv())
            .await
            .unwrap_or_default()
    }

    /// Refuse the next `count` connects.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }
}

/// Server view of one accepted connection.
pub struct MockSocket {
    url: String,
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockSocket {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receive a frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Receive the next client text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.outbound_rx.recv().await {
            match frame {
                WsFrame::Text(_) => return frame.as_text().map(str::to_owned),
                WsFrame::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }

    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text))
    }

    /// Close from the server side with a close frame.
    pub fn close(&mut self, code: u16, reason: &str) -> Result<(), MockServerError> {
        let result = self.send_inbound(WsFrame::close(code, reason));
        self.inbound_tx = None;
        result
    }

    /// Simulate a socket drop: the client sees the stream end with no close frame.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, WebSocketError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = WebSocketError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| WebSocketError::TransportError {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
