//! Tokio implementations of the engine's timer and connector seams.
//!
//! Neither type touches the controller directly: timer expirations and transport callbacks are
//! pushed into unbounded channels, and the owning actor feeds them back through its mailbox.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::core::{
    ConnectionId, Connector, TimerId, TimerScheduler, Transport, TransportEvent,
    WebSocketBufferConfig, WebSocketError, WebSocketResult, WsFrame, abnormal_close, close_parts,
    duration_ms,
};
use crate::transport::WsTransport;

/// Timer scheduler backed by `tokio::time`.
///
/// `now_ms` is wall-clock milliseconds at construction plus tokio's monotonic elapsed time, so
/// timestamps look like epoch time but never step backwards and follow paused test clocks.
pub struct TokioTimers {
    epoch_ms: u64,
    started: Instant,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    fired: mpsc::UnboundedSender<TimerId>,
}

impl TokioTimers {
    pub fn new(fired: mpsc::UnboundedSender<TimerId>) -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_ms)
            .unwrap_or(0);
        Self {
            epoch_ms,
            started: Instant::now(),
            next_id: 0,
            tasks: HashMap::new(),
            fired,
        }
    }

    pub fn armed(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }

    fn allocate(&mut self) -> TimerId {
        self.tasks.retain(|_, task| !task.is_finished());
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

impl TimerScheduler for TokioTimers {
    fn now_ms(&self) -> u64 {
        self.epoch_ms
            .saturating_add(duration_ms(self.started.elapsed()))
    }

    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        let fired = self.fired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired.send(id);
        });
        self.tasks.insert(id, task);
        id
    }

    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let fired = self.fired.clone();
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if fired.send(id).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

enum LinkCommand {
    Frame(WsFrame),
    Close { code: u16, reason: String },
}

/// Handle to one socket IO task.
pub struct WsLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl Transport for WsLink {
    fn send_text(&mut self, text: &str) -> WebSocketResult<()> {
        self.commands
            .send(LinkCommand::Frame(WsFrame::text(text)))
            .map_err(|_| WebSocketError::SendFailed("connection task has stopped".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.commands.send(LinkCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Connector that runs each socket in its own task on top of a [`WsTransport`].
///
/// The task connects, then multiplexes outbound frames, inbound frames and the close request.
/// Everything it observes is reported as `(ConnectionId, TransportEvent)`.
pub struct WsConnector<T: WsTransport> {
    transport: T,
    buffers: WebSocketBufferConfig,
    events: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: WsTransport> WsConnector<T> {
    pub fn new(
        transport: T,
        buffers: WebSocketBufferConfig,
        events: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    ) -> Self {
        Self {
            transport,
            buffers,
            events,
            tasks: Vec::new(),
        }
    }

    pub fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<T: WsTransport> Connector for WsConnector<T> {
    type Link = WsLink;

    fn open(&mut self, id: ConnectionId, url: &str) -> WebSocketResult<WsLink> {
        self.tasks.retain(|task| !task.is_finished());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let connect = self.transport.connect(url.to_string(), self.buffers);
        let events = self.events.clone();
        self.tasks
            .push(tokio::spawn(run_link::<T>(id, connect, commands_rx, events)));

        Ok(WsLink {
            commands: commands_tx,
        })
    }
}

impl<T: WsTransport> Drop for WsConnector<T> {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn run_link<T: WsTransport>(
    id: ConnectionId,
    connect: crate::transport::WsTransportConnectFuture<T::Reader, T::Writer>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send((id, event));
    };

    let (mut reader, mut writer) = tokio::select! {
        result = connect => match result {
            Ok(pair) => pair,
            Err(err) => {
                emit(TransportEvent::Error(err.to_string()));
                let (code, reason) = abnormal_close(err.to_string());
                emit(TransportEvent::Closed { code, reason });
                return;
            }
        },
        // Frames are only written after `Opened`, so anything here is a close request.
        _ = commands.recv() => {
            debug!(connection = %id, "closed before the socket opened");
            return;
        }
    };
    emit(TransportEvent::Opened);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Frame(frame)) => {
                    if let Err(err) = writer.send(frame).await {
                        emit(TransportEvent::Error(err.to_string()));
                        let (code, reason) = abnormal_close(err.to_string());
                        emit(TransportEvent::Closed { code, reason });
                        break;
                    }
                }
                Some(LinkCommand::Close { code, reason }) => {
                    let _ = writer.send(WsFrame::close(code, reason)).await;
                    let _ = writer.close().await;
                    break;
                }
                None => {
                    let _ = writer.close().await;
                    break;
                }
            },
            inbound = reader.next() => match inbound {
                Some(Ok(WsFrame::Text(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => debug!(connection = %id, "dropping text frame with invalid utf-8"),
                },
                Some(Ok(WsFrame::Close(frame))) => {
                    let _ = writer.close().await;
                    let (code, reason) = close_parts(frame.as_ref());
                    emit(TransportEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(WsFrame::Binary(bytes))) => {
                    debug!(connection = %id, len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(WsFrame::Ping(_) | WsFrame::Pong(_))) => {}
                Some(Err(err)) => {
                    emit(TransportEvent::Error(err.to_string()));
                    let (code, reason) = abnormal_close(err.to_string());
                    emit(TransportEvent::Closed { code, reason });
                    break;
                }
                None => {
                    let (code, reason) = abnormal_close("stream ended");
                    emit(TransportEvent::Closed { code, reason });
                    break;
                }
            },
        }
    }
}
