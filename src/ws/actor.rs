//! Kameo actor hosting one session.
//!
//! The controller is single-threaded by construction; the actor mailbox is what serializes
//! public calls, timer expirations and socket callbacks into it. Socket IO and timers run in
//! their own tasks and report back through two pump tasks that `tell` the actor.

use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::runtime::{TokioTimers, WsConnector};
use crate::core::{
    AddressResolver, Command, ConnectionController, ConnectionId, ConnectionState, EventKind,
    Listener, MetricsSnapshot, SendOptions, SendOutcome, SessionConfig, TimerId, TransportEvent,
    WebSocketBufferConfig, WebSocketError, WebSocketResult,
};
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;

/// Controller type driven by [`SessionActor`].
pub type SessionController<T> = ConnectionController<WsConnector<T>, TokioTimers>;

/// Arguments passed when spawning a [`SessionActor`].
pub struct SessionActorArgs<T: WsTransport = TungsteniteTransport> {
    pub config: SessionConfig,
    pub transport: T,
    pub buffers: WebSocketBufferConfig,
    pub resolver: Option<Box<dyn AddressResolver + Send>>,
    /// Call `connect` as soon as the actor starts.
    pub connect_on_start: bool,
}

impl SessionActorArgs<TungsteniteTransport> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_transport(config, TungsteniteTransport::default())
    }
}

impl<T: WsTransport> SessionActorArgs<T> {
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            buffers: WebSocketBufferConfig::default(),
            resolver: None,
            connect_on_start: false,
        }
    }

    pub fn resolver(mut self, resolver: impl AddressResolver + Send + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn buffers(mut self, buffers: WebSocketBufferConfig) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn connect_on_start(mut self) -> Self {
        self.connect_on_start = true;
        self
    }
}

pub struct SessionActor<T: WsTransport = TungsteniteTransport> {
    controller: SessionController<T>,
    pumps: Vec<JoinHandle<()>>,
}

impl<T: WsTransport> SessionActor<T> {
    pub fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    fn spawn_pumps(
        actor_ref: &ActorRef<Self>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerId>,
        mut event_rx: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    ) -> Vec<JoinHandle<()>> {
        let weak = actor_ref.downgrade();
        let timer_pump = tokio::spawn(async move {
            while let Some(id) = timer_rx.recv().await {
                let Some(actor) = weak.upgrade() else {
                    break;
                };
                if actor.tell(TimerFired(id)).send().await.is_err() {
                    break;
                }
            }
        });

        let weak = actor_ref.downgrade();
        let event_pump = tokio::spawn(async move {
            while let Some((id, event)) = event_rx.recv().await {
                let Some(actor) = weak.upgrade() else {
                    break;
                };
                if actor.tell(TransportSignal { id, event }).send().await.is_err() {
                    break;
                }
            }
        });

        vec![timer_pump, event_pump]
    }
}

impl<T: WsTransport> Actor for SessionActor<T> {
    type Args = SessionActorArgs<T>;
    type Error = WebSocketError;

    fn name() -> &'static str {
        "SessionActor"
    }

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> WebSocketResult<Self> {
        let SessionActorArgs {
            config,
            transport,
            buffers,
            resolver,
            connect_on_start,
        } = args;

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut controller = ConnectionController::new(
            config,
            WsConnector::new(transport, buffers, event_tx),
            TokioTimers::new(timer_tx),
        );
        if let Some(resolver) = resolver {
            controller = controller.with_boxed_resolver(resolver);
        }

        let pumps = Self::spawn_pumps(&actor_ref, timer_rx, event_rx);
        let mut actor = Self { controller, pumps };

        if connect_on_start && let Err(err) = actor.controller.connect() {
            warn!(error = %err, "initial connect failed");
        }
        Ok(actor)
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        reason: kameo::error::ActorStopReason,
    ) -> WebSocketResult<()> {
        info!(reason = ?reason, "session actor stopping");
        self.controller.destroy();
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "SessionActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Open the session.
#[derive(Debug, Clone, Copy)]
pub struct Connect;

/// Close the session on purpose; no automatic reconnect follows.
#[derive(Debug, Clone, Copy)]
pub struct Disconnect;

/// Send a command now, or buffer it while offline.
#[derive(Debug)]
pub struct SendCommand {
    pub command: Command,
    pub options: SendOptions,
}

impl SendCommand {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            options: SendOptions::default(),
        }
    }

    pub fn with_options(command: Command, options: SendOptions) -> Self {
        Self { command, options }
    }
}

/// Register a listener. With `once` it is dropped after its first delivery.
pub struct Subscribe {
    pub kind: EventKind,
    pub listener: Listener,
    pub once: bool,
}

impl Subscribe {
    pub fn on(kind: EventKind, listener: Listener) -> Self {
        Self {
            kind,
            listener,
            once: false,
        }
    }

    pub fn once(kind: EventKind, listener: Listener) -> Self {
        Self {
            kind,
            listener,
            once: true,
        }
    }
}

impl std::fmt::Debug for Subscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribe")
            .field("kind", &self.kind)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

pub struct Unsubscribe {
    pub kind: EventKind,
    pub listener: Listener,
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetAuthenticated(pub bool);

#[derive(Debug, Clone, Copy)]
pub struct GetState;

#[derive(Debug, Clone, Copy)]
pub struct IsAuthenticated;

#[derive(Debug, Clone, Copy)]
pub struct GetMetrics;

/// Discard buffered messages without notifying them. Replies with the count.
#[derive(Debug, Clone, Copy)]
pub struct ClearQueue;

/// Terminal teardown. The actor stays up but rejects further connects.
#[derive(Debug, Clone, Copy)]
pub struct Destroy;

/// A scheduled timer expired. Sent by the timer pump.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired(pub TimerId);

/// A socket task reported a lifecycle event. Sent by the transport pump.
#[derive(Debug, Clone)]
pub struct TransportSignal {
    pub id: ConnectionId,
    pub event: TransportEvent,
}

impl<T: WsTransport> KameoMessage<Connect> for SessionActor<T> {
    type Reply = WebSocketResult<()>;

    async fn handle(&mut self, _msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.controller.connect()
    }
}

impl<T: WsTransport> KameoMessage<Disconnect> for SessionActor<T> {
    type Reply = WebSocketResult<()>;

    async fn handle(
        &mut self,
        _msg: Disconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.controller.disconnect();
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<SendCommand> for SessionActor<T> {
    type Reply = WebSocketResult<SendOutcome>;

    async fn handle(
        &mut self,
        msg: SendCommand,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.controller.send(msg.command, msg.options))
    }
}

impl<T: WsTransport> KameoMessage<Subscribe> for SessionActor<T> {
    type Reply = WebSocketResult<()>;

    async fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.controller.is_destroyed() {
            return Err(WebSocketError::InvalidState(
                "session has been destroyed".to_string(),
            ));
        }
        if msg.once {
            self.controller.once(msg.kind, msg.listener);
        } else {
            self.controller.on(msg.kind, msg.listener);
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Unsubscribe> for SessionActor<T> {
    type Reply = WebSocketResult<bool>;

    async fn handle(
        &mut self,
        msg: Unsubscribe,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.controller.off(msg.kind, &msg.listener))
    }
}

impl<T: WsTransport> KameoMessage<SetAuthenticated> for SessionActor<T> {
    type Reply = WebSocketResult<()>;

    async fn handle(
        &mut self,
        msg: SetAuthenticated,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.controller.set_authenticated(msg.0);
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<GetState> for SessionActor<T> {
    type Reply = WebSocketResult<ConnectionState>;

    async fn handle(&mut self, _msg: GetState, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.controller.state())
    }
}

impl<T: WsTransport> KameoMessage<IsAuthenticated> for SessionActor<T> {
    type Reply = WebSocketResult<bool>;

    async fn handle(
        &mut self,
        _msg: IsAuthenticated,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.controller.is_authenticated())
    }
}

impl<T: WsTransport> KameoMessage<GetMetrics> for SessionActor<T> {
    type Reply = WebSocketResult<MetricsSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetMetrics,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.controller.metrics())
    }
}

impl<T: WsTransport> KameoMessage<ClearQueue> for SessionActor<T> {
    type Reply = WebSocketResult<usize>;

    async fn handle(
        &mut self,
        _msg: ClearQueue,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.controller.clear_queue())
    }
}

impl<T: WsTransport> KameoMessage<Destroy> for SessionActor<T> {
    type Reply = WebSocketResult<()>;

    async fn handle(&mut self, _msg: Destroy, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.controller.destroy();
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<TimerFired> for SessionActor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: TimerFired,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.controller.handle_timer(msg.0);
    }
}

impl<T: WsTransport> KameoMessage<TransportSignal> for SessionActor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: TransportSignal,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.controller.handle_transport_event(msg.id, msg.event);
    }
}
