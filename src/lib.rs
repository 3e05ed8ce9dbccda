//! Self-healing websocket session.
//!
//! [`core`] holds the single-threaded lifecycle engine ([`core::ConnectionController`]) and its
//! policies: exponential reconnection backoff, heartbeat liveness, an offline outbound queue and
//! metrics. [`ws`] hosts that engine inside a kameo actor on tokio, with sockets provided by any
//! [`transport::WsTransport`].

pub mod client;
pub mod core;
pub mod testing;
pub mod tls;
pub mod transport;
pub mod ws;

pub use ws::{SessionActor, SessionActorArgs};
