pub mod actor;
pub mod runtime;

pub use actor::*;
pub use runtime::{TokioTimers, WsConnector, WsLink};

pub use crate::core::*;
