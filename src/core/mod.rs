pub mod circular_buffer;
pub mod connector;
pub mod controller;
pub mod events;
pub mod frame;
pub mod heartbeat;
pub mod metrics;
pub mod queue;
pub mod reconnect;
pub mod timer;
pub mod types;
pub mod wire;

pub use circular_buffer::*;
pub use connector::*;
pub use controller::*;
pub use events::*;
pub use frame::*;
pub use heartbeat::*;
pub use metrics::*;
pub use queue::*;
pub use reconnect::*;
pub use timer::*;
pub use types::*;
pub use wire::*;
