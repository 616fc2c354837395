//! Live board channel: connection lifecycle, subscriptions, and publishing.
//!
//! SYSTEM CONTEXT
//! ==============
//! `manager` owns one duplex session (connect, reconnect, teardown),
//! `registry` tracks topic subscriptions and routes inbound frames,
//! `broadcast` publishes local scene changes, and `transport` is the seam to
//! the actual socket. All three views share one `session::Session`.
//!
//! ERROR HANDLING
//! ==============
//! Nothing in this module returns channel failures to the caller. Failures
//! are delivered as [`ChannelEvent::Error`] so UI code can render
//! connectivity without wrapping each call.

mod broadcast;
mod manager;
mod registry;
mod session;
pub mod transport;

pub use broadcast::{BroadcastChannel, publish_destination};
pub use manager::{ChannelError, ChannelEvent, ConnectionManager};
pub use registry::{SubscriptionRegistry, board_topic};
pub use session::{ConnectionStatus, SessionState};
pub use transport::{Connector, Inbound, TransportError, TransportLink, WsConnector};
