//! Real-time shared-board synchronization for lesson whiteboards.
//!
//! SYSTEM CONTEXT
//! ==============
//! A board is one lesson's drawing surface. Its durable copy lives behind an
//! authenticated HTTP API (`persistence`); its live copy is pushed between
//! participants over a STOMP-over-WebSocket channel (`channel`). The
//! `controller` module ties both together for one mounted board view and
//! exposes the current scene and connection status to the hosting UI.
//!
//! Conflict policy is last-write-wins on the whole element sequence: every
//! load, local edit, or remote frame replaces the scene outright.

pub mod board;
pub mod channel;
pub mod config;
pub mod controller;
pub mod credential;
pub mod persistence;

#[cfg(test)]
mod testutil;

pub use board::{Element, LessonId, Scene, ViewState};
pub use channel::{
    BroadcastChannel, ChannelError, ChannelEvent, ConnectionManager, ConnectionStatus, SessionState,
    SubscriptionRegistry,
};
pub use config::{ChannelConfig, ConfigError, SyncConfig};
pub use controller::{BoardPhase, BoardViewController};
pub use credential::{Credential, CredentialProvider, SessionCredentials};
pub use persistence::{BoardStore, PersistenceError, PersistenceGateway};
