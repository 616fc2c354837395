//! Shared state of the one live channel session.
//!
//! DESIGN
//! ======
//! The manager, registry, and broadcaster are thin views over one
//! `Arc<Mutex<SessionInner>>`. Locks are held only for field reads/writes,
//! never across an await or a user callback.
//!
//! Every `connect`/`disconnect` bumps `generation`. A session driver stamps
//! its generation at spawn time and drops any state change once it no longer
//! matches, so a driver that is mid-poll when aborted cannot resurrect a
//! torn-down session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::board::{Element, LessonId};

/// Channel Session lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transport, no pending reconnect.
    #[default]
    Disconnected,
    /// Transport opening or awaiting the protocol acknowledgment.
    Connecting,
    /// Transport open and `CONNECTED` received.
    Connected,
    /// Transport closed; waiting out the reconnect delay.
    Reconnecting,
}

/// Snapshot for connectivity indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub subscription_count: usize,
    pub state: SessionState,
    pub lesson_id: Option<LessonId>,
}

pub(crate) type MessageHandler = Arc<dyn Fn(Vec<Element>) + Send + Sync>;

pub(crate) struct Subscription {
    pub id: String,
    pub topic: String,
    pub on_message: MessageHandler,
}

#[derive(Default)]
pub(crate) struct SessionInner {
    pub generation: u64,
    pub lesson_id: Option<LessonId>,
    pub state: SessionState,
    pub reconnect_attempts: u32,
    /// Writer half of the current transport; `None` while no transport is open.
    pub outbound: Option<mpsc::UnboundedSender<frames::Frame>>,
    /// Held subscriptions keyed by topic.
    pub subscriptions: HashMap<String, Subscription>,
}

#[derive(Clone, Default)]
pub(crate) struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    pub fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = self.lock();
        ConnectionStatus {
            connected: inner.state == SessionState::Connected,
            reconnect_attempts: inner.reconnect_attempts,
            subscription_count: inner.subscriptions.len(),
            state: inner.state,
            lesson_id: inner.lesson_id,
        }
    }
}
