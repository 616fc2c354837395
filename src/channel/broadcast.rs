//! Outbound path for local scene changes.
//!
//! Fire-and-forget: no acknowledgment is awaited and nothing is buffered.
//! While the session is not connected, updates are dropped with a warning.
//! Whole-scene last-write-wins makes a lost update harmless; the next local
//! change or a reload supersedes it.

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod broadcast_test;

use std::sync::Arc;

use frames::Frame;
use tracing::{debug, warn};

use super::session::{Session, SessionState};
use crate::board::{Element, LessonId};
use crate::credential::CredentialProvider;

/// Application destination that accepts a lesson's board updates.
#[must_use]
pub fn publish_destination(lesson_id: LessonId) -> String {
    format!("/app/lesson/{lesson_id}/board")
}

#[derive(Clone)]
pub struct BroadcastChannel {
    session: Session,
    credentials: Arc<dyn CredentialProvider>,
}

impl BroadcastChannel {
    pub(crate) fn new(session: Session, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { session, credentials }
    }

    /// Publish the full element sequence. Returns whether it was handed to the transport.
    pub fn publish(&self, lesson_id: LessonId, elements: &[Element]) -> bool {
        let outbound = {
            let inner = self.session.lock();
            if inner.state != SessionState::Connected {
                warn!(%lesson_id, state = ?inner.state, count = elements.len(), "broadcast: not connected, update dropped");
                return false;
            }
            inner.outbound.clone()
        };
        let Some(outbound) = outbound else {
            warn!(%lesson_id, "broadcast: no transport, update dropped");
            return false;
        };

        let body = match serde_json::to_string(elements) {
            Ok(body) => body,
            Err(error) => {
                warn!(%lesson_id, error = %error, "broadcast: serialize failed, update dropped");
                return false;
            }
        };
        let authorization = self.credentials.bearer().map(|credential| credential.bearer_header());
        let frame = Frame::send(&publish_destination(lesson_id), body, authorization.as_deref());

        if outbound.send(frame).is_err() {
            warn!(%lesson_id, "broadcast: transport closed, update dropped");
            return false;
        }
        debug!(%lesson_id, count = elements.len(), "broadcast: published");
        true
    }
}
