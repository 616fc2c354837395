//! Topic subscription registry.
//!
//! At most one subscription per topic per session. Subscribing is only
//! possible while the session is `Connected`; there is no pending queue, so
//! callers subscribe from their `Connected` event handler. Inbound `MESSAGE`
//! frames are routed by destination and parsed as a board element array. A
//! payload that fails to parse is logged and dropped without touching the
//! subscription or the connection.

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;

use std::sync::Arc;

use frames::Frame;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{Session, SessionState, Subscription};
use crate::board::{Element, LessonId, parse_elements};

/// Topic carrying live updates for one lesson's board.
#[must_use]
pub fn board_topic(lesson_id: LessonId) -> String {
    format!("/topic/lesson/{lesson_id}/board")
}

/// What happened to one inbound `MESSAGE` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// No held subscription matches the frame.
    Unrouted,
    /// Payload did not parse as an element array.
    Malformed,
}

/// Subscription bookkeeping for the session it was created from.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    session: Session,
}

impl SubscriptionRegistry {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Subscribe `on_message` to the lesson's board topic.
    ///
    /// Returns `false` without side effects when the session is not
    /// connected or the topic is already held.
    pub fn subscribe<F>(&self, lesson_id: LessonId, on_message: F) -> bool
    where
        F: Fn(Vec<Element>) + Send + Sync + 'static,
    {
        let topic = board_topic(lesson_id);
        let mut inner = self.session.lock();

        if inner.state != SessionState::Connected {
            warn!(%lesson_id, state = ?inner.state, "registry: subscribe ignored, session not connected");
            return false;
        }
        if inner.subscriptions.contains_key(&topic) {
            warn!(%lesson_id, %topic, "registry: already subscribed, ignoring duplicate");
            return false;
        }
        let Some(outbound) = inner.outbound.clone() else {
            warn!(%lesson_id, "registry: connected session has no transport");
            return false;
        };

        let id = format!("sub-{}", Uuid::new_v4());
        if outbound.send(Frame::subscribe(&id, &topic)).is_err() {
            warn!(%lesson_id, %topic, "registry: transport closed before subscribe");
            return false;
        }

        info!(%lesson_id, %topic, subscription = %id, "registry: subscribed");
        inner.subscriptions.insert(
            topic.clone(),
            Subscription { id, topic, on_message: Arc::new(on_message) },
        );
        true
    }

    /// Release every held subscription. Returns how many were released.
    ///
    /// Failures to send `UNSUBSCRIBE` are tolerated; the transport may
    /// already be gone.
    pub fn unsubscribe_all(&self) -> usize {
        let (released, outbound) = {
            let mut inner = self.session.lock();
            let released: Vec<Subscription> = inner.subscriptions.drain().map(|(_, sub)| sub).collect();
            (released, inner.outbound.clone())
        };

        for sub in &released {
            match &outbound {
                Some(tx) if tx.send(Frame::unsubscribe(&sub.id)).is_ok() => {
                    debug!(topic = %sub.topic, subscription = %sub.id, "registry: unsubscribed");
                }
                _ => {
                    debug!(topic = %sub.topic, subscription = %sub.id, "registry: transport gone, dropped locally");
                }
            }
        }
        released.len()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.session.lock().subscriptions.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, lesson_id: LessonId) -> bool {
        self.session.lock().subscriptions.contains_key(&board_topic(lesson_id))
    }

    /// Route one inbound `MESSAGE` frame to its callback.
    pub(crate) fn dispatch(&self, frame: &Frame) -> Delivery {
        let Some(destination) = frame.header(frames::DESTINATION) else {
            warn!("registry: message without destination");
            return Delivery::Unrouted;
        };

        // Clone the handler out so the callback runs without the session lock.
        let handler = {
            let inner = self.session.lock();
            inner
                .subscriptions
                .get(destination)
                .filter(|sub| frame.header(frames::SUBSCRIPTION).is_none_or(|id| id == sub.id))
                .map(|sub| Arc::clone(&sub.on_message))
        };
        let Some(handler) = handler else {
            debug!(%destination, "registry: no subscription for message");
            return Delivery::Unrouted;
        };

        match parse_elements(&frame.body) {
            Ok(elements) => {
                debug!(%destination, count = elements.len(), "registry: delivering board update");
                handler(elements);
                Delivery::Delivered
            }
            Err(error) => {
                warn!(%destination, error = %error, "registry: dropping malformed board payload");
                Delivery::Malformed
            }
        }
    }
}
