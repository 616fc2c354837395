//! Connection manager: lifecycle of one live channel session.
//!
//! LIFECYCLE
//! =========
//! 1. `connect` checks the credential, then spawns a session driver
//! 2. Driver opens the transport and sends `CONNECT`
//! 3. `CONNECTED` → state `Connected`, attempt counter reset, event emitted
//! 4. Transport closes → `Disconnected` event, subscriptions dropped, and
//!    after the fixed delay a new attempt (bounded by the configured max)
//! 5. `disconnect` releases subscriptions, closes the transport, cancels any
//!    pending reconnect, and resets state
//!
//! ERROR HANDLING
//! ==============
//! Protocol errors (`ERROR` frames, undecodable frames) are reported as
//! events only. Retry is driven solely by transport closure.

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;

use std::sync::{Arc, Mutex, PoisonError};

use frames::{Command, Frame};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broadcast::BroadcastChannel;
use super::registry::SubscriptionRegistry;
use super::session::{ConnectionStatus, Session, SessionInner, SessionState};
use super::transport::{Connector, Inbound, TransportLink, endpoint_host};
use crate::board::LessonId;
use crate::config::ChannelConfig;
use crate::credential::{Credential, CredentialProvider};

const EVENT_CAPACITY: usize = 64;

/// Failures delivered through [`ChannelEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("no bearer credential available; connection not attempted")]
    MissingCredential,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Observable session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An attempt started; `attempt` is 0 for the initial connect.
    Connecting { lesson_id: LessonId, attempt: u32 },
    Connected { lesson_id: LessonId },
    /// The transport closed (not emitted for a session that never opened one
    /// and is torn down by `disconnect`).
    Disconnected { lesson_id: LessonId },
    Error(ChannelError),
}

/// Owns the live session for one mounted board view.
pub struct ConnectionManager {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    session: Session,
    events: broadcast::Sender<ChannelEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            connector,
            credentials,
            session: Session::default(),
            events,
            driver: Mutex::new(None),
        }
    }

    /// Subscribe to session events. Subscribe before `connect` to see them all.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn registry(&self) -> SubscriptionRegistry {
        SubscriptionRegistry::new(self.session.clone())
    }

    #[must_use]
    pub fn broadcaster(&self) -> BroadcastChannel {
        BroadcastChannel::new(self.session.clone(), Arc::clone(&self.credentials))
    }

    /// Snapshot of connectivity. Never blocks on I/O.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    /// Start a session for `lesson_id`. Must be called inside a Tokio runtime.
    ///
    /// No-op when already connected to the same lesson. Any other existing
    /// session (different lesson, or one still retrying) is torn down first.
    pub fn connect(&self, lesson_id: LessonId) {
        let (state, current) = {
            let inner = self.session.lock();
            (inner.state, inner.lesson_id)
        };
        if state == SessionState::Connected && current == Some(lesson_id) {
            info!(%lesson_id, "channel: already connected, ignoring connect");
            return;
        }
        if state != SessionState::Disconnected || self.has_driver() {
            self.disconnect();
        }

        let Some(credential) = self.credentials.bearer() else {
            warn!(%lesson_id, "channel: no credential, connect refused");
            emit(&self.events, ChannelEvent::Error(ChannelError::MissingCredential));
            return;
        };

        let generation = {
            let mut inner = self.session.lock();
            inner.generation += 1;
            inner.lesson_id = Some(lesson_id);
            inner.state = SessionState::Connecting;
            inner.reconnect_attempts = 0;
            inner.generation
        };
        info!(%lesson_id, endpoint = %self.config.endpoint, "channel: connecting");
        emit(&self.events, ChannelEvent::Connecting { lesson_id, attempt: 0 });

        let driver = SessionDriver {
            generation,
            lesson_id,
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            credentials: Arc::clone(&self.credentials),
            session: self.session.clone(),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(driver.run(credential));
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Tear down the session. Idempotent and safe from any state.
    pub fn disconnect(&self) {
        let released = self.registry().unsubscribe_all();

        let (outbound, lesson_id, was_open) = {
            let mut inner = self.session.lock();
            let was_open = inner.state != SessionState::Disconnected || inner.outbound.is_some();
            inner.generation += 1;
            inner.state = SessionState::Disconnected;
            inner.reconnect_attempts = 0;
            (inner.outbound.take(), inner.lesson_id.take(), was_open)
        };

        if let Some(outbound) = outbound {
            // Dropping the sender after DISCONNECT lets the writer close the socket.
            if outbound.send(Frame::disconnect()).is_err() {
                debug!("channel: transport already closed at disconnect");
            }
        }

        if let Some(handle) = self.driver.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }

        if let (Some(lesson_id), true) = (lesson_id, was_open) {
            info!(%lesson_id, released, "channel: disconnected");
            emit(&self.events, ChannelEvent::Disconnected { lesson_id });
        }
    }

    fn has_driver(&self) -> bool {
        self.driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn emit(events: &broadcast::Sender<ChannelEvent>, event: ChannelEvent) {
    // Send only fails when nobody listens; status() still reflects the change.
    if events.send(event).is_err() {
        debug!("channel: event dropped, no listeners");
    }
}

// =============================================================================
// SESSION DRIVER
// =============================================================================

/// Background task owning the reconnect loop for one `connect` call.
struct SessionDriver {
    generation: u64,
    lesson_id: LessonId,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    session: Session,
    events: broadcast::Sender<ChannelEvent>,
}

impl SessionDriver {
    async fn run(self, first: Credential) {
        let lesson_id = self.lesson_id;
        let mut credential = Some(first);

        loop {
            let Some(current) = credential.take().or_else(|| self.credentials.bearer()) else {
                warn!(%lesson_id, "channel: credential gone before reconnect");
                if self.update(|inner| inner.state = SessionState::Disconnected).is_some() {
                    emit(&self.events, ChannelEvent::Error(ChannelError::MissingCredential));
                }
                return;
            };

            self.run_transport(&current).await;

            let Some(attempts) = self.on_transport_closed() else {
                return;
            };
            if attempts >= self.config.max_reconnect_attempts {
                error!(%lesson_id, attempts, "channel: reconnect attempts exhausted");
                emit(&self.events, ChannelEvent::Error(ChannelError::ReconnectExhausted { attempts }));
                return;
            }

            if self.update(|inner| inner.state = SessionState::Reconnecting).is_none() {
                return;
            }
            tokio::time::sleep(self.config.reconnect_delay).await;

            let Some(attempt) = self.update(|inner| {
                inner.reconnect_attempts += 1;
                inner.state = SessionState::Connecting;
                inner.reconnect_attempts
            }) else {
                return;
            };
            info!(%lesson_id, attempt, max = self.config.max_reconnect_attempts, "channel: reconnecting");
            emit(&self.events, ChannelEvent::Connecting { lesson_id, attempt });
        }
    }

    /// Open, handshake, and pump inbound events until the transport closes.
    async fn run_transport(&self, credential: &Credential) {
        let lesson_id = self.lesson_id;
        let link = match self.connector.open(&self.config.endpoint, credential).await {
            Ok(link) => link,
            Err(error) => {
                warn!(%lesson_id, error = %error, "channel: transport open failed");
                return;
            }
        };
        let TransportLink { outbound, mut inbound } = link;

        let connect = Frame::connect(endpoint_host(&self.config.endpoint), Some(&credential.bearer_header()));
        if outbound.send(connect).is_err() {
            warn!(%lesson_id, "channel: transport closed before handshake");
            return;
        }
        if self.update(|inner| inner.outbound = Some(outbound)).is_none() {
            return;
        }

        while let Some(event) = inbound.recv().await {
            match event {
                Inbound::Frame(frame) => self.handle_frame(&frame),
                Inbound::Malformed(detail) => {
                    warn!(%lesson_id, %detail, "channel: undecodable frame");
                    emit(&self.events, ChannelEvent::Error(ChannelError::Protocol(detail)));
                }
            }
        }
    }

    fn handle_frame(&self, frame: &Frame) {
        let lesson_id = self.lesson_id;
        match frame.command {
            Command::Connected => {
                let acknowledged = self.update(|inner| {
                    inner.state = SessionState::Connected;
                    inner.reconnect_attempts = 0;
                });
                if acknowledged.is_some() {
                    info!(%lesson_id, version = frame.header(frames::VERSION).unwrap_or("?"), "channel: connected");
                    emit(&self.events, ChannelEvent::Connected { lesson_id });
                }
            }
            Command::Message => {
                SubscriptionRegistry::new(self.session.clone()).dispatch(frame);
            }
            Command::Error => {
                let detail = frame
                    .header(frames::MESSAGE)
                    .map_or_else(|| frame.body.clone(), str::to_owned);
                warn!(%lesson_id, %detail, body = %frame.body, "channel: broker error frame");
                emit(&self.events, ChannelEvent::Error(ChannelError::Protocol(detail)));
            }
            Command::Receipt => {
                debug!(%lesson_id, receipt = ?frame.header(frames::RECEIPT_ID), "channel: receipt");
            }
            other => {
                debug!(%lesson_id, command = %other, "channel: ignoring unexpected frame");
            }
        }
    }

    /// Record a closure. Returns the attempt count, or `None` if superseded.
    fn on_transport_closed(&self) -> Option<u32> {
        let (attempts, dropped) = self.update(|inner| {
            inner.state = SessionState::Disconnected;
            inner.outbound = None;
            let dropped = inner.subscriptions.len();
            inner.subscriptions.clear();
            (inner.reconnect_attempts, dropped)
        })?;
        info!(lesson_id = %self.lesson_id, attempts, dropped, "channel: transport closed");
        emit(&self.events, ChannelEvent::Disconnected { lesson_id: self.lesson_id });
        Some(attempts)
    }

    /// Apply `f` if this driver still owns the session.
    fn update<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> Option<R> {
        let mut inner = self.session.lock();
        if inner.generation != self.generation {
            return None;
        }
        Some(f(&mut inner))
    }
}
