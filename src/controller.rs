//! Board view controller for one mounted board.
//!
//! DESIGN
//! ======
//! The controller exclusively owns the board's `Scene` (published through a
//! `watch` channel so the UI can render it) and the channel session. The
//! scene has exactly two writers: local edits (`apply_local_edit`) and the
//! registry callback for remote frames. Both replace the element sequence
//! wholesale; the last writer wins.
//!
//! LIFECYCLE
//! =========
//! 1. `mount` → `Loading`, load the persisted scene
//! 2. Start the event pump, then `connect` → `Live` (even if the load failed)
//! 3. Each `Connected` event subscribes to the board topic, which also
//!    covers re-subscribing after a reconnect
//! 4. `unmount` → `disconnect` unconditionally; the only teardown path

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::{Element, LessonId, Scene, ViewState};
use crate::channel::{ChannelEvent, ConnectionManager, ConnectionStatus, WsConnector};
use crate::config::SyncConfig;
use crate::credential::CredentialProvider;
use crate::persistence::{BoardStore, PersistenceError, PersistenceGateway};

/// Coordination phase of a board view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardPhase {
    #[default]
    NotConnected,
    Loading,
    Live,
}

pub struct BoardViewController {
    lesson_id: LessonId,
    store: Arc<dyn BoardStore>,
    channel: ConnectionManager,
    scene: Arc<watch::Sender<Scene>>,
    phase: watch::Sender<BoardPhase>,
    pump: Option<JoinHandle<()>>,
}

impl BoardViewController {
    #[must_use]
    pub fn new(lesson_id: LessonId, store: Arc<dyn BoardStore>, channel: ConnectionManager) -> Self {
        let (scene, _) = watch::channel(Scene::default());
        let (phase, _) = watch::channel(BoardPhase::NotConnected);
        Self { lesson_id, store, channel, scene: Arc::new(scene), phase, pump: None }
    }

    /// Wire the HTTP gateway and WebSocket channel from config.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Request`] if the HTTP client cannot be built.
    pub fn from_config(
        lesson_id: LessonId,
        config: &SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, PersistenceError> {
        let store = PersistenceGateway::new(config, Arc::clone(&credentials))?;
        let channel = ConnectionManager::new(config.channel.clone(), Arc::new(WsConnector), credentials);
        Ok(Self::new(lesson_id, Arc::new(store), channel))
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    /// Load the persisted scene, then go live.
    ///
    /// A load failure is returned, but only after the live connection has
    /// been started; collaboration is never blocked on persistence.
    ///
    /// # Errors
    ///
    /// Returns the load failure, if any.
    pub async fn mount(&mut self) -> Result<(), PersistenceError> {
        if self.pump.is_some() {
            debug!(lesson_id = %self.lesson_id, "board: remounting, tearing down previous session");
            self.unmount();
        }
        let lesson_id = self.lesson_id;
        self.phase.send_replace(BoardPhase::Loading);

        let loaded = match self.store.load(lesson_id).await {
            Ok(elements) => {
                info!(%lesson_id, count = elements.len(), "board: loaded persisted scene");
                self.scene.send_modify(|scene| scene.replace_elements(elements));
                Ok(())
            }
            Err(error) => {
                warn!(%lesson_id, error = %error, "board: load failed, connecting anyway");
                Err(error)
            }
        };

        self.start_pump();
        self.channel.connect(lesson_id);
        self.phase.send_replace(BoardPhase::Live);
        loaded
    }

    /// Tear down the live session. Safe to call in any phase, any number of times.
    pub fn unmount(&mut self) {
        self.channel.disconnect();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if self.phase.send_replace(BoardPhase::NotConnected) != BoardPhase::NotConnected {
            info!(lesson_id = %self.lesson_id, "board: unmounted");
        }
    }

    /// Replace the scene with a local edit and publish it. Returns whether
    /// the update went out on the live channel.
    pub fn apply_local_edit(&self, elements: Vec<Element>) -> bool {
        let published = self.channel.broadcaster().publish(self.lesson_id, &elements);
        self.scene.send_modify(|scene| scene.replace_elements(elements));
        published
    }

    /// Edit a copy of the current elements, then apply it as a local edit.
    pub fn edit_elements(&self, edit: impl FnOnce(&mut Vec<Element>)) -> bool {
        let mut elements = self.scene.borrow().elements.clone();
        edit(&mut elements);
        self.apply_local_edit(elements)
    }

    /// Update local pan/zoom. Never saved or published.
    pub fn set_view(&self, view: ViewState) {
        self.scene.send_modify(|scene| scene.view = view);
    }

    /// Persist whatever scene is current right now. Works in any phase.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged.
    pub async fn save(&self) -> Result<(), PersistenceError> {
        let elements = self.scene.borrow().elements.clone();
        self.store.save(self.lesson_id, &elements).await
    }

    #[must_use]
    pub fn scene(&self) -> Scene {
        self.scene.borrow().clone()
    }

    #[must_use]
    pub fn watch_scene(&self) -> watch::Receiver<Scene> {
        self.scene.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> BoardPhase {
        *self.phase.borrow()
    }

    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<BoardPhase> {
        self.phase.subscribe()
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.channel.status()
    }

    #[must_use]
    pub fn channel_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.channel.events()
    }

    fn start_pump(&mut self) {
        let mut events = self.channel.events();
        let registry = self.channel.registry();
        let scene = Arc::clone(&self.scene);
        let lesson_id = self.lesson_id;

        self.pump = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Connected { lesson_id: connected }) if connected == lesson_id => {
                        let scene = Arc::clone(&scene);
                        registry.subscribe(lesson_id, move |elements| apply_remote(&scene, lesson_id, elements));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%lesson_id, skipped, "board: channel events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }
}

impl Drop for BoardViewController {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn apply_remote(scene: &watch::Sender<Scene>, lesson_id: LessonId, elements: Vec<Element>) {
    debug!(%lesson_id, count = elements.len(), "board: applying remote scene");
    scene.send_modify(|scene| scene.replace_elements(elements));
}
