//! Persistence gateway: durable save/load of a board over the HTTP API.
//!
//! DESIGN
//! ======
//! These two calls are the only source of durability; the live channel never
//! persists anything. They are independent of channel state, so a save works
//! with no live session at all.
//!
//! ERROR HANDLING
//! ==============
//! Unlike the channel, failures here are returned to the caller as
//! [`PersistenceError`]. Non-2xx responses keep the status and body text for
//! diagnostics. There is no automatic retry.

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::board::{Element, LessonId, parse_elements};
use crate::config::SyncConfig;
use crate::credential::CredentialProvider;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("no bearer credential available")]
    MissingCredential,
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("board request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid board payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Durable board storage, as seen by the board view controller.
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn save(&self, lesson_id: LessonId, elements: &[Element]) -> Result<(), PersistenceError>;
    async fn load(&self, lesson_id: LessonId) -> Result<Vec<Element>, PersistenceError>;
}

pub(crate) fn save_endpoint(base_url: &str, lesson_id: LessonId) -> String {
    format!("{}/api/lessons/{lesson_id}/board/save", base_url.trim_end_matches('/'))
}

pub(crate) fn load_endpoint(base_url: &str, lesson_id: LessonId) -> String {
    format!("{}/api/lessons/{lesson_id}/board/load", base_url.trim_end_matches('/'))
}

/// Save/load client for the lesson board endpoints.
pub struct PersistenceGateway {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl PersistenceGateway {
    /// # Errors
    ///
    /// Returns [`PersistenceError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self, PersistenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        Ok(Self::with_client(http, &config.base_url, credentials))
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_owned(), credentials }
    }

    /// Persist the full element sequence for a lesson.
    ///
    /// # Errors
    ///
    /// Fails without a credential, on transport errors, or on a non-2xx status.
    pub async fn save(&self, lesson_id: LessonId, elements: &[Element]) -> Result<(), PersistenceError> {
        let credential = self.credentials.bearer().ok_or(PersistenceError::MissingCredential)?;
        let url = save_endpoint(&self.base_url, lesson_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .json(elements)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%lesson_id, status = status.as_u16(), %body, "persistence: save rejected");
            return Err(PersistenceError::Status { status: status.as_u16(), body });
        }

        info!(%lesson_id, count = elements.len(), "persistence: board saved");
        Ok(())
    }

    /// Fetch the last saved element sequence. A board never saved is empty.
    ///
    /// # Errors
    ///
    /// Fails without a credential, on transport errors, on a non-2xx status,
    /// or when the body is not an element array.
    pub async fn load(&self, lesson_id: LessonId) -> Result<Vec<Element>, PersistenceError> {
        let credential = self.credentials.bearer().ok_or(PersistenceError::MissingCredential)?;
        let url = load_endpoint(&self.base_url, lesson_id);

        let response = self.http.get(&url).bearer_auth(credential.expose()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%lesson_id, status = status.as_u16(), %body, "persistence: load rejected");
            return Err(PersistenceError::Status { status: status.as_u16(), body });
        }

        let elements = decode_board(&body)?;
        debug!(%lesson_id, count = elements.len(), "persistence: board loaded");
        Ok(elements)
    }
}

/// Decode a load response; an empty body means nothing was saved yet.
fn decode_board(body: &str) -> Result<Vec<Element>, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    parse_elements(body)
}

#[async_trait]
impl BoardStore for PersistenceGateway {
    async fn save(&self, lesson_id: LessonId, elements: &[Element]) -> Result<(), PersistenceError> {
        PersistenceGateway::save(self, lesson_id, elements).await
    }

    async fn load(&self, lesson_id: LessonId) -> Result<Vec<Element>, PersistenceError> {
        PersistenceGateway::load(self, lesson_id).await
    }
}
