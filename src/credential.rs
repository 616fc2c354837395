//! Bearer credential access.
//!
//! The authentication subsystem owns the token; this crate only reads it at
//! call time through a [`CredentialProvider`]. Nothing here caches a token
//! across calls, so a refresh written into [`SessionCredentials`] is picked up
//! by the next connect, publish, save, or load.

#[cfg(test)]
#[path = "credential_test.rs"]
mod credential_test;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// An access token. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token. Blank tokens count as no credential.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of the current bearer credential.
pub trait CredentialProvider: Send + Sync {
    fn bearer(&self) -> Option<Credential>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<Credential> + Send + Sync,
{
    fn bearer(&self) -> Option<Credential> {
        self()
    }
}

/// Shared, settable credential slot for the signed-in session.
#[derive(Clone, Debug, Default)]
pub struct SessionCredentials {
    slot: Arc<RwLock<Option<Credential>>>,
}

impl SessionCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let credentials = Self::new();
        credentials.set(token);
        credentials
    }

    /// Replace the token. Returns `false` (and clears the slot) for a blank token.
    pub fn set(&self, token: impl Into<String>) -> bool {
        let credential = Credential::new(token);
        let present = credential.is_some();
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = credential;
        present
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn bearer(&self) -> Option<Credential> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
