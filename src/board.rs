//! Board data model: lesson keys, elements, and the in-memory scene.
//!
//! Elements are opaque to this crate. They are kept as raw JSON values so the
//! drawing layer can evolve its schema without touching sync code.

#[cfg(test)]
#[path = "board_test.rs"]
mod board_test;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of the lesson a board belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub i64);

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LessonId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for LessonId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One drawable record. Treated as an arbitrary serializable payload.
pub type Element = serde_json::Value;

/// Local pan/zoom. Never persisted, never broadcast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

/// The board content currently shown to the user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    /// Ordered element sequence; the only part that is saved or published.
    pub elements: Vec<Element>,
    pub view: ViewState,
}

impl Scene {
    #[must_use]
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements, view: ViewState::default() }
    }

    /// Overwrite the element sequence. No merge with the prior content.
    pub fn replace_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Parse a board payload (a JSON element array). `null` reads as an empty board.
///
/// # Errors
///
/// Returns the JSON error when the payload is not an array (or `null`).
pub fn parse_elements(payload: &str) -> Result<Vec<Element>, serde_json::Error> {
    serde_json::from_str::<Option<Vec<Element>>>(payload).map(Option::unwrap_or_default)
}
