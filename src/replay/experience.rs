//! Experience records, slot handles and event signals.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form tags attached to an experience (e.g. event labels)
pub type Metadata = BTreeMap<String, String>;

/// A transition as supplied by the training loop, before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Array1<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Array1<f64>,
    pub done: bool,
    pub metadata: Option<Metadata>,
}

impl Transition {
    pub fn new(
        state: Array1<f64>,
        action: usize,
        reward: f64,
        next_state: Array1<f64>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
            metadata: None,
        }
    }

    /// Attach a single metadata tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A stored experience, copied out of the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub state: Array1<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Array1<f64>,
    pub done: bool,
    /// Raw priority (before the alpha exponent)
    pub priority: f64,
    /// Monotonic insertion sequence number
    pub inserted_at: u64,
    pub metadata: Option<Metadata>,
}

impl Experience {
    /// Get a metadata value by key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }
}

/// Reference to an experience returned by `add` and `sample`.
///
/// The generation disambiguates the slot's occupant: once the slot is
/// overwritten the handle no longer matches and updates through it are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotHandle {
    pub slot: usize,
    pub generation: u64,
}

impl SlotHandle {
    pub fn new(slot: usize, generation: u64) -> Self {
        Self { slot, generation }
    }
}

/// Critical-event flag supplied by the event classifier alongside `add`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSignal {
    pub is_critical: bool,
    /// Event severity, expected in `[0, 1]`
    pub severity: f64,
}

impl Default for EventSignal {
    fn default() -> Self {
        Self::none()
    }
}

impl EventSignal {
    /// No event: priority is left unscaled
    pub fn none() -> Self {
        Self {
            is_critical: false,
            severity: 1.0,
        }
    }

    /// Critical event with the given severity
    pub fn critical(severity: f64) -> Self {
        Self {
            is_critical: true,
            severity,
        }
    }
}
