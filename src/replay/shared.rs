//! Thread-safe handle to a replay buffer.
//!
//! A single mutex guards the whole buffer: `add` and `sample` both touch the
//! sum tree and the slot generations, so every operation, including
//! snapshot and restore, runs as one critical section.

use super::buffer::{ReplayBuffer, SampledBatch};
use super::experience::{EventSignal, Experience, SlotHandle, Transition};
use super::stats::{BufferStats, UpdateOutcome};
use crate::error::Result;
use crate::persistence::Snapshot;
use crate::utils::ReplayConfig;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Cloneable handle shared between the writer and the consumer
#[derive(Clone)]
pub struct SharedReplayBuffer {
    inner: Arc<Mutex<ReplayBuffer>>,
}

impl SharedReplayBuffer {
    pub fn new(config: ReplayConfig) -> Result<Self> {
        Ok(Self::from_buffer(ReplayBuffer::new(config)?))
    }

    pub fn from_buffer(buffer: ReplayBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    /// Run a closure with exclusive access to the buffer
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut ReplayBuffer) -> T) -> T {
        let mut buffer = self.inner.lock();
        f(&mut buffer)
    }

    pub fn add(
        &self,
        transition: Transition,
        priority_hint: Option<f64>,
        signal: EventSignal,
    ) -> Result<SlotHandle> {
        self.inner.lock().add(transition, priority_hint, signal)
    }

    pub fn push(&self, transition: Transition) -> Result<SlotHandle> {
        self.inner.lock().push(transition)
    }

    pub fn sample(&self, batch_size: usize) -> Result<SampledBatch> {
        self.inner.lock().sample(batch_size)
    }

    pub fn update_priorities(
        &self,
        handles: &[SlotHandle],
        priorities: &[f64],
    ) -> Result<UpdateOutcome> {
        self.inner.lock().update_priorities(handles, priorities)
    }

    pub fn boost(&self, handles: &[SlotHandle], boost_factor: f64) -> Result<UpdateOutcome> {
        self.inner.lock().boost(handles, boost_factor)
    }

    pub fn recent(&self, count: usize, shuffled: bool) -> Vec<Experience> {
        self.inner.lock().recent(count, shuffled)
    }

    pub fn advance(&self) -> f64 {
        self.inner.lock().advance()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.lock().stats()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.inner.lock().restore(snapshot)
    }

    /// Write a snapshot file while holding the lock for the whole write
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.lock().save(path)
    }

    /// Restore from a snapshot file while holding the lock
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.lock().load(path)
    }
}
