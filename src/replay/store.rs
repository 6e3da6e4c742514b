//! Flat, slot-addressed storage for experience payloads.

use super::experience::{Experience, Metadata};
use crate::error::{ReplayError, Result};
use ndarray::{Array2, ArrayView1};

/// Column-oriented experience storage with one row per slot.
///
/// States are kept in dense `capacity x state_dim` matrices so the whole
/// buffer is a handful of contiguous allocations. Reads always return copies.
#[derive(Debug, Clone)]
pub struct ExperienceStore {
    state_dim: usize,
    states: Array2<f64>,
    next_states: Array2<f64>,
    actions: Vec<usize>,
    rewards: Vec<f64>,
    dones: Vec<bool>,
    priorities: Vec<f64>,
    inserted_at: Vec<u64>,
    metadata: Vec<Option<Metadata>>,
}

impl ExperienceStore {
    pub fn new(capacity: usize, state_dim: usize) -> Self {
        Self {
            state_dim,
            states: Array2::zeros((capacity, state_dim)),
            next_states: Array2::zeros((capacity, state_dim)),
            actions: vec![0; capacity],
            rewards: vec![0.0; capacity],
            dones: vec![false; capacity],
            priorities: vec![0.0; capacity],
            inserted_at: vec![0; capacity],
            metadata: vec![None; capacity],
        }
    }

    /// Check that a state vector fits this store
    pub fn check_dim(&self, state: ArrayView1<f64>) -> Result<()> {
        if state.len() != self.state_dim {
            return Err(ReplayError::DimensionMismatch {
                expected: self.state_dim,
                got: state.len(),
            });
        }
        Ok(())
    }

    /// Copy an experience into a slot, replacing its previous occupant
    pub fn write(&mut self, slot: usize, experience: Experience) -> Result<()> {
        self.check_dim(experience.state.view())?;
        self.check_dim(experience.next_state.view())?;

        self.states.row_mut(slot).assign(&experience.state);
        self.next_states.row_mut(slot).assign(&experience.next_state);
        self.actions[slot] = experience.action;
        self.rewards[slot] = experience.reward;
        self.dones[slot] = experience.done;
        self.priorities[slot] = experience.priority;
        self.inserted_at[slot] = experience.inserted_at;
        self.metadata[slot] = experience.metadata;
        Ok(())
    }

    /// Copy a slot's experience out of the store
    pub fn read(&self, slot: usize) -> Experience {
        Experience {
            state: self.states.row(slot).to_owned(),
            action: self.actions[slot],
            reward: self.rewards[slot],
            next_state: self.next_states.row(slot).to_owned(),
            done: self.dones[slot],
            priority: self.priorities[slot],
            inserted_at: self.inserted_at[slot],
            metadata: self.metadata[slot].clone(),
        }
    }

    /// Raw priority of a slot
    pub fn priority(&self, slot: usize) -> f64 {
        self.priorities[slot]
    }

    pub fn set_priority(&mut self, slot: usize, priority: f64) {
        self.priorities[slot] = priority;
    }
}
