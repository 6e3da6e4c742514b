//! Prioritized experience replay buffer.
//!
//! Experiences live in a circular [`ExperienceStore`]; their `priority^alpha`
//! values live in a [`PriorityIndex`] aligned by slot. Sampling is stratified
//! over the index's total mass and corrected with importance-sampling weights
//! whose exponent is annealed towards 1.0 by a [`BetaSchedule`].

use super::experience::{EventSignal, Experience, SlotHandle, Transition};
use super::schedule::BetaSchedule;
use super::stats::{BufferStats, UpdateOutcome};
use super::store::ExperienceStore;
use super::sum_tree::PriorityIndex;
use crate::error::{ReplayError, Result};
use crate::persistence::{
    self, Snapshot, SnapshotHeader, SnapshotRecord, SnapshotTrailer, SCHEMA_VERSION,
};
use crate::utils::ReplayConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// A batch drawn by [`ReplayBuffer::sample`], aligned by position
#[derive(Debug, Clone, Default)]
pub struct SampledBatch {
    pub experiences: Vec<Experience>,
    pub handles: Vec<SlotHandle>,
    /// Importance-sampling weights, normalized so the largest is 1.0
    pub weights: Vec<f64>,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    /// Iterate over `(experience, handle, weight)` triples
    pub fn iter(&self) -> impl Iterator<Item = (&Experience, &SlotHandle, f64)> {
        self.experiences
            .iter()
            .zip(self.handles.iter())
            .zip(self.weights.iter())
            .map(|((e, h), &w)| (e, h, w))
    }
}

/// Fixed-capacity prioritized replay buffer
pub struct ReplayBuffer {
    config: ReplayConfig,
    store: ExperienceStore,
    index: PriorityIndex,
    /// Bumped every time a slot is written; 0 means never written
    generations: Vec<u64>,
    size: usize,
    write_cursor: usize,
    schedule: BetaSchedule,
    max_priority_seen: f64,
    total_inserted: u64,
    total_sampled: u64,
    stale_skipped: u64,
    rng: StdRng,
}

impl ReplayBuffer {
    /// Create an empty buffer
    pub fn new(config: ReplayConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            store: ExperienceStore::new(config.capacity, config.state_dim),
            index: PriorityIndex::new(config.capacity),
            generations: vec![0; config.capacity],
            size: 0,
            write_cursor: 0,
            schedule: BetaSchedule::new(config.beta_start, config.beta_frames),
            max_priority_seen: 1.0,
            total_inserted: 0,
            total_sampled: 0,
            stale_skipped: 0,
            rng,
            config,
        })
    }

    /// Create a buffer from a snapshot, using the snapshot's hyperparameters
    pub fn from_snapshot(snapshot: Snapshot, seed: Option<u64>) -> Result<Self> {
        let header = &snapshot.header;
        let config = ReplayConfig {
            capacity: header.capacity,
            state_dim: header.state_dim,
            alpha: header.alpha,
            beta_start: header.beta_start,
            beta_frames: header.beta_frames,
            epsilon: header.epsilon,
            critical_boost_factor: header.critical_boost_factor,
            seed,
        };
        config
            .validate()
            .map_err(|e| ReplayError::format(format!("snapshot header rejected: {}", e)))?;

        let mut buffer = Self::new(config)?;
        buffer.restore(snapshot)?;
        Ok(buffer)
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Number of live experiences
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Check if the buffer holds at least `batch_size` experiences
    pub fn can_sample(&self, batch_size: usize) -> bool {
        self.size >= batch_size && self.size > 0
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn beta(&self) -> f64 {
        self.schedule.beta()
    }

    pub fn max_priority_seen(&self) -> f64 {
        self.max_priority_seen
    }

    /// Read-only view of the sum tree
    pub fn index(&self) -> &PriorityIndex {
        &self.index
    }

    /// Reset the sampling RNG
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Store a transition.
    ///
    /// The priority is `max(hint, epsilon)` when a hint is given, otherwise the
    /// largest priority seen so far. Critical events multiply it by
    /// `critical_boost_factor^severity`. The oldest experience is overwritten
    /// once the buffer is full.
    ///
    /// Fails with `InvalidPriority` when the priority is not finite or when
    /// `priority^alpha` exceeds `f64::MAX / capacity`, the largest leaf for
    /// which the total mass is guaranteed to stay finite.
    pub fn add(
        &mut self,
        transition: Transition,
        priority_hint: Option<f64>,
        signal: EventSignal,
    ) -> Result<SlotHandle> {
        let base = match priority_hint {
            Some(hint) => check_finite(hint)?.max(self.config.epsilon),
            None => self.max_priority_seen,
        };

        let mut priority = base;
        if signal.is_critical {
            let severity = check_finite(signal.severity)?.clamp(0.0, 1.0);
            priority *= self.config.critical_boost_factor.powf(severity);
        }
        let priority = check_finite(priority)?.max(self.config.epsilon);
        let leaf = self.weighted(priority)?;

        let slot = self.write_cursor;
        let experience = Experience {
            state: transition.state,
            action: transition.action,
            reward: transition.reward,
            next_state: transition.next_state,
            done: transition.done,
            priority,
            inserted_at: self.total_inserted,
            metadata: transition.metadata,
        };
        self.store.write(slot, experience)?;
        self.index.set(slot, leaf);

        self.generations[slot] += 1;
        self.write_cursor = (self.write_cursor + 1) % self.config.capacity;
        self.size = (self.size + 1).min(self.config.capacity);
        self.total_inserted += 1;
        self.max_priority_seen = self.max_priority_seen.max(priority);

        Ok(SlotHandle::new(slot, self.generations[slot]))
    }

    /// Store a transition at the current maximum priority
    pub fn push(&mut self, transition: Transition) -> Result<SlotHandle> {
        self.add(transition, None, EventSignal::none())
    }

    /// Check whether a handle still refers to its original experience
    pub fn is_live(&self, handle: SlotHandle) -> bool {
        handle.slot < self.size
            && handle.generation > 0
            && self.generations[handle.slot] == handle.generation
    }

    /// Copy of the experience behind a live handle
    pub fn get(&self, handle: SlotHandle) -> Option<Experience> {
        self.is_live(handle).then(|| self.store.read(handle.slot))
    }

    /// Raw priority behind a live handle
    pub fn priority(&self, handle: SlotHandle) -> Option<f64> {
        self.is_live(handle).then(|| self.store.priority(handle.slot))
    }

    /// Probability that a single proportional draw selects this handle
    pub fn sampling_probability(&self, handle: SlotHandle) -> Option<f64> {
        if !self.is_live(handle) {
            return None;
        }
        let total = self.index.total_mass();
        (total > 0.0).then(|| self.index.get(handle.slot) / total)
    }

    /// Draw a batch of distinct slots with probability proportional to `priority^alpha`.
    ///
    /// `batch_size` is clamped to the number of live experiences. Each call
    /// takes one beta annealing step.
    pub fn sample(&mut self, batch_size: usize) -> Result<SampledBatch> {
        if self.size == 0 {
            return Err(ReplayError::EmptyBuffer);
        }
        let n = batch_size.min(self.size);
        if n == 0 {
            return Ok(SampledBatch::default());
        }

        let slots = self.draw_distinct(n);
        let beta = self.schedule.beta();

        // (N * P(i))^-beta / max_j (N * P(j))^-beta == (min_j P(j) / P(i))^beta
        let min_leaf = slots
            .iter()
            .map(|&slot| self.index.get(slot))
            .fold(f64::INFINITY, f64::min);
        let weights = slots
            .iter()
            .map(|&slot| (min_leaf / self.index.get(slot)).powf(beta))
            .collect();

        let experiences = slots.iter().map(|&slot| self.store.read(slot)).collect();
        let handles = slots
            .iter()
            .map(|&slot| SlotHandle::new(slot, self.generations[slot]))
            .collect();

        self.total_sampled += n as u64;
        self.schedule.advance();

        Ok(SampledBatch {
            experiences,
            handles,
            weights,
        })
    }

    /// Stratified draw of `n <= size` distinct slots
    fn draw_distinct(&mut self, n: usize) -> Vec<usize> {
        let total = self.index.total_mass();
        let segment = total / n as f64;

        let mut chosen = Vec::with_capacity(n);
        let mut seen = HashSet::with_capacity(n);
        for i in 0..n {
            let mass = segment * (i as f64 + self.rng.gen::<f64>());
            if let Some(slot) = self.index.sample_by_mass(mass) {
                if seen.insert(slot) {
                    chosen.push(slot);
                }
            }
        }

        if chosen.len() < n {
            debug!(
                "Stratified draw produced {} duplicates, filling from remaining mass",
                n - chosen.len()
            );

            // Hide chosen slots so every further draw lands on a new one
            let mut hidden: Vec<(usize, f64)> = Vec::with_capacity(n);
            for &slot in &chosen {
                hidden.push((slot, self.index.get(slot)));
                self.index.set(slot, 0.0);
            }
            while chosen.len() < n {
                let mass = self.rng.gen::<f64>() * self.index.total_mass();
                match self.index.sample_by_mass(mass) {
                    Some(slot) => {
                        hidden.push((slot, self.index.get(slot)));
                        self.index.set(slot, 0.0);
                        chosen.push(slot);
                    }
                    None => break,
                }
            }
            for (slot, value) in hidden {
                self.index.set(slot, value);
            }
        }

        chosen
    }

    /// Replace priorities of sampled experiences.
    ///
    /// Handles whose slot has been overwritten since sampling are skipped and
    /// counted. All priorities are validated before anything is written.
    pub fn update_priorities(
        &mut self,
        handles: &[SlotHandle],
        priorities: &[f64],
    ) -> Result<UpdateOutcome> {
        if handles.len() != priorities.len() {
            return Err(ReplayError::LengthMismatch {
                handles: handles.len(),
                priorities: priorities.len(),
            });
        }
        let mut updates = Vec::with_capacity(priorities.len());
        for &priority in priorities {
            let priority = check_finite(priority)?.abs().max(self.config.epsilon);
            updates.push((priority, self.weighted(priority)?));
        }

        let mut outcome = UpdateOutcome::default();
        for (&handle, &(priority, leaf)) in handles.iter().zip(&updates) {
            if !self.is_live(handle) {
                trace!("Skipping stale handle {:?}", handle);
                outcome.stale += 1;
                continue;
            }
            self.write_priority(handle.slot, priority, leaf);
            outcome.applied += 1;
        }

        self.stale_skipped += outcome.stale as u64;
        Ok(outcome)
    }

    /// Multiply the current priority of each live handle by `boost_factor`
    pub fn boost(&mut self, handles: &[SlotHandle], boost_factor: f64) -> Result<UpdateOutcome> {
        if !boost_factor.is_finite() || boost_factor <= 0.0 {
            return Err(ReplayError::InvalidPriority {
                value: boost_factor,
            });
        }

        let mut updates = Vec::with_capacity(handles.len());
        let mut outcome = UpdateOutcome::default();
        for &handle in handles {
            if !self.is_live(handle) {
                trace!("Skipping stale handle {:?}", handle);
                outcome.stale += 1;
                continue;
            }
            let boosted = check_finite(self.store.priority(handle.slot) * boost_factor)?
                .max(self.config.epsilon);
            updates.push((handle.slot, boosted, self.weighted(boosted)?));
        }

        for (slot, priority, leaf) in updates {
            self.write_priority(slot, priority, leaf);
            outcome.applied += 1;
        }

        self.stale_skipped += outcome.stale as u64;
        Ok(outcome)
    }

    fn write_priority(&mut self, slot: usize, priority: f64, leaf: f64) {
        self.store.set_priority(slot, priority);
        self.index.set(slot, leaf);
        self.max_priority_seen = self.max_priority_seen.max(priority);
    }

    /// Take one beta annealing step outside of `sample`
    pub fn advance(&mut self) -> f64 {
        self.schedule.advance()
    }

    /// The `count` most recently inserted live experiences, newest first,
    /// or in random order when `shuffled` is set
    pub fn recent(&mut self, count: usize, shuffled: bool) -> Vec<Experience> {
        let n = count.min(self.size);
        let capacity = self.config.capacity;
        let mut experiences: Vec<Experience> = (1..=n)
            .map(|back| self.store.read((self.write_cursor + capacity - back) % capacity))
            .collect();

        if shuffled {
            experiences.shuffle(&mut self.rng);
        }
        experiences
    }

    /// Recompute the sum tree from its leaves
    pub fn rebuild_index(&mut self) {
        self.index.rebuild();
    }

    /// Drop every experience. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.store = ExperienceStore::new(self.config.capacity, self.config.state_dim);
        self.index = PriorityIndex::new(self.config.capacity);
        self.size = 0;
        self.write_cursor = 0;
        self.max_priority_seen = 1.0;
    }

    /// Get statistics about the buffer
    pub fn stats(&self) -> BufferStats {
        let priorities = (0..self.size).map(|slot| self.store.priority(slot));
        let (min, max, sum) = priorities.fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), p| (min.min(p), max.max(p), sum + p),
        );

        let (min_priority, max_priority, mean_priority) = if self.size == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, sum / self.size as f64)
        };

        BufferStats {
            size: self.size,
            capacity: self.config.capacity,
            write_cursor: self.write_cursor,
            total_inserted: self.total_inserted,
            total_sampled: self.total_sampled,
            sample_calls: self.schedule.frames(),
            stale_skipped: self.stale_skipped,
            beta: self.schedule.beta(),
            max_priority_seen: self.max_priority_seen,
            total_mass: self.index.total_mass(),
            min_priority,
            max_priority,
            mean_priority,
        }
    }

    /// Capture the full buffer state
    pub fn snapshot(&self) -> Snapshot {
        let header = SnapshotHeader {
            schema_version: SCHEMA_VERSION,
            capacity: self.config.capacity,
            state_dim: self.config.state_dim,
            alpha: self.config.alpha,
            beta_start: self.config.beta_start,
            beta_frames: self.config.beta_frames,
            epsilon: self.config.epsilon,
            critical_boost_factor: self.config.critical_boost_factor,
        };

        let records = (0..self.size)
            .map(|slot| {
                let experience = self.store.read(slot);
                SnapshotRecord {
                    slot,
                    generation: self.generations[slot],
                    priority: experience.priority,
                    inserted_at: experience.inserted_at,
                    state: experience.state.to_vec(),
                    action: experience.action,
                    reward: experience.reward,
                    next_state: experience.next_state.to_vec(),
                    done: experience.done,
                    metadata: experience.metadata,
                }
            })
            .collect();

        let trailer = SnapshotTrailer {
            write_cursor: self.write_cursor,
            total_inserted: self.total_inserted,
            total_sampled: self.total_sampled,
            sample_calls: self.schedule.frames(),
            stale_skipped: self.stale_skipped,
            max_priority_seen: self.max_priority_seen,
            current_beta: self.schedule.beta(),
            generations: self.generations.clone(),
        };

        Snapshot {
            header,
            records,
            trailer,
        }
    }

    /// Replace the buffer state with a snapshot.
    ///
    /// The snapshot must have this buffer's capacity and state dimension. It is
    /// fully validated before anything is replaced, so on error the buffer is
    /// unchanged. The sampling RNG is left as is.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        let Snapshot {
            header,
            records,
            trailer,
        } = snapshot;

        if header.schema_version != SCHEMA_VERSION {
            return Err(ReplayError::format(format!(
                "unsupported schema version {}",
                header.schema_version
            )));
        }
        if header.capacity != self.config.capacity {
            return Err(ReplayError::format(format!(
                "capacity mismatch: snapshot has {}, buffer has {}",
                header.capacity, self.config.capacity
            )));
        }
        if header.state_dim != self.config.state_dim {
            return Err(ReplayError::format(format!(
                "state_dim mismatch: snapshot has {}, buffer has {}",
                header.state_dim, self.config.state_dim
            )));
        }

        let config = ReplayConfig {
            capacity: header.capacity,
            state_dim: header.state_dim,
            alpha: header.alpha,
            beta_start: header.beta_start,
            beta_frames: header.beta_frames,
            epsilon: header.epsilon,
            critical_boost_factor: header.critical_boost_factor,
            seed: self.config.seed,
        };
        config
            .validate()
            .map_err(|e| ReplayError::format(format!("snapshot header rejected: {}", e)))?;

        let capacity = config.capacity;
        let size = records.len();
        if size > capacity {
            return Err(ReplayError::format(format!(
                "{} records exceed capacity {}",
                size, capacity
            )));
        }
        if trailer.write_cursor >= capacity || (size < capacity && trailer.write_cursor != size) {
            return Err(ReplayError::format(format!(
                "write cursor {} inconsistent with size {}",
                trailer.write_cursor, size
            )));
        }
        if !trailer.max_priority_seen.is_finite() || trailer.max_priority_seen <= 0.0 {
            return Err(ReplayError::format("invalid max_priority_seen"));
        }
        if !(0.0..=1.0).contains(&trailer.current_beta) {
            return Err(ReplayError::format("current beta outside [0, 1]"));
        }
        if trailer.generations.len() != capacity {
            return Err(ReplayError::format(format!(
                "{} slot generations for capacity {}",
                trailer.generations.len(),
                capacity
            )));
        }
        let generations = trailer.generations;

        let mut store = ExperienceStore::new(capacity, config.state_dim);
        let mut occupied = vec![false; capacity];
        let mut leaves = vec![0.0; capacity];
        for record in records {
            if record.slot >= size || occupied[record.slot] {
                return Err(ReplayError::format(format!(
                    "unexpected or duplicate slot {}",
                    record.slot
                )));
            }
            if record.generation == 0 || record.generation != generations[record.slot] {
                return Err(ReplayError::format(format!(
                    "slot {} has generation {}, expected {}",
                    record.slot, record.generation, generations[record.slot]
                )));
            }
            if !record.priority.is_finite() || record.priority <= 0.0 {
                return Err(ReplayError::format(format!(
                    "slot {} has invalid priority {}",
                    record.slot, record.priority
                )));
            }

            let slot = record.slot;
            occupied[slot] = true;
            leaves[slot] = weighted_within_ceiling(record.priority, config.alpha, capacity)
                .map_err(|e| ReplayError::format(format!("slot {}: {}", slot, e)))?;
            store
                .write(
                    slot,
                    Experience {
                        state: record.state.into(),
                        action: record.action,
                        reward: record.reward,
                        next_state: record.next_state.into(),
                        done: record.done,
                        priority: record.priority,
                        inserted_at: record.inserted_at,
                        metadata: record.metadata,
                    },
                )
                .map_err(|e| ReplayError::format(format!("slot {}: {}", slot, e)))?;
        }

        if config != self.config {
            warn!(
                "Restoring snapshot with hyperparameters that differ from the live buffer: {:?}",
                config
            );
        }

        self.store = store;
        self.index = PriorityIndex::from_leaves(&leaves);
        self.generations = generations;
        self.size = size;
        self.write_cursor = trailer.write_cursor;
        self.schedule = BetaSchedule::resume(
            config.beta_start,
            config.beta_frames,
            trailer.sample_calls,
            trailer.current_beta,
        );
        self.max_priority_seen = trailer.max_priority_seen;
        self.total_inserted = trailer.total_inserted;
        self.total_sampled = trailer.total_sampled;
        self.stale_skipped = trailer.stale_skipped;
        self.config = config;

        info!(
            "Restored replay buffer: {} experiences, cursor {}, beta {:.3}",
            self.size,
            self.write_cursor,
            self.schedule.beta()
        );
        Ok(())
    }

    /// Write a snapshot file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::save_snapshot(&self.snapshot(), path)
    }

    /// Restore from a snapshot file
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = persistence::load_snapshot(path)?;
        self.restore(snapshot)
    }

    fn weighted(&self, priority: f64) -> Result<f64> {
        weighted_within_ceiling(priority, self.config.alpha, self.config.capacity)
    }
}

/// `priority^alpha`, rejected when `capacity` leaves of that size could
/// overflow the root of the sum tree
fn weighted_within_ceiling(priority: f64, alpha: f64, capacity: usize) -> Result<f64> {
    let weighted = priority.powf(alpha);
    if weighted.is_finite() && weighted <= f64::MAX / capacity as f64 {
        Ok(weighted)
    } else {
        Err(ReplayError::InvalidPriority { value: priority })
    }
}

fn check_finite(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReplayError::InvalidPriority { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn config(capacity: usize) -> ReplayConfig {
        ReplayConfig::new(capacity, 3)
            .with_alpha(0.6)
            .with_beta(0.4, 10)
            .with_epsilon(1e-3)
            .with_seed(42)
    }

    fn transition(value: f64) -> Transition {
        Transition::new(
            Array1::from_elem(3, value),
            (value as usize) % 3,
            value,
            Array1::from_elem(3, value + 1.0),
            false,
        )
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ReplayBuffer::new(ReplayConfig::new(0, 3));
        assert!(matches!(
            result,
            Err(ReplayError::CapacityMisconfiguration { .. })
        ));
    }

    #[test]
    fn test_add_and_len() {
        let mut buffer = ReplayBuffer::new(config(10)).unwrap();
        assert!(buffer.is_empty());

        for i in 0..4 {
            let handle = buffer.push(transition(i as f64)).unwrap();
            assert_eq!(handle, SlotHandle::new(i, 1));
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.write_cursor(), 4);
        assert!(buffer.can_sample(4));
        assert!(!buffer.can_sample(5));
    }

    #[test]
    fn test_new_experiences_get_max_priority() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        buffer.add(transition(0.0), Some(5.0), EventSignal::none()).unwrap();
        let handle = buffer.push(transition(1.0)).unwrap();

        assert_eq!(buffer.priority(handle), Some(5.0));
        assert_eq!(buffer.max_priority_seen(), 5.0);
    }

    #[test]
    fn test_hint_floored_at_epsilon() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        let zero = buffer.add(transition(0.0), Some(0.0), EventSignal::none()).unwrap();
        let negative = buffer.add(transition(1.0), Some(-3.0), EventSignal::none()).unwrap();

        assert_eq!(buffer.priority(zero), Some(1e-3));
        assert_eq!(buffer.priority(negative), Some(1e-3));
    }

    #[test]
    fn test_invalid_hint_rejected_without_mutation() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        let result = buffer.add(transition(0.0), Some(f64::NAN), EventSignal::none());

        assert!(matches!(result, Err(ReplayError::InvalidPriority { .. })));
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().total_inserted, 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        let bad = Transition::new(Array1::zeros(2), 0, 0.0, Array1::zeros(2), true);

        assert!(matches!(
            buffer.push(bad),
            Err(ReplayError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert!(buffer.is_empty());
        assert_eq!(buffer.write_cursor(), 0);
    }

    #[test]
    fn test_critical_boost_scales_with_severity() {
        let mut buffer = ReplayBuffer::new(config(8).with_critical_boost(4.0)).unwrap();
        let mild = buffer
            .add(transition(0.0), Some(1.0), EventSignal::critical(0.5))
            .unwrap();
        let severe = buffer
            .add(transition(1.0), Some(1.0), EventSignal::critical(1.0))
            .unwrap();
        let over = buffer
            .add(transition(2.0), Some(1.0), EventSignal::critical(3.0))
            .unwrap();

        assert!((buffer.priority(mild).unwrap() - 2.0).abs() < 1e-12);
        assert!((buffer.priority(severe).unwrap() - 4.0).abs() < 1e-12);
        assert!((buffer.priority(over).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_empty_buffer() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        assert!(matches!(buffer.sample(2), Err(ReplayError::EmptyBuffer)));
    }

    #[test]
    fn test_sample_clamps_and_is_distinct() {
        let mut buffer = ReplayBuffer::new(config(16)).unwrap();
        for i in 0..5 {
            buffer
                .add(transition(i as f64), Some(1.0 + i as f64 * 10.0), EventSignal::none())
                .unwrap();
        }

        let batch = buffer.sample(32).unwrap();
        assert_eq!(batch.len(), 5);

        let slots: HashSet<usize> = batch.handles.iter().map(|h| h.slot).collect();
        assert_eq!(slots.len(), 5);
        assert_eq!(buffer.stats().total_sampled, 5);
    }

    #[test]
    fn test_distinct_under_skewed_priorities() {
        let mut buffer = ReplayBuffer::new(config(64).with_alpha(1.0)).unwrap();
        buffer.add(transition(0.0), Some(1e6), EventSignal::none()).unwrap();
        for i in 1..40 {
            buffer.add(transition(i as f64), Some(1e-3), EventSignal::none()).unwrap();
        }
        let mass_before = buffer.index().total_mass();

        for _ in 0..20 {
            let batch = buffer.sample(16).unwrap();
            let slots: HashSet<usize> = batch.handles.iter().map(|h| h.slot).collect();
            assert_eq!(slots.len(), 16);
            assert!(slots.contains(&0));
        }
        assert_eq!(buffer.index().total_mass(), mass_before);
    }

    #[test]
    fn test_weights_normalized() {
        let mut buffer = ReplayBuffer::new(config(32)).unwrap();
        for i in 0..32 {
            buffer
                .add(transition(i as f64), Some(0.1 + i as f64), EventSignal::none())
                .unwrap();
        }

        for _ in 0..10 {
            let batch = buffer.sample(8).unwrap();
            let max = batch.weights.iter().cloned().fold(0.0, f64::max);
            assert_eq!(max, 1.0);
            assert!(batch.weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        }
    }

    #[test]
    fn test_sample_anneals_beta_once_per_call() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        for i in 0..8 {
            buffer.push(transition(i as f64)).unwrap();
        }

        assert_eq!(buffer.beta(), 0.4);
        buffer.sample(4).unwrap();
        assert!((buffer.beta() - 0.46).abs() < 1e-12);
        for _ in 0..20 {
            buffer.sample(4).unwrap();
        }
        assert_eq!(buffer.beta(), 1.0);
        assert_eq!(buffer.stats().sample_calls, 21);
    }

    #[test]
    fn test_update_priorities() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        for i in 0..4 {
            buffer.push(transition(i as f64)).unwrap();
        }

        let batch = buffer.sample(2).unwrap();
        let outcome = buffer
            .update_priorities(&batch.handles, &[-7.0, 0.0])
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { applied: 2, stale: 0 });

        assert_eq!(buffer.priority(batch.handles[0]), Some(7.0));
        assert_eq!(buffer.priority(batch.handles[1]), Some(1e-3));
        assert_eq!(buffer.max_priority_seen(), 7.0);
    }

    #[test]
    fn test_update_priorities_is_all_or_nothing() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        let a = buffer.push(transition(0.0)).unwrap();
        let b = buffer.push(transition(1.0)).unwrap();

        let result = buffer.update_priorities(&[a, b], &[3.0, f64::INFINITY]);
        assert!(matches!(result, Err(ReplayError::InvalidPriority { .. })));
        assert_eq!(buffer.priority(a), Some(1.0));

        let result = buffer.update_priorities(&[a, b], &[3.0]);
        assert!(matches!(result, Err(ReplayError::LengthMismatch { .. })));
    }

    #[test]
    fn test_stale_handles_skipped() {
        let mut buffer = ReplayBuffer::new(config(2)).unwrap();
        let old = buffer.push(transition(0.0)).unwrap();
        buffer.push(transition(1.0)).unwrap();
        let replacement = buffer.push(transition(2.0)).unwrap();

        assert_eq!(replacement.slot, old.slot);
        assert!(!buffer.is_live(old));

        let outcome = buffer.update_priorities(&[old], &[50.0]).unwrap();
        assert_eq!(outcome, UpdateOutcome { applied: 0, stale: 1 });
        assert_eq!(buffer.priority(replacement), Some(1.0));

        let outcome = buffer.boost(&[old, replacement], 2.0).unwrap();
        assert_eq!(outcome, UpdateOutcome { applied: 1, stale: 1 });
        assert_eq!(buffer.stats().stale_skipped, 2);
    }

    #[test]
    fn test_boost_multiplies_current_priority() {
        let mut buffer = ReplayBuffer::new(config(8)).unwrap();
        let handle = buffer.add(transition(0.0), Some(2.0), EventSignal::none()).unwrap();
        buffer.update_priorities(&[handle], &[3.0]).unwrap();

        buffer.boost(&[handle], 2.5).unwrap();
        assert!((buffer.priority(handle).unwrap() - 7.5).abs() < 1e-12);

        assert!(matches!(
            buffer.boost(&[handle], 0.0),
            Err(ReplayError::InvalidPriority { .. })
        ));
        assert!(matches!(
            buffer.boost(&[handle], f64::NAN),
            Err(ReplayError::InvalidPriority { .. })
        ));
    }

    #[test]
    fn test_recent_newest_first() {
        let mut buffer = ReplayBuffer::new(config(3)).unwrap();
        for i in 0..5 {
            buffer.push(transition(i as f64)).unwrap();
        }

        let rewards: Vec<f64> = buffer.recent(10, false).iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![4.0, 3.0, 2.0]);

        let mut shuffled: Vec<f64> = buffer.recent(3, true).iter().map(|e| e.reward).collect();
        shuffled.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(shuffled, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        let handle = buffer.push(transition(0.0)).unwrap();
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(!buffer.is_live(handle));
        assert_eq!(buffer.index().total_mass(), 0.0);

        let fresh = buffer.push(transition(1.0)).unwrap();
        assert_eq!(fresh, SlotHandle::new(0, 2));
    }

    #[test]
    fn test_snapshot_restore_in_memory() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        for i in 0..6 {
            buffer
                .add(transition(i as f64), Some(i as f64 + 1.0), EventSignal::none())
                .unwrap();
        }
        buffer.sample(2).unwrap();

        let mut restored = ReplayBuffer::new(config(4)).unwrap();
        restored.restore(buffer.snapshot()).unwrap();

        assert_eq!(restored.stats(), buffer.stats());
        assert_eq!(restored.index().leaves(), buffer.index().leaves());
    }

    #[test]
    fn test_restore_capacity_mismatch() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        buffer.push(transition(0.0)).unwrap();

        let mut other = ReplayBuffer::new(config(8)).unwrap();
        other.push(transition(9.0)).unwrap();
        let before = other.stats();

        assert!(matches!(
            other.restore(buffer.snapshot()),
            Err(ReplayError::PersistenceFormat(_))
        ));
        assert_eq!(other.stats(), before);
    }

    #[test]
    fn test_restore_rejects_bad_records() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        buffer.push(transition(0.0)).unwrap();
        buffer.push(transition(1.0)).unwrap();

        let mut snapshot = buffer.snapshot();
        snapshot.records[1].priority = f64::NAN;
        let mut target = ReplayBuffer::new(config(4)).unwrap();
        assert!(target.restore(snapshot).is_err());
        assert!(target.is_empty());

        let mut snapshot = buffer.snapshot();
        snapshot.records[1].slot = 0;
        assert!(target.restore(snapshot).is_err());

        let mut snapshot = buffer.snapshot();
        snapshot.records[0].state.pop();
        assert!(target.restore(snapshot).is_err());
        assert!(target.is_empty());

        let mut snapshot = buffer.snapshot();
        snapshot.trailer.generations[1] = 7;
        assert!(matches!(
            target.restore(snapshot),
            Err(ReplayError::PersistenceFormat(_))
        ));

        let mut snapshot = buffer.snapshot();
        snapshot.trailer.generations.pop();
        assert!(target.restore(snapshot).is_err());
        assert!(target.is_empty());
    }

    #[test]
    fn test_handles_from_before_clear_stay_stale_after_restore() {
        let mut buffer = ReplayBuffer::new(config(4)).unwrap();
        buffer.push(transition(0.0)).unwrap();
        let old = buffer.push(transition(1.0)).unwrap();
        assert_eq!(old, SlotHandle::new(1, 1));

        buffer.clear();
        buffer.push(transition(2.0)).unwrap();

        let mut restored = ReplayBuffer::new(config(4)).unwrap();
        restored.restore(buffer.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), buffer.snapshot());

        let live_new = buffer.push(transition(3.0)).unwrap();
        let restored_new = restored.push(transition(3.0)).unwrap();
        assert_eq!(restored_new, live_new);
        assert_eq!(restored_new, SlotHandle::new(1, 2));

        assert!(!buffer.is_live(old));
        assert!(!restored.is_live(old));
        let outcome = restored.update_priorities(&[old], &[50.0]).unwrap();
        assert_eq!(outcome, UpdateOutcome { applied: 0, stale: 1 });
        assert_eq!(restored.priority(restored_new), Some(1.0));
    }

    #[test]
    fn test_priorities_that_would_overflow_total_mass_rejected() {
        let mut buffer = ReplayBuffer::new(config(4).with_alpha(1.0)).unwrap();
        let handle = buffer.add(transition(0.0), Some(1e300), EventSignal::none()).unwrap();
        let before = buffer.stats();

        let result = buffer.add(transition(1.0), Some(1e308), EventSignal::none());
        assert!(matches!(result, Err(ReplayError::InvalidPriority { .. })));
        assert_eq!(buffer.stats(), before);

        let result = buffer.update_priorities(&[handle], &[f64::MAX]);
        assert!(matches!(result, Err(ReplayError::InvalidPriority { .. })));
        let result = buffer.boost(&[handle], 1e8);
        assert!(matches!(result, Err(ReplayError::InvalidPriority { .. })));
        assert_eq!(buffer.priority(handle), Some(1e300));

        let other = buffer.add(transition(2.0), Some(1e300), EventSignal::none()).unwrap();
        assert!(buffer.index().total_mass().is_finite());
        let probability = buffer.sampling_probability(other).unwrap();
        assert!((probability - 0.5).abs() < 1e-12);
    }
}
