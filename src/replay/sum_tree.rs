//! Sum tree over slot priorities.
//!
//! Leaves hold `priority^alpha` for each slot and every internal node holds
//! the sum of its two children, so the root is the total sampling mass.
//! Both updates and proportional lookups cost O(log capacity).

use tracing::debug;

/// Fixed-capacity sum tree indexed by slot
#[derive(Debug, Clone)]
pub struct PriorityIndex {
    capacity: usize,
    /// Node `i` has children `2i` and `2i + 1`; leaves live at `[capacity, 2 * capacity)`.
    /// Index 0 is unused.
    nodes: Vec<f64>,
    updates_since_rebuild: usize,
}

impl PriorityIndex {
    /// Create an index with all leaves at zero
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. `ReplayBuffer` rejects that earlier through
    /// `ReplayConfig::validate`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "PriorityIndex capacity must be positive");
        Self {
            capacity,
            nodes: vec![0.0; 2 * capacity],
            updates_since_rebuild: 0,
        }
    }

    /// Build an index from leaf values in one bottom-up pass
    ///
    /// # Panics
    ///
    /// Panics if `leaves` is empty.
    pub fn from_leaves(leaves: &[f64]) -> Self {
        let mut index = Self::new(leaves.len());
        index.nodes[index.capacity..].copy_from_slice(leaves);
        index.rebuild();
        index
    }

    /// Total mass (value at the root)
    pub fn total_mass(&self) -> f64 {
        self.nodes[1]
    }

    /// Leaf value of a slot
    ///
    /// # Panics
    ///
    /// Panics if `slot >= capacity`.
    pub fn get(&self, slot: usize) -> f64 {
        self.nodes[self.capacity + slot]
    }

    /// Overwrite a leaf and refresh all of its ancestors.
    ///
    /// Every `capacity` calls the whole tree is recomputed from its leaves.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= capacity`.
    pub fn set(&mut self, slot: usize, weighted_priority: f64) {
        assert!(slot < self.capacity, "slot {} out of range", slot);
        debug_assert!(weighted_priority.is_finite() && weighted_priority >= 0.0);

        let mut node = self.capacity + slot;
        self.nodes[node] = weighted_priority;
        node /= 2;
        while node >= 1 {
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
            node /= 2;
        }

        self.updates_since_rebuild += 1;
        if self.updates_since_rebuild >= self.capacity {
            self.rebuild();
        }
    }

    /// Resolve a mass in `[0, total_mass())` to a slot.
    ///
    /// Returns `None` only when the tree holds no mass. Out-of-range targets are
    /// clamped, and zero-mass subtrees are never entered, so the returned slot
    /// always has a positive leaf.
    pub fn sample_by_mass(&self, target_mass: f64) -> Option<usize> {
        let total = self.total_mass();
        if !(total > 0.0) {
            return None;
        }

        let mut mass = if target_mass.is_nan() {
            0.0
        } else {
            target_mass.clamp(0.0, total)
        };
        let mut node = 1;
        while node < self.capacity {
            let left = self.nodes[2 * node];
            let right = self.nodes[2 * node + 1];
            if left > 0.0 && (mass < left || right <= 0.0) {
                node = 2 * node;
            } else {
                mass = (mass - left).max(0.0);
                node = 2 * node + 1;
            }
        }

        Some(node - self.capacity)
    }

    /// Number of `set` calls since the last full rebuild
    pub fn updates_since_rebuild(&self) -> usize {
        self.updates_since_rebuild
    }

    /// Recompute every internal node from the leaves
    pub fn rebuild(&mut self) {
        for node in (1..self.capacity).rev() {
            self.nodes[node] = self.nodes[2 * node] + self.nodes[2 * node + 1];
        }
        debug!(
            "Rebuilt priority index after {} updates, total mass {:.6}",
            self.updates_since_rebuild,
            self.total_mass()
        );
        self.updates_since_rebuild = 0;
    }

    /// Plain sum over all leaves, independent of the internal nodes
    pub fn leaf_sum(&self) -> f64 {
        self.nodes[self.capacity..].iter().sum()
    }

    /// Leaf values in slot order
    pub fn leaves(&self) -> &[f64] {
        &self.nodes[self.capacity..]
    }
}
