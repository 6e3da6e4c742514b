//! Observability counters for the replay buffer.

use std::fmt;

/// Statistics about the replay buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferStats {
    /// Occupied slots
    pub size: usize,
    /// Total slots
    pub capacity: usize,
    /// Next slot to be written
    pub write_cursor: usize,
    /// Experiences inserted since creation
    pub total_inserted: u64,
    /// Experiences handed out by `sample`
    pub total_sampled: u64,
    /// Calls to `sample` (annealing frames)
    pub sample_calls: u64,
    /// Priority updates skipped because the slot was overwritten
    pub stale_skipped: u64,
    /// Current importance-sampling exponent
    pub beta: f64,
    /// Initial priority for experiences added without a hint
    pub max_priority_seen: f64,
    /// Sum of `priority^alpha` over occupied slots
    pub total_mass: f64,
    /// Smallest raw priority among occupied slots
    pub min_priority: f64,
    /// Largest raw priority among occupied slots
    pub max_priority: f64,
    /// Mean raw priority among occupied slots
    pub mean_priority: f64,
}

impl BufferStats {
    /// Fraction of capacity in use
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.size as f64 / self.capacity as f64
        }
    }
}

impl fmt::Display for BufferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size {}/{} ({:.1}%), inserted {}, sampled {}, stale {}, beta {:.3}, \
             priority min/mean/max {:.4}/{:.4}/{:.4}",
            self.size,
            self.capacity,
            self.fill_ratio() * 100.0,
            self.total_inserted,
            self.total_sampled,
            self.stale_skipped,
            self.beta,
            self.min_priority,
            self.mean_priority,
            self.max_priority,
        )
    }
}

/// Result of `update_priorities` / `boost`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Handles whose slot was updated
    pub applied: usize,
    /// Handles skipped because their slot had been overwritten
    pub stale: usize,
}

