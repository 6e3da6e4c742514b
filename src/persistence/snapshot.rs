//! Snapshot schema.

use crate::replay::Metadata;
use serde::{Deserialize, Serialize};

/// Version of the snapshot layout written by this crate
pub const SCHEMA_VERSION: u32 = 2;

/// Complete, self-describing buffer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    /// One record per occupied slot
    pub records: Vec<SnapshotRecord>,
    pub trailer: SnapshotTrailer,
}

/// Buffer configuration at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub schema_version: u32,
    pub capacity: usize,
    pub state_dim: usize,
    pub alpha: f64,
    pub beta_start: f64,
    pub beta_frames: u64,
    pub epsilon: f64,
    pub critical_boost_factor: f64,
}

/// One occupied slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub slot: usize,
    pub generation: u64,
    /// Raw priority; the sum tree is rebuilt from these on restore
    pub priority: f64,
    pub inserted_at: u64,
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
    pub metadata: Option<Metadata>,
}

/// Counters and schedule state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTrailer {
    pub write_cursor: usize,
    pub total_inserted: u64,
    pub total_sampled: u64,
    pub sample_calls: u64,
    pub stale_skipped: u64,
    pub max_priority_seen: f64,
    pub current_beta: f64,
    /// Generation of every slot, including slots above `size` left behind by `clear`
    pub generations: Vec<u64>,
}

