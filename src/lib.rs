//! # Prioritized Replay
//!
//! Prioritized experience replay for market-prediction training loops.
//!
//! Experiences are kept in a fixed-capacity circular buffer and sampled with
//! probability proportional to `priority^alpha` through a sum tree. Sampling
//! bias is corrected with importance-sampling weights whose exponent is
//! annealed towards 1.0, and experiences flagged as critical market events
//! receive a priority boost.
//!
//! ## Modules
//!
//! - `replay` - Sum tree, experience store and the replay buffer
//! - `persistence` - Crash-safe snapshot files
//! - `utils` - Configuration
//! - `error` - Error types
//!
//! ## Quick Start
//!
//! ```rust
//! use ndarray::Array1;
//! use prioritized_replay::{EventSignal, ReplayBuffer, ReplayConfig, Transition};
//!
//! let config = ReplayConfig::new(1024, 4).with_seed(7);
//! let mut buffer = ReplayBuffer::new(config)?;
//!
//! let t = Transition::new(Array1::zeros(4), 1, 0.5, Array1::ones(4), false);
//! buffer.add(t, None, EventSignal::critical(0.9))?;
//!
//! let batch = buffer.sample(32)?;
//! let errors: Vec<f64> = batch.experiences.iter().map(|e| e.reward.abs()).collect();
//! buffer.update_priorities(&batch.handles, &errors)?;
//! # Ok::<(), prioritized_replay::ReplayError>(())
//! ```

pub mod error;
pub mod persistence;
pub mod replay;
pub mod utils;

pub use error::{ReplayError, Result};
pub use persistence::{load_snapshot, save_snapshot, Snapshot};
pub use replay::{
    BufferStats, EventSignal, Experience, Metadata, PriorityIndex, ReplayBuffer, SampledBatch,
    SharedReplayBuffer, SlotHandle, Transition, UpdateOutcome,
};
pub use utils::ReplayConfig;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::ReplayError;
    pub use crate::persistence::{load_snapshot, save_snapshot, Snapshot};
    pub use crate::replay::{
        BufferStats, EventSignal, Experience, ReplayBuffer, SampledBatch, SharedReplayBuffer,
        SlotHandle, Transition, UpdateOutcome,
    };
    pub use crate::utils::ReplayConfig;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
