//! # Replay Module
//!
//! Prioritized experience replay: sum-tree index, circular experience store,
//! beta annealing and the buffer that ties them together.

mod buffer;
mod experience;
mod schedule;
mod shared;
mod stats;
mod store;
mod sum_tree;

pub use buffer::{ReplayBuffer, SampledBatch};
pub use experience::{EventSignal, Experience, Metadata, SlotHandle, Transition};
pub use schedule::BetaSchedule;
pub use shared::SharedReplayBuffer;
pub use stats::{BufferStats, UpdateOutcome};
pub use store::ExperienceStore;
pub use sum_tree::PriorityIndex;
