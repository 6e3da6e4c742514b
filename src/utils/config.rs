//! Replay buffer configuration.

use crate::error::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Hyperparameters of a prioritized replay buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Number of slots (fixed for the lifetime of the buffer)
    pub capacity: usize,
    /// Length of `state` and `next_state` vectors
    pub state_dim: usize,
    /// Priority exponent (0 = uniform sampling)
    pub alpha: f64,
    /// Initial importance-sampling exponent
    pub beta_start: f64,
    /// Number of `sample` calls over which beta reaches 1.0
    pub beta_frames: u64,
    /// Floor applied to every stored priority
    pub epsilon: f64,
    /// Base of the critical-event multiplier (`factor^severity`)
    pub critical_boost_factor: f64,
    /// RNG seed for sampling; entropy when absent
    pub seed: Option<u64>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            state_dim: 8,
            alpha: 0.6,
            beta_start: 0.4,
            beta_frames: 100_000,
            epsilon: 1e-6,
            critical_boost_factor: 4.0,
            seed: None,
        }
    }
}

impl ReplayConfig {
    /// Create a configuration with default hyperparameters
    pub fn new(capacity: usize, state_dim: usize) -> Self {
        Self {
            capacity,
            state_dim,
            ..Self::default()
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta_start: f64, beta_frames: u64) -> Self {
        self.beta_start = beta_start;
        self.beta_frames = beta_frames;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_critical_boost(mut self, factor: f64) -> Self {
        self.critical_boost_factor = factor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ReplayError::CapacityMisconfiguration {
                capacity: self.capacity,
            });
        }
        if self.state_dim == 0 {
            return Err(ReplayError::config("state_dim must be positive"));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ReplayError::config(format!(
                "alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.beta_start) {
            return Err(ReplayError::config(format!(
                "beta_start must be in [0, 1], got {}",
                self.beta_start
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(ReplayError::config(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        if !self.critical_boost_factor.is_finite() || self.critical_boost_factor < 1.0 {
            return Err(ReplayError::config(format!(
                "critical_boost_factor must be finite and >= 1, got {}",
                self.critical_boost_factor
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReplayConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overridden by `REPLAY_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `REPLAY_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(capacity) = env_value("REPLAY_CAPACITY") {
            self.capacity = capacity;
        }
        if let Some(state_dim) = env_value("REPLAY_STATE_DIM") {
            self.state_dim = state_dim;
        }
        if let Some(alpha) = env_value("REPLAY_ALPHA") {
            self.alpha = alpha;
        }
        if let Some(beta_start) = env_value("REPLAY_BETA_START") {
            self.beta_start = beta_start;
        }
        if let Some(beta_frames) = env_value("REPLAY_BETA_FRAMES") {
            self.beta_frames = beta_frames;
        }
        if let Some(epsilon) = env_value("REPLAY_EPSILON") {
            self.epsilon = epsilon;
        }
        if let Some(factor) = env_value("REPLAY_CRITICAL_BOOST") {
            self.critical_boost_factor = factor;
        }
        if let Some(seed) = env_value("REPLAY_SEED") {
            self.seed = Some(seed);
        }
        self
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}
