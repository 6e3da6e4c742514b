//! Utility functions and helpers.

mod config;

pub use config::ReplayConfig;
