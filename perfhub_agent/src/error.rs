//! Error types for the agent library.

use thiserror::Error;

/// The OS collaborator could not produce a reading this tick.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("metrics source is not supported on this platform")]
    Unsupported,
    #[error("metric unavailable: {0}")]
    Unavailable(&'static str),
    #[error("metrics refresh panicked: {0}")]
    Panicked(String),
}

/// A single push to one connection failed. Never fatal to the tick loop.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection queue is full")]
    Backlogged,
    #[error("connection is closed")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("missing value for {0}")]
    Missing(&'static str),
    #[error("unexpected argument: {0}")]
    Unexpected(String),
}
