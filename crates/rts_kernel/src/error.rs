//! Error types for the simulation kernel.

use thiserror::Error;

use crate::target::{Rtti, Target};

/// Result type alias using [`KernelError`].
pub type Result<T> = std::result::Result<T, KernelError>;

/// Top-level error type for all kernel errors.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A category pool has no free slot left.
    #[error("Pool exhausted: {rtti} pool is full at {capacity} slots")]
    PoolExhausted {
        /// Category of the exhausted pool.
        rtti: Rtti,
        /// Fixed capacity of the pool.
        capacity: usize,
    },

    /// A target did not resolve to a live entity.
    #[error("Entity not found: {0}")]
    EntityNotFound(Target),

    /// A target was used where it does not apply (wrong category, cell target, ...).
    #[error("Invalid target {target}: {reason}")]
    InvalidTarget {
        /// Offending target.
        target: Target,
        /// Why it was rejected.
        reason: String,
    },

    /// A radio message other than `Hello` was sent without a contact.
    #[error("No radio contact: {0}")]
    NoContact(Target),

    /// A cell outside the map was supplied.
    #[error("Invalid cell ({x}, {y})")]
    InvalidCell {
        /// Requested column.
        x: i32,
        /// Requested row.
        y: i32,
    },

    /// Save data could not be encoded or decoded.
    #[error("Save data error: {0}")]
    SaveData(String),

    /// Configuration data failed to parse.
    #[error("Failed to parse config '{path}': {message}")]
    ConfigParse {
        /// Source of the config (file path or `<string>`).
        path: String,
        /// Parser message.
        message: String,
    },

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Replay file was written by an incompatible version.
    #[error("Replay version mismatch: expected {expected}, got {found}")]
    ReplayVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Invalid simulation state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Desync detected between two runs of the same inputs.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}

impl From<bincode::Error> for KernelError {
    fn from(err: bincode::Error) -> Self {
        Self::SaveData(err.to_string())
    }
}
