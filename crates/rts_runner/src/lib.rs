//! Headless scenario runner and replay verifier for the RTS kernel.
//!
//! Scenarios are RON files naming a terrain layout, the starting units and
//! a list of timed orders. The runner builds a [`Simulation`] from one,
//! drives it tick by tick, and can record the run as a [`Replay`] that
//! `verify` later re-checks.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario, one JSON line per tick
//! cargo run -p rts_runner -- run --scenario scenarios/skirmish.ron --json
//!
//! # Record it and check the recording
//! cargo run -p rts_runner -- record --scenario scenarios/skirmish.ron --out skirmish.replay
//! cargo run -p rts_runner -- verify --replay skirmish.replay
//! ```
//!
//! [`Simulation`]: rts_kernel::simulation::Simulation
//! [`Replay`]: rts_kernel::replay::Replay

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod runner;
pub mod scenario;

use thiserror::Error;

pub use runner::{RunSummary, ScenarioRunner, TickReport};
pub use scenario::{EntityKind, Scenario, ScenarioOrder, TimedOrder, UnitPlacement};

/// Errors from loading or running scenarios.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Scenario file does not exist.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse scenario RON.
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Two placements share an id.
    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(String),
    /// An order names a unit id no placement defines.
    #[error("Unknown unit id: {0}")]
    UnknownUnit(String),
    /// Failed to encode a report.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The kernel rejected an operation.
    #[error(transparent)]
    Kernel(#[from] rts_kernel::error::KernelError),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
