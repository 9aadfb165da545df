//! # RTS Kernel
//!
//! Deterministic per-tick simulation kernel for a classic real-time
//! strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO outside explicit save/load
//! - No system randomness (one seeded stream per simulation)
//! - No floating-point math in simulation state
//!
//! Two runs fed the same scenario and the same orders produce bit-identical
//! state at every tick, which is what replays and lockstep play rely on.
//!
//! ## Crate Structure
//!
//! - [`coord`] - packed coordinates, cells and headings
//! - [`target`] - the 32-bit entity/cell reference codec
//! - [`pool`] - fixed-capacity per-category object pools
//! - [`entity`] - the layered entity model and concrete unit kinds
//! - [`mission`] - missions and the per-entity mission state machine
//! - [`radio`] - point-to-point entity messaging
//! - [`pathfinding`] - grid A* over [`terrain`]
//! - [`world`] - the context threaded through every update
//! - [`simulation`] - the tick driver, orders and persistence
//! - [`replay`] - order recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod coord;
pub mod entity;
pub mod error;
pub mod math;
pub mod mission;
pub mod pathfinding;
pub mod pool;
pub mod radio;
pub mod replay;
pub mod rng;
pub mod simulation;
pub mod target;
pub mod terrain;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::KernelConfig;
    pub use crate::coord::{Cell, Coordinate, Dir256, Facing};
    pub use crate::entity::{
        BuildingKind, CombatObject, HouseId, InfantryKind, MapObject, MissionObject, MobileObject,
        Object, RadioObject, VehicleKind,
    };
    pub use crate::error::{KernelError, Result};
    pub use crate::math::Fixed;
    pub use crate::mission::Mission;
    pub use crate::pathfinding::{find_path, PathLimits, PathResult, PathStatus};
    pub use crate::pool::{Handle, Pool, PoolCapacities};
    pub use crate::radio::RadioMessage;
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::simulation::{Order, Simulation};
    pub use crate::target::{Rtti, Target};
    pub use crate::terrain::{LandType, Locomotion, Terrain};
    pub use crate::world::{TickEvents, World};
}
