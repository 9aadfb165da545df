//! Core simulation loop.
//!
//! The simulation advances in fixed ticks. Each tick updates every active
//! entity exactly once, category by category in [`Rtti::POOL_ORDER`] and in
//! slot order within a category.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math in simulation state
//! - One seeded random stream, consumed only from entity updates
//! - Fixed iteration order (category, then slot)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use rts_kernel::prelude::*;
//!
//! let mut sim = Simulation::new(&KernelConfig::with_seed(7));
//! let soldier = sim
//!     .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(2, 2))
//!     .unwrap();
//! sim.order_move(soldier, Cell::new(6, 2)).unwrap();
//! for _ in 0..600 {
//!     sim.tick();
//! }
//! assert_eq!(sim.world().coord_of(soldier).map(|c| c.to_cell()), Some(Cell::new(6, 2)));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::coord::Cell;
use crate::entity::{
    BuildingKind, CombatObject, HouseId, InfantryKind, MissionObject, MobileObject, RadioObject,
    VehicleKind,
};
use crate::error::{KernelError, Result};
use crate::mission::Mission;
use crate::radio::RadioMessage;
use crate::target::{Rtti, Target};
use crate::terrain::Terrain;
use crate::world::{TickEvents, World};

/// A player or script instruction, applied between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Walk or drive to a cell.
    Move {
        /// Unit to move.
        unit: Target,
        /// Destination.
        cell: Cell,
    },
    /// Attack an entity.
    Attack {
        /// Attacker.
        unit: Target,
        /// Entity to attack.
        victim: Target,
    },
    /// Board a transport, dock at a building, or take a building over.
    Enter {
        /// Unit entering.
        unit: Target,
        /// Transport or building.
        host: Target,
    },
    /// Replace the current mission at the next update.
    Mission {
        /// Entity to instruct.
        unit: Target,
        /// New mission.
        mission: Mission,
    },
    /// Suspend the current mission in favour of another.
    Override {
        /// Entity to instruct.
        unit: Target,
        /// Temporary mission.
        mission: Mission,
    },
    /// Return to the suspended mission.
    Restore {
        /// Entity to instruct.
        unit: Target,
    },
    /// Remove an entity outright.
    Destroy {
        /// Entity to remove.
        unit: Target,
    },
    /// Start building a vehicle at a construction yard.
    Produce {
        /// Construction yard.
        factory: Target,
        /// Vehicle to build.
        kind: VehicleKind,
    },
}

/// The deterministic game simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    world: World,
}

impl Simulation {
    /// Create an empty simulation on clear terrain.
    #[must_use]
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            world: World::new(config),
        }
    }

    /// Create an empty simulation on the given terrain.
    #[must_use]
    pub fn with_terrain(config: &KernelConfig, terrain: Terrain) -> Self {
        Self {
            world: World::with_terrain(config, terrain),
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.world.tick
    }

    /// Read access to the world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Write access to the world, for scenario setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Advance the simulation by one tick.
    ///
    /// Each category's active set is captured when the category's turn
    /// comes, so a projectile launched by a vehicle flies in the same tick
    /// while a vehicle produced by a building waits for the next one.
    pub fn tick(&mut self) -> TickEvents {
        for rtti in Rtti::POOL_ORDER {
            for handle in self.world.pools.active_handles(rtti) {
                self.world.update_entity(handle.target(rtti));
            }
        }

        self.world.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.world.tick, state_hash = hash, "Simulation state hash");
        }

        std::mem::take(&mut self.world.events)
    }

    // --- Creation ---------------------------------------------------------

    /// Place a soldier.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] if the cell is off the map,
    /// impassable or taken.
    ///
    /// # Panics
    ///
    /// Panics if the infantry pool is exhausted.
    pub fn create_infantry(&mut self, kind: InfantryKind, owner: HouseId, cell: Cell) -> Result<Target> {
        self.world.create_infantry(kind, owner, cell)
    }

    /// Place a vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] if the cell is off the map,
    /// impassable or taken.
    ///
    /// # Panics
    ///
    /// Panics if the vehicle pool is exhausted.
    pub fn create_vehicle(&mut self, kind: VehicleKind, owner: HouseId, cell: Cell) -> Result<Target> {
        self.world.create_vehicle(kind, owner, cell)
    }

    /// Place a structure with its top-left corner at `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] if any footprint cell is off
    /// the map, unbuildable or taken.
    ///
    /// # Panics
    ///
    /// Panics if the building pool is exhausted.
    pub fn create_building(&mut self, kind: BuildingKind, owner: HouseId, cell: Cell) -> Result<Target> {
        self.world.create_building(kind, owner, cell)
    }

    /// Place an aircraft.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] if the cell is off the map.
    ///
    /// # Panics
    ///
    /// Panics if the aircraft pool is exhausted.
    pub fn create_aircraft(&mut self, owner: HouseId, cell: Cell) -> Result<Target> {
        self.world.create_aircraft(owner, cell)
    }

    // --- Orders -----------------------------------------------------------

    fn techno<R>(
        &mut self,
        unit: Target,
        f: impl FnOnce(&mut dyn CombatObject, &mut World) -> R,
    ) -> Result<R> {
        let result = self
            .world
            .with_techno(unit, f)
            .ok_or(KernelError::EntityNotFound(unit))?;
        self.world.flush_graveyard();
        Ok(result)
    }

    fn mobile<R>(
        &mut self,
        unit: Target,
        f: impl FnOnce(&mut dyn MobileObject, &mut World) -> R,
    ) -> Result<R> {
        if !self.world.is_alive(unit) {
            return Err(KernelError::EntityNotFound(unit));
        }
        let result = self.world.with_mobile(unit, f).ok_or_else(|| KernelError::InvalidTarget {
            target: unit,
            reason: "not a mobile unit".to_string(),
        })?;
        self.world.flush_graveyard();
        Ok(result)
    }

    /// Queue `mission` to commence at the entity's next update.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `unit` does not resolve.
    pub fn assign_mission(&mut self, unit: Target, mission: Mission) -> Result<()> {
        self.techno(unit, |entity, _| entity.mission_mut().queue(mission))
    }

    /// Suspend the current (or queued) mission and switch to `mission` now.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `unit` does not resolve.
    pub fn override_mission(&mut self, unit: Target, mission: Mission) -> Result<()> {
        self.techno(unit, |entity, _| entity.override_mission(mission))
    }

    /// Return to the mission parked by the last override. `Ok(false)` when
    /// nothing was parked.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `unit` does not resolve.
    pub fn restore_mission(&mut self, unit: Target) -> Result<bool> {
        self.techno(unit, |entity, _| entity.restore_mission())
    }

    /// Send a mobile unit to `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] for an off-map cell and
    /// [`KernelError::InvalidTarget`] for something that cannot move.
    pub fn order_move(&mut self, unit: Target, cell: Cell) -> Result<()> {
        if !cell.is_valid() {
            return Err(KernelError::InvalidCell {
                x: cell.x(),
                y: cell.y(),
            });
        }
        self.mobile(unit, |entity, world| {
            entity.stop_moving(world);
            entity.foot_mut().navcom = Target::from_cell(cell);
            entity.mission_mut().queue(Mission::Move);
        })
    }

    /// Set an attack target. Buildings engage from where they stand.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if either side does not
    /// resolve.
    pub fn order_attack(&mut self, unit: Target, victim: Target) -> Result<()> {
        if !self.world.is_targetable(victim) {
            return Err(KernelError::EntityNotFound(victim));
        }
        self.techno(unit, |entity, _| {
            entity.assign_target(victim);
            entity.mission_mut().queue(Mission::Attack);
        })
    }

    /// Send a mobile unit into a transport or building.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if the host does not resolve
    /// and [`KernelError::InvalidTarget`] for something that cannot move.
    pub fn order_enter(&mut self, unit: Target, host: Target) -> Result<()> {
        if !self.world.is_targetable(host) {
            return Err(KernelError::EntityNotFound(host));
        }
        self.mobile(unit, |entity, world| {
            entity.stop_moving(world);
            entity.foot_mut().navcom = host;
            entity.mission_mut().queue(Mission::Enter);
        })
    }

    /// Start building a vehicle. `Ok(false)` when the factory is busy or
    /// cannot build.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `factory` is not a live
    /// building.
    pub fn order_production(&mut self, factory: Target, kind: VehicleKind) -> Result<bool> {
        self.world
            .with_building(factory, |building, _| building.start_production(kind))
            .ok_or(KernelError::EntityNotFound(factory))
    }

    /// Send a radio message on behalf of `from`. `to` may be
    /// [`Target::NONE`] to address the current contact.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `from` does not resolve
    /// and [`KernelError::NoContact`] for a non-`Hello` message with
    /// neither a recipient nor a contact.
    pub fn transmit(
        &mut self,
        from: Target,
        message: RadioMessage,
        param: &mut i32,
        to: Target,
    ) -> Result<RadioMessage> {
        self.techno(from, |entity, world| {
            if message != RadioMessage::Hello && !to.is_valid() && !entity.contact().is_valid() {
                return Err(KernelError::NoContact(from));
            }
            Ok(entity.transmit(world, message, param, to))
        })?
    }

    /// Remove an entity now, breaking its links and scrubbing references.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EntityNotFound`] if `unit` does not resolve.
    pub fn destroy(&mut self, unit: Target) -> Result<()> {
        if !self.world.destroy(unit) {
            return Err(KernelError::EntityNotFound(unit));
        }
        self.world.flush_graveyard();
        Ok(())
    }

    /// Apply a recorded order.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying order.
    pub fn apply_order(&mut self, order: &Order) -> Result<()> {
        tracing::debug!(tick = self.world.tick, ?order, "apply order");
        match *order {
            Order::Move { unit, cell } => self.order_move(unit, cell),
            Order::Attack { unit, victim } => self.order_attack(unit, victim),
            Order::Enter { unit, host } => self.order_enter(unit, host),
            Order::Mission { unit, mission } => self.assign_mission(unit, mission),
            Order::Override { unit, mission } => self.override_mission(unit, mission),
            Order::Restore { unit } => self.restore_mission(unit).map(|_| ()),
            Order::Destroy { unit } => self.destroy(unit),
            Order::Produce { factory, kind } => self.order_production(factory, kind).map(|_| ()),
        }
    }

    // --- Persistence ------------------------------------------------------

    /// Compute a hash of the current simulation state.
    ///
    /// Used for desync detection. Two simulations with identical state
    /// produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let world = &self.world;

        world.tick.hash(&mut hasher);
        world.rng.seed().hash(&mut hasher);
        world.rng.word_pos().hash(&mut hasher);
        world.terrain.hash(&mut hasher);

        let pools = &world.pools;
        pools.len().hash(&mut hasher);
        for (handle, entity) in pools.vehicles.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        for (handle, entity) in pools.infantry.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        for (handle, entity) in pools.buildings.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        for (handle, entity) in pools.projectiles.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        for (handle, entity) in pools.effects.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        for (handle, entity) in pools.aircraft.iter() {
            handle.hash(&mut hasher);
            entity.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the simulation state for save games and replays.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        tracing::info!(tick = self.world.tick, bytes = bytes.len(), "simulation saved");
        Ok(bytes)
    }

    /// Restore a simulation from [`Simulation::serialize`] output.
    ///
    /// Raw fields are decoded first; then every cross-entity reference is
    /// checked against the restored pools and dropped if it does not
    /// resolve.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be decoded.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut sim: Self = bincode::deserialize(data)?;
        sim.world.resolve_references();
        tracing::info!(tick = sim.world.tick, entities = sim.world.pools.len(), "simulation loaded");
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Object;

    fn sim() -> Simulation {
        Simulation::new(&KernelConfig::with_seed(11))
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = sim();
        sim.tick();
        sim.tick();
        assert_eq!(sim.get_tick(), 2);
    }

    #[test]
    fn test_assign_is_deferred_to_next_update() {
        let mut sim = sim();
        let soldier = sim
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4, 4))
            .unwrap();
        sim.assign_mission(soldier, Mission::Sleep).unwrap();
        let control = *sim.world().pools.infantry.resolve(soldier).unwrap().mission();
        assert_eq!(control.current(), Mission::Guard);
        assert_eq!(control.queued(), Some(Mission::Sleep));

        sim.tick();
        let control = *sim.world().pools.infantry.resolve(soldier).unwrap().mission();
        assert_eq!(control.current(), Mission::Sleep);
        assert_eq!(control.queued(), None);
    }

    #[test]
    fn test_override_and_restore() {
        let mut sim = sim();
        let soldier = sim
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4, 4))
            .unwrap();
        sim.override_mission(soldier, Mission::Sticky).unwrap();
        assert!(sim.restore_mission(soldier).unwrap());
        assert!(!sim.restore_mission(soldier).unwrap());
        let control = sim.world().pools.infantry.resolve(soldier).unwrap().mission();
        assert_eq!(control.current(), Mission::Guard);
    }

    #[test]
    fn test_orders_reject_missing_entities() {
        let mut sim = sim();
        let ghost = Target::new(Rtti::Infantry, 9);
        assert!(matches!(
            sim.assign_mission(ghost, Mission::Guard),
            Err(KernelError::EntityNotFound(_))
        ));
        assert!(sim.destroy(ghost).is_err());
        let tower = sim
            .create_building(BuildingKind::GuardTower, HouseId(1), Cell::new(10, 10))
            .unwrap();
        assert!(matches!(
            sim.order_move(tower, Cell::new(2, 2)),
            Err(KernelError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_transmit_without_contact() {
        let mut sim = sim();
        let soldier = sim
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4, 4))
            .unwrap();
        let result = sim.transmit(soldier, RadioMessage::Tether, &mut 0, Target::NONE);
        assert!(matches!(result, Err(KernelError::NoContact(_))));
    }

    #[test]
    fn test_destroy_removes_entity() {
        let mut sim = sim();
        let tank = sim
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(4, 4))
            .unwrap();
        sim.destroy(tank).unwrap();
        assert!(!sim.world().is_alive(tank));
        assert!(sim.world().pools.is_empty());
        let events = sim.tick();
        assert_eq!(events.destroyed, vec![tank]);
        assert_eq!(events.spawned, vec![tank]);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut a = sim();
        let mut b = sim();
        assert_eq!(a.state_hash(), b.state_hash());
        a.create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4, 4))
            .unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
        b.create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4, 4))
            .unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut sim = sim();
        let tank = sim
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(4, 4))
            .unwrap();
        sim.order_move(tank, Cell::new(12, 9)).unwrap();
        for _ in 0..5 {
            sim.tick();
        }
        let restored = Simulation::deserialize(&sim.serialize().unwrap()).unwrap();
        assert_eq!(restored.get_tick(), sim.get_tick());
        assert_eq!(restored.state_hash(), sim.state_hash());
        assert_eq!(
            restored.world().pools.vehicles.resolve(tank).map(Object::coord),
            sim.world().pools.vehicles.resolve(tank).map(Object::coord)
        );
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(Simulation::deserialize(&[1, 2, 3]).is_err());
    }
}
