//! The simulation context threaded through every entity update.
//!
//! [`World`] owns the pools, terrain, random stream and tick counter.
//! Entities never hold references to each other; they hold [`Target`]s and
//! resolve them through the world when they need to look or act.
//!
//! # Checkout
//!
//! While an entity runs (its own update, or a radio message it receives)
//! it is detached from its pool and handed a `&mut World`. Lookups of a
//! detached entity fail, which is what keeps radio calls from recursing
//! back into the sender.
//!
//! # Destruction
//!
//! [`World::kill`] only records the target. The graveyard is flushed after
//! the current entity update finishes, at which point radio links are
//! broken on both sides, every reference to the dead entity is scrubbed
//! and the slot is released.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::coord::{Cell, Coordinate};
use crate::entity::{
    Aircraft, Building, BuildingKind, CombatObject, Effect, EffectKind, HouseId, Infantry,
    InfantryKind, MapObject, MobileObject, Object, Projectile, RadioObject, Vehicle, VehicleKind,
    Weapon,
};
use crate::error::{KernelError, Result};
use crate::pathfinding::{find_path, PathLimits, PathResult};
use crate::pool::{Handle, Pool, PoolCapacities};
use crate::radio::RadioMessage;
use crate::rng::RandomStream;
use crate::target::{Rtti, Target};
use crate::terrain::{Locomotion, Terrain};

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Entities created, in creation order.
    pub spawned: Vec<Target>,
    /// Entities removed, in removal order.
    pub destroyed: Vec<Target>,
}

/// One pool per entity category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pools {
    /// Ground vehicles.
    pub vehicles: Pool<Vehicle>,
    /// Foot soldiers.
    pub infantry: Pool<Infantry>,
    /// Structures.
    pub buildings: Pool<Building>,
    /// Projectiles in flight.
    pub projectiles: Pool<Projectile>,
    /// Transient effects.
    pub effects: Pool<Effect>,
    /// Flying units.
    pub aircraft: Pool<Aircraft>,
}

impl Pools {
    /// Empty pools sized from the capacity table.
    #[must_use]
    pub fn new(capacities: &PoolCapacities) -> Self {
        Self {
            vehicles: Pool::new(Rtti::Vehicle, capacities.vehicles),
            infantry: Pool::new(Rtti::Infantry, capacities.infantry),
            buildings: Pool::new(Rtti::Building, capacities.buildings),
            projectiles: Pool::new(Rtti::Projectile, capacities.projectiles),
            effects: Pool::new(Rtti::Effect, capacities.effects),
            aircraft: Pool::new(Rtti::Aircraft, capacities.aircraft),
        }
    }

    fn vehicles_mut(&mut self) -> &mut Pool<Vehicle> {
        &mut self.vehicles
    }

    fn infantry_mut(&mut self) -> &mut Pool<Infantry> {
        &mut self.infantry
    }

    fn buildings_mut(&mut self) -> &mut Pool<Building> {
        &mut self.buildings
    }

    fn projectiles_mut(&mut self) -> &mut Pool<Projectile> {
        &mut self.projectiles
    }

    fn effects_mut(&mut self) -> &mut Pool<Effect> {
        &mut self.effects
    }

    fn aircraft_mut(&mut self) -> &mut Pool<Aircraft> {
        &mut self.aircraft
    }

    /// Resolve any pooled target.
    #[must_use]
    pub fn object(&self, target: Target) -> Option<&dyn Object> {
        match target.rtti() {
            Rtti::Vehicle => self.vehicles.resolve(target).map(|e| e as &dyn Object),
            Rtti::Infantry => self.infantry.resolve(target).map(|e| e as &dyn Object),
            Rtti::Building => self.buildings.resolve(target).map(|e| e as &dyn Object),
            Rtti::Projectile => self.projectiles.resolve(target).map(|e| e as &dyn Object),
            Rtti::Effect => self.effects.resolve(target).map(|e| e as &dyn Object),
            Rtti::Aircraft => self.aircraft.resolve(target).map(|e| e as &dyn Object),
            Rtti::None | Rtti::Cell => None,
        }
    }

    fn object_mut(&mut self, target: Target) -> Option<&mut dyn Object> {
        match target.rtti() {
            Rtti::Vehicle => self.vehicles.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::Infantry => self.infantry.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::Building => self.buildings.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::Projectile => self.projectiles.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::Effect => self.effects.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::Aircraft => self.aircraft.resolve_mut(target).map(|e| e as &mut dyn Object),
            Rtti::None | Rtti::Cell => None,
        }
    }

    /// Resolve a combat-capable target.
    #[must_use]
    pub fn techno(&self, target: Target) -> Option<&dyn CombatObject> {
        match target.rtti() {
            Rtti::Vehicle => self.vehicles.resolve(target).map(|e| e as &dyn CombatObject),
            Rtti::Infantry => self.infantry.resolve(target).map(|e| e as &dyn CombatObject),
            Rtti::Building => self.buildings.resolve(target).map(|e| e as &dyn CombatObject),
            Rtti::Aircraft => self.aircraft.resolve(target).map(|e| e as &dyn CombatObject),
            _ => None,
        }
    }

    fn techno_mut(&mut self, target: Target) -> Option<&mut dyn CombatObject> {
        match target.rtti() {
            Rtti::Vehicle => self.vehicles.resolve_mut(target).map(|e| e as &mut dyn CombatObject),
            Rtti::Infantry => self.infantry.resolve_mut(target).map(|e| e as &mut dyn CombatObject),
            Rtti::Building => self.buildings.resolve_mut(target).map(|e| e as &mut dyn CombatObject),
            Rtti::Aircraft => self.aircraft.resolve_mut(target).map(|e| e as &mut dyn CombatObject),
            _ => None,
        }
    }

    /// Handles of every active entity in one category, in slot order.
    #[must_use]
    pub fn active_handles(&self, rtti: Rtti) -> Vec<Handle> {
        match rtti {
            Rtti::Vehicle => self.vehicles.active_handles(),
            Rtti::Infantry => self.infantry.active_handles(),
            Rtti::Building => self.buildings.active_handles(),
            Rtti::Projectile => self.projectiles.active_handles(),
            Rtti::Effect => self.effects.active_handles(),
            Rtti::Aircraft => self.aircraft.active_handles(),
            Rtti::None | Rtti::Cell => Vec::new(),
        }
    }

    /// Targets of every active entity, categories in tick order.
    #[must_use]
    pub fn active_targets(&self) -> Vec<Target> {
        Rtti::POOL_ORDER
            .iter()
            .flat_map(|&rtti| {
                self.active_handles(rtti)
                    .into_iter()
                    .map(move |handle| handle.target(rtti))
            })
            .collect()
    }

    /// Number of active entities across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
            + self.infantry.len()
            + self.buildings.len()
            + self.projectiles.len()
            + self.effects.len()
            + self.aircraft.len()
    }

    /// Whether no entity is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&mut self, target: Target) -> bool {
        let Some(handle) = Handle::from_target(target) else {
            return false;
        };
        match target.rtti() {
            Rtti::Vehicle => self.vehicles.release(handle).is_some(),
            Rtti::Infantry => self.infantry.release(handle).is_some(),
            Rtti::Building => self.buildings.release(handle).is_some(),
            Rtti::Projectile => self.projectiles.release(handle).is_some(),
            Rtti::Effect => self.effects.release(handle).is_some(),
            Rtti::Aircraft => self.aircraft.release(handle).is_some(),
            Rtti::None | Rtti::Cell => false,
        }
    }

    /// Make every entity forget `target`.
    fn detach_everywhere(&mut self, target: Target) {
        for (_, e) in self.vehicles.iter_mut() {
            e.detach_target(target);
        }
        for (_, e) in self.infantry.iter_mut() {
            e.detach_target(target);
        }
        for (_, e) in self.buildings.iter_mut() {
            e.detach_target(target);
        }
        for (_, e) in self.projectiles.iter_mut() {
            e.detach_target(target);
        }
        for (_, e) in self.effects.iter_mut() {
            e.detach_target(target);
        }
        for (_, e) in self.aircraft.iter_mut() {
            e.detach_target(target);
        }
    }
}

/// Explicit simulation context: pools, terrain, randomness and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub(crate) tick: u64,
    /// The single random stream. Consume only from entity updates.
    pub rng: RandomStream,
    /// Land, resource and occupancy.
    pub terrain: Terrain,
    /// Entity storage.
    pub pools: Pools,
    limits: PathLimits,
    graveyard: VecDeque<Target>,
    #[serde(skip)]
    pub(crate) events: TickEvents,
}

impl World {
    /// Empty world on clear terrain.
    #[must_use]
    pub fn new(config: &KernelConfig) -> Self {
        Self::with_terrain(config, Terrain::new())
    }

    /// Empty world on the given terrain.
    #[must_use]
    pub fn with_terrain(config: &KernelConfig, terrain: Terrain) -> Self {
        Self {
            tick: 0,
            rng: RandomStream::new(config.seed),
            terrain,
            pools: Pools::new(&config.capacities),
            limits: config.pathfinding,
            graveyard: VecDeque::new(),
            events: TickEvents::default(),
        }
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Pathfinder limits in force.
    #[must_use]
    pub const fn path_limits(&self) -> &PathLimits {
        &self.limits
    }

    // --- Resolution -------------------------------------------------------

    /// Whether `target` names an entity that exists and is not destroyed.
    #[must_use]
    pub fn is_alive(&self, target: Target) -> bool {
        self.pools.object(target).is_some_and(|e| e.is_active())
    }

    /// Whether `target` can be shot at or approached: alive and on the map.
    #[must_use]
    pub fn is_targetable(&self, target: Target) -> bool {
        self.pools.object(target).is_some_and(|e| e.is_targetable())
    }

    /// Position of an entity, or the center of a cell target.
    #[must_use]
    pub fn coord_of(&self, target: Target) -> Option<Coordinate> {
        if target.is_cell() {
            return Some(target.as_cell().center());
        }
        self.pools.object(target).map(|e| e.coord())
    }

    /// Owner of an entity.
    #[must_use]
    pub fn owner_of(&self, target: Target) -> Option<HouseId> {
        self.pools.object(target).map(|e| e.owner())
    }

    /// Hit points of a combat-capable entity.
    #[must_use]
    pub fn strength_of(&self, target: Target) -> Option<i32> {
        self.pools.techno(target).map(|e| e.map().strength)
    }

    /// Radio contact of a combat-capable entity.
    #[must_use]
    pub fn contact_of(&self, target: Target) -> Option<Target> {
        self.pools.techno(target).map(|e| e.contact())
    }

    /// Structure type of a building target.
    #[must_use]
    pub fn building_kind(&self, target: Target) -> Option<BuildingKind> {
        self.pools.buildings.resolve(target).map(Building::kind)
    }

    /// Docking pad of a building target.
    #[must_use]
    pub fn service_cell(&self, target: Target) -> Option<Cell> {
        self.pools.buildings.resolve(target).and_then(Building::service_cell)
    }

    /// Whether `cell` touches (but is not inside) the footprint of `target`.
    #[must_use]
    pub fn is_adjacent(&self, cell: Cell, target: Target) -> bool {
        let Some(entity) = self.pools.object(target) else {
            return false;
        };
        let footprint = entity.footprint();
        !footprint.contains(&cell)
            && footprint.iter().any(|&c| {
                c.is_valid() && (c.x() - cell.x()).abs() <= 1 && (c.y() - cell.y()).abs() <= 1
            })
    }

    // --- Checkout ---------------------------------------------------------

    fn with_detached<T, R>(
        &mut self,
        pool: fn(&mut Pools) -> &mut Pool<T>,
        target: Target,
        f: impl FnOnce(&mut T, &mut Self) -> R,
    ) -> Option<R> {
        let handle = Handle::from_target(target)?;
        let slots = pool(&mut self.pools);
        if slots.rtti() != target.rtti() {
            return None;
        }
        let mut entity = slots.detach(handle)?;
        let result = f(&mut entity, self);
        pool(&mut self.pools).reattach(handle, entity);
        Some(result)
    }

    /// Check out any pooled entity and run `f` on it.
    pub fn with_object<R>(
        &mut self,
        target: Target,
        f: impl FnOnce(&mut dyn Object, &mut Self) -> R,
    ) -> Option<R> {
        match target.rtti() {
            Rtti::Vehicle => self.with_detached(Pools::vehicles_mut, target, |e, w| f(e, w)),
            Rtti::Infantry => self.with_detached(Pools::infantry_mut, target, |e, w| f(e, w)),
            Rtti::Building => self.with_detached(Pools::buildings_mut, target, |e, w| f(e, w)),
            Rtti::Projectile => self.with_detached(Pools::projectiles_mut, target, |e, w| f(e, w)),
            Rtti::Effect => self.with_detached(Pools::effects_mut, target, |e, w| f(e, w)),
            Rtti::Aircraft => self.with_detached(Pools::aircraft_mut, target, |e, w| f(e, w)),
            Rtti::None | Rtti::Cell => None,
        }
    }

    /// Check out a combat-capable entity and run `f` on it. `None` when the
    /// target does not resolve (destroyed, stale, or already checked out).
    pub fn with_techno<R>(
        &mut self,
        target: Target,
        f: impl FnOnce(&mut dyn CombatObject, &mut Self) -> R,
    ) -> Option<R> {
        match target.rtti() {
            Rtti::Vehicle => self.with_detached(Pools::vehicles_mut, target, |e, w| f(e, w)),
            Rtti::Infantry => self.with_detached(Pools::infantry_mut, target, |e, w| f(e, w)),
            Rtti::Building => self.with_detached(Pools::buildings_mut, target, |e, w| f(e, w)),
            Rtti::Aircraft => self.with_detached(Pools::aircraft_mut, target, |e, w| f(e, w)),
            _ => None,
        }
    }

    /// Check out a mobile entity and run `f` on it.
    pub fn with_mobile<R>(
        &mut self,
        target: Target,
        f: impl FnOnce(&mut dyn MobileObject, &mut Self) -> R,
    ) -> Option<R> {
        match target.rtti() {
            Rtti::Vehicle => self.with_detached(Pools::vehicles_mut, target, |e, w| f(e, w)),
            Rtti::Infantry => self.with_detached(Pools::infantry_mut, target, |e, w| f(e, w)),
            Rtti::Aircraft => self.with_detached(Pools::aircraft_mut, target, |e, w| f(e, w)),
            _ => None,
        }
    }

    /// Check out a building and run `f` on it.
    pub fn with_building<R>(
        &mut self,
        target: Target,
        f: impl FnOnce(&mut Building, &mut Self) -> R,
    ) -> Option<R> {
        self.with_detached(Pools::buildings_mut, target, f)
    }

    // --- Queries ----------------------------------------------------------

    /// Path for `mover` under this world's limits.
    #[must_use]
    pub fn request_path(&self, start: Cell, goal: Cell, locomotion: Locomotion, mover: Target) -> PathResult {
        let result = find_path(&self.terrain, start, goal, locomotion, mover, &self.limits);
        tracing::debug!(
            entity = %mover,
            %start,
            %goal,
            status = ?result.status,
            len = result.cells.len(),
            iterations = result.iterations,
            "path request"
        );
        result
    }

    /// Closest targetable enemy of `owner`, optionally within `range`.
    ///
    /// Scans combat categories in tick order and slot order; the first of
    /// equally distant candidates wins.
    #[must_use]
    pub fn nearest_enemy(&self, from: Coordinate, owner: HouseId, range: Option<i32>) -> Target {
        let mut best = Target::NONE;
        let mut best_distance = range.map_or(i32::MAX, |r| r.saturating_add(1));
        let mut consider = |entity: &dyn CombatObject| {
            if !entity.is_targetable() || !owner.is_enemy(entity.owner()) {
                return;
            }
            let distance = from.distance(entity.coord());
            if distance < best_distance {
                best_distance = distance;
                best = entity.as_target();
            }
        };
        for rtti in Rtti::POOL_ORDER {
            match rtti {
                Rtti::Vehicle => self.pools.vehicles.iter().for_each(|(_, e)| consider(e)),
                Rtti::Infantry => self.pools.infantry.iter().for_each(|(_, e)| consider(e)),
                Rtti::Building => self.pools.buildings.iter().for_each(|(_, e)| consider(e)),
                Rtti::Aircraft => self.pools.aircraft.iter().for_each(|(_, e)| consider(e)),
                _ => {}
            }
        }
        best
    }

    /// Closest targetable building of `kind` owned by `owner`.
    #[must_use]
    pub fn nearest_building(&self, from: Coordinate, owner: HouseId, kind: BuildingKind) -> Target {
        let mut best = Target::NONE;
        let mut best_distance = i32::MAX;
        for (_, building) in self.pools.buildings.iter() {
            if building.kind() != kind || building.owner() != owner || !building.is_targetable() {
                continue;
            }
            let distance = from.distance(building.coord());
            if distance < best_distance {
                best_distance = distance;
                best = building.as_target();
            }
        }
        best
    }

    // --- Creation ---------------------------------------------------------

    fn check_placement(&self, cells: &[Cell], fits: impl Fn(Cell) -> bool) -> Result<()> {
        for &cell in cells {
            if !cell.is_valid() || !fits(cell) {
                return Err(KernelError::InvalidCell {
                    x: cell.x(),
                    y: cell.y(),
                });
            }
        }
        Ok(())
    }

    fn place(&mut self, target: Target, cells: &[Cell]) {
        for &cell in cells {
            self.terrain.occupy(cell, target);
        }
        self.events.spawned.push(target);
        tracing::debug!(entity = %target, tick = self.tick, "spawned");
    }

    /// Create a soldier on a free cell.
    ///
    /// # Panics
    ///
    /// Panics if the infantry pool is exhausted.
    pub fn create_infantry(&mut self, kind: InfantryKind, owner: HouseId, cell: Cell) -> Result<Target> {
        self.check_placement(&[cell], |c| self.terrain.is_passable(c, Locomotion::Foot, Target::NONE))?;
        let handle = self
            .pools
            .infantry
            .allocate(|handle| Infantry::new(kind, handle, owner, cell.center()));
        let target = handle.target(Rtti::Infantry);
        self.place(target, &[cell]);
        Ok(target)
    }

    /// Create a vehicle on a free cell.
    ///
    /// # Panics
    ///
    /// Panics if the vehicle pool is exhausted.
    pub fn create_vehicle(&mut self, kind: VehicleKind, owner: HouseId, cell: Cell) -> Result<Target> {
        let locomotion = kind.locomotion();
        self.check_placement(&[cell], |c| self.terrain.is_passable(c, locomotion, Target::NONE))?;
        let handle = self
            .pools
            .vehicles
            .allocate(|handle| Vehicle::new(kind, handle, owner, cell.center()));
        let target = handle.target(Rtti::Vehicle);
        self.place(target, &[cell]);
        Ok(target)
    }

    /// Create a structure with its top-left corner at `cell`.
    ///
    /// # Panics
    ///
    /// Panics if the building pool is exhausted.
    pub fn create_building(&mut self, kind: BuildingKind, owner: HouseId, cell: Cell) -> Result<Target> {
        let footprint = kind.footprint(cell);
        self.check_placement(&footprint, |c| {
            self.terrain.land(c).is_buildable() && self.terrain.is_passable(c, Locomotion::Track, Target::NONE)
        })?;
        let handle = self
            .pools
            .buildings
            .allocate(|handle| Building::new(kind, handle, owner, cell.center()));
        let target = handle.target(Rtti::Building);
        self.place(target, &footprint);
        Ok(target)
    }

    /// Create an aircraft over any cell.
    ///
    /// # Panics
    ///
    /// Panics if the aircraft pool is exhausted.
    pub fn create_aircraft(&mut self, owner: HouseId, cell: Cell) -> Result<Target> {
        self.check_placement(&[cell], |_| true)?;
        let handle = self
            .pools
            .aircraft
            .allocate(|handle| Aircraft::new(handle, owner, cell.center()));
        let target = handle.target(Rtti::Aircraft);
        self.place(target, &[]);
        Ok(target)
    }

    /// Launch a projectile.
    ///
    /// # Panics
    ///
    /// Panics with "pool exhausted" when the projectile pool is full.
    pub fn spawn_projectile(
        &mut self,
        source: Target,
        victim: Target,
        from: Coordinate,
        destination: Coordinate,
        weapon: Weapon,
    ) -> Target {
        let owner = self.owner_of(source).unwrap_or_default();
        let handle = self.pools.projectiles.allocate(|handle| {
            Projectile::new(
                handle,
                owner,
                from,
                destination,
                source,
                victim,
                weapon.projectile_speed,
                weapon.damage,
            )
        });
        let target = handle.target(Rtti::Projectile);
        self.events.spawned.push(target);
        tracing::trace!(%source, projectile = %target, "shot fired");
        target
    }

    /// Start an effect.
    ///
    /// # Panics
    ///
    /// Panics with "pool exhausted" when the effect pool is full.
    pub fn spawn_effect(&mut self, kind: EffectKind, at: Coordinate) -> Target {
        let handle = self.pools.effects.allocate(|handle| Effect::new(kind, handle, at));
        let target = handle.target(Rtti::Effect);
        self.events.spawned.push(target);
        target
    }

    /// Resolve one shot of `weapon` from `source` at `victim`.
    ///
    /// Weapons with a projectile speed launch a projectile aimed at the
    /// victim plus random scatter; instant weapons apply damage now.
    pub fn fire(&mut self, source: Target, from: Coordinate, weapon: Weapon, victim: Target) {
        let Some(at) = self.coord_of(victim) else {
            return;
        };
        if weapon.projectile_speed > 0 {
            let spread = weapon.inaccuracy;
            let aim = if spread > 0 {
                let dx = self.rng.between(-spread, spread);
                let dy = self.rng.between(-spread, spread);
                at.offset(dx, dy)
            } else {
                at
            };
            self.spawn_projectile(source, victim, from, aim, weapon);
        } else {
            self.with_techno(victim, |target, world| {
                target.take_damage(world, weapon.damage, source);
            });
            self.spawn_effect(EffectKind::MuzzleFlash, from);
        }
    }

    // --- Destruction ------------------------------------------------------

    /// Schedule `target` for removal after the current entity update.
    /// The caller is responsible for clearing the entity's active flag.
    pub fn kill(&mut self, target: Target) {
        if target.is_entity() && !self.graveyard.contains(&target) {
            self.graveyard.push_back(target);
        }
    }

    /// Deactivate and schedule removal of any entity. Returns `false` when
    /// the target does not resolve.
    pub fn destroy(&mut self, target: Target) -> bool {
        let done = self.with_object(target, |entity, world| {
            if entity.is_active() {
                entity.object_mut().active = false;
                world.kill(target);
            }
        });
        done.is_some()
    }

    /// Remove everything in the graveyard, including anything that dies as
    /// a consequence (passengers of a destroyed transport).
    pub(crate) fn flush_graveyard(&mut self) {
        while let Some(dead) = self.graveyard.pop_front() {
            self.remove_entity(dead);
        }
    }

    fn remove_entity(&mut self, dead: Target) {
        let Some(entity) = self.pools.object(dead) else {
            return;
        };
        debug_assert!(!entity.is_active(), "removing live entity {dead}");

        let (cargo, contact) = self
            .pools
            .techno(dead)
            .map_or((Vec::new(), Target::NONE), |e| (e.cargo(), e.contact()));

        for passenger in cargo {
            self.destroy(passenger);
        }

        if contact.is_valid() && self.contact_of(contact) == Some(dead) {
            self.with_techno(contact, |partner, world| {
                partner.receive(world, dead, RadioMessage::OverOut, &mut 0)
            });
        }

        self.pools.detach_everywhere(dead);
        self.terrain.scrub(dead);
        self.pools.release(dead);
        self.events.destroyed.push(dead);
        tracing::debug!(entity = %dead, tick = self.tick, "removed");
    }

    // --- Driver hooks -----------------------------------------------------

    /// Run one entity's update, then flush the graveyard.
    pub(crate) fn update_entity(&mut self, target: Target) {
        let run = |entity: &mut dyn Object, world: &mut Self| {
            if entity.is_active() && !entity.object().in_limbo {
                entity.ai(world);
            }
        };
        match target.rtti() {
            Rtti::Vehicle => self.with_detached(Pools::vehicles_mut, target, |e, w| run(e, w)),
            Rtti::Infantry => self.with_detached(Pools::infantry_mut, target, |e, w| run(e, w)),
            Rtti::Building => self.with_detached(Pools::buildings_mut, target, |e, w| run(e, w)),
            Rtti::Projectile => self.with_detached(Pools::projectiles_mut, target, |e, w| run(e, w)),
            Rtti::Effect => self.with_detached(Pools::effects_mut, target, |e, w| run(e, w)),
            Rtti::Aircraft => self.with_detached(Pools::aircraft_mut, target, |e, w| run(e, w)),
            Rtti::None | Rtti::Cell => None,
        };
        self.flush_graveyard();
    }

    /// Second phase of a load: drop every cross-entity reference that does
    /// not resolve, break one-sided radio links and clear stale occupancy.
    pub(crate) fn resolve_references(&mut self) {
        let targets = self.pools.active_targets();

        let mut stale = Vec::new();
        for &owner in &targets {
            if let Some(entity) = self.pools.object(owner) {
                for reference in entity.references() {
                    if reference.is_entity() && self.pools.object(reference).is_none() {
                        stale.push((owner, reference));
                    }
                }
            }
        }
        for (owner, reference) in stale {
            tracing::warn!(entity = %owner, %reference, "dropping unresolved reference");
            if let Some(entity) = self.pools.object_mut(owner) {
                entity.detach_target(reference);
            }
        }

        let one_sided: Vec<Target> = targets
            .iter()
            .copied()
            .filter(|&t| {
                let contact = self.contact_of(t).unwrap_or(Target::NONE);
                contact.is_valid() && self.contact_of(contact) != Some(t)
            })
            .collect();
        for target in one_sided {
            tracing::warn!(entity = %target, "breaking one-sided radio link");
            if let Some(entity) = self.pools.techno_mut(target) {
                let radio = entity.radio_mut();
                radio.contact = Target::NONE;
                radio.tethered = false;
            }
        }

        let pools = &self.pools;
        self.terrain.retain_holders(|holder| pools.object(holder).is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::LandType;

    fn world() -> World {
        World::new(&KernelConfig::default())
    }

    #[test]
    fn test_create_occupies_cell() {
        let mut world = world();
        let cell = Cell::new(3, 3);
        let soldier = world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), cell)
            .unwrap();
        assert_eq!(soldier.rtti(), Rtti::Infantry);
        assert_eq!(soldier.index(), 0);
        assert_eq!(world.terrain.occupier(cell), soldier);
        assert!(world.create_vehicle(VehicleKind::Tank, HouseId(1), cell).is_err());
        assert_eq!(world.events.spawned, vec![soldier]);
    }

    #[test]
    fn test_create_rejects_bad_ground() {
        let mut world = world();
        world.terrain.set_land(Cell::new(5, 5), LandType::Water);
        assert!(matches!(
            world.create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(5, 5)),
            Err(KernelError::InvalidCell { x: 5, y: 5 })
        ));
        assert!(world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::INVALID)
            .is_err());
        assert!(world
            .create_building(BuildingKind::Refinery, HouseId(1), Cell::new(4, 4))
            .is_err());
    }

    #[test]
    fn test_building_covers_footprint() {
        let mut world = world();
        let refinery = world
            .create_building(BuildingKind::Refinery, HouseId(1), Cell::new(10, 10))
            .unwrap();
        for cell in BuildingKind::Refinery.footprint(Cell::new(10, 10)) {
            assert_eq!(world.terrain.occupier(cell), refinery);
        }
        assert_eq!(world.building_kind(refinery), Some(BuildingKind::Refinery));
        assert_eq!(world.service_cell(refinery), Some(Cell::new(10, 12)));
        assert!(world.is_adjacent(Cell::new(12, 11), refinery));
        assert!(!world.is_adjacent(Cell::new(11, 11), refinery));
        assert!(!world.is_adjacent(Cell::new(13, 11), refinery));
    }

    #[test]
    fn test_nearest_enemy_ignores_friends_and_range() {
        let mut world = world();
        let me = HouseId(1);
        let origin = Cell::new(20, 20).center();
        world.create_infantry(InfantryKind::Rifleman, me, Cell::new(21, 20)).unwrap();
        let far = world
            .create_infantry(InfantryKind::Rifleman, HouseId(2), Cell::new(30, 20))
            .unwrap();
        let near = world
            .create_vehicle(VehicleKind::Jeep, HouseId(2), Cell::new(24, 20))
            .unwrap();
        assert_eq!(world.nearest_enemy(origin, me, None), near);
        assert_eq!(world.nearest_enemy(origin, me, Some(2 * 256)), Target::NONE);
        assert!(world.destroy(near));
        world.flush_graveyard();
        assert_eq!(world.nearest_enemy(origin, me, None), far);
    }

    #[test]
    fn test_nearest_enemy_tie_keeps_first_in_pool_order() {
        let mut world = world();
        let origin = Cell::new(20, 20).center();
        let vehicle = world
            .create_vehicle(VehicleKind::Jeep, HouseId(2), Cell::new(22, 20))
            .unwrap();
        world
            .create_infantry(InfantryKind::Rifleman, HouseId(2), Cell::new(18, 20))
            .unwrap();
        assert_eq!(world.nearest_enemy(origin, HouseId(1), None), vehicle);
    }

    #[test]
    fn test_destroy_releases_slot_and_scrubs() {
        let mut world = world();
        let cell = Cell::new(8, 8);
        let victim = world
            .create_infantry(InfantryKind::Rifleman, HouseId(2), cell)
            .unwrap();
        let hunter = world
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(9, 8))
            .unwrap();
        world.with_techno(hunter, |tank, _| tank.assign_target(victim));

        assert!(world.destroy(victim));
        assert!(world.is_targetable(hunter));
        assert!(!world.is_alive(victim));
        world.flush_graveyard();

        assert!(world.pools.object(victim).is_none());
        assert_eq!(world.terrain.occupier(cell), Target::NONE);
        assert_eq!(world.pools.techno(hunter).unwrap().combat().tarcom, Target::NONE);
        assert_eq!(world.events.destroyed, vec![victim]);
    }

    #[test]
    fn test_graveyard_flushes_in_kill_order() {
        let mut world = world();
        let units: Vec<Target> = (0..4)
            .map(|i| {
                world
                    .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(4 + i * 2, 4))
                    .unwrap()
            })
            .collect();
        for &unit in units.iter().rev() {
            assert!(world.destroy(unit));
        }
        // A second kill of the same target is not queued twice.
        world.kill(units[0]);
        world.flush_graveyard();

        let expected: Vec<Target> = units.iter().rev().copied().collect();
        assert_eq!(world.events.destroyed, expected);
        assert!(world.pools.is_empty());
    }

    #[test]
    fn test_stale_target_does_not_resolve_after_reuse() {
        let mut world = world();
        let first = world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(1, 1))
            .unwrap();
        world.destroy(first);
        world.flush_graveyard();
        let second = world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(2, 2))
            .unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(world.pools.object(first).is_none());
        assert!(world.with_techno(first, |_, _| ()).is_none());
        assert_eq!(world.coord_of(second), Some(Cell::new(2, 2).center()));
    }

    #[test]
    fn test_instant_fire_damages() {
        let mut world = world();
        let shooter = world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(5, 5))
            .unwrap();
        let victim = world
            .create_infantry(InfantryKind::Rifleman, HouseId(2), Cell::new(6, 5))
            .unwrap();
        world.fire(shooter, Cell::new(5, 5).center(), Weapon::RIFLE, victim);
        assert_eq!(
            world.strength_of(victim),
            Some(InfantryKind::Rifleman.strength() - Weapon::RIFLE.damage)
        );
        assert_eq!(world.pools.effects.len(), 1);
        assert_eq!(
            world.pools.techno(victim).unwrap().map().last_attacker,
            shooter
        );
    }

    #[test]
    fn test_projectile_fire_spawns_projectile() {
        let mut world = world();
        let shooter = world
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(5, 5))
            .unwrap();
        let victim = world
            .create_vehicle(VehicleKind::Tank, HouseId(2), Cell::new(8, 5))
            .unwrap();
        world.fire(shooter, Cell::new(5, 5).center(), Weapon::CANNON, victim);
        assert_eq!(world.pools.projectiles.len(), 1);
        assert_eq!(world.strength_of(victim), Some(VehicleKind::Tank.strength()));
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn test_full_projectile_pool_is_fatal() {
        let config = KernelConfig {
            capacities: PoolCapacities {
                projectiles: 1,
                ..PoolCapacities::default()
            },
            ..KernelConfig::default()
        };
        let mut world = World::new(&config);
        let shooter = world
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(5, 5))
            .unwrap();
        let victim = world
            .create_vehicle(VehicleKind::Tank, HouseId(2), Cell::new(8, 5))
            .unwrap();
        let from = Cell::new(5, 5).center();
        world.fire(shooter, from, Weapon::CANNON, victim);
        assert_eq!(world.pools.projectiles.len(), 1);
        world.fire(shooter, from, Weapon::CANNON, victim);
    }

    #[test]
    fn test_checked_out_entity_is_invisible() {
        let mut world = world();
        let soldier = world
            .create_infantry(InfantryKind::Rifleman, HouseId(1), Cell::new(5, 5))
            .unwrap();
        let seen = world.with_techno(soldier, |_, world| world.is_alive(soldier));
        assert_eq!(seen, Some(false));
        assert!(world.is_alive(soldier));
    }
}
