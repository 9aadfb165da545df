//! The layered entity model.
//!
//! Each layer is a trait that adds state and per-tick behaviour on top of
//! the one below it:
//!
//! | Layer | Trait | Data | Per-tick step |
//! |-------|-------|------|---------------|
//! | object | [`Object`] | [`ObjectData`] | `object_ai` |
//! | map presence | [`MapObject`] | [`MapData`] | `map_ai` |
//! | mission | [`MissionObject`] | [`MissionControl`] | `mission_ai` |
//! | radio | [`RadioObject`] | [`RadioData`] | `radio_ai` |
//! | combat | [`CombatObject`] | [`CombatData`] | `techno_ai` |
//! | mobile | [`MobileObject`] | [`FootData`] | `foot_ai` |
//!
//! Every layer's step runs the layer beneath it first, so a concrete
//! entity's [`Object::ai`] only has to call its topmost step. Concrete
//! kinds override mission handlers and radio reception; layers never
//! need to know what sits above them.

pub mod aircraft;
pub mod building;
pub mod effect;
pub mod foot;
pub mod infantry;
pub mod projectile;
pub mod techno;
pub mod vehicle;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::radio::{RadioData, RadioObject};
use crate::coord::{Cell, Coordinate, Dir256};
use crate::mission::{Mission, MissionControl, IDLE_DELAY};
use crate::pool::Handle;
use crate::target::{Rtti, Target};
use crate::world::World;
pub use aircraft::Aircraft;
pub use building::{Building, BuildingData, BuildingKind};
pub use effect::{Effect, EffectKind};
pub use foot::{FootData, MobileObject};
pub use infantry::{Infantry, InfantryKind};
pub use projectile::Projectile;
pub use techno::{CombatData, CombatObject, Weapon};
pub use vehicle::{Vehicle, VehicleData, VehicleKind};

/// Owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(pub u8);

impl HouseId {
    /// Whether `other` is hostile to this house.
    #[must_use]
    pub const fn is_enemy(self, other: Self) -> bool {
        self.0 != other.0
    }
}

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "House{}", self.0)
    }
}

/// State shared by everything that lives in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectData {
    /// Category, fixed at creation.
    pub rtti: Rtti,
    /// Slot this entity occupies.
    pub handle: Handle,
    /// Owning side.
    pub owner: HouseId,
    /// Position.
    pub coord: Coordinate,
    /// Heading.
    pub facing: Dir256,
    /// Cleared when the entity is destroyed; it stays pooled until the
    /// end of the current entity update.
    pub active: bool,
    /// Off the map (inside a transport, not yet placed).
    pub in_limbo: bool,
    /// Ticks this entity has been updated.
    pub age: u32,
}

impl ObjectData {
    /// Fresh state for a newly allocated slot.
    #[must_use]
    pub const fn new(rtti: Rtti, handle: Handle, owner: HouseId, coord: Coordinate) -> Self {
        Self {
            rtti,
            handle,
            owner,
            coord,
            facing: Dir256::NORTH,
            active: true,
            in_limbo: false,
            age: 0,
        }
    }
}

/// Damage resistance class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Armor {
    /// Unarmored.
    #[default]
    None,
    /// Light vehicle plating.
    Light,
    /// Tank armor.
    Heavy,
    /// Structures.
    Concrete,
}

impl Armor {
    /// Damage left after armor, at least 1 for any positive hit.
    #[must_use]
    pub const fn absorb(self, damage: i32) -> i32 {
        let percent = match self {
            Self::None => 100,
            Self::Light => 75,
            Self::Heavy => 50,
            Self::Concrete => 40,
        };
        if damage <= 0 {
            return 0;
        }
        let dealt = damage * percent / 100;
        if dealt < 1 {
            1
        } else {
            dealt
        }
    }
}

/// State for entities that exist on the map and can be hurt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapData {
    /// Current hit points.
    pub strength: i32,
    /// Full hit points.
    pub max_strength: i32,
    /// Damage resistance.
    pub armor: Armor,
    /// Last entity that hurt this one.
    pub last_attacker: Target,
}

impl MapData {
    /// Full-health state.
    #[must_use]
    pub const fn new(strength: i32, armor: Armor) -> Self {
        Self {
            strength,
            max_strength: strength,
            armor,
            last_attacker: Target::NONE,
        }
    }
}

/// Outcome of [`MapObject::take_damage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageResult {
    /// Nothing happened (already dead, zero damage).
    Unaffected,
    /// Hit points were lost.
    Damaged,
    /// The hit was fatal.
    Destroyed,
}

/// Base layer: identity, position and the per-tick entry point.
pub trait Object {
    /// Shared object state.
    fn object(&self) -> &ObjectData;
    /// Shared object state, mutably.
    fn object_mut(&mut self) -> &mut ObjectData;

    /// Per-tick entry point. Implementors run their topmost layer step.
    fn ai(&mut self, world: &mut World);

    /// Base per-tick step.
    fn object_ai(&mut self, _world: &mut World) {
        let data = self.object_mut();
        data.age = data.age.saturating_add(1);
    }

    /// Target addressing this entity, or [`Target::NONE`] once destroyed.
    fn as_target(&self) -> Target {
        let data = self.object();
        if data.active {
            data.handle.target(data.rtti)
        } else {
            Target::NONE
        }
    }

    /// Category.
    fn rtti(&self) -> Rtti {
        self.object().rtti
    }

    /// Position.
    fn coord(&self) -> Coordinate {
        self.object().coord
    }

    /// Cell containing the position.
    fn cell(&self) -> Cell {
        self.object().coord.to_cell()
    }

    /// Owning side.
    fn owner(&self) -> HouseId {
        self.object().owner
    }

    /// Not yet destroyed.
    fn is_active(&self) -> bool {
        self.object().active
    }

    /// On the map and not destroyed.
    fn is_targetable(&self) -> bool {
        let data = self.object();
        data.active && !data.in_limbo
    }

    /// Whether this entity registers itself as a cell occupier.
    fn occupies_cells(&self) -> bool {
        false
    }

    /// Cells this entity covers when placed.
    fn footprint(&self) -> Vec<Cell> {
        vec![self.cell()]
    }

    /// Take this entity off the map. Returns `false` if already off it.
    fn limbo(&mut self, world: &mut World) -> bool {
        if self.object().in_limbo {
            return false;
        }
        if self.occupies_cells() {
            let me = self.object().handle.target(self.rtti());
            for cell in self.footprint() {
                world.terrain.vacate(cell, me);
                world.terrain.unreserve(cell, me);
            }
        }
        self.object_mut().in_limbo = true;
        true
    }

    /// Put this entity back on the map at `coord`. Fails (and stays in
    /// limbo) if any covered cell is taken.
    fn unlimbo(&mut self, world: &mut World, coord: Coordinate) -> bool {
        if !self.object().in_limbo {
            return false;
        }
        let previous = self.object().coord;
        self.object_mut().coord = coord;
        if self.occupies_cells() {
            let me = self.object().handle.target(self.rtti());
            let cells = self.footprint();
            let free = cells.iter().all(|&cell| {
                let occupier = world.terrain.occupier(cell);
                cell.is_valid() && (!occupier.is_valid() || occupier == me)
            });
            if !free {
                self.object_mut().coord = previous;
                return false;
            }
            for cell in cells {
                world.terrain.occupy(cell, me);
            }
        }
        self.object_mut().in_limbo = false;
        true
    }

    /// Forget every reference this entity holds to `target`.
    fn detach_target(&mut self, _target: Target) {}

    /// Every entity target this entity refers to.
    fn references(&self) -> Vec<Target> {
        Vec::new()
    }
}

/// Map presence: hit points and damage.
pub trait MapObject: Object {
    /// Map-layer state.
    fn map(&self) -> &MapData;
    /// Map-layer state, mutably.
    fn map_mut(&mut self) -> &mut MapData;

    /// Map-layer per-tick step.
    fn map_ai(&mut self, world: &mut World) {
        self.object_ai(world);
        if self.is_active() && self.map().strength <= 0 {
            let me = self.as_target();
            self.object_mut().active = false;
            world.kill(me);
        }
    }

    /// Apply a hit. A fatal hit deactivates the entity and queues it for
    /// removal after the current entity update.
    fn take_damage(&mut self, world: &mut World, damage: i32, source: Target) -> DamageResult {
        if !self.is_active() || damage <= 0 {
            return DamageResult::Unaffected;
        }
        let me = self.as_target();
        let map = self.map_mut();
        let dealt = map.armor.absorb(damage);
        map.strength = (map.strength - dealt).max(0);
        if source.is_entity() {
            map.last_attacker = source;
        }
        let left = map.strength;
        tracing::trace!(entity = %me, %source, dealt, left, "damage");

        if left == 0 {
            self.object_mut().active = false;
            world.kill(me);
            tracing::debug!(entity = %me, %source, "destroyed");
            DamageResult::Destroyed
        } else {
            DamageResult::Damaged
        }
    }

    /// Restore up to `amount` hit points. Returns `false` when already full.
    fn heal(&mut self, amount: i32) -> bool {
        let map = self.map_mut();
        if map.strength >= map.max_strength {
            return false;
        }
        map.strength = (map.strength + amount.max(0)).min(map.max_strength);
        true
    }

    /// Below full hit points.
    fn is_damaged(&self) -> bool {
        self.map().strength < self.map().max_strength
    }
}

/// Mission layer: one current behaviour, polled on its own schedule.
pub trait MissionObject: MapObject {
    /// Mission state.
    fn mission(&self) -> &MissionControl;
    /// Mission state, mutably.
    fn mission_mut(&mut self) -> &mut MissionControl;

    /// Mission-layer per-tick step: commence any queued mission, then run
    /// the current handler if its delay has elapsed.
    fn mission_ai(&mut self, world: &mut World) {
        self.map_ai(world);
        if !self.is_active() {
            return;
        }
        if let Some(next) = self.mission_mut().take_queued() {
            self.assign_mission(next);
        }
        if self.mission_mut().tick() {
            let delay = self.dispatch_mission(world);
            self.mission_mut().set_delay(delay);
        }
    }

    /// Make `mission` current immediately.
    fn assign_mission(&mut self, mission: Mission) {
        let from = self.mission().current();
        tracing::debug!(entity = %self.as_target(), %from, to = %mission, "mission assigned");
        self.mission_mut().assign(mission);
    }

    /// Suspend the current mission in favour of `mission`.
    fn override_mission(&mut self, mission: Mission) {
        tracing::debug!(entity = %self.as_target(), to = %mission, "mission override");
        self.mission_mut().override_mission(mission);
    }

    /// Return to the suspended mission. `false` if there was none.
    fn restore_mission(&mut self) -> bool {
        self.mission_mut().restore()
    }

    /// What to do when a mission has nothing left to do.
    fn enter_idle_mode(&mut self, _world: &mut World) {
        self.assign_mission(Mission::Guard);
    }

    /// Run the handler for the current mission; returns the re-poll delay.
    fn dispatch_mission(&mut self, world: &mut World) -> u32 {
        match self.mission().current() {
            Mission::Sleep => self.mission_sleep(world),
            Mission::Attack => self.mission_attack(world),
            Mission::Move => self.mission_move(world),
            Mission::Retreat => self.mission_retreat(world),
            Mission::Guard => self.mission_guard(world),
            Mission::Sticky => self.mission_sticky(world),
            Mission::Enter => self.mission_enter(world),
            Mission::Capture => self.mission_capture(world),
            Mission::Harvest => self.mission_harvest(world),
            Mission::GuardArea => self.mission_guard_area(world),
            Mission::Return => self.mission_return(world),
            Mission::Stop => self.mission_stop(world),
            Mission::Ambush => self.mission_ambush(world),
            Mission::Hunt => self.mission_hunt(world),
            Mission::TimedHunt => self.mission_timed_hunt(world),
            Mission::Unload => self.mission_unload(world),
            Mission::Sabotage => self.mission_sabotage(world),
            Mission::Construction => self.mission_construction(world),
            Mission::Deconstruction => self.mission_deconstruction(world),
            Mission::Repair => self.mission_repair(world),
            Mission::Rescue => self.mission_rescue(world),
            Mission::Missile => self.mission_missile(world),
        }
    }

    /// Sleep handler.
    fn mission_sleep(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Attack handler.
    fn mission_attack(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Move handler.
    fn mission_move(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Retreat handler.
    fn mission_retreat(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Guard handler.
    fn mission_guard(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Sticky handler.
    fn mission_sticky(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Enter handler.
    fn mission_enter(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Capture handler.
    fn mission_capture(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Harvest handler.
    fn mission_harvest(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Area guard handler.
    fn mission_guard_area(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Return handler.
    fn mission_return(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Stop handler.
    fn mission_stop(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Ambush handler.
    fn mission_ambush(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Hunt handler.
    fn mission_hunt(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Timed hunt handler.
    fn mission_timed_hunt(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Unload handler.
    fn mission_unload(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Sabotage handler.
    fn mission_sabotage(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Construction handler.
    fn mission_construction(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Deconstruction handler.
    fn mission_deconstruction(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Repair handler.
    fn mission_repair(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Rescue handler.
    fn mission_rescue(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
    /// Missile handler.
    fn mission_missile(&mut self, _world: &mut World) -> u32 {
        IDLE_DELAY
    }
}

/// Drop every reference equal to `target` from a list of fields.
pub(crate) fn clear_refs(target: Target, fields: &mut [&mut Target]) {
    for field in fields {
        if **field == target {
            **field = Target::NONE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_armor_absorb() {
        assert_eq!(Armor::None.absorb(40), 40);
        assert_eq!(Armor::Heavy.absorb(40), 20);
        assert_eq!(Armor::Concrete.absorb(1), 1);
        assert_eq!(Armor::Light.absorb(0), 0);
    }

    #[test]
    fn test_house_enmity() {
        assert!(HouseId(1).is_enemy(HouseId(2)));
        assert!(!HouseId(1).is_enemy(HouseId(1)));
    }

    #[test]
    fn test_clear_refs() {
        let dead = Target::new(Rtti::Vehicle, 3);
        let alive = Target::new(Rtti::Vehicle, 4);
        let (mut a, mut b) = (dead, alive);
        clear_refs(dead, &mut [&mut a, &mut b]);
        assert_eq!(a, Target::NONE);
        assert_eq!(b, alive);
    }
}
