//! Combat layer: weapons, targeting and firing.

use serde::{Deserialize, Serialize};

use crate::coord::CELL_LEPTON_W;
use crate::entity::{clear_refs, RadioObject};
use crate::mission::{IDLE_DELAY, IMMEDIATE_DELAY, SCAN_DELAY};
use crate::target::Target;
use crate::world::World;

/// A unit's gun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    /// Hit points removed per shot before armor.
    pub damage: i32,
    /// Reach in leptons (game distance).
    pub range: i32,
    /// Ticks between shots.
    pub rate_of_fire: u32,
    /// Leptons per tick of the fired projectile; 0 hits instantly.
    pub projectile_speed: i32,
    /// Largest random offset of the aim point, in leptons.
    pub inaccuracy: i32,
}

impl Weapon {
    /// Instant-hit small arms.
    pub const RIFLE: Self = Self {
        damage: 15,
        range: 2 * CELL_LEPTON_W,
        rate_of_fire: 20,
        projectile_speed: 0,
        inaccuracy: 0,
    };

    /// Tank cannon firing a shell.
    pub const CANNON: Self = Self {
        damage: 40,
        range: 4 * CELL_LEPTON_W,
        rate_of_fire: 50,
        projectile_speed: 96,
        inaccuracy: 48,
    };

    /// Machine gun.
    pub const MACHINE_GUN: Self = Self {
        damage: 10,
        range: 3 * CELL_LEPTON_W,
        rate_of_fire: 12,
        projectile_speed: 0,
        inaccuracy: 0,
    };

    /// Lobbed grenade.
    pub const GRENADE: Self = Self {
        damage: 30,
        range: 3 * CELL_LEPTON_W + CELL_LEPTON_W / 2,
        rate_of_fire: 60,
        projectile_speed: 40,
        inaccuracy: 64,
    };

    /// Air-to-ground rocket.
    pub const ROCKET: Self = Self {
        damage: 35,
        range: 4 * CELL_LEPTON_W,
        rate_of_fire: 40,
        projectile_speed: 128,
        inaccuracy: 32,
    };
}

/// Combat-layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CombatData {
    /// Current attack target.
    pub tarcom: Target,
    /// Armament, if any.
    pub weapon: Option<Weapon>,
    /// Ticks until the weapon is ready again.
    pub arm: u32,
}

impl CombatData {
    /// Unarmed or armed combat state with no target.
    #[must_use]
    pub const fn new(weapon: Option<Weapon>) -> Self {
        Self {
            tarcom: Target::NONE,
            weapon,
            arm: 0,
        }
    }

    pub(crate) fn detach(&mut self, target: Target) {
        clear_refs(target, &mut [&mut self.tarcom]);
    }
}

/// Combat layer.
pub trait CombatObject: RadioObject {
    /// Combat state.
    fn combat(&self) -> &CombatData;
    /// Combat state, mutably.
    fn combat_mut(&mut self) -> &mut CombatData;

    /// Combat-layer per-tick step: reload and drop dead targets.
    fn techno_ai(&mut self, world: &mut World) {
        self.radio_ai(world);
        let combat = self.combat_mut();
        combat.arm = combat.arm.saturating_sub(1);
        let tarcom = combat.tarcom;
        if tarcom.is_valid() && !world.is_targetable(tarcom) {
            self.combat_mut().tarcom = Target::NONE;
        }
    }

    /// Set the attack target.
    fn assign_target(&mut self, target: Target) {
        self.combat_mut().tarcom = target;
    }

    /// How far this unit looks for trouble.
    fn scan_range(&self) -> i32 {
        self.combat()
            .weapon
            .map_or(0, |weapon| weapon.range + 2 * CELL_LEPTON_W)
    }

    /// Whether `target` is within weapon reach.
    fn in_range(&self, world: &World, target: Target) -> bool {
        let Some(weapon) = self.combat().weapon else {
            return false;
        };
        world
            .coord_of(target)
            .is_some_and(|at| self.coord().distance(at) <= weapon.range)
    }

    /// Fire at `target` if armed, reloaded and in range.
    fn fire_at(&mut self, world: &mut World, target: Target) -> bool {
        let Some(weapon) = self.combat().weapon else {
            return false;
        };
        if self.combat().arm > 0 || !self.in_range(world, target) {
            return false;
        }
        let me = self.as_target();
        let from = self.coord();
        if let Some(at) = world.coord_of(target) {
            self.object_mut().facing = from.direction(at);
        }
        self.combat_mut().arm = weapon.rate_of_fire;
        tracing::trace!(entity = %me, %target, "fire");
        world.fire(me, from, weapon, target);
        true
    }

    /// Passengers or other entities carried inside this one.
    fn cargo(&self) -> Vec<Target> {
        Vec::new()
    }
}

/// Nearest threat: whoever hit us last if still around, otherwise the
/// closest enemy within scan range.
pub fn find_threat<U: CombatObject + ?Sized>(unit: &U, world: &World) -> Target {
    let attacker = unit.map().last_attacker;
    if attacker.is_valid()
        && world.is_targetable(attacker)
        && world
            .coord_of(attacker)
            .is_some_and(|at| unit.coord().distance(at) <= unit.scan_range())
    {
        return attacker;
    }
    world.nearest_enemy(unit.coord(), unit.owner(), Some(unit.scan_range()))
}

/// Fire at the current target or the nearest threat in range without
/// moving. Used by static defences and units holding position.
pub fn engage_in_place<U: CombatObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    if unit.combat().weapon.is_none() {
        return IDLE_DELAY;
    }
    let mut target = unit.combat().tarcom;
    if !world.is_targetable(target) || !unit.in_range(world, target) {
        target = find_threat(unit, world);
        if !unit.in_range(world, target) {
            unit.assign_target(Target::NONE);
            return SCAN_DELAY + world.rng.below(4);
        }
        unit.assign_target(target);
    }
    unit.fire_at(world, target);
    unit.combat().arm.max(IMMEDIATE_DELAY)
}
