//! Shells, grenades and rockets in flight.
//!
//! A projectile flies in a straight line to the point it was aimed at
//! (the target's position plus any scatter) and detonates there. The
//! target only takes damage if it is still alive and within
//! [`HIT_RADIUS`] of the impact point.

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::entity::effect::EffectKind;
use crate::entity::{clear_refs, HouseId, MapObject, Object, ObjectData};
use crate::pool::Handle;
use crate::target::{Rtti, Target};
use crate::world::World;

/// Largest miss distance that still hits, in leptons.
pub const HIT_RADIUS: i32 = 128;

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    object: ObjectData,
    target: Target,
    source: Target,
    destination: Coordinate,
    speed: i32,
    damage: i32,
}

impl Projectile {
    /// New projectile at `from` heading for `destination`.
    #[must_use]
    pub fn new(
        handle: Handle,
        owner: HouseId,
        from: Coordinate,
        destination: Coordinate,
        source: Target,
        target: Target,
        speed: i32,
        damage: i32,
    ) -> Self {
        let mut object = ObjectData::new(Rtti::Projectile, handle, owner, from);
        object.facing = from.direction(destination);
        Self {
            object,
            target,
            source,
            destination,
            speed,
            damage,
        }
    }

    /// Entity this projectile was fired at.
    #[must_use]
    pub const fn target(&self) -> Target {
        self.target
    }

    /// Impact point.
    #[must_use]
    pub const fn destination(&self) -> Coordinate {
        self.destination
    }

    fn detonate(&mut self, world: &mut World) {
        let me = self.as_target();
        let (target, source, damage) = (self.target, self.source, self.damage);
        let hit = world
            .coord_of(target)
            .is_some_and(|at| at.distance(self.destination) <= HIT_RADIUS);
        if hit {
            world.with_techno(target, |victim, world| victim.take_damage(world, damage, source));
        }
        tracing::trace!(entity = %me, %target, hit, "detonate");
        world.spawn_effect(EffectKind::Explosion, self.destination);
        self.object.active = false;
        world.kill(me);
    }
}

impl Object for Projectile {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn ai(&mut self, world: &mut World) {
        self.object_ai(world);
        let next = self.object.coord.step_toward(self.destination, self.speed);
        self.object.coord = next;
        if next == self.destination {
            self.detonate(world);
        }
    }

    fn detach_target(&mut self, target: Target) {
        clear_refs(target, &mut [&mut self.target, &mut self.source]);
    }

    fn references(&self) -> Vec<Target> {
        vec![self.target, self.source]
    }
}
