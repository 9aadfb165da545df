//! Short-lived visual markers. They carry no gameplay, but live in a pool
//! and tick like everything else so their lifetimes stay deterministic.

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::entity::{HouseId, Object, ObjectData};
use crate::pool::Handle;
use crate::target::Rtti;
use crate::world::World;

/// Effect types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Projectile impact.
    Explosion,
    /// Burning wreck.
    Smoke,
    /// Instant-hit weapon discharge.
    MuzzleFlash,
}

impl EffectKind {
    /// Ticks the effect lasts.
    #[must_use]
    pub const fn duration(self) -> u32 {
        match self {
            Self::Explosion => 12,
            Self::Smoke => 45,
            Self::MuzzleFlash => 2,
        }
    }
}

/// A transient effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Effect {
    object: ObjectData,
    kind: EffectKind,
    remaining: u32,
}

impl Effect {
    /// New effect at `coord`.
    #[must_use]
    pub fn new(kind: EffectKind, handle: Handle, coord: Coordinate) -> Self {
        Self {
            object: ObjectData::new(Rtti::Effect, handle, HouseId::default(), coord),
            kind,
            remaining: kind.duration(),
        }
    }

    /// Effect type.
    #[must_use]
    pub const fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Ticks left.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Object for Effect {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn ai(&mut self, world: &mut World) {
        self.object_ai(world);
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            let me = self.as_target();
            self.object.active = false;
            world.kill(me);
        }
    }
}
