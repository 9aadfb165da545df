//! Opaque, save-stable references to entities and cells.
//!
//! A [`Target`] packs a category tag ([`Rtti`]), a 16-bit payload and a
//! validity bit into one `u32`. The payload is either a pool slot index or
//! a packed [`Cell`]. The otherwise unused top bits carry the low bits of
//! the slot generation so a Target whose slot has since been reused by a
//! different entity no longer resolves.
//!
//! ```text
//! 31..25      24     23..16  15..0
//! generation  valid  rtti    payload (slot index or cell)
//! ```
//!
//! The all-zero value is [`Target::NONE`] and decodes as invalid. Two
//! targets are equal exactly when their raw values are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Coordinate};

/// Category tag identifying which pool a target lives in.
///
/// Ordinals are persisted and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rtti {
    /// No category; the sentinel for invalid targets.
    None = 0,
    /// Payload is a map cell, not a pool index.
    Cell = 1,
    /// Ground vehicles.
    Vehicle = 2,
    /// Foot soldiers.
    Infantry = 3,
    /// Structures.
    Building = 4,
    /// Bullets, shells, missiles.
    Projectile = 5,
    /// Transient effects (explosions, smoke).
    Effect = 6,
    /// Flying units.
    Aircraft = 7,
}

impl Rtti {
    /// Pool categories in the fixed order the simulation ticks them.
    pub const POOL_ORDER: [Self; 6] = [
        Self::Vehicle,
        Self::Infantry,
        Self::Building,
        Self::Projectile,
        Self::Effect,
        Self::Aircraft,
    ];

    /// Decode a persisted tag. Unknown values map to [`Rtti::None`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Cell,
            2 => Self::Vehicle,
            3 => Self::Infantry,
            4 => Self::Building,
            5 => Self::Projectile,
            6 => Self::Effect,
            7 => Self::Aircraft,
            _ => Self::None,
        }
    }

    /// Whether targets of this category refer to pool residents.
    #[must_use]
    pub const fn is_pooled(self) -> bool {
        !matches!(self, Self::None | Self::Cell)
    }

    /// Whether this category carries the combat/radio layers.
    #[must_use]
    pub const fn is_techno(self) -> bool {
        matches!(
            self,
            Self::Vehicle | Self::Infantry | Self::Building | Self::Aircraft
        )
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Cell => "Cell",
            Self::Vehicle => "Vehicle",
            Self::Infantry => "Infantry",
            Self::Building => "Building",
            Self::Projectile => "Projectile",
            Self::Effect => "Effect",
            Self::Aircraft => "Aircraft",
        }
    }
}

impl fmt::Display for Rtti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed reference to an entity or a cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(u32);

const PAYLOAD_MASK: u32 = 0xFFFF;
const RTTI_SHIFT: u32 = 16;
const VALID_BIT: u32 = 1 << 24;
const GENERATION_SHIFT: u32 = 25;

/// Mask applied to slot generations stored in a target.
pub const GENERATION_MASK: u8 = 0x7F;

impl Target {
    /// The "no target" sentinel.
    pub const NONE: Self = Self(0);

    /// Index reported when decoding a target without a pool index.
    pub const INVALID_INDEX: u16 = u16::MAX;

    /// Build a target for pool slot `index` of category `rtti`.
    ///
    /// Returns [`Target::NONE`] for non-pool categories and for the
    /// reserved index `u16::MAX`.
    #[must_use]
    pub const fn new(rtti: Rtti, index: u16) -> Self {
        Self::with_generation(rtti, index, 0)
    }

    /// Build a target that also pins the slot generation.
    #[must_use]
    pub const fn with_generation(rtti: Rtti, index: u16, generation: u8) -> Self {
        if !rtti.is_pooled() || index == Self::INVALID_INDEX {
            return Self::NONE;
        }
        Self(
            ((generation & GENERATION_MASK) as u32) << GENERATION_SHIFT
                | VALID_BIT
                | (rtti as u32) << RTTI_SHIFT
                | index as u32,
        )
    }

    /// Build a cell target. Invalid cells yield [`Target::NONE`].
    #[must_use]
    pub const fn from_cell(cell: Cell) -> Self {
        if !cell.is_valid() {
            return Self::NONE;
        }
        Self(VALID_BIT | (Rtti::Cell as u32) << RTTI_SHIFT | (cell.raw() as u16) as u32)
    }

    /// Cell target for the cell containing `coord`.
    #[must_use]
    pub const fn from_coord(coord: Coordinate) -> Self {
        Self::from_cell(coord.to_cell())
    }

    /// Rebuild from a persisted raw value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the validity bit is set.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 & VALID_BIT != 0
    }

    /// Category, or [`Rtti::None`] when invalid.
    #[must_use]
    pub const fn rtti(self) -> Rtti {
        if !self.is_valid() {
            return Rtti::None;
        }
        Rtti::from_u8(((self.0 >> RTTI_SHIFT) & 0xFF) as u8)
    }

    /// Pool slot index, or [`Target::INVALID_INDEX`] for cells and invalid targets.
    #[must_use]
    pub const fn index(self) -> u16 {
        if self.rtti().is_pooled() {
            (self.0 & PAYLOAD_MASK) as u16
        } else {
            Self::INVALID_INDEX
        }
    }

    /// Slot generation tag (0 for cells and invalid targets).
    #[must_use]
    pub const fn generation(self) -> u8 {
        if self.rtti().is_pooled() {
            (self.0 >> GENERATION_SHIFT) as u8 & GENERATION_MASK
        } else {
            0
        }
    }

    /// Whether this is a valid cell target.
    #[must_use]
    pub const fn is_cell(self) -> bool {
        matches!(self.rtti(), Rtti::Cell)
    }

    /// Whether this is a valid pool-resident target.
    #[must_use]
    pub const fn is_entity(self) -> bool {
        self.rtti().is_pooled()
    }

    /// Cell payload, or [`Cell::INVALID`] when this is not a cell target.
    #[must_use]
    pub const fn as_cell(self) -> Cell {
        if self.is_cell() {
            Cell::from_raw((self.0 & PAYLOAD_MASK) as i16)
        } else {
            Cell::INVALID
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rtti() {
            Rtti::None => f.write_str("None"),
            Rtti::Cell => {
                let cell = self.as_cell();
                write!(f, "Cell({},{})", cell.x(), cell.y())
            }
            rtti => write!(f, "{}#{}@g{}", rtti, self.index(), self.generation()),
        }
    }
}
