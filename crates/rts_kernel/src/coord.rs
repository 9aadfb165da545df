//! Bit-packed map addressing.
//!
//! The map is a fixed 64×64 grid of cells. Positions are stored as a
//! [`Coordinate`]: a 32-bit value holding the cell and the sub-cell
//! offset ("lepton", 256 per cell) on each axis. Cells are stored as a
//! [`Cell`]: 6 bits of column and 6 bits of row.
//!
//! ```text
//! Coordinate  31..30  29..24  23..16   15..14  13..8   7..0
//!             unused  y cell  y lepton unused  x cell  x lepton
//!
//! Cell        15..12  11..6   5..0
//!             zero    y       x
//! ```
//!
//! All gameplay math here is integer-only. The one transcendental path,
//! [`Coordinate::direction_atan2`], is kept as a reference for the
//! lookup-table based [`Coordinate::direction`] and is not used by the
//! simulation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::isqrt;

/// Width of the map in cells.
pub const MAP_CELL_W: i32 = 64;
/// Height of the map in cells.
pub const MAP_CELL_H: i32 = 64;
/// Total number of cells on the map.
pub const MAP_CELL_TOTAL: usize = (MAP_CELL_W * MAP_CELL_H) as usize;
/// Leptons per cell edge.
pub const CELL_LEPTON_W: i32 = 256;
/// Lepton offset of a cell's center.
pub const CELL_CENTER: u8 = 128;
/// Largest valid lepton position on either axis.
pub const MAP_LEPTON_MAX: i32 = MAP_CELL_W * CELL_LEPTON_W - 1;

const CELL_MASK: u32 = 0x3F;

/// A 256-step heading. 0 is north, 64 east, 128 south, 192 west.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dir256(pub u8);

impl Dir256 {
    /// Due north.
    pub const NORTH: Self = Self(0);
    /// Due east.
    pub const EAST: Self = Self(64);
    /// Due south.
    pub const SOUTH: Self = Self(128);
    /// Due west.
    pub const WEST: Self = Self(192);

    /// Reduce to the nearest of the eight compass directions.
    #[must_use]
    pub const fn to_facing(self) -> Facing {
        Facing::ALL[(((self.0 as u16 + 16) / 32) & 7) as usize]
    }
}

/// Eight-way compass direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    /// Up (negative y).
    North,
    /// Up and right.
    NorthEast,
    /// Right.
    East,
    /// Down and right.
    SouthEast,
    /// Down (positive y).
    South,
    /// Down and left.
    SouthWest,
    /// Left.
    West,
    /// Up and left.
    NorthWest,
}

impl Facing {
    /// All facings in clockwise order starting north.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    /// Cell offset for one step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    /// Whether this is a diagonal direction.
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        matches!(
            self,
            Self::NorthEast | Self::SouthEast | Self::SouthWest | Self::NorthWest
        )
    }

    /// Heading of this facing in 256 steps.
    #[must_use]
    pub const fn to_dir(self) -> Dir256 {
        Dir256((self as u8) * 32)
    }
}

/// A map cell: 6 bits column, 6 bits row. Invalid cells are `-1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cell(i16);

impl Cell {
    /// Sentinel for "no cell" and for anything off the map.
    pub const INVALID: Self = Self(-1);

    /// Build a cell. Out-of-range components yield [`Cell::INVALID`].
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        if x < 0 || y < 0 || x >= MAP_CELL_W || y >= MAP_CELL_H {
            return Self::INVALID;
        }
        Self(((y << 6) | x) as i16)
    }

    /// Rebuild a cell from its packed value.
    #[must_use]
    pub const fn from_raw(raw: i16) -> Self {
        if raw < 0 || raw as usize >= MAP_CELL_TOTAL {
            Self::INVALID
        } else {
            Self(raw)
        }
    }

    /// Cell for a flat grid index.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        i16::try_from(index).map_or(Self::INVALID, Self::from_raw)
    }

    /// Packed value.
    #[must_use]
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// Whether this cell lies on the map.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Column, or -1 for an invalid cell.
    #[must_use]
    pub const fn x(self) -> i32 {
        if self.is_valid() {
            (self.0 as i32) & (CELL_MASK as i32)
        } else {
            -1
        }
    }

    /// Row, or -1 for an invalid cell.
    #[must_use]
    pub const fn y(self) -> i32 {
        if self.is_valid() {
            ((self.0 as i32) >> 6) & (CELL_MASK as i32)
        } else {
            -1
        }
    }

    /// Flat row-major index, `None` for invalid cells.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    /// Neighbouring cell, or [`Cell::INVALID`] across the map edge.
    #[must_use]
    pub const fn adjacent(self, facing: Facing) -> Self {
        if !self.is_valid() {
            return Self::INVALID;
        }
        let (dx, dy) = facing.offset();
        Self::new(self.x() + dx, self.y() + dy)
    }

    /// Coordinate of this cell's center.
    #[must_use]
    pub fn center(self) -> Coordinate {
        if !self.is_valid() {
            return Coordinate::from_raw(0);
        }
        Coordinate::new(self.x() as u8, self.y() as u8, CELL_CENTER, CELL_CENTER)
    }

    /// Game distance in cells, same formula as [`Coordinate::distance`].
    #[must_use]
    pub fn distance(self, other: Self) -> i32 {
        let dx = (self.x() - other.x()).abs();
        let dy = (self.y() - other.y()).abs();
        dx.max(dy) + dx.min(dy) / 2
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Cell({}, {})", self.x(), self.y())
        } else {
            write!(f, "Cell(INVALID)")
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Map position: cell plus lepton offset on each axis, packed in 32 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Coordinate(u32);

/// Bits carrying position: 14 per axis, the top two of each half unused.
const COORD_RAW_MASK: u32 = 0x3FFF_3FFF;

impl Coordinate {
    /// Pack a coordinate. Cell components are masked to 6 bits.
    #[must_use]
    pub const fn new(cell_x: u8, cell_y: u8, lepton_x: u8, lepton_y: u8) -> Self {
        let x = ((cell_x as u32 & CELL_MASK) << 8) | lepton_x as u32;
        let y = ((cell_y as u32 & CELL_MASK) << 8) | lepton_y as u32;
        Self((y << 16) | x)
    }

    /// Rebuild from a persisted raw value. Unused bits are cleared.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & COORD_RAW_MASK)
    }

    /// Build from absolute lepton positions, clamping to the map.
    #[must_use]
    pub fn from_leptons(x: i32, y: i32) -> Self {
        let x = x.clamp(0, MAP_LEPTON_MAX) as u32;
        let y = y.clamp(0, MAP_LEPTON_MAX) as u32;
        Self((y << 16) | x)
    }

    /// Raw packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Column of the containing cell (always < 64).
    #[must_use]
    pub const fn x_cell(self) -> u8 {
        ((self.0 >> 8) & CELL_MASK) as u8
    }

    /// Row of the containing cell (always < 64).
    #[must_use]
    pub const fn y_cell(self) -> u8 {
        ((self.0 >> 24) & CELL_MASK) as u8
    }

    /// Horizontal offset within the cell.
    #[must_use]
    pub const fn x_lepton(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Vertical offset within the cell.
    #[must_use]
    pub const fn y_lepton(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// Absolute horizontal position in leptons.
    #[must_use]
    pub const fn x(self) -> i32 {
        self.x_cell() as i32 * CELL_LEPTON_W + self.x_lepton() as i32
    }

    /// Absolute vertical position in leptons.
    #[must_use]
    pub const fn y(self) -> i32 {
        self.y_cell() as i32 * CELL_LEPTON_W + self.y_lepton() as i32
    }

    /// Cell containing this coordinate.
    #[must_use]
    pub const fn to_cell(self) -> Cell {
        Cell::new(self.x_cell() as i32, self.y_cell() as i32)
    }

    /// Center of the containing cell.
    #[must_use]
    pub fn snap(self) -> Self {
        self.to_cell().center()
    }

    /// Offset by a lepton delta, clamping at the map edges.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::from_leptons(self.x().saturating_add(dx), self.y().saturating_add(dy))
    }

    /// Game distance: `max(|dx|,|dy|) + min(|dx|,|dy|)/2` in leptons.
    ///
    /// This is the approximation combat range and AI decisions are built on;
    /// it must not be replaced by a Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> i32 {
        let dx = (self.x() - other.x()).abs();
        let dy = (self.y() - other.y()).abs();
        dx.max(dy) + dx.min(dy) / 2
    }

    /// Exact Euclidean distance in leptons (floor). Not for gameplay decisions.
    #[must_use]
    pub fn euclidean_distance(self, other: Self) -> i32 {
        let dx = i64::from(self.x() - other.x());
        let dy = i64::from(self.y() - other.y());
        // Both axes are bounded by the map, so the result fits comfortably.
        isqrt((dx * dx + dy * dy) as u64) as i32
    }

    /// Heading toward `other` in 256 steps, integer-only.
    ///
    /// The direction from a coordinate to itself is step 0.
    #[must_use]
    pub fn direction(self, other: Self) -> Dir256 {
        direction256(other.x() - self.x(), other.y() - self.y())
    }

    /// Reference heading computed with `atan2`. Agrees with
    /// [`Coordinate::direction`] to within one step.
    #[must_use]
    pub fn direction_atan2(self, other: Self) -> Dir256 {
        let dx = f64::from(other.x() - self.x());
        let dy = f64::from(other.y() - self.y());
        if dx == 0.0 && dy == 0.0 {
            return Dir256::NORTH;
        }
        let angle = dx.atan2(-dy);
        let steps = (angle * 128.0 / std::f64::consts::PI).round() as i32;
        Dir256(steps.rem_euclid(256) as u8)
    }

    /// Eight-way compass direction toward `other`.
    #[must_use]
    pub fn facing(self, other: Self) -> Facing {
        self.direction(other).to_facing()
    }

    /// Move up to `distance` leptons straight toward `target`, never past it.
    #[must_use]
    pub fn step_toward(self, target: Self, distance: i32) -> Self {
        if distance <= 0 {
            return self;
        }
        let dx = target.x() - self.x();
        let dy = target.y() - self.y();
        let length = self.euclidean_distance(target);
        if length <= distance {
            return target;
        }

        let mut mx = dx * distance / length;
        let mut my = dy * distance / length;
        if mx == 0 && my == 0 {
            if dx.abs() >= dy.abs() {
                mx = dx.signum();
            } else {
                my = dy.signum();
            }
        }
        self.offset(mx, my)
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Coordinate({}:{}, {}:{})",
            self.x_cell(),
            self.x_lepton(),
            self.y_cell(),
            self.y_lepton()
        )
    }
}

impl From<u32> for Coordinate {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Coordinate> for u32 {
    fn from(coord: Coordinate) -> Self {
        coord.0
    }
}

impl From<Cell> for Coordinate {
    fn from(cell: Cell) -> Self {
        cell.center()
    }
}

/// `tan((k + 0.5) * 45° / 32)` in 16.16 fixed point: the rounding
/// boundaries between successive heading steps inside one octant.
const OCTANT_BOUNDARIES: [u64; 32] = [
    804, 2414, 4026, 5644, 7268, 8901, 10545, 12202, 13874, 15564, 17273, 19005, 20762, 22546,
    24360, 26208, 28093, 30018, 31986, 34002, 36071, 38196, 40382, 42636, 44963, 47369, 49863,
    52451, 55144, 57950, 60880, 63947,
];

/// Steps (0..=32) away from the major axis for a `minor / major` ratio.
fn octant_steps(minor: u64, major: u64) -> i32 {
    if major == 0 {
        return 0;
    }
    let ratio = (minor << 16) / major;
    OCTANT_BOUNDARIES.iter().take_while(|&&b| b <= ratio).count() as i32
}

/// Heading for a lepton delta, with y growing southward.
fn direction256(dx: i32, dy: i32) -> Dir256 {
    if dx == 0 && dy == 0 {
        return Dir256::NORTH;
    }
    let ax = u64::from(dx.unsigned_abs());
    let ay = u64::from(dy.unsigned_abs());
    let vertical = ay >= ax;
    let s = if vertical {
        octant_steps(ax, ay)
    } else {
        octant_steps(ay, ax)
    };

    let steps = match (dx >= 0, dy <= 0, vertical) {
        (true, true, true) => s,
        (true, true, false) => 64 - s,
        (true, false, false) => 64 + s,
        (true, false, true) => 128 - s,
        (false, false, true) => 128 + s,
        (false, false, false) => 192 - s,
        (false, true, false) => 192 + s,
        (false, true, true) => 256 - s,
    };
    Dir256(steps.rem_euclid(256) as u8)
}
