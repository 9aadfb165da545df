//! Per-cell map data: land type, resources, occupancy and reservations.
//!
//! The terrain grid is the only shared spatial index in the kernel. Units
//! register the cell they stand in as its occupier and may reserve the
//! cell they are about to enter; the pathfinder treats both as blocking
//! for every mover except their owner.

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Facing, MAP_CELL_H, MAP_CELL_TOTAL, MAP_CELL_W};
use crate::error::{KernelError, Result};
use crate::math::Fixed;
use crate::target::Target;

/// Most resource a cell can hold.
pub const TIBERIUM_MAX: u8 = 12;

/// Ground type of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LandType {
    /// Open ground.
    #[default]
    Clear,
    /// Paved road, fastest for wheels and tracks.
    Road,
    /// Broken ground.
    Rough,
    /// Shoreline sand.
    Beach,
    /// Trees; blocks ground units.
    Tree,
    /// Cliffs and boulders.
    Rock,
    /// Open water; only hover and air units cross.
    Water,
    /// Man-made wall.
    Wall,
}

impl LandType {
    /// Whether structures can be placed on this land.
    #[must_use]
    pub const fn is_buildable(self) -> bool {
        matches!(self, Self::Clear | Self::Road | Self::Rough)
    }

    /// Map-text character for this land type.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Clear => '.',
            Self::Road => '=',
            Self::Rough => ':',
            Self::Beach => '_',
            Self::Tree => 'T',
            Self::Rock => '^',
            Self::Water => '~',
            Self::Wall => '#',
        }
    }

    /// Parse a map-text character. `$` is clear ground seeded with resources.
    #[must_use]
    pub const fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '.' | '$' => Some(Self::Clear),
            '=' => Some(Self::Road),
            ':' => Some(Self::Rough),
            '_' => Some(Self::Beach),
            'T' => Some(Self::Tree),
            '^' => Some(Self::Rock),
            '~' => Some(Self::Water),
            '#' => Some(Self::Wall),
            _ => None,
        }
    }
}

/// How a unit moves; decides which land it can cross and at what cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locomotion {
    /// Infantry.
    Foot,
    /// Tracked vehicles.
    Track,
    /// Wheeled vehicles.
    Wheel,
    /// Hovercraft; crosses water.
    Hover,
    /// Aircraft; ignores land and occupancy.
    Fly,
}

/// Cost in quarters of a clear-ground step.
const fn quarters(q: i64) -> Fixed {
    Fixed::from_bits(q << 30)
}

impl Locomotion {
    /// Movement cost multiplier for entering `land`, `None` when impassable.
    #[must_use]
    pub const fn cost(self, land: LandType) -> Option<Fixed> {
        use LandType as L;
        let q = match (self, land) {
            (Self::Fly, _) => 4,
            (_, L::Tree | L::Rock | L::Wall) => return None,
            (Self::Hover, L::Water) => 4,
            (_, L::Water) => return None,
            (Self::Foot | Self::Hover, L::Clear | L::Road) => 4,
            (Self::Foot, L::Rough | L::Beach) => 6,
            (Self::Hover, L::Rough) => 8,
            (Self::Hover, L::Beach) => 4,
            (Self::Track, L::Clear) => 4,
            (Self::Track | Self::Wheel, L::Road) => 3,
            (Self::Track, L::Rough) => 6,
            (Self::Track, L::Beach) => 8,
            (Self::Wheel, L::Clear) => 5,
            (Self::Wheel, L::Rough | L::Beach) => 10,
        };
        Some(quarters(q))
    }

    /// Cheapest step this locomotion can take anywhere; scales the heuristic.
    #[must_use]
    pub const fn min_cost(self) -> Fixed {
        match self {
            Self::Track | Self::Wheel => quarters(3),
            Self::Foot | Self::Hover | Self::Fly => quarters(4),
        }
    }

    /// Whether units with this locomotion stand in and block cells.
    #[must_use]
    pub const fn occupies_cells(self) -> bool {
        !matches!(self, Self::Fly)
    }
}

/// Everything the kernel knows about one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellData {
    /// Ground type.
    pub land: LandType,
    /// Harvestable resource, `0..=TIBERIUM_MAX`.
    pub tiberium: u8,
    /// Entity standing in (or built on) this cell.
    pub occupier: Target,
    /// Entity about to move into this cell.
    pub reserved_by: Target,
}

/// The 64×64 cell grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Terrain {
    cells: Vec<CellData>,
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new()
    }
}

impl Terrain {
    /// All-clear map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: vec![CellData::default(); MAP_CELL_TOTAL],
        }
    }

    /// Build from map text, one string per row starting at row 0.
    ///
    /// Rows and columns not covered by `rows` stay clear.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidCell`] for text past the map edge and
    /// [`KernelError::InvalidState`] for unknown characters.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let mut terrain = Self::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, symbol) in row.as_ref().chars().enumerate() {
                let (x, y) = (x as i32, y as i32);
                let cell = Cell::new(x, y);
                if !cell.is_valid() {
                    return Err(KernelError::InvalidCell { x, y });
                }
                let land = LandType::from_symbol(symbol).ok_or_else(|| {
                    KernelError::InvalidState(format!("unknown map symbol {symbol:?} at ({x}, {y})"))
                })?;
                terrain.set_land(cell, land);
                if symbol == '$' {
                    terrain.set_tiberium(cell, TIBERIUM_MAX);
                }
            }
        }
        Ok(terrain)
    }

    /// Data for a cell, `None` off the map.
    #[must_use]
    pub fn get(&self, cell: Cell) -> Option<&CellData> {
        self.cells.get(cell.index()?)
    }

    fn get_mut(&mut self, cell: Cell) -> Option<&mut CellData> {
        self.cells.get_mut(cell.index()?)
    }

    /// Land type; off-map reads as rock.
    #[must_use]
    pub fn land(&self, cell: Cell) -> LandType {
        self.get(cell).map_or(LandType::Rock, |data| data.land)
    }

    /// Change a cell's land type.
    pub fn set_land(&mut self, cell: Cell, land: LandType) {
        if let Some(data) = self.get_mut(cell) {
            data.land = land;
        }
    }

    /// Resource left in a cell.
    #[must_use]
    pub fn tiberium(&self, cell: Cell) -> u8 {
        self.get(cell).map_or(0, |data| data.tiberium)
    }

    /// Set a cell's resource, clamped to [`TIBERIUM_MAX`].
    pub fn set_tiberium(&mut self, cell: Cell, amount: u8) {
        if let Some(data) = self.get_mut(cell) {
            data.tiberium = amount.min(TIBERIUM_MAX);
        }
    }

    /// Remove up to `amount` resource from a cell; returns what was taken.
    pub fn harvest(&mut self, cell: Cell, amount: u8) -> u8 {
        let Some(data) = self.get_mut(cell) else {
            return 0;
        };
        let taken = data.tiberium.min(amount);
        data.tiberium -= taken;
        taken
    }

    /// Closest cell holding resource within `radius` cells that nobody but
    /// `mover` stands in, scanning rings outward. Ties go to the first cell
    /// in row-major order within the ring.
    #[must_use]
    pub fn nearest_tiberium(&self, from: Cell, radius: i32, mover: Target) -> Option<Cell> {
        if !from.is_valid() {
            return None;
        }
        (0..=radius).find_map(|r| {
            ring(from, r).find(|&cell| {
                let occupier = self.occupier(cell);
                self.tiberium(cell) > 0 && (occupier == Target::NONE || occupier == mover)
            })
        })
    }

    /// Entity occupying a cell ([`Target::NONE`] when empty or off-map).
    #[must_use]
    pub fn occupier(&self, cell: Cell) -> Target {
        self.get(cell).map_or(Target::NONE, |data| data.occupier)
    }

    /// Entity holding a reservation on a cell.
    #[must_use]
    pub fn reserved_by(&self, cell: Cell) -> Target {
        self.get(cell).map_or(Target::NONE, |data| data.reserved_by)
    }

    /// Claim a cell for `who`. Fails if someone else stands there.
    pub fn occupy(&mut self, cell: Cell, who: Target) -> bool {
        let Some(data) = self.get_mut(cell) else {
            return false;
        };
        if data.occupier.is_valid() && data.occupier != who {
            return false;
        }
        data.occupier = who;
        if data.reserved_by == who {
            data.reserved_by = Target::NONE;
        }
        true
    }

    /// Give up a cell if `who` holds it.
    pub fn vacate(&mut self, cell: Cell, who: Target) {
        if let Some(data) = self.get_mut(cell) {
            if data.occupier == who {
                data.occupier = Target::NONE;
            }
        }
    }

    /// Reserve a cell for an upcoming move. Fails if another entity holds
    /// or reserves it.
    pub fn reserve(&mut self, cell: Cell, who: Target) -> bool {
        let Some(data) = self.get_mut(cell) else {
            return false;
        };
        let free = |t: Target| !t.is_valid() || t == who;
        if !free(data.occupier) || !free(data.reserved_by) {
            return false;
        }
        data.reserved_by = who;
        true
    }

    /// Drop `who`'s reservation on a cell.
    pub fn unreserve(&mut self, cell: Cell, who: Target) {
        if let Some(data) = self.get_mut(cell) {
            if data.reserved_by == who {
                data.reserved_by = Target::NONE;
            }
        }
    }

    /// Remove every occupancy and reservation held by `who`.
    pub fn scrub(&mut self, who: Target) {
        for data in &mut self.cells {
            if data.occupier == who {
                data.occupier = Target::NONE;
            }
            if data.reserved_by == who {
                data.reserved_by = Target::NONE;
            }
        }
    }

    /// Clear occupancy and reservations whose holder fails `alive`.
    pub fn retain_holders(&mut self, mut alive: impl FnMut(Target) -> bool) {
        for data in &mut self.cells {
            if data.occupier.is_valid() && !alive(data.occupier) {
                data.occupier = Target::NONE;
            }
            if data.reserved_by.is_valid() && !alive(data.reserved_by) {
                data.reserved_by = Target::NONE;
            }
        }
    }

    /// Cost for `mover` to enter `cell`, `None` if it cannot.
    ///
    /// Ground locomotion is blocked by any other entity's occupancy or
    /// reservation. Flying ignores both.
    #[must_use]
    pub fn movement_cost(&self, cell: Cell, locomotion: Locomotion, mover: Target) -> Option<Fixed> {
        let data = self.get(cell)?;
        let cost = locomotion.cost(data.land)?;
        if locomotion.occupies_cells() {
            let blocked = |t: Target| t.is_valid() && t != mover;
            if blocked(data.occupier) || blocked(data.reserved_by) {
                return None;
            }
        }
        Some(cost)
    }

    /// Whether `mover` can enter `cell`.
    #[must_use]
    pub fn is_passable(&self, cell: Cell, locomotion: Locomotion, mover: Target) -> bool {
        self.movement_cost(cell, locomotion, mover).is_some()
    }

    /// First passable neighbour of `cell`, clockwise from north.
    #[must_use]
    pub fn free_adjacent(&self, cell: Cell, locomotion: Locomotion, mover: Target) -> Option<Cell> {
        Facing::ALL
            .iter()
            .map(|&facing| cell.adjacent(facing))
            .find(|&n| self.is_passable(n, locomotion, mover))
    }
}

/// Cells at Chebyshev distance exactly `radius` from `center`, on the map,
/// in row-major order.
pub(crate) fn ring(center: Cell, radius: i32) -> impl Iterator<Item = Cell> {
    let (cx, cy) = (center.x(), center.y());
    (cy - radius..=cy + radius).flat_map(move |y| {
        (cx - radius..=cx + radius).filter_map(move |x| {
            let on_ring = (x - cx).abs() == radius || (y - cy).abs() == radius;
            let in_map = (0..MAP_CELL_W).contains(&x) && (0..MAP_CELL_H).contains(&y);
            (on_ring && in_map).then(|| Cell::new(x, y))
        })
    })
}
