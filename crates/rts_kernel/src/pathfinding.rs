//! Grid A* over the 64×64 cell map.
//!
//! All costs are fixed-point so the same request produces the same path on
//! every machine. Dynamic blocking (other units' occupancy and
//! reservations) is read from the [`Terrain`] during expansion, so a path
//! is only a snapshot: movers re-request when they find it blocked.
//!
//! A search never fails outright. When the goal cell is impassable the
//! search retargets to the nearest passable cell; when the iteration cap is
//! hit or the goal is sealed off it returns the path toward the frontier
//! node closest to the goal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Facing, MAP_CELL_TOTAL};
use crate::math::{Fixed, SQRT2};
use crate::target::Target;
use crate::terrain::{ring, Locomotion, Terrain};

/// Search bounds for one path request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLimits {
    /// Nodes expanded before the search gives up and returns a partial path.
    pub max_iterations: u32,
    /// Longest path handed back; longer routes are truncated.
    pub max_path_length: usize,
    /// Furthest ring searched when retargeting an impassable goal.
    pub retarget_radius: i32,
    /// Collapse straight runs into line-of-sight waypoints.
    pub smooth: bool,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            max_path_length: 128,
            retarget_radius: 8,
            smooth: false,
        }
    }
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    /// The path reaches the requested goal.
    Complete,
    /// The path stops short (iteration cap, length cap, or sealed goal).
    Partial,
    /// The goal was impassable; the path reaches the nearest passable cell.
    Retargeted,
    /// No usable goal or start.
    Unreachable,
}

/// Result of a path request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    /// Cells to visit in order, excluding the start cell.
    pub cells: Vec<Cell>,
    /// How the search ended.
    pub status: PathStatus,
    /// Nodes expanded.
    pub iterations: u32,
    /// Goal actually searched for (differs from the request when retargeted).
    pub goal: Cell,
}

impl PathResult {
    fn unreachable(goal: Cell) -> Self {
        Self {
            cells: Vec::new(),
            status: PathStatus::Unreachable,
            iterations: 0,
            goal,
        }
    }

    /// Whether the last cell is the effective goal.
    #[must_use]
    pub const fn reaches_goal(&self) -> bool {
        matches!(self.status, PathStatus::Complete | PathStatus::Retargeted)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    index: u16,
    f_score: Fixed,
    h_score: Fixed,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse every key for min-first order.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Octile distance between two cells in clear-ground step units.
#[must_use]
pub fn octile_distance(a: Cell, b: Cell) -> Fixed {
    let dx = (a.x() - b.x()).unsigned_abs();
    let dy = (a.y() - b.y()).unsigned_abs();
    let (long, short) = (dx.max(dy), dx.min(dy));
    Fixed::from_num(long - short) + SQRT2 * Fixed::from_num(short)
}

fn heuristic(from: Cell, goal: Cell, locomotion: Locomotion) -> Fixed {
    octile_distance(from, goal) * locomotion.min_cost()
}

/// Diagonal steps may not cut the corner of an impassable cell.
fn is_diagonal_valid(
    terrain: &Terrain,
    from: Cell,
    facing: Facing,
    locomotion: Locomotion,
    mover: Target,
) -> bool {
    if !facing.is_diagonal() {
        return true;
    }
    let (dx, dy) = facing.offset();
    let side_a = Cell::new(from.x() + dx, from.y());
    let side_b = Cell::new(from.x(), from.y() + dy);
    terrain.is_passable(side_a, locomotion, mover) && terrain.is_passable(side_b, locomotion, mover)
}

/// Closest passable cell to `goal` within `radius` rings, row-major within a ring.
#[must_use]
pub fn nearest_passable(
    terrain: &Terrain,
    goal: Cell,
    locomotion: Locomotion,
    mover: Target,
    radius: i32,
) -> Option<Cell> {
    if !goal.is_valid() {
        return None;
    }
    (0..=radius).find_map(|r| ring(goal, r).find(|&cell| terrain.is_passable(cell, locomotion, mover)))
}

/// Find a path for `mover` from `start` to `goal`.
///
/// The start cell is never checked for passability (the mover stands
/// there). Identical inputs always return identical results.
#[must_use]
pub fn find_path(
    terrain: &Terrain,
    start: Cell,
    goal: Cell,
    locomotion: Locomotion,
    mover: Target,
    limits: &PathLimits,
) -> PathResult {
    if !start.is_valid() || !goal.is_valid() {
        return PathResult::unreachable(goal);
    }

    let mut status = PathStatus::Complete;
    let mut goal = goal;
    if goal != start && !terrain.is_passable(goal, locomotion, mover) {
        match nearest_passable(terrain, goal, locomotion, mover, limits.retarget_radius) {
            Some(cell) => {
                tracing::trace!(requested = %goal, retargeted = %cell, "goal impassable, retargeting");
                goal = cell;
                status = PathStatus::Retargeted;
            }
            None => return PathResult::unreachable(goal),
        }
    }

    if start == goal {
        return PathResult {
            cells: Vec::new(),
            status,
            iterations: 0,
            goal,
        };
    }

    let (reached, best, iterations) = search(terrain, start, goal, locomotion, mover, limits);
    let mut cells = match reached {
        Some(cells) => cells,
        None => {
            status = PathStatus::Partial;
            best
        }
    };

    if limits.smooth {
        cells = smooth_path(terrain, start, cells, locomotion, mover);
    }
    if cells.len() > limits.max_path_length {
        cells.truncate(limits.max_path_length);
        status = PathStatus::Partial;
    }

    tracing::trace!(%start, %goal, ?status, iterations, len = cells.len(), "path search");
    PathResult {
        cells,
        status,
        iterations,
        goal,
    }
}

/// Core A*. Returns the full path if the goal was reached, the path to the
/// best frontier node otherwise, and the number of expansions.
fn search(
    terrain: &Terrain,
    start: Cell,
    goal: Cell,
    locomotion: Locomotion,
    mover: Target,
    limits: &PathLimits,
) -> (Option<Vec<Cell>>, Vec<Cell>, u32) {
    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: Vec<i16> = vec![-1; MAP_CELL_TOTAL];
    let mut g_score: Vec<Fixed> = vec![Fixed::MAX; MAP_CELL_TOTAL];
    let mut closed: Vec<bool> = vec![false; MAP_CELL_TOTAL];

    let start_h = heuristic(start, goal, locomotion);
    let start_index = start.raw() as u16;
    g_score[usize::from(start_index)] = Fixed::ZERO;
    open_set.push(AStarNode {
        index: start_index,
        f_score: start_h,
        h_score: start_h,
    });

    // Frontier node closest to the goal: lowest h, then lowest g, then index.
    let mut best = (start_h, Fixed::ZERO, start_index);
    let mut iterations = 0u32;

    while let Some(current) = open_set.pop() {
        let current_index = usize::from(current.index);
        if closed[current_index] {
            continue;
        }
        if iterations >= limits.max_iterations {
            break;
        }
        closed[current_index] = true;
        iterations += 1;

        let cell = Cell::from_raw(current.index as i16);
        if cell == goal {
            return (Some(reconstruct_path(&came_from, cell)), Vec::new(), iterations);
        }

        let current_g = g_score[current_index];
        if (current.h_score, current_g, current.index) < best {
            best = (current.h_score, current_g, current.index);
        }

        for facing in Facing::ALL {
            let neighbor = cell.adjacent(facing);
            let Some(neighbor_index) = neighbor.index() else {
                continue;
            };
            if closed[neighbor_index] {
                continue;
            }
            let Some(cell_cost) = terrain.movement_cost(neighbor, locomotion, mover) else {
                continue;
            };
            if !is_diagonal_valid(terrain, cell, facing, locomotion, mover) {
                continue;
            }

            let move_cost = if facing.is_diagonal() {
                cell_cost * SQRT2
            } else {
                cell_cost
            };
            let tentative_g = current_g + move_cost;
            if tentative_g < g_score[neighbor_index] {
                came_from[neighbor_index] = cell.raw();
                g_score[neighbor_index] = tentative_g;
                let h = heuristic(neighbor, goal, locomotion);
                open_set.push(AStarNode {
                    index: neighbor.raw() as u16,
                    f_score: tentative_g + h,
                    h_score: h,
                });
            }
        }
    }

    let best_cell = Cell::from_raw(best.2 as i16);
    (None, reconstruct_path(&came_from, best_cell), iterations)
}

/// Walk `came_from` back from `end`; the start cell is left out.
fn reconstruct_path(came_from: &[i16], end: Cell) -> Vec<Cell> {
    let mut path = Vec::new();
    let mut current = end;
    while let Some(index) = current.index() {
        let previous = came_from[index];
        if previous < 0 {
            break;
        }
        path.push(current);
        current = Cell::from_raw(previous);
    }
    path.reverse();
    path
}

/// Drop waypoints that can be skipped in a straight line.
///
/// `path` excludes `start`; the result keeps the final cell.
#[must_use]
pub fn smooth_path(
    terrain: &Terrain,
    start: Cell,
    path: Vec<Cell>,
    locomotion: Locomotion,
    mover: Target,
) -> Vec<Cell> {
    if path.len() <= 1 {
        return path;
    }

    let mut smoothed = Vec::with_capacity(path.len());
    let mut anchor = start;
    let mut current_idx = 0;

    while current_idx < path.len() {
        let mut furthest_visible = current_idx;
        for check_idx in (current_idx + 1)..path.len() {
            if has_line_of_sight(terrain, anchor, path[check_idx], locomotion, mover) {
                furthest_visible = check_idx;
            }
        }
        smoothed.push(path[furthest_visible]);
        anchor = path[furthest_visible];
        current_idx = furthest_visible + 1;
    }

    smoothed
}

/// Bresenham walk between two cells; every visited cell must be passable
/// and diagonal steps may not cut corners.
fn has_line_of_sight(
    terrain: &Terrain,
    start: Cell,
    end: Cell,
    locomotion: Locomotion,
    mover: Target,
) -> bool {
    let (x1, y1) = (end.x(), end.y());
    let dx = (x1 - start.x()).abs();
    let dy = (y1 - start.y()).abs();
    let sx = if start.x() < x1 { 1 } else { -1 };
    let sy = if start.y() < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (start.x(), start.y());
    let passable = |x: i32, y: i32| terrain.is_passable(Cell::new(x, y), locomotion, mover);

    loop {
        if (x, y) != (start.x(), start.y()) && !passable(x, y) {
            return false;
        }
        if x == x1 && y == y1 {
            return true;
        }

        let e2 = 2 * err;
        if e2 > -dy && e2 < dx && (!passable(x + sx, y) || !passable(x, y + sy)) {
            return false;
        }
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Rtti;
    use crate::terrain::LandType;

    fn mover() -> Target {
        Target::new(Rtti::Vehicle, 0)
    }

    fn path_cost(start: Cell, cells: &[Cell]) -> Fixed {
        let mut previous = start;
        let mut total = Fixed::ZERO;
        for &cell in cells {
            let diagonal = previous.x() != cell.x() && previous.y() != cell.y();
            total += if diagonal { SQRT2 } else { Fixed::ONE };
            previous = cell;
        }
        total
    }

    fn assert_connected(start: Cell, cells: &[Cell]) {
        let mut previous = start;
        for &cell in cells {
            assert!(
                (previous.x() - cell.x()).abs() <= 1 && (previous.y() - cell.y()).abs() <= 1,
                "{previous} -> {cell} is not a single step"
            );
            previous = cell;
        }
    }

    #[test]
    fn test_straight_path() {
        let terrain = Terrain::new();
        let start = Cell::new(0, 0);
        let goal = Cell::new(5, 0);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Complete);
        assert_eq!(result.cells.len(), 5);
        assert_eq!(result.cells.last(), Some(&goal));
        assert!(!result.cells.contains(&start));
    }

    #[test]
    fn test_open_grid_cost_is_octile() {
        let terrain = Terrain::new();
        let start = Cell::new(3, 4);
        let goal = Cell::new(20, 11);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Complete);
        assert_eq!(path_cost(start, &result.cells), octile_distance(start, goal));
    }

    #[test]
    fn test_start_equals_goal() {
        let terrain = Terrain::new();
        let cell = Cell::new(9, 9);
        let result = find_path(&terrain, cell, cell, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Complete);
        assert!(result.cells.is_empty());
    }

    #[test]
    fn test_path_around_obstacle() {
        let mut terrain = Terrain::new();
        for y in 0..9 {
            terrain.set_land(Cell::new(5, y), LandType::Wall);
        }
        let start = Cell::new(2, 2);
        let goal = Cell::new(8, 2);
        let result = find_path(&terrain, start, goal, Locomotion::Track, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Complete);
        assert_connected(start, &result.cells);
        for cell in &result.cells {
            assert_ne!(terrain.land(*cell), LandType::Wall, "path crosses wall at {cell}");
        }
        assert!(result.cells.iter().any(|c| c.y() >= 9), "path goes around the wall end");
    }

    #[test]
    fn test_no_corner_cutting() {
        let mut terrain = Terrain::new();
        terrain.set_land(Cell::new(1, 0), LandType::Rock);
        let start = Cell::new(0, 0);
        let goal = Cell::new(1, 1);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Complete);
        assert_eq!(result.cells, vec![Cell::new(0, 1), Cell::new(1, 1)]);
    }

    #[test]
    fn test_impassable_goal_retargets() {
        let mut terrain = Terrain::new();
        let goal = Cell::new(10, 10);
        terrain.set_land(goal, LandType::Water);
        let start = Cell::new(10, 2);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Retargeted);
        assert_ne!(result.goal, goal);
        assert_eq!(result.cells.last(), Some(&result.goal));
        assert!(result.goal.distance(goal) <= 1);
    }

    #[test]
    fn test_occupied_goal_retargets_but_own_cell_does_not() {
        let mut terrain = Terrain::new();
        let goal = Cell::new(6, 6);
        let other = Target::new(Rtti::Infantry, 3);
        terrain.occupy(goal, other);
        let start = Cell::new(0, 6);
        let limits = PathLimits::default();

        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &limits);
        assert_eq!(result.status, PathStatus::Retargeted);

        let own = find_path(&terrain, start, goal, Locomotion::Foot, other, &limits);
        assert_eq!(own.status, PathStatus::Complete);
    }

    #[test]
    fn test_sealed_goal_returns_partial_path() {
        let mut terrain = Terrain::new();
        let goal = Cell::new(30, 30);
        for facing in Facing::ALL {
            terrain.set_land(goal.adjacent(facing), LandType::Rock);
        }
        let start = Cell::new(20, 30);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        assert_eq!(result.status, PathStatus::Partial);
        assert!(!result.cells.is_empty());
        let end = *result.cells.last().unwrap();
        assert!(end.distance(goal) <= 2, "partial path ends near the goal, got {end}");
        assert_connected(start, &result.cells);
    }

    #[test]
    fn test_iteration_cap_returns_partial_progress() {
        let terrain = Terrain::new();
        let limits = PathLimits {
            max_iterations: 10,
            ..PathLimits::default()
        };
        let start = Cell::new(0, 0);
        let goal = Cell::new(60, 60);
        let result = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &limits);
        assert_eq!(result.status, PathStatus::Partial);
        assert!(result.iterations <= 10);
        let end = *result.cells.last().unwrap();
        assert!(end.distance(goal) < start.distance(goal));
    }

    #[test]
    fn test_length_cap_truncates() {
        let terrain = Terrain::new();
        let limits = PathLimits {
            max_path_length: 4,
            ..PathLimits::default()
        };
        let result = find_path(&terrain, Cell::new(0, 0), Cell::new(20, 0), Locomotion::Foot, mover(), &limits);
        assert_eq!(result.status, PathStatus::Partial);
        assert_eq!(result.cells.len(), 4);
    }

    #[test]
    fn test_unreachable_without_passable_goal() {
        let mut terrain = Terrain::new();
        for y in 0..64 {
            for x in 40..64 {
                terrain.set_land(Cell::new(x, y), LandType::Water);
            }
        }
        let result = find_path(
            &terrain,
            Cell::new(0, 0),
            Cell::new(60, 30),
            Locomotion::Foot,
            mover(),
            &PathLimits::default(),
        );
        assert_eq!(result.status, PathStatus::Unreachable);
        assert!(result.cells.is_empty());
    }

    #[test]
    fn test_hover_crosses_water() {
        let mut terrain = Terrain::new();
        for y in 0..64 {
            terrain.set_land(Cell::new(10, y), LandType::Water);
        }
        let start = Cell::new(5, 5);
        let goal = Cell::new(15, 5);
        let limits = PathLimits::default();
        let foot = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &limits);
        assert_eq!(foot.status, PathStatus::Partial);
        let hover = find_path(&terrain, start, goal, Locomotion::Hover, mover(), &limits);
        assert_eq!(hover.status, PathStatus::Complete);
        assert_eq!(hover.cells.len(), 10);
    }

    #[test]
    fn test_roads_attract_wheels() {
        let mut terrain = Terrain::new();
        for x in 0..20 {
            terrain.set_land(Cell::new(x, 1), LandType::Road);
        }
        let result = find_path(
            &terrain,
            Cell::new(0, 0),
            Cell::new(19, 0),
            Locomotion::Wheel,
            mover(),
            &PathLimits::default(),
        );
        let on_road = result.cells.iter().filter(|c| terrain.land(**c) == LandType::Road).count();
        assert!(on_road > 10, "wheels should prefer the road, used {on_road} road cells");
    }

    #[test]
    fn test_determinism() {
        let mut terrain = Terrain::new();
        for y in 5..50 {
            terrain.set_land(Cell::new(25, y), LandType::Tree);
        }
        let limits = PathLimits::default();
        let first = find_path(&terrain, Cell::new(10, 20), Cell::new(40, 30), Locomotion::Foot, mover(), &limits);
        for _ in 0..10 {
            let again = find_path(&terrain, Cell::new(10, 20), Cell::new(40, 30), Locomotion::Foot, mover(), &limits);
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_smoothing_keeps_endpoints_and_line_of_sight() {
        let mut terrain = Terrain::new();
        for y in 0..9 {
            terrain.set_land(Cell::new(5, y), LandType::Wall);
        }
        let limits = PathLimits {
            smooth: true,
            ..PathLimits::default()
        };
        let start = Cell::new(2, 2);
        let goal = Cell::new(8, 2);
        let raw = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &PathLimits::default());
        let smooth = find_path(&terrain, start, goal, Locomotion::Foot, mover(), &limits);
        assert_eq!(smooth.cells.last(), Some(&goal));
        assert!(smooth.cells.len() < raw.cells.len());
        let mut anchor = start;
        for &cell in &smooth.cells {
            assert!(has_line_of_sight(&terrain, anchor, cell, Locomotion::Foot, mover()));
            anchor = cell;
        }
    }

    #[test]
    fn test_nearest_passable_prefers_inner_ring() {
        let mut terrain = Terrain::new();
        let center = Cell::new(10, 10);
        terrain.set_land(center, LandType::Rock);
        let found = nearest_passable(&terrain, center, Locomotion::Foot, mover(), 3).unwrap();
        assert_eq!(found, Cell::new(9, 9));
    }
}
