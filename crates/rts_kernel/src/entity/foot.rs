//! Mobile layer: path following plus the mission behaviour shared by
//! every unit that moves.
//!
//! Movement is cell to cell along the path handed back by the
//! pathfinder. A unit reserves the next cell before stepping toward it
//! and swaps occupancy when its coordinate crosses into the new cell, so
//! two ground units never stand in the same cell.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Facing, CELL_LEPTON_W};
use crate::entity::techno::{find_threat, CombatObject};
use crate::entity::clear_refs;
use crate::mission::{Mission, IDLE_DELAY, IMMEDIATE_DELAY, SCAN_DELAY, TICKS_PER_SECOND};
use crate::pathfinding::{PathResult, PathStatus};
use crate::radio::RadioMessage;
use crate::target::Target;
use crate::terrain::Locomotion;
use crate::world::World;

/// Re-poll interval while travelling.
pub const MOVE_DELAY: u32 = 3;
/// Ticks a unit waits at a blocked cell before dropping its path.
pub const BLOCKED_LIMIT: u32 = 8;
/// Failed or empty path requests before a destination is abandoned.
pub const MAX_PATH_FAILURES: u32 = 5;
/// How far a guarding unit will chase from its post, in leptons.
pub const GUARD_AREA_RADIUS: i32 = 6 * CELL_LEPTON_W;
/// How far a retreating unit falls back, in leptons.
pub const RETREAT_DISTANCE: i32 = 6 * CELL_LEPTON_W;
/// Polls a timed hunt waits before hunting.
pub const TIMED_HUNT_POLLS: i32 = 10;

/// Mobile-layer state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FootData {
    /// How this unit moves.
    pub locomotion: Locomotion,
    /// Leptons per tick.
    pub speed: i32,
    /// Where the current mission wants to go (cell or entity).
    pub navcom: Target,
    /// Remaining cells to walk, next cell first.
    pub path: VecDeque<Cell>,
    /// Ticks spent waiting for a blocked cell.
    pub blocked_ticks: u32,
    /// Consecutive path requests that made no progress.
    pub path_failures: u32,
    /// Post for area guard and retreat.
    pub home: Cell,
    /// Cell a docking partner asked us to use.
    pub rendezvous: Cell,
}

impl FootData {
    /// Stationary state.
    #[must_use]
    pub fn new(locomotion: Locomotion, speed: i32) -> Self {
        Self {
            locomotion,
            speed,
            navcom: Target::NONE,
            path: VecDeque::new(),
            blocked_ticks: 0,
            path_failures: 0,
            home: Cell::INVALID,
            rendezvous: Cell::INVALID,
        }
    }

    pub(crate) fn detach(&mut self, target: Target) {
        clear_refs(target, &mut [&mut self.navcom]);
    }
}

/// Mobile layer.
pub trait MobileObject: CombatObject {
    /// Mobile state.
    fn foot(&self) -> &FootData;
    /// Mobile state, mutably.
    fn foot_mut(&mut self) -> &mut FootData;

    /// Mobile-layer per-tick step: everything below, then one movement step.
    fn foot_ai(&mut self, world: &mut World) {
        self.techno_ai(world);
        if self.is_targetable() {
            self.follow_path(world);
        }
    }

    /// Whether a path is being followed.
    fn is_moving(&self) -> bool {
        !self.foot().path.is_empty()
    }

    /// Advance one tick along the path.
    fn follow_path(&mut self, world: &mut World) {
        let Some(&next) = self.foot().path.front() else {
            return;
        };
        if self.radio().tethered {
            return;
        }
        let me = self.as_target();
        let locomotion = self.foot().locomotion;
        let ground = locomotion.occupies_cells();
        let here = self.cell();

        if ground && next != here && !world.terrain.reserve(next, me) {
            let foot = self.foot_mut();
            foot.blocked_ticks += 1;
            if foot.blocked_ticks >= BLOCKED_LIMIT {
                tracing::debug!(entity = %me, %next, "path blocked, dropping it");
                self.stop_moving(world);
            }
            return;
        }
        self.foot_mut().blocked_ticks = 0;

        let goal = next.center();
        let step = self.coord().step_toward(goal, self.foot().speed);
        if ground && step.to_cell() != here {
            // Occupancy moves to the reserved cell as soon as we leave ours.
            world.terrain.vacate(here, me);
            world.terrain.occupy(next, me);
        }

        let data = self.object_mut();
        data.facing = data.coord.direction(goal);
        data.coord = step;
        if step == goal {
            self.foot_mut().path.pop_front();
            world.terrain.unreserve(next, me);
        }
    }

    /// Drop the current path and any reservation ahead.
    fn stop_moving(&mut self, world: &mut World) {
        let me = self.object().handle.target(self.rtti());
        let here = self.cell();
        for cell in self.foot_mut().path.drain(..) {
            if cell != here {
                world.terrain.unreserve(cell, me);
            }
        }
        self.foot_mut().blocked_ticks = 0;
    }

    /// Request a fresh path to `dest` and start following it.
    fn plan_route(&mut self, world: &mut World, dest: Cell) -> PathResult {
        self.stop_moving(world);
        let me = self.as_target();
        let result = world.request_path(self.cell(), dest, self.foot().locomotion, me);
        let foot = self.foot_mut();
        foot.path = result.cells.iter().copied().collect();
        if result.cells.is_empty() && result.goal != self.cell() {
            self.foot_mut().path_failures += 1;
        } else if result.status == PathStatus::Complete || !result.cells.is_empty() {
            self.foot_mut().path_failures = 0;
        }
        result
    }

    /// Hook run when a docking partner accepts us.
    fn docked(&mut self, _world: &mut World) {}
}

/// Cell a navigation target points at, following entities.
pub fn navcom_cell<U: MobileObject + ?Sized>(unit: &U, world: &World) -> Cell {
    let navcom = unit.foot().navcom;
    if navcom.is_cell() {
        return navcom.as_cell();
    }
    world
        .coord_of(navcom)
        .map_or(Cell::INVALID, |coord| coord.to_cell())
}

/// Give up on the current destination and go idle.
fn abandon<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    unit.stop_moving(world);
    let foot = unit.foot_mut();
    foot.navcom = Target::NONE;
    foot.path_failures = 0;
    unit.enter_idle_mode(world);
    IMMEDIATE_DELAY
}

/// Travel toward the navigation target; idle on arrival.
pub fn move_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    let dest = navcom_cell(unit, world);
    if !dest.is_valid() {
        return abandon(unit, world);
    }
    if unit.is_moving() {
        return MOVE_DELAY;
    }
    if unit.cell() == dest {
        return abandon(unit, world);
    }

    let result = unit.plan_route(world, dest);
    if result.status == PathStatus::Unreachable || unit.foot().path_failures > MAX_PATH_FAILURES {
        tracing::debug!(entity = %unit.as_target(), %dest, "destination unreachable");
        return abandon(unit, world);
    }
    if result.cells.is_empty() && result.goal == unit.cell() {
        // Already as close as the terrain allows.
        return abandon(unit, world);
    }
    MOVE_DELAY
}

/// Close on a target and fire when in range. Returns `None` once the
/// target is gone or cannot be reached.
fn engage<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World, target: Target) -> Option<u32> {
    if !world.is_targetable(target) || unit.combat().weapon.is_none() {
        return None;
    }
    if unit.in_range(world, target) {
        unit.stop_moving(world);
        unit.fire_at(world, target);
        return Some(unit.combat().arm.clamp(IMMEDIATE_DELAY, SCAN_DELAY));
    }

    let goal = world.coord_of(target)?.to_cell();
    let stale = unit
        .foot()
        .path
        .back()
        .map_or(true, |end| end.distance(goal) > 2);
    if stale {
        let result = unit.plan_route(world, goal);
        if result.status == PathStatus::Unreachable || unit.foot().path_failures > MAX_PATH_FAILURES {
            return None;
        }
    }
    Some(MOVE_DELAY)
}

/// Attack the current target; resume the suspended mission when done.
pub fn attack_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    let target = unit.combat().tarcom;
    if let Some(delay) = engage(unit, world, target) {
        return delay;
    }
    unit.assign_target(Target::NONE);
    unit.stop_moving(world);
    unit.foot_mut().path_failures = 0;
    if !unit.restore_mission() {
        unit.enter_idle_mode(world);
    }
    IMMEDIATE_DELAY
}

/// Watch for enemies; break off to attack anything that comes close.
pub fn guard_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    if unit.combat().weapon.is_none() {
        return IDLE_DELAY;
    }
    let threat = find_threat(unit, world);
    if threat.is_valid() {
        unit.assign_target(threat);
        unit.override_mission(Mission::Attack);
        return IMMEDIATE_DELAY;
    }
    SCAN_DELAY + world.rng.below(4)
}

/// Guard a post, chasing only within [`GUARD_AREA_RADIUS`] of it.
pub fn guard_area_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    if unit.mission().status == 0 {
        unit.foot_mut().home = unit.cell();
        unit.mission_mut().status = 1;
    }
    let home = unit.foot().home;
    let post = home.center();

    let mut target = unit.combat().tarcom;
    if !world.is_targetable(target) {
        target = find_threat(unit, world);
    }
    let near_post = world
        .coord_of(target)
        .is_some_and(|at| at.distance(post) <= GUARD_AREA_RADIUS);
    if target.is_valid() && near_post {
        unit.assign_target(target);
        if let Some(delay) = engage(unit, world, target) {
            return delay;
        }
    }

    unit.assign_target(Target::NONE);
    if unit.cell() != home && !unit.is_moving() {
        unit.plan_route(world, home);
    }
    SCAN_DELAY
}

/// Hunt down the nearest enemy anywhere on the map.
pub fn hunt_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    let mut target = unit.combat().tarcom;
    if !world.is_targetable(target) {
        target = world.nearest_enemy(unit.coord(), unit.owner(), None);
        if !target.is_valid() {
            unit.stop_moving(world);
            unit.enter_idle_mode(world);
            return SCAN_DELAY;
        }
        unit.assign_target(target);
    }
    engage(unit, world, target).unwrap_or_else(|| {
        unit.assign_target(Target::NONE);
        unit.foot_mut().path_failures = 0;
        SCAN_DELAY
    })
}

/// Hold position and shoot at anything in range.
pub fn sticky_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    unit.stop_moving(world);
    crate::entity::techno::engage_in_place(unit, world)
}

/// Stay hidden until an enemy comes within scan range, then hunt.
pub fn ambush_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    let threat = find_threat(unit, world);
    if threat.is_valid() {
        unit.assign_target(threat);
        unit.assign_mission(Mission::Hunt);
        return IMMEDIATE_DELAY;
    }
    SCAN_DELAY
}

/// Count down, then hunt.
pub fn timed_hunt_mission<U: MobileObject + ?Sized>(unit: &mut U, _world: &mut World) -> u32 {
    let status = &mut unit.mission_mut().status;
    if *status == 0 {
        *status = TIMED_HUNT_POLLS;
    }
    *status -= 1;
    if *status <= 0 {
        unit.assign_mission(Mission::Hunt);
        return IMMEDIATE_DELAY;
    }
    TICKS_PER_SECOND
}

/// Fall back away from the nearest enemy, then guard.
pub fn retreat_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    let here = unit.coord();
    let range = unit.scan_range().max(RETREAT_DISTANCE);
    let enemy = world.nearest_enemy(here, unit.owner(), Some(range));
    let Some(danger) = world.coord_of(enemy) else {
        unit.enter_idle_mode(world);
        return IMMEDIATE_DELAY;
    };
    let away_x = (here.x() - danger.x()).signum();
    let away_y = (here.y() - danger.y()).signum();
    let (away_x, away_y) = if away_x == 0 && away_y == 0 {
        (0, 1)
    } else {
        (away_x, away_y)
    };
    let fallback = here.offset(away_x * RETREAT_DISTANCE, away_y * RETREAT_DISTANCE);
    unit.assign_target(Target::NONE);
    unit.foot_mut().navcom = Target::from_coord(fallback);
    unit.assign_mission(Mission::Move);
    IMMEDIATE_DELAY
}

/// Halt and forget all orders.
pub fn stop_mission<U: MobileObject + ?Sized>(unit: &mut U, world: &mut World) -> u32 {
    unit.stop_moving(world);
    unit.assign_target(Target::NONE);
    unit.foot_mut().navcom = Target::NONE;
    IDLE_DELAY
}

/// Progress of a docking approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockStep {
    /// Still working; poll again after this many ticks.
    Pending(u32),
    /// The host acknowledged the dock message.
    Docked,
    /// The host is busy; try again later.
    Refused,
    /// The host is gone, unreachable, or turned us away.
    Failed,
}

/// Open a link with `host`, move to where it wants us, and send `dock`.
///
/// The approach cell is the host's service cell when it has one,
/// otherwise any cell next to it. A [`RadioMessage::NeedToMove`] reply
/// redirects the approach to the cell in the parameter.
pub fn approach_and_dock<U: MobileObject + ?Sized>(
    unit: &mut U,
    world: &mut World,
    host: Target,
    dock: RadioMessage,
) -> DockStep {
    if !world.is_targetable(host) {
        unit.release_link(world);
        return DockStep::Failed;
    }

    if unit.contact() != host {
        let dock_cell = world.service_cell(host).unwrap_or(Cell::INVALID);
        unit.foot_mut().rendezvous = dock_cell;
        unit.foot_mut().path_failures = 0;
        if unit.transmit(world, RadioMessage::Hello, &mut 0, host) != RadioMessage::Roger {
            return DockStep::Refused;
        }
        if host.rtti().is_techno() && world.service_cell(host).is_none() {
            unit.transmit(world, RadioMessage::HoldStill, &mut 0, host);
        }
    }

    let here = unit.cell();
    let rendezvous = unit.foot().rendezvous;
    let (goal, arrived) = if rendezvous.is_valid() {
        (rendezvous, here == rendezvous)
    } else {
        let host_cell = world.coord_of(host).map_or(Cell::INVALID, |c| c.to_cell());
        let adjacent = Facing::ALL.iter().any(|&f| host_cell.adjacent(f) == here);
        (host_cell, adjacent)
    };

    if unit.is_moving() {
        return DockStep::Pending(MOVE_DELAY);
    }
    if !arrived {
        let result = unit.plan_route(world, goal);
        if result.status == PathStatus::Unreachable || unit.foot().path_failures > MAX_PATH_FAILURES {
            unit.release_link(world);
            return DockStep::Failed;
        }
        return DockStep::Pending(MOVE_DELAY);
    }

    let mut param = i32::from(here.raw());
    match unit.transmit(world, dock, &mut param, host) {
        RadioMessage::Roger => {
            unit.foot_mut().path_failures = 0;
            unit.docked(world);
            DockStep::Docked
        }
        RadioMessage::NeedToMove => {
            let cell = i16::try_from(param).map_or(Cell::INVALID, Cell::from_raw);
            unit.foot_mut().rendezvous = cell;
            DockStep::Pending(IMMEDIATE_DELAY)
        }
        _ => {
            unit.release_link(world);
            DockStep::Failed
        }
    }
}
