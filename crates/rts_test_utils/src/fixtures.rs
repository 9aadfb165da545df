//! Test fixtures and helpers.
//!
//! Pre-built simulations and entity placements for consistent testing.
//! Helpers panic on bad placement; they are for tests only.

use fixed::types::I32F32;
use rts_kernel::prelude::*;

/// Player house used by fixtures.
pub const PLAYER: HouseId = HouseId(1);
/// Opposing house used by fixtures.
pub const ENEMY: HouseId = HouseId(2);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Empty simulation on an all-clear map.
#[must_use]
pub fn open_field(seed: u64) -> Simulation {
    Simulation::new(&KernelConfig::with_seed(seed))
}

/// Empty simulation on a map given as text rows.
///
/// # Panics
///
/// Panics if the map text is invalid.
#[must_use]
pub fn field_from_rows(seed: u64, rows: &[&str]) -> Simulation {
    let terrain = Terrain::from_rows(rows).expect("fixture map is valid");
    Simulation::with_terrain(&KernelConfig::with_seed(seed), terrain)
}

/// Place a soldier.
///
/// # Panics
///
/// Panics if the cell is unusable.
pub fn spawn_infantry(sim: &mut Simulation, kind: InfantryKind, owner: HouseId, x: i32, y: i32) -> Target {
    sim.create_infantry(kind, owner, Cell::new(x, y))
        .expect("fixture infantry placement")
}

/// Place a rifleman.
///
/// # Panics
///
/// Panics if the cell is unusable.
pub fn spawn_rifleman(sim: &mut Simulation, owner: HouseId, x: i32, y: i32) -> Target {
    spawn_infantry(sim, InfantryKind::Rifleman, owner, x, y)
}

/// Place a vehicle.
///
/// # Panics
///
/// Panics if the cell is unusable.
pub fn spawn_vehicle(sim: &mut Simulation, kind: VehicleKind, owner: HouseId, x: i32, y: i32) -> Target {
    sim.create_vehicle(kind, owner, Cell::new(x, y))
        .expect("fixture vehicle placement")
}

/// Place a tank.
///
/// # Panics
///
/// Panics if the cell is unusable.
pub fn spawn_tank(sim: &mut Simulation, owner: HouseId, x: i32, y: i32) -> Target {
    spawn_vehicle(sim, VehicleKind::Tank, owner, x, y)
}

/// Place a structure and run its construction to completion.
///
/// # Panics
///
/// Panics if the footprint is unusable.
pub fn spawn_building(sim: &mut Simulation, kind: BuildingKind, owner: HouseId, x: i32, y: i32) -> Target {
    let building = sim
        .create_building(kind, owner, Cell::new(x, y))
        .expect("fixture building placement");
    finish_construction(sim, building);
    building
}

/// Skip a building's construction phase.
///
/// # Panics
///
/// Panics if `building` is not a live building.
pub fn finish_construction(sim: &mut Simulation, building: Target) {
    sim.world_mut()
        .with_building(building, |b, world| b.enter_idle_mode(world))
        .expect("fixture building exists");
}

/// Advance `ticks` ticks, collecting every event.
pub fn run_ticks(sim: &mut Simulation, ticks: u64) -> TickEvents {
    let mut all = TickEvents::default();
    for _ in 0..ticks {
        let mut events = sim.tick();
        all.spawned.append(&mut events.spawned);
        all.destroyed.append(&mut events.destroyed);
    }
    all
}

/// Advance until `done` holds or `limit` ticks pass. Returns the number of
/// ticks run, or `None` on timeout.
pub fn run_until(sim: &mut Simulation, limit: u64, mut done: impl FnMut(&Simulation) -> bool) -> Option<u64> {
    for n in 0..limit {
        if done(sim) {
            return Some(n);
        }
        sim.tick();
    }
    done(sim).then_some(limit)
}

/// Current mission of a mission-bearing entity.
#[must_use]
pub fn mission_of(sim: &Simulation, unit: Target) -> Option<Mission> {
    sim.world().pools.techno(unit).map(|e| e.mission().current())
}

/// Cell an entity stands in.
#[must_use]
pub fn cell_of(sim: &Simulation, unit: Target) -> Option<Cell> {
    sim.world().coord_of(unit).map(Coordinate::to_cell)
}

/// Two squads facing each other across open ground: tanks and riflemen on
/// each side, all hunting.
#[must_use]
pub fn battle_scenario(seed: u64) -> Simulation {
    let mut sim = open_field(seed);
    for i in 0..4 {
        let a = spawn_tank(&mut sim, PLAYER, 4, 10 + i * 2);
        let b = spawn_tank(&mut sim, ENEMY, 40, 10 + i * 2);
        let c = spawn_rifleman(&mut sim, PLAYER, 6, 11 + i * 2);
        let d = spawn_rifleman(&mut sim, ENEMY, 38, 11 + i * 2);
        for unit in [a, b, c, d] {
            sim.assign_mission(unit, Mission::Hunt).expect("fixture unit exists");
        }
    }
    sim
}

/// A harvester, a refinery and a tiberium field.
///
/// Returns the simulation, the harvester and the refinery.
#[must_use]
pub fn harvest_scenario(seed: u64) -> (Simulation, Target, Target) {
    let mut sim = open_field(seed);
    for y in 20..24 {
        for x in 20..24 {
            sim.world_mut().terrain.set_tiberium(Cell::new(x, y), 40);
        }
    }
    let refinery = spawn_building(&mut sim, BuildingKind::Refinery, PLAYER, 8, 8);
    let harvester = spawn_vehicle(&mut sim, VehicleKind::Harvester, PLAYER, 12, 12);
    sim.assign_mission(harvester, Mission::Harvest)
        .expect("fixture harvester exists");
    (sim, harvester, refinery)
}
