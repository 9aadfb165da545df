//! End-to-end behaviour of the tick driver: missions, docking, production,
//! combat and persistence.

use rts_kernel::prelude::*;
use rts_test_utils::determinism::{
    find_first_divergence, run_parallel_simulations_scoped, verify_save_load_determinism,
};
use rts_test_utils::fixtures::*;

fn refinery_stock(sim: &Simulation, refinery: Target) -> u32 {
    sim.world()
        .pools
        .buildings
        .resolve(refinery)
        .map_or(0, |b| b.data().stock)
}

fn passengers(sim: &Simulation, apc: Target) -> usize {
    sim.world()
        .pools
        .vehicles
        .resolve(apc)
        .map_or(0, |v| v.data().passengers.len())
}

// =============================================================================
// Movement
// =============================================================================

#[test]
fn test_move_order_arrives_and_guards() {
    let mut sim = open_field(1);
    let soldier = spawn_rifleman(&mut sim, PLAYER, 2, 2);
    assert_eq!(mission_of(&sim, soldier), Some(Mission::Guard));

    sim.order_move(soldier, Cell::new(9, 5)).unwrap();
    let ticks = run_until(&mut sim, 1200, |s| cell_of(s, soldier) == Some(Cell::new(9, 5)));
    assert!(ticks.is_some(), "rifleman never arrived");

    run_ticks(&mut sim, 60);
    assert_eq!(cell_of(&sim, soldier), Some(Cell::new(9, 5)));
    assert_eq!(mission_of(&sim, soldier), Some(Mission::Guard));
    assert_eq!(sim.world().terrain.occupier(Cell::new(9, 5)), soldier);
    assert_eq!(sim.world().terrain.occupier(Cell::new(2, 2)), Target::NONE);
}

#[test]
fn test_remaining_path_shrinks() {
    let mut sim = open_field(2);
    let soldier = spawn_rifleman(&mut sim, PLAYER, 3, 3);
    assert_eq!(soldier.index(), 0);
    sim.order_move(soldier, Cell::new(11, 7)).unwrap();

    let remaining = |s: &Simulation| {
        s.world()
            .pools
            .infantry
            .resolve(soldier)
            .map_or(0, |i| i.foot().path.len())
    };
    let mut previous: Option<usize> = None;
    for _ in 0..1200 {
        sim.tick();
        let now = remaining(&sim);
        if let Some(before) = previous {
            assert!(now <= before, "path grew from {before} to {now}");
        }
        if now > 0 || previous.is_some() {
            previous = Some(now);
        }
        if cell_of(&sim, soldier) == Some(Cell::new(11, 7)) {
            break;
        }
    }
    assert_eq!(previous, Some(0));
    assert_eq!(cell_of(&sim, soldier), Some(Cell::new(11, 7)));
}

#[test]
fn test_move_around_wall() {
    let mut sim = field_from_rows(
        3,
        &[
            "..........",
            "....#.....",
            "....#.....",
            "....#.....",
            "..........",
        ],
    );
    let tank = spawn_tank(&mut sim, PLAYER, 2, 2);
    sim.order_move(tank, Cell::new(7, 2)).unwrap();
    let ticks = run_until(&mut sim, 1500, |s| cell_of(s, tank) == Some(Cell::new(7, 2)));
    assert!(ticks.is_some(), "tank never got around the wall");
}

#[test]
fn test_move_rejects_invalid_cell() {
    let mut sim = open_field(1);
    let soldier = spawn_rifleman(&mut sim, PLAYER, 2, 2);
    assert!(matches!(
        sim.order_move(soldier, Cell::INVALID),
        Err(KernelError::InvalidCell { .. })
    ));
    assert_eq!(mission_of(&sim, soldier), Some(Mission::Guard));
}

// =============================================================================
// Harvesting
// =============================================================================

#[test]
fn test_harvester_delivers_to_refinery() {
    let (mut sim, harvester, refinery) = harvest_scenario(5);
    assert_eq!(refinery_stock(&sim, refinery), 0);

    let ticks = run_until(&mut sim, 3000, |s| refinery_stock(s, refinery) > 0);
    assert!(ticks.is_some(), "no load was ever delivered");
    assert_eq!(refinery_stock(&sim, refinery), 24);

    // Unloading closes the link on both sides.
    run_ticks(&mut sim, 2);
    assert_eq!(sim.world().contact_of(refinery), Some(Target::NONE));
    assert_eq!(mission_of(&sim, harvester), Some(Mission::Harvest));
}

#[test]
fn test_harvest_keeps_going() {
    let (mut sim, _, refinery) = harvest_scenario(6);
    let ticks = run_until(&mut sim, 6000, |s| refinery_stock(s, refinery) >= 48);
    assert!(ticks.is_some(), "second load never arrived");
}

#[test]
fn test_destroying_refinery_breaks_link() {
    let (mut sim, harvester, refinery) = harvest_scenario(7);
    let linked = run_until(&mut sim, 3000, |s| {
        s.world().contact_of(harvester) == Some(refinery)
    });
    assert!(linked.is_some(), "harvester never called the refinery");

    sim.destroy(refinery).unwrap();
    assert!(!sim.world().is_alive(refinery));
    assert_eq!(sim.world().contact_of(harvester), Some(Target::NONE));

    // With no refinery left the harvester gives up instead of spinning.
    run_ticks(&mut sim, 300);
    assert!(sim.world().is_alive(harvester));
    assert_eq!(sim.world().contact_of(harvester), Some(Target::NONE));
}

// =============================================================================
// Transports and service depots
// =============================================================================

#[test]
fn test_infantry_boards_and_leaves_apc() {
    let mut sim = open_field(11);
    let apc = spawn_vehicle(&mut sim, VehicleKind::Apc, PLAYER, 12, 10);
    let soldier = spawn_rifleman(&mut sim, PLAYER, 6, 10);

    sim.order_enter(soldier, apc).unwrap();
    let boarded = run_until(&mut sim, 1500, |s| passengers(s, apc) == 1);
    assert!(boarded.is_some(), "rifleman never boarded");
    run_ticks(&mut sim, 1);
    assert!(!sim.world().is_targetable(soldier));
    assert!(cell_of(&sim, soldier).is_some());

    sim.assign_mission(apc, Mission::Unload).unwrap();
    let unloaded = run_until(&mut sim, 300, |s| passengers(s, apc) == 0);
    assert!(unloaded.is_some(), "passenger never got out");
    run_ticks(&mut sim, 5);
    assert!(sim.world().is_targetable(soldier));
    let cell = cell_of(&sim, soldier).unwrap();
    assert_eq!(cell.distance(Cell::new(12, 10)), 1);
    assert_eq!(mission_of(&sim, soldier), Some(Mission::Guard));
}

#[test]
fn test_destroying_apc_kills_passengers() {
    let mut sim = open_field(12);
    let apc = spawn_vehicle(&mut sim, VehicleKind::Apc, PLAYER, 12, 10);
    let soldier = spawn_rifleman(&mut sim, PLAYER, 10, 10);
    sim.order_enter(soldier, apc).unwrap();
    assert!(run_until(&mut sim, 900, |s| passengers(s, apc) == 1).is_some());

    sim.destroy(apc).unwrap();
    run_ticks(&mut sim, 1);
    assert!(!sim.world().is_alive(apc));
    assert!(!sim.world().is_alive(soldier));
}

#[test]
fn test_depot_repairs_vehicle() {
    let mut sim = open_field(13);
    let depot = spawn_building(&mut sim, BuildingKind::RepairDepot, PLAYER, 20, 20);
    let tank = spawn_tank(&mut sim, PLAYER, 12, 20);
    let full = VehicleKind::Tank.strength();

    sim.world_mut()
        .with_techno(tank, |unit, world| unit.take_damage(world, 120, Target::NONE))
        .unwrap();
    let damaged = sim.world().strength_of(tank).unwrap();
    assert!(damaged < full);

    sim.order_enter(tank, depot).unwrap();
    let repaired = run_until(&mut sim, 4000, |s| s.world().strength_of(tank) == Some(full));
    assert!(repaired.is_some(), "tank was never repaired");

    // Service ends with the link closed and the tank untethered.
    run_ticks(&mut sim, 60);
    assert_eq!(sim.world().contact_of(depot), Some(Target::NONE));
    assert_eq!(sim.world().contact_of(tank), Some(Target::NONE));
}

// =============================================================================
// Production
// =============================================================================

#[test]
fn test_construction_yard_produces_vehicle() {
    let mut sim = open_field(21);
    let yard = spawn_building(&mut sim, BuildingKind::ConstructionYard, PLAYER, 20, 20);

    assert!(sim.order_production(yard, VehicleKind::Jeep).unwrap());
    assert!(!sim.order_production(yard, VehicleKind::Tank).unwrap());

    let built = run_until(&mut sim, 200, |s| s.world().pools.vehicles.len() == 1);
    assert!(built.is_some(), "jeep never rolled out");

    let (_, jeep) = sim.world().pools.vehicles.iter().next().unwrap();
    assert_eq!(jeep.kind(), VehicleKind::Jeep);
    assert_eq!(jeep.owner(), PLAYER);

    // The yard is free again.
    assert!(sim.order_production(yard, VehicleKind::Tank).unwrap());
}

#[test]
fn test_only_yards_produce() {
    let mut sim = open_field(22);
    let refinery = spawn_building(&mut sim, BuildingKind::Refinery, PLAYER, 8, 8);
    assert!(!sim.order_production(refinery, VehicleKind::Jeep).unwrap());
    let soldier = spawn_rifleman(&mut sim, PLAYER, 2, 2);
    assert!(sim.order_production(soldier, VehicleKind::Jeep).is_err());
}

// =============================================================================
// Combat
// =============================================================================

#[test]
fn test_attack_order_kills_target() {
    let mut sim = open_field(31);
    let tank = spawn_tank(&mut sim, PLAYER, 10, 10);
    let victim = spawn_rifleman(&mut sim, ENEMY, 14, 10);

    sim.order_attack(tank, victim).unwrap();
    let dead = run_until(&mut sim, 1500, |s| !s.world().is_alive(victim));
    assert!(dead.is_some(), "target survived");

    run_ticks(&mut sim, 30);
    assert!(sim.world().is_alive(tank));
    assert_eq!(sim.world().terrain.occupier(Cell::new(14, 10)), Target::NONE);
}

#[test]
fn test_stale_target_is_not_resolved() {
    let mut sim = open_field(32);
    let first = spawn_rifleman(&mut sim, ENEMY, 14, 10);
    sim.destroy(first).unwrap();
    let second = spawn_rifleman(&mut sim, ENEMY, 15, 10);

    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert!(!sim.world().is_alive(first));
    assert!(sim.world().is_alive(second));

    let tank = spawn_tank(&mut sim, PLAYER, 10, 10);
    assert!(sim.order_attack(tank, first).is_err());
}

#[test]
fn test_battle_produces_casualties() {
    let mut sim = battle_scenario(41);
    let units = sim.world().pools.len();
    let events = run_ticks(&mut sim, 2500);
    assert!(!events.destroyed.is_empty());
    assert!(sim.world().pools.vehicles.len() + sim.world().pools.infantry.len() < units);
}

// =============================================================================
// Determinism and persistence
// =============================================================================

#[test]
fn test_battle_is_deterministic() {
    assert_eq!(find_first_divergence(|| battle_scenario(42), 400), None);
}

#[test]
fn test_battle_deterministic_across_threads() {
    run_parallel_simulations_scoped(|| battle_scenario(43), 4, 300).assert_deterministic();
}

#[test]
fn test_harvest_save_load_continues_identically() {
    assert!(verify_save_load_determinism(|| harvest_scenario(44).0, 250, 400));
}

#[test]
fn test_battle_save_load_continues_identically() {
    assert!(verify_save_load_determinism(|| battle_scenario(45), 150, 300));
}

#[test]
fn test_seeds_diverge() {
    let mut a = battle_scenario(1);
    let mut b = battle_scenario(2);
    run_ticks(&mut a, 200);
    run_ticks(&mut b, 200);
    assert_ne!(a.state_hash(), b.state_hash());
}

#[test]
fn test_replay_of_recorded_game_verifies() {
    let mut sim = open_field(50);
    let tank = spawn_tank(&mut sim, PLAYER, 4, 4);
    let victim = spawn_rifleman(&mut sim, ENEMY, 20, 6);
    let mut replay = Replay::new("integration", &sim).unwrap();

    let orders = [
        (0, Order::Move { unit: tank, cell: Cell::new(14, 6) }),
        (90, Order::Attack { unit: tank, victim }),
        (400, Order::Mission { unit: tank, mission: Mission::Guard }),
    ];
    for tick in 0..600 {
        for (at, order) in &orders {
            if *at == tick {
                let _ = sim.apply_order(order);
                replay.record_order(tick, *order);
            }
        }
        sim.tick();
    }
    replay.finalize(sim.get_tick(), sim.state_hash());

    assert!(replay.verify().is_ok());
}
