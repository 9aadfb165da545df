//! The shipped scenario files load, run deterministically and record
//! replays that verify.

use std::path::PathBuf;

use rts_kernel::prelude::*;
use rts_runner::{Scenario, ScenarioRunner};
use rts_test_utils::determinism::verify_simulation_determinism;

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn load(name: &str) -> Scenario {
    Scenario::load(scenario_path(name)).unwrap()
}

#[test]
fn test_all_scenarios_load() {
    for name in ["skirmish.ron", "harvest.ron", "convoy.ron"] {
        let scenario = load(name);
        let runner = ScenarioRunner::new(scenario.clone()).unwrap();
        assert_eq!(runner.simulation().world().pools.len(), scenario.units.len());
    }
}

#[test]
fn test_skirmish_is_deterministic() {
    let scenario = load("skirmish.ron");
    let build = || ScenarioRunner::new(scenario.clone()).unwrap().simulation().clone();
    assert!(verify_simulation_determinism(build, 300));
}

#[test]
fn test_skirmish_has_casualties() {
    let mut runner = ScenarioRunner::new(load("skirmish.ron")).unwrap();
    let summary = runner.run(1800, |_| Ok(())).unwrap();
    assert!(summary.destroyed > 0);
}

#[test]
fn test_harvest_scenario_delivers() {
    let mut runner = ScenarioRunner::new(load("harvest.ron")).unwrap();
    let refinery = runner.unit("refinery").unwrap();
    let summary = runner.run(2400, |_| Ok(())).unwrap();

    let stock = runner
        .simulation()
        .world()
        .pools
        .buildings
        .resolve(refinery)
        .map_or(0, |b| b.data().stock);
    assert!(stock > 0);
    assert_eq!(summary.orders_applied, 2);

    // The yard rolled out its jeep.
    let jeeps = runner
        .simulation()
        .world()
        .pools
        .vehicles
        .iter()
        .filter(|(_, v)| v.kind() == VehicleKind::Jeep)
        .count();
    assert_eq!(jeeps, 1);
}

#[test]
fn test_convoy_unloads_passengers() {
    let mut runner = ScenarioRunner::new(load("convoy.ron")).unwrap();
    let apc = runner.unit("apc").unwrap();
    let riflemen = [runner.unit("rifle_1").unwrap(), runner.unit("rifle_2").unwrap()];

    runner.run(300, |_| Ok(())).unwrap();
    let aboard = runner
        .simulation()
        .world()
        .pools
        .vehicles
        .resolve(apc)
        .map_or(0, |v| v.data().passengers.len());
    assert_eq!(aboard, 2);
    for soldier in riflemen {
        assert!(!runner.simulation().world().is_targetable(soldier));
    }

    runner.run(700, |_| Ok(())).unwrap();
    for soldier in riflemen {
        assert!(runner.simulation().world().is_targetable(soldier));
    }
}

#[test]
fn test_record_and_verify_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("convoy.replay");

    let mut runner = ScenarioRunner::new(load("convoy.ron")).unwrap();
    runner.record().unwrap();
    runner.run(400, |_| Ok(())).unwrap();
    runner.finish_recording().unwrap().save(&path).unwrap();

    let replay = Replay::load(&path).unwrap();
    assert_eq!(replay.scenario_id, "Convoy");
    assert_eq!(replay.order_count(), 3);
    assert!(replay.verify().is_ok());
}
