//! Driving a simulation from a scenario.

use std::collections::BTreeMap;

use serde::Serialize;

use rts_kernel::prelude::*;

use crate::scenario::{EntityKind, Scenario};
use crate::Result;

/// Per-tick output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tick just completed.
    pub tick: u64,
    /// State hash after the tick.
    pub state_hash: u64,
    /// Entities alive after the tick.
    pub entities: usize,
    /// Entities created this tick.
    pub spawned: usize,
    /// Entities removed this tick.
    pub destroyed: usize,
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Final tick.
    pub ticks: u64,
    /// State hash at the final tick.
    pub final_hash: u64,
    /// Entities alive at the end, per house.
    pub survivors: BTreeMap<u8, usize>,
    /// Entities removed over the run.
    pub destroyed: usize,
    /// Orders the kernel accepted.
    pub orders_applied: usize,
    /// Orders the kernel rejected (dead unit, bad cell and so on).
    pub orders_rejected: usize,
}

/// Runs a scenario against a fresh simulation, optionally recording a
/// replay of everything issued.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    simulation: Simulation,
    units: BTreeMap<String, Target>,
    replay: Option<Replay>,
    destroyed: usize,
    orders_applied: usize,
    orders_rejected: usize,
}

impl ScenarioRunner {
    /// Build the starting simulation: terrain, placements, initial missions.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario is invalid or a placement is refused.
    pub fn new(scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        let config = KernelConfig::with_seed(scenario.seed);
        let mut simulation = Simulation::with_terrain(&config, scenario.terrain()?);

        let mut units = BTreeMap::new();
        for placement in &scenario.units {
            let cell = Cell::new(placement.cell.0, placement.cell.1);
            let owner = placement.owner;
            let target = match placement.kind {
                EntityKind::Infantry(kind) => simulation.create_infantry(kind, owner, cell)?,
                EntityKind::Vehicle(kind) => simulation.create_vehicle(kind, owner, cell)?,
                EntityKind::Building(kind) => {
                    let building = simulation.create_building(kind, owner, cell)?;
                    if placement.built {
                        simulation
                            .world_mut()
                            .with_building(building, |b, world| b.enter_idle_mode(world));
                    }
                    building
                }
                EntityKind::Aircraft => simulation.create_aircraft(owner, cell)?,
            };
            if let Some(mission) = placement.mission {
                simulation.assign_mission(target, mission)?;
            }
            tracing::debug!(id = %placement.id, entity = %target, "placed");
            units.insert(placement.id.clone(), target);
        }

        tracing::info!(
            scenario = %scenario.name,
            seed = scenario.seed,
            units = units.len(),
            orders = scenario.orders.len(),
            "scenario ready"
        );
        Ok(Self {
            scenario,
            simulation,
            units,
            replay: None,
            destroyed: 0,
            orders_applied: 0,
            orders_rejected: 0,
        })
    }

    /// Start recording from the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    pub fn record(&mut self) -> Result<()> {
        self.replay = Some(Replay::new(self.scenario.name.clone(), &self.simulation)?);
        Ok(())
    }

    /// Target placed under a scenario id.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<Target> {
        self.units.get(id).copied()
    }

    /// The scenario being run.
    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// The simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Issue this tick's orders, then advance one tick.
    ///
    /// # Errors
    ///
    /// Returns an error only for orders naming unknown ids, which
    /// validation already rules out. Orders the kernel refuses are logged
    /// and counted.
    pub fn step(&mut self) -> Result<TickReport> {
        let now = self.simulation.get_tick();
        let orders = self
            .scenario
            .orders_at(now)
            .map(|o| o.to_order(|id| self.units.get(id).copied()))
            .collect::<Result<Vec<_>>>()?;

        for order in orders {
            if let Some(replay) = self.replay.as_mut() {
                replay.record_order(now, order);
            }
            match self.simulation.apply_order(&order) {
                Ok(()) => self.orders_applied += 1,
                Err(err) => {
                    tracing::warn!(tick = now, ?order, %err, "order rejected");
                    self.orders_rejected += 1;
                }
            }
        }

        let events = self.simulation.tick();
        self.destroyed += events.destroyed.len();
        Ok(TickReport {
            tick: self.simulation.get_tick(),
            state_hash: self.simulation.state_hash(),
            entities: self.simulation.world().pools.len(),
            spawned: events.spawned.len(),
            destroyed: events.destroyed.len(),
        })
    }

    /// Run `ticks` ticks, handing each report to `on_tick`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ScenarioRunner::step`] and `on_tick`.
    pub fn run(
        &mut self,
        ticks: u64,
        mut on_tick: impl FnMut(&TickReport) -> Result<()>,
    ) -> Result<RunSummary> {
        for _ in 0..ticks {
            let report = self.step()?;
            on_tick(&report)?;
        }
        let summary = self.summary();
        tracing::info!(
            scenario = %summary.scenario,
            tick = summary.ticks,
            hash = summary.final_hash,
            destroyed = summary.destroyed,
            "run complete"
        );
        Ok(summary)
    }

    /// Summary of the run so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let world = self.simulation.world();
        let mut survivors = BTreeMap::new();
        for target in world.pools.active_targets() {
            if !world.is_alive(target) || !target.rtti().is_techno() {
                continue;
            }
            if let Some(owner) = world.owner_of(target) {
                *survivors.entry(owner.0).or_insert(0) += 1;
            }
        }
        RunSummary {
            scenario: self.scenario.name.clone(),
            seed: self.scenario.seed,
            ticks: self.simulation.get_tick(),
            final_hash: self.simulation.state_hash(),
            survivors,
            destroyed: self.destroyed,
            orders_applied: self.orders_applied,
            orders_rejected: self.orders_rejected,
        }
    }

    /// Stop recording and return the finalized replay.
    pub fn finish_recording(&mut self) -> Option<Replay> {
        let mut replay = self.replay.take()?;
        replay.finalize(self.simulation.get_tick(), self.simulation.state_hash());
        Some(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScenarioOrder, TimedOrder, UnitPlacement};
    use crate::RunnerError;

    fn patrol() -> Scenario {
        Scenario {
            name: "Patrol".to_string(),
            seed: 3,
            ticks: 300,
            units: vec![
                UnitPlacement::new("scout", EntityKind::Vehicle(VehicleKind::Jeep), HouseId(1), 4, 4),
                UnitPlacement::new("tower", EntityKind::Building(BuildingKind::GuardTower), HouseId(2), 50, 40),
            ],
            orders: vec![
                TimedOrder {
                    tick: 0,
                    order: ScenarioOrder::Move {
                        unit: "scout".to_string(),
                        cell: (12, 4),
                    },
                },
                TimedOrder {
                    tick: 5,
                    order: ScenarioOrder::Move {
                        unit: "scout".to_string(),
                        cell: (-1, 4),
                    },
                },
            ],
            ..Scenario::default()
        }
    }

    #[test]
    fn test_places_units() {
        let runner = ScenarioRunner::new(patrol()).unwrap();
        let scout = runner.unit("scout").unwrap();
        assert_eq!(scout.rtti(), Rtti::Vehicle);
        assert_eq!(runner.unit("tower").unwrap().rtti(), Rtti::Building);
        assert!(runner.unit("nobody").is_none());
        assert_eq!(runner.simulation().world().pools.len(), 2);
    }

    #[test]
    fn test_blocked_placement_fails() {
        let mut scenario = patrol();
        scenario.units[1].cell = (4, 4);
        assert!(matches!(ScenarioRunner::new(scenario), Err(RunnerError::Kernel(_))));
    }

    #[test]
    fn test_run_counts_orders() {
        let mut runner = ScenarioRunner::new(patrol()).unwrap();
        let mut seen = 0;
        let summary = runner
            .run(20, |report| {
                seen += 1;
                assert_eq!(report.tick, seen);
                Ok(())
            })
            .unwrap();
        assert_eq!(summary.ticks, 20);
        assert_eq!(summary.orders_applied, 1);
        assert_eq!(summary.orders_rejected, 1);
        assert_eq!(summary.survivors.get(&1), Some(&1));
        assert_eq!(summary.survivors.get(&2), Some(&1));
    }

    #[test]
    fn test_runs_are_repeatable() {
        let a = ScenarioRunner::new(Scenario::skirmish()).unwrap().run(200, |_| Ok(())).unwrap();
        let b = ScenarioRunner::new(Scenario::skirmish()).unwrap().run(200, |_| Ok(())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_recording_verifies() {
        let mut runner = ScenarioRunner::new(patrol()).unwrap();
        runner.record().unwrap();
        runner.run(60, |_| Ok(())).unwrap();
        let replay = runner.finish_recording().unwrap();
        assert_eq!(replay.scenario_id, "Patrol");
        assert_eq!(replay.order_count(), 2);
        assert_eq!(replay.final_tick, 60);
        assert!(replay.verify().is_ok());
        assert!(runner.finish_recording().is_none());
    }
}
