//! Scenario loading and validation.
//!
//! A scenario defines the starting state for a headless run: the map as
//! text rows, the units and structures placed on it, and orders to issue
//! at given ticks. Units are named by string ids so orders can refer to
//! them before any [`Target`] exists.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rts_kernel::prelude::*;

use crate::{Result, RunnerError};

/// What to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A soldier.
    Infantry(InfantryKind),
    /// A ground vehicle.
    Vehicle(VehicleKind),
    /// A structure; its cell is the top-left of the footprint.
    Building(BuildingKind),
    /// An aircraft.
    Aircraft,
}

/// One starting entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Name used by orders.
    pub id: String,
    /// Entity type.
    pub kind: EntityKind,
    /// Owning house.
    pub owner: HouseId,
    /// Cell (x, y).
    pub cell: (i32, i32),
    /// Mission assigned after placement.
    #[serde(default)]
    pub mission: Option<Mission>,
    /// Buildings only: start finished instead of under construction.
    #[serde(default = "default_built")]
    pub built: bool,
}

const fn default_built() -> bool {
    true
}

impl UnitPlacement {
    /// Placement with no initial mission.
    #[must_use]
    pub fn new(id: &str, kind: EntityKind, owner: HouseId, x: i32, y: i32) -> Self {
        Self {
            id: id.to_string(),
            kind,
            owner,
            cell: (x, y),
            mission: None,
            built: true,
        }
    }

    /// Assign a mission after placement.
    #[must_use]
    pub fn with_mission(mut self, mission: Mission) -> Self {
        self.mission = Some(mission);
        self
    }
}

/// An order naming units by scenario id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioOrder {
    /// Move to a cell.
    Move {
        /// Unit id.
        unit: String,
        /// Destination cell.
        cell: (i32, i32),
    },
    /// Attack another unit.
    Attack {
        /// Unit id.
        unit: String,
        /// Victim id.
        victim: String,
    },
    /// Board a transport or dock at a structure.
    Enter {
        /// Unit id.
        unit: String,
        /// Host id.
        host: String,
    },
    /// Queue a mission.
    Mission {
        /// Unit id.
        unit: String,
        /// Mission to queue.
        mission: Mission,
    },
    /// Interrupt with a mission.
    Override {
        /// Unit id.
        unit: String,
        /// Mission to run now.
        mission: Mission,
    },
    /// Return to the interrupted mission.
    Restore {
        /// Unit id.
        unit: String,
    },
    /// Remove a unit.
    Destroy {
        /// Unit id.
        unit: String,
    },
    /// Start building a vehicle.
    Produce {
        /// Construction yard id.
        factory: String,
        /// Vehicle type.
        kind: VehicleKind,
    },
}

impl ScenarioOrder {
    /// Every unit id this order names.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<&str> {
        match self {
            Self::Move { unit, .. }
            | Self::Mission { unit, .. }
            | Self::Override { unit, .. }
            | Self::Restore { unit }
            | Self::Destroy { unit } => vec![unit.as_str()],
            Self::Attack { unit, victim } => vec![unit.as_str(), victim.as_str()],
            Self::Enter { unit, host } => vec![unit.as_str(), host.as_str()],
            Self::Produce { factory, .. } => vec![factory.as_str()],
        }
    }

    /// Translate to a kernel order, looking ids up with `resolve`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownUnit`] for an id `resolve` does not know.
    pub fn to_order(&self, resolve: impl Fn(&str) -> Option<Target>) -> Result<Order> {
        let target = |id: &str| resolve(id).ok_or_else(|| RunnerError::UnknownUnit(id.to_string()));
        Ok(match self {
            Self::Move { unit, cell } => Order::Move {
                unit: target(unit)?,
                cell: Cell::new(cell.0, cell.1),
            },
            Self::Attack { unit, victim } => Order::Attack {
                unit: target(unit)?,
                victim: target(victim)?,
            },
            Self::Enter { unit, host } => Order::Enter {
                unit: target(unit)?,
                host: target(host)?,
            },
            Self::Mission { unit, mission } => Order::Mission {
                unit: target(unit)?,
                mission: *mission,
            },
            Self::Override { unit, mission } => Order::Override {
                unit: target(unit)?,
                mission: *mission,
            },
            Self::Restore { unit } => Order::Restore { unit: target(unit)? },
            Self::Destroy { unit } => Order::Destroy { unit: target(unit)? },
            Self::Produce { factory, kind } => Order::Produce {
                factory: target(factory)?,
                kind: *kind,
            },
        })
    }
}

/// An order and the tick it is issued before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedOrder {
    /// Tick to issue at.
    pub tick: u64,
    /// The order.
    pub order: ScenarioOrder,
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, stored in replays.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Random seed.
    pub seed: u64,
    /// Ticks to run when the command line does not say.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Terrain rows from the top-left; `$` marks resource fields. Cells
    /// not covered are clear.
    #[serde(default)]
    pub map: Vec<String>,
    /// Starting entities, placed in order.
    #[serde(default)]
    pub units: Vec<UnitPlacement>,
    /// Orders, in any order; applied by tick then listing order.
    #[serde(default)]
    pub orders: Vec<TimedOrder>,
}

const fn default_ticks() -> u64 {
    900
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Empty".to_string(),
            description: String::new(),
            seed: 0,
            ticks: default_ticks(),
            map: Vec::new(),
            units: Vec::new(),
            orders: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RunnerError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron_str(&contents)?;
        tracing::info!(path = %path.display(), name = %scenario.name, "scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let scenario: Self = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check that ids are unique and every order names a placed unit.
    pub fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for unit in &self.units {
            if !ids.insert(unit.id.as_str()) {
                return Err(RunnerError::DuplicateUnit(unit.id.clone()));
            }
        }
        for timed in &self.orders {
            if let Some(id) = timed.order.unit_ids().into_iter().find(|id| !ids.contains(id)) {
                return Err(RunnerError::UnknownUnit(id.to_string()));
            }
        }
        Ok(())
    }

    /// Terrain described by the map rows.
    pub fn terrain(&self) -> Result<Terrain> {
        Ok(Terrain::from_rows(&self.map)?)
    }

    /// Orders issued before `tick`, in listing order.
    pub fn orders_at(&self, tick: u64) -> impl Iterator<Item = &ScenarioOrder> {
        self.orders
            .iter()
            .filter(move |o| o.tick == tick)
            .map(|o| &o.order)
    }

    /// Two squads meeting in the middle of an open field.
    #[must_use]
    pub fn skirmish() -> Self {
        let mut units = Vec::new();
        for i in 0..3 {
            let y = 12 + i * 3;
            units.push(
                UnitPlacement::new(&format!("blue_tank_{i}"), EntityKind::Vehicle(VehicleKind::Tank), HouseId(1), 6, y)
                    .with_mission(Mission::Hunt),
            );
            units.push(
                UnitPlacement::new(&format!("red_tank_{i}"), EntityKind::Vehicle(VehicleKind::Tank), HouseId(2), 40, y)
                    .with_mission(Mission::Hunt),
            );
        }
        Self {
            name: "Skirmish".to_string(),
            description: "Three tanks a side, all hunting".to_string(),
            seed: 1,
            ticks: 1200,
            units,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario() {
        let scenario = Scenario::default();
        assert!(scenario.units.is_empty());
        assert_eq!(scenario.ticks, 900);
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_skirmish_scenario() {
        let scenario = Scenario::skirmish();
        assert_eq!(scenario.units.len(), 6);
        assert!(scenario.validate().is_ok());
        assert!(scenario.terrain().is_ok());
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                seed: 7,
                map: [
                    "....~~....",
                    "..$$~~....",
                ],
                units: [
                    UnitPlacement(id: "tank", kind: Vehicle(Tank), owner: 1, cell: (1, 1)),
                    UnitPlacement(id: "yard", kind: Building(ConstructionYard), owner: 1, cell: (6, 4), built: false),
                    UnitPlacement(id: "man", kind: Infantry(Rifleman), owner: 2, cell: (8, 1), mission: Some(Hunt)),
                ],
                orders: [
                    TimedOrder(tick: 5, order: Move(unit: "tank", cell: (3, 0))),
                    TimedOrder(tick: 9, order: Attack(unit: "tank", victim: "man")),
                    TimedOrder(tick: 9, order: Produce(factory: "yard", kind: Jeep)),
                ],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.ticks, 900);
        assert_eq!(scenario.units[1].kind, EntityKind::Building(BuildingKind::ConstructionYard));
        assert!(!scenario.units[1].built);
        assert!(scenario.units[0].built);
        assert_eq!(scenario.units[2].owner, HouseId(2));
        assert_eq!(scenario.units[2].mission, Some(Mission::Hunt));
        assert_eq!(scenario.orders_at(9).count(), 2);

        let terrain = scenario.terrain().unwrap();
        assert_eq!(terrain.land(Cell::new(4, 0)), LandType::Water);
        assert!(terrain.tiberium(Cell::new(2, 1)) > 0);
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let ron = r#"
            Scenario(
                name: "Bad",
                seed: 1,
                units: [UnitPlacement(id: "a", kind: Aircraft, owner: 1, cell: (1, 1))],
                orders: [TimedOrder(tick: 0, order: Restore(unit: "b"))],
            )
        "#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(RunnerError::UnknownUnit(id)) if id == "b"
        ));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut scenario = Scenario::skirmish();
        scenario.units.push(scenario.units[0].clone());
        assert!(matches!(scenario.validate(), Err(RunnerError::DuplicateUnit(_))));
    }

    #[test]
    fn test_bad_map_symbol() {
        let scenario = Scenario {
            map: vec!["..?..".to_string()],
            ..Scenario::default()
        };
        assert!(matches!(scenario.terrain(), Err(RunnerError::Kernel(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("does/not/exist.ron"),
            Err(RunnerError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_to_order_resolves_ids() {
        let order = ScenarioOrder::Attack {
            unit: "a".to_string(),
            victim: "b".to_string(),
        };
        let a = Target::new(Rtti::Vehicle, 0);
        let b = Target::new(Rtti::Infantry, 3);
        let resolved = order
            .to_order(|id| match id {
                "a" => Some(a),
                "b" => Some(b),
                _ => None,
            })
            .unwrap();
        assert_eq!(resolved, Order::Attack { unit: a, victim: b });
        assert!(order.to_order(|_| None).is_err());
    }
}
