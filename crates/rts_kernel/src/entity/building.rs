//! Structures.
//!
//! Buildings do not move. They cover a rectangular footprint whose top-left
//! cell holds the building's coordinate, and service buildings have a pad
//! (the cell just below the footprint's left column) where units dock.

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Coordinate};
use crate::entity::foot::MobileObject;
use crate::entity::techno::{engage_in_place, CombatData, CombatObject, Weapon};
use crate::entity::vehicle::VehicleKind;
use crate::entity::{
    clear_refs, Armor, HouseId, MapData, MapObject, MissionObject, Object, ObjectData, RadioData,
    RadioObject,
};
use crate::mission::{Mission, MissionControl, IDLE_DELAY, IMMEDIATE_DELAY, SCAN_DELAY, TICKS_PER_SECOND};
use crate::pool::Handle;
use crate::radio::RadioMessage;
use crate::target::{Rtti, Target};
use crate::world::World;

/// Ticks a new building takes to finish construction.
pub const CONSTRUCTION_TICKS: u32 = TICKS_PER_SECOND;
/// Ticks a building takes to be sold off.
pub const DECONSTRUCTION_TICKS: u32 = TICKS_PER_SECOND;
/// Hit points a depot restores per repair step.
pub const DEPOT_REPAIR_STEP: i32 = 10;
/// Ticks between depot repair steps.
pub const DEPOT_REPAIR_INTERVAL: u32 = TICKS_PER_SECOND / 3;
/// Hit points a building restores to itself per repair poll.
pub const SELF_REPAIR_STEP: i32 = 5;

/// Structure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Accepts harvested resource.
    Refinery,
    /// Repairs docked vehicles.
    RepairDepot,
    /// Static defence.
    GuardTower,
    /// Builds vehicles.
    ConstructionYard,
}

impl BuildingKind {
    /// Full hit points.
    #[must_use]
    pub const fn strength(self) -> i32 {
        match self {
            Self::Refinery => 450,
            Self::RepairDepot => 400,
            Self::GuardTower => 200,
            Self::ConstructionYard => 500,
        }
    }

    /// Footprint in cells, width then height.
    #[must_use]
    pub const fn size(self) -> (i32, i32) {
        match self {
            Self::Refinery | Self::RepairDepot => (2, 2),
            Self::GuardTower => (1, 1),
            Self::ConstructionYard => (3, 2),
        }
    }

    /// Armament.
    #[must_use]
    pub const fn weapon(self) -> Option<Weapon> {
        match self {
            Self::GuardTower => Some(Weapon::MACHINE_GUN),
            _ => None,
        }
    }

    /// Whether units dock on a pad below the footprint.
    #[must_use]
    pub const fn has_pad(self) -> bool {
        !matches!(self, Self::GuardTower)
    }

    /// Cells covered when the top-left cell is `origin`, row by row.
    /// Contains [`Cell::INVALID`] where the footprint leaves the map.
    #[must_use]
    pub fn footprint(self, origin: Cell) -> Vec<Cell> {
        let (w, h) = self.size();
        (0..h)
            .flat_map(|dy| (0..w).map(move |dx| Cell::new(origin.x() + dx, origin.y() + dy)))
            .collect()
    }
}

/// A vehicle under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Production {
    /// What is being built.
    pub kind: VehicleKind,
    /// Ticks left.
    pub remaining: u32,
}

impl Production {
    /// Build time for a vehicle type.
    #[must_use]
    pub const fn build_ticks(kind: VehicleKind) -> u32 {
        match kind {
            VehicleKind::Tank => TICKS_PER_SECOND * 6,
            VehicleKind::Harvester => TICKS_PER_SECOND * 8,
            VehicleKind::Apc => TICKS_PER_SECOND * 5,
            VehicleKind::Jeep => TICKS_PER_SECOND * 3,
        }
    }
}

/// Building-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingData {
    /// Structure type.
    pub kind: BuildingKind,
    /// Resource credited by refineries.
    pub stock: u32,
    /// Unit standing on the pad.
    pub docked: Target,
    /// Vehicle being built.
    pub production: Option<Production>,
}

/// A structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Building {
    object: ObjectData,
    map: MapData,
    mission: MissionControl,
    radio: RadioData,
    combat: CombatData,
    data: BuildingData,
}

impl Building {
    /// New structure with its top-left cell at `coord`, under construction.
    #[must_use]
    pub fn new(kind: BuildingKind, handle: Handle, owner: HouseId, coord: Coordinate) -> Self {
        Self {
            object: ObjectData::new(Rtti::Building, handle, owner, coord),
            map: MapData::new(kind.strength(), Armor::Concrete),
            mission: MissionControl::new(Mission::Construction),
            radio: RadioData::default(),
            combat: CombatData::new(kind.weapon()),
            data: BuildingData {
                kind,
                stock: 0,
                docked: Target::NONE,
                production: None,
            },
        }
    }

    /// Building-specific state.
    #[must_use]
    pub const fn data(&self) -> &BuildingData {
        &self.data
    }

    /// Structure type.
    #[must_use]
    pub const fn kind(&self) -> BuildingKind {
        self.data.kind
    }

    /// Cell where units dock, if this building has one on the map.
    #[must_use]
    pub fn service_cell(&self) -> Option<Cell> {
        if !self.data.kind.has_pad() {
            return None;
        }
        let origin = self.cell();
        let (_, h) = self.data.kind.size();
        Some(Cell::new(origin.x(), origin.y() + h)).filter(|cell| cell.is_valid())
    }

    /// Queue a vehicle. Only idle construction yards accept.
    pub fn start_production(&mut self, kind: VehicleKind) -> bool {
        if self.data.kind != BuildingKind::ConstructionYard || self.data.production.is_some() {
            return false;
        }
        self.data.production = Some(Production {
            kind,
            remaining: Production::build_ticks(kind),
        });
        true
    }

    fn is_busy_building(&self) -> bool {
        matches!(
            self.mission.current(),
            Mission::Construction | Mission::Deconstruction
        )
    }

    /// Count down the current job and roll the vehicle out onto the pad.
    fn production_ai(&mut self, world: &mut World) {
        let Some(job) = self.data.production.as_mut() else {
            return;
        };
        if job.remaining > 0 {
            job.remaining -= 1;
            return;
        }
        let kind = job.kind;
        let Some(pad) = self.service_cell() else {
            self.data.production = None;
            return;
        };
        let Ok(unit) = world.create_vehicle(kind, self.owner(), pad) else {
            // Pad blocked; try again next tick.
            return;
        };
        self.data.production = None;
        tracing::debug!(entity = %self.as_target(), %unit, ?kind, "vehicle produced");

        let exit = Cell::new(pad.x(), pad.y() + 1);
        world.with_mobile(unit, |vehicle, world| {
            if kind == VehicleKind::Harvester {
                vehicle.assign_mission(Mission::Harvest);
                return;
            }
            let locomotion = vehicle.foot().locomotion;
            let exit = if world.terrain.is_passable(exit, locomotion, unit) {
                Some(exit)
            } else {
                world.terrain.free_adjacent(pad, locomotion, unit)
            };
            if let Some(exit) = exit {
                vehicle.foot_mut().navcom = Target::from_cell(exit);
                vehicle.assign_mission(Mission::Move);
            }
        });
    }

    /// Repair-depot service for the docked unit.
    fn service_pad(&mut self, world: &mut World) -> u32 {
        let docked = self.data.docked;
        if !docked.is_valid() {
            return IDLE_DELAY;
        }
        if self.radio.contact != docked || !world.is_alive(docked) {
            self.data.docked = Target::NONE;
            self.mission.status = 0;
            return SCAN_DELAY;
        }
        if self.mission.status == 0 {
            if self.transmit(world, RadioMessage::Tether, &mut 0, docked) != RadioMessage::Roger {
                self.finish_service(world);
                return SCAN_DELAY;
            }
            self.mission.status = 1;
        }
        let mut step = DEPOT_REPAIR_STEP;
        if self.transmit(world, RadioMessage::RepairOneStep, &mut step, docked) == RadioMessage::Roger {
            return DEPOT_REPAIR_INTERVAL;
        }
        tracing::debug!(entity = %self.as_target(), unit = %docked, "repair complete");
        self.finish_service(world);
        SCAN_DELAY
    }

    fn finish_service(&mut self, world: &mut World) {
        let docked = self.data.docked;
        self.transmit(world, RadioMessage::Untether, &mut 0, docked);
        self.release_link(world);
        self.data.docked = Target::NONE;
        self.mission.status = 0;
    }
}

impl Object for Building {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn ai(&mut self, world: &mut World) {
        self.techno_ai(world);
        if self.is_active() && !self.is_busy_building() {
            self.production_ai(world);
        }
    }

    fn occupies_cells(&self) -> bool {
        true
    }

    fn footprint(&self) -> Vec<Cell> {
        self.data.kind.footprint(self.cell())
    }

    fn detach_target(&mut self, target: Target) {
        clear_refs(
            target,
            &mut [
                &mut self.radio.contact,
                &mut self.map.last_attacker,
                &mut self.data.docked,
            ],
        );
        self.combat.detach(target);
    }

    fn references(&self) -> Vec<Target> {
        vec![
            self.radio.contact,
            self.map.last_attacker,
            self.combat.tarcom,
            self.data.docked,
        ]
    }
}

impl MapObject for Building {
    fn map(&self) -> &MapData {
        &self.map
    }

    fn map_mut(&mut self) -> &mut MapData {
        &mut self.map
    }
}

impl MissionObject for Building {
    fn mission(&self) -> &MissionControl {
        &self.mission
    }

    fn mission_mut(&mut self) -> &mut MissionControl {
        &mut self.mission
    }

    /// Refineries wait on the harvest mission; everything else guards.
    fn enter_idle_mode(&mut self, _world: &mut World) {
        let idle = match self.data.kind {
            BuildingKind::Refinery => Mission::Harvest,
            _ => Mission::Guard,
        };
        self.assign_mission(idle);
    }

    fn mission_construction(&mut self, world: &mut World) -> u32 {
        if self.mission.status == 0 {
            self.mission.status = 1;
            return CONSTRUCTION_TICKS;
        }
        tracing::debug!(entity = %self.as_target(), kind = ?self.data.kind, "construction complete");
        self.enter_idle_mode(world);
        IMMEDIATE_DELAY
    }

    fn mission_deconstruction(&mut self, world: &mut World) -> u32 {
        if self.mission.status == 0 {
            self.release_link(world);
            self.data.docked = Target::NONE;
            self.mission.status = 1;
            return DECONSTRUCTION_TICKS;
        }
        let me = self.as_target();
        tracing::debug!(entity = %me, "sold");
        self.object.active = false;
        world.kill(me);
        IDLE_DELAY
    }

    fn mission_guard(&mut self, world: &mut World) -> u32 {
        match self.data.kind {
            BuildingKind::GuardTower => engage_in_place(self, world),
            BuildingKind::RepairDepot => self.service_pad(world),
            BuildingKind::Refinery | BuildingKind::ConstructionYard => IDLE_DELAY,
        }
    }

    /// Refinery idle service: wait for harvesters to dock.
    fn mission_harvest(&mut self, world: &mut World) -> u32 {
        if self.data.kind != BuildingKind::Refinery {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        }
        if self.data.docked.is_valid() {
            SCAN_DELAY
        } else {
            IDLE_DELAY
        }
    }

    /// Self repair until full.
    fn mission_repair(&mut self, world: &mut World) -> u32 {
        if self.heal(SELF_REPAIR_STEP) && self.is_damaged() {
            return TICKS_PER_SECOND;
        }
        if !self.restore_mission() {
            self.enter_idle_mode(world);
        }
        IMMEDIATE_DELAY
    }
}

impl RadioObject for Building {
    fn radio(&self) -> &RadioData {
        &self.radio
    }

    fn radio_mut(&mut self) -> &mut RadioData {
        &mut self.radio
    }

    fn holds_radio_link(&self) -> bool {
        true
    }

    fn receive(
        &mut self,
        world: &mut World,
        from: Target,
        message: RadioMessage,
        param: &mut i32,
    ) -> RadioMessage {
        let reply = self.radio_receive(world, from, message, param);
        if message == RadioMessage::OverOut && self.data.docked == from {
            self.data.docked = Target::NONE;
            self.mission.status = 0;
        }
        if reply != RadioMessage::Static {
            return reply;
        }

        match (self.data.kind, message) {
            (BuildingKind::Refinery, RadioMessage::Attach)
            | (BuildingKind::RepairDepot, RadioMessage::OnDepot) => {
                if self.is_busy_building() {
                    return RadioMessage::Building;
                }
                let Some(pad) = self.service_cell() else {
                    return RadioMessage::Negative;
                };
                if *param != i32::from(pad.raw()) {
                    *param = i32::from(pad.raw());
                    return RadioMessage::NeedToMove;
                }
                self.data.docked = from;
                if self.data.kind == BuildingKind::RepairDepot {
                    self.mission.status = 0;
                    self.mission.timer = 1;
                }
                RadioMessage::Roger
            }
            (BuildingKind::Refinery, RadioMessage::Unload) => {
                self.data.stock += u32::try_from(*param).unwrap_or(0);
                RadioMessage::Roger
            }
            (BuildingKind::Refinery, RadioMessage::Unloaded) => {
                self.data.docked = Target::NONE;
                RadioMessage::Roger
            }
            (BuildingKind::RepairDepot, RadioMessage::RepairCancelled) => {
                self.data.docked = Target::NONE;
                self.mission.status = 0;
                RadioMessage::Roger
            }
            _ => RadioMessage::Static,
        }
    }
}

impl CombatObject for Building {
    fn combat(&self) -> &CombatData {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatData {
        &mut self.combat
    }
}
