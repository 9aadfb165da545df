//! Ground vehicles: tanks, harvesters, transports.
//!
//! Harvesters run a resource loop against the nearest friendly refinery,
//! damaged vehicles can be sent to a repair depot, and APCs carry
//! infantry. All three conversations are radio exchanges driven from the
//! vehicle's mission handlers.

use serde::{Deserialize, Serialize};

use crate::coord::{Cell, Coordinate};
use crate::entity::building::BuildingKind;
use crate::entity::foot::{
    ambush_mission, approach_and_dock, attack_mission, guard_area_mission, guard_mission,
    hunt_mission, move_mission, retreat_mission, stop_mission, sticky_mission,
    timed_hunt_mission, DockStep, FootData, MobileObject, MAX_PATH_FAILURES, MOVE_DELAY,
};
use crate::entity::techno::{CombatData, CombatObject, Weapon};
use crate::entity::{
    clear_refs, Armor, HouseId, MapData, MapObject, MissionObject, Object, ObjectData, RadioData,
    RadioObject,
};
use crate::mission::{Mission, MissionControl, IDLE_DELAY, IMMEDIATE_DELAY, SCAN_DELAY, TICKS_PER_SECOND};
use crate::pool::Handle;
use crate::radio::RadioMessage;
use crate::target::{Rtti, Target};
use crate::terrain::Locomotion;
use crate::world::World;

/// Resource a full harvester carries.
pub const HARVESTER_CAPACITY: u8 = 24;
/// Resource taken from a cell per harvest poll.
pub const HARVEST_STEP: u8 = 3;
/// Ticks between harvest polls.
pub const HARVEST_DELAY: u32 = TICKS_PER_SECOND / 3;
/// How far a harvester looks for a resource field, in cells.
pub const TIBERIUM_SCAN_RADIUS: i32 = 16;
/// Passenger seats in an APC.
pub const APC_CAPACITY: usize = 5;

/// Harvest sub-step: heading for a resource field.
pub const HARVEST_LOOKING: i32 = 0;
/// Harvest sub-step: gathering in place.
pub const HARVEST_GATHERING: i32 = 1;
/// Harvest sub-step: choosing a refinery.
pub const HARVEST_FIND_REFINERY: i32 = 2;
/// Harvest sub-step: approaching and attaching to the refinery.
pub const HARVEST_DOCKING: i32 = 3;
/// Harvest sub-step: attached, handing over the load.
pub const HARVEST_UNLOADING: i32 = 4;

/// Repair sub-step: choosing a depot.
pub const REPAIR_FIND_DEPOT: i32 = 0;
/// Repair sub-step: approaching the pad.
pub const REPAIR_DOCKING: i32 = 1;
/// Repair sub-step: on the pad, being serviced.
pub const REPAIR_ON_PAD: i32 = 2;

/// Vehicle types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleKind {
    /// Main battle tank.
    Tank,
    /// Unarmed resource gatherer.
    Harvester,
    /// Armored personnel carrier.
    Apc,
    /// Fast wheeled scout.
    Jeep,
}

impl VehicleKind {
    /// Full hit points.
    #[must_use]
    pub const fn strength(self) -> i32 {
        match self {
            Self::Tank => 300,
            Self::Harvester => 400,
            Self::Apc => 200,
            Self::Jeep => 150,
        }
    }

    /// Damage resistance.
    #[must_use]
    pub const fn armor(self) -> Armor {
        match self {
            Self::Tank | Self::Harvester => Armor::Heavy,
            Self::Apc | Self::Jeep => Armor::Light,
        }
    }

    /// Armament.
    #[must_use]
    pub const fn weapon(self) -> Option<Weapon> {
        match self {
            Self::Tank => Some(Weapon::CANNON),
            Self::Harvester => None,
            Self::Apc | Self::Jeep => Some(Weapon::MACHINE_GUN),
        }
    }

    /// Leptons per tick.
    #[must_use]
    pub const fn speed(self) -> i32 {
        match self {
            Self::Tank => 24,
            Self::Harvester => 16,
            Self::Apc => 28,
            Self::Jeep => 40,
        }
    }

    /// Drive train.
    #[must_use]
    pub const fn locomotion(self) -> Locomotion {
        match self {
            Self::Jeep => Locomotion::Wheel,
            Self::Tank | Self::Harvester | Self::Apc => Locomotion::Track,
        }
    }
}

/// Vehicle-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleData {
    /// Vehicle type.
    pub kind: VehicleKind,
    /// Resource carried (harvesters).
    pub load: u8,
    /// Infantry aboard (APCs), in boarding order.
    pub passengers: Vec<Target>,
    /// On a repair pad with the depot servicing us.
    pub repairing: bool,
}

/// A ground vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vehicle {
    object: ObjectData,
    map: MapData,
    mission: MissionControl,
    radio: RadioData,
    combat: CombatData,
    foot: FootData,
    data: VehicleData,
}

impl Vehicle {
    /// Fresh vehicle at `coord`, guarding.
    #[must_use]
    pub fn new(kind: VehicleKind, handle: Handle, owner: HouseId, coord: Coordinate) -> Self {
        let mut foot = FootData::new(kind.locomotion(), kind.speed());
        foot.home = coord.to_cell();
        Self {
            object: ObjectData::new(Rtti::Vehicle, handle, owner, coord),
            map: MapData::new(kind.strength(), kind.armor()),
            mission: MissionControl::new(Mission::Guard),
            radio: RadioData::default(),
            combat: CombatData::new(kind.weapon()),
            foot,
            data: VehicleData {
                kind,
                load: 0,
                passengers: Vec::new(),
                repairing: false,
            },
        }
    }

    /// Vehicle-specific state.
    #[must_use]
    pub const fn data(&self) -> &VehicleData {
        &self.data
    }

    /// Vehicle type.
    #[must_use]
    pub const fn kind(&self) -> VehicleKind {
        self.data.kind
    }

    /// One poll of the harvest loop. With `returning` set the loop ends
    /// after the next unload instead of going back to the field.
    fn harvest_step(&mut self, world: &mut World, returning: bool) -> u32 {
        let me = self.as_target();
        let here = self.cell();
        match self.mission.status {
            HARVEST_LOOKING => {
                if self.data.load >= HARVESTER_CAPACITY || (returning && self.data.load > 0) {
                    self.mission.status = HARVEST_FIND_REFINERY;
                    return IMMEDIATE_DELAY;
                }
                if returning {
                    self.enter_idle_mode(world);
                    return IMMEDIATE_DELAY;
                }
                if world.terrain.tiberium(here) > 0 {
                    self.stop_moving(world);
                    self.mission.status = HARVEST_GATHERING;
                    return IMMEDIATE_DELAY;
                }
                if self.is_moving() {
                    return MOVE_DELAY;
                }
                let field = world
                    .terrain
                    .nearest_tiberium(here, TIBERIUM_SCAN_RADIUS, me)
                    .filter(|_| self.foot.path_failures <= MAX_PATH_FAILURES);
                if let Some(field) = field {
                    self.plan_route(world, field);
                    return MOVE_DELAY;
                }
                self.foot.path_failures = 0;
                if self.data.load > 0 {
                    self.mission.status = HARVEST_FIND_REFINERY;
                    return IMMEDIATE_DELAY;
                }
                tracing::debug!(entity = %me, "no resource in reach");
                self.enter_idle_mode(world);
                IDLE_DELAY
            }
            HARVEST_GATHERING => {
                let room = HARVESTER_CAPACITY.saturating_sub(self.data.load);
                let taken = world.terrain.harvest(here, HARVEST_STEP.min(room));
                self.data.load += taken;
                if self.data.load >= HARVESTER_CAPACITY {
                    self.mission.status = HARVEST_FIND_REFINERY;
                    IMMEDIATE_DELAY
                } else if taken == 0 {
                    self.mission.status = HARVEST_LOOKING;
                    IMMEDIATE_DELAY
                } else {
                    HARVEST_DELAY
                }
            }
            HARVEST_FIND_REFINERY => {
                let refinery = world.nearest_building(self.coord(), self.owner(), BuildingKind::Refinery);
                if !refinery.is_valid() {
                    tracing::debug!(entity = %me, "no refinery");
                    self.enter_idle_mode(world);
                    return IDLE_DELAY;
                }
                self.foot.navcom = refinery;
                self.mission.status = HARVEST_DOCKING;
                IMMEDIATE_DELAY
            }
            HARVEST_DOCKING => {
                let refinery = self.foot.navcom;
                match approach_and_dock(self, world, refinery, RadioMessage::Attach) {
                    DockStep::Pending(delay) => delay,
                    DockStep::Docked => {
                        self.mission.status = HARVEST_UNLOADING;
                        IMMEDIATE_DELAY
                    }
                    DockStep::Refused => SCAN_DELAY,
                    DockStep::Failed => {
                        self.foot.navcom = Target::NONE;
                        self.mission.status = HARVEST_FIND_REFINERY;
                        SCAN_DELAY
                    }
                }
            }
            _ => {
                let refinery = self.foot.navcom;
                if !refinery.is_valid() || self.radio.contact != refinery {
                    tracing::debug!(entity = %me, %refinery, "lost refinery while unloading");
                    self.mission.status = HARVEST_FIND_REFINERY;
                    return SCAN_DELAY;
                }
                let mut amount = i32::from(self.data.load);
                if self.transmit(world, RadioMessage::Unload, &mut amount, refinery) == RadioMessage::Roger {
                    self.data.load = 0;
                }
                self.transmit(world, RadioMessage::Unloaded, &mut 0, refinery);
                self.release_link(world);
                self.foot.navcom = Target::NONE;
                if returning {
                    self.enter_idle_mode(world);
                } else {
                    self.mission.status = HARVEST_LOOKING;
                }
                IMMEDIATE_DELAY
            }
        }
    }

    /// Drive off whatever pad we are standing on.
    fn leave_pad(&mut self, world: &mut World) {
        let me = self.as_target();
        if let Some(cell) = world.terrain.free_adjacent(self.cell(), self.foot.locomotion, me) {
            self.plan_route(world, cell);
        }
    }
}

impl Object for Vehicle {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn ai(&mut self, world: &mut World) {
        self.foot_ai(world);
    }

    fn occupies_cells(&self) -> bool {
        true
    }

    fn detach_target(&mut self, target: Target) {
        clear_refs(target, &mut [&mut self.radio.contact, &mut self.map.last_attacker]);
        self.combat.detach(target);
        self.foot.detach(target);
        self.data.passengers.retain(|&p| p != target);
    }

    fn references(&self) -> Vec<Target> {
        let mut refs = vec![
            self.radio.contact,
            self.map.last_attacker,
            self.combat.tarcom,
            self.foot.navcom,
        ];
        refs.extend_from_slice(&self.data.passengers);
        refs
    }
}

impl MapObject for Vehicle {
    fn map(&self) -> &MapData {
        &self.map
    }

    fn map_mut(&mut self) -> &mut MapData {
        &mut self.map
    }
}

impl MissionObject for Vehicle {
    fn mission(&self) -> &MissionControl {
        &self.mission
    }

    fn mission_mut(&mut self) -> &mut MissionControl {
        &mut self.mission
    }

    fn mission_move(&mut self, world: &mut World) -> u32 {
        move_mission(self, world)
    }

    fn mission_attack(&mut self, world: &mut World) -> u32 {
        attack_mission(self, world)
    }

    fn mission_guard(&mut self, world: &mut World) -> u32 {
        guard_mission(self, world)
    }

    fn mission_guard_area(&mut self, world: &mut World) -> u32 {
        guard_area_mission(self, world)
    }

    fn mission_hunt(&mut self, world: &mut World) -> u32 {
        hunt_mission(self, world)
    }

    fn mission_sticky(&mut self, world: &mut World) -> u32 {
        sticky_mission(self, world)
    }

    fn mission_ambush(&mut self, world: &mut World) -> u32 {
        ambush_mission(self, world)
    }

    fn mission_timed_hunt(&mut self, world: &mut World) -> u32 {
        timed_hunt_mission(self, world)
    }

    fn mission_retreat(&mut self, world: &mut World) -> u32 {
        retreat_mission(self, world)
    }

    fn mission_stop(&mut self, world: &mut World) -> u32 {
        stop_mission(self, world)
    }

    fn mission_harvest(&mut self, world: &mut World) -> u32 {
        if self.data.kind != VehicleKind::Harvester {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        }
        self.harvest_step(world, false)
    }

    /// Harvesters unload and stop; everything else drives home.
    fn mission_return(&mut self, world: &mut World) -> u32 {
        if self.data.kind == VehicleKind::Harvester {
            return self.harvest_step(world, true);
        }
        let home = self.foot.home;
        if !home.is_valid() || self.cell() == home {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        }
        self.foot.navcom = Target::from_cell(home);
        self.assign_mission(Mission::Move);
        IMMEDIATE_DELAY
    }

    /// Dock at the building named by the navigation target.
    fn mission_enter(&mut self, world: &mut World) -> u32 {
        let next = match world.building_kind(self.foot.navcom) {
            Some(BuildingKind::RepairDepot) => Mission::Repair,
            Some(BuildingKind::Refinery) if self.data.kind == VehicleKind::Harvester => Mission::Return,
            _ => {
                self.foot.navcom = Target::NONE;
                self.enter_idle_mode(world);
                return IMMEDIATE_DELAY;
            }
        };
        self.assign_mission(next);
        IMMEDIATE_DELAY
    }

    fn mission_repair(&mut self, world: &mut World) -> u32 {
        match self.mission.status {
            REPAIR_FIND_DEPOT => {
                if !self.is_damaged() {
                    self.enter_idle_mode(world);
                    return IMMEDIATE_DELAY;
                }
                let depot = match world.building_kind(self.foot.navcom) {
                    Some(BuildingKind::RepairDepot) => self.foot.navcom,
                    _ => world.nearest_building(self.coord(), self.owner(), BuildingKind::RepairDepot),
                };
                if !depot.is_valid() {
                    self.enter_idle_mode(world);
                    return IDLE_DELAY;
                }
                self.foot.navcom = depot;
                self.mission.status = REPAIR_DOCKING;
                IMMEDIATE_DELAY
            }
            REPAIR_DOCKING => {
                let depot = self.foot.navcom;
                match approach_and_dock(self, world, depot, RadioMessage::OnDepot) {
                    DockStep::Pending(delay) => delay,
                    DockStep::Docked => {
                        self.data.repairing = true;
                        self.mission.status = REPAIR_ON_PAD;
                        SCAN_DELAY
                    }
                    DockStep::Refused => SCAN_DELAY,
                    DockStep::Failed => {
                        self.foot.navcom = Target::NONE;
                        self.enter_idle_mode(world);
                        IMMEDIATE_DELAY
                    }
                }
            }
            _ => {
                if self.radio.contact.is_valid() && self.radio.contact == self.foot.navcom {
                    return SCAN_DELAY;
                }
                self.data.repairing = false;
                self.foot.navcom = Target::NONE;
                self.leave_pad(world);
                if !self.restore_mission() {
                    self.enter_idle_mode(world);
                }
                IMMEDIATE_DELAY
            }
        }
    }

    /// Let passengers out one at a time onto free neighbouring cells.
    fn mission_unload(&mut self, world: &mut World) -> u32 {
        let Some(&passenger) = self.data.passengers.first() else {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        };
        self.stop_moving(world);
        let Some(cell) = world.terrain.free_adjacent(self.cell(), Locomotion::Foot, Target::NONE) else {
            return SCAN_DELAY;
        };
        let placed = world.with_techno(passenger, |unit, world| {
            let placed = unit.unlimbo(world, cell.center());
            if placed {
                unit.assign_mission(Mission::Guard);
            }
            placed
        });
        if placed == Some(false) {
            return SCAN_DELAY;
        }
        self.data.passengers.remove(0);
        tracing::debug!(entity = %self.as_target(), %passenger, %cell, "passenger unloaded");
        MOVE_DELAY
    }
}

impl RadioObject for Vehicle {
    fn radio(&self) -> &RadioData {
        &self.radio
    }

    fn radio_mut(&mut self) -> &mut RadioData {
        &mut self.radio
    }

    /// Transports keep a boarding link open whatever their mission.
    fn holds_radio_link(&self) -> bool {
        self.data.kind == VehicleKind::Apc
            || matches!(
                self.mission.current(),
                Mission::Enter | Mission::Harvest | Mission::Repair | Mission::Unload | Mission::Return
            )
    }

    /// Leaving a depot mid-repair tells it first.
    fn release_link(&mut self, world: &mut World) {
        let contact = self.radio.contact;
        if !contact.is_valid() {
            return;
        }
        if self.data.repairing {
            self.transmit(world, RadioMessage::RepairCancelled, &mut 0, contact);
            self.data.repairing = false;
        }
        self.transmit(world, RadioMessage::OverOut, &mut 0, contact);
    }

    fn receive(
        &mut self,
        world: &mut World,
        from: Target,
        message: RadioMessage,
        param: &mut i32,
    ) -> RadioMessage {
        let is_apc = self.data.kind == VehicleKind::Apc;
        if message == RadioMessage::Hello && is_apc && self.data.passengers.len() >= APC_CAPACITY {
            return RadioMessage::Negative;
        }
        let reply = self.radio_receive(world, from, message, param);
        if reply != RadioMessage::Static {
            return reply;
        }
        match message {
            RadioMessage::HoldStill => {
                self.stop_moving(world);
                RadioMessage::Roger
            }
            RadioMessage::RepairOneStep => {
                if self.heal(*param) {
                    RadioMessage::Roger
                } else {
                    RadioMessage::Negative
                }
            }
            RadioMessage::PickUp if is_apc => {
                let at = i16::try_from(*param).map_or(Cell::INVALID, Cell::from_raw);
                let here = self.cell();
                if self.data.passengers.len() >= APC_CAPACITY {
                    RadioMessage::Negative
                } else if at.is_valid() && at != here && at.distance(here) <= 1 {
                    self.data.passengers.push(from);
                    RadioMessage::Roger
                } else {
                    match world.terrain.free_adjacent(here, Locomotion::Foot, from) {
                        Some(cell) => {
                            *param = i32::from(cell.raw());
                            RadioMessage::NeedToMove
                        }
                        None => RadioMessage::Negative,
                    }
                }
            }
            _ => RadioMessage::Static,
        }
    }
}

impl CombatObject for Vehicle {
    fn combat(&self) -> &CombatData {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatData {
        &mut self.combat
    }

    fn cargo(&self) -> Vec<Target> {
        self.data.passengers.clone()
    }
}

impl MobileObject for Vehicle {
    fn foot(&self) -> &FootData {
        &self.foot
    }

    fn foot_mut(&mut self) -> &mut FootData {
        &mut self.foot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(kind: VehicleKind) -> Vehicle {
        let handle = Handle {
            index: 1,
            generation: 1,
        };
        Vehicle::new(kind, handle, HouseId(1), Cell::new(10, 10).center())
    }

    #[test]
    fn test_kind_stats() {
        let jeep = vehicle(VehicleKind::Jeep);
        assert_eq!(jeep.foot().locomotion, Locomotion::Wheel);
        assert_eq!(jeep.map().armor, Armor::Light);
        let harvester = vehicle(VehicleKind::Harvester);
        assert!(harvester.combat().weapon.is_none());
        assert_eq!(harvester.data().load, 0);
    }

    #[test]
    fn test_apc_always_holds_link() {
        let apc = vehicle(VehicleKind::Apc);
        assert_eq!(apc.mission().current(), Mission::Guard);
        assert!(apc.holds_radio_link());
        let tank = vehicle(VehicleKind::Tank);
        assert!(!tank.holds_radio_link());
    }

    #[test]
    fn test_detach_drops_passenger() {
        let mut apc = vehicle(VehicleKind::Apc);
        let rider = Target::with_generation(Rtti::Infantry, 0, 1);
        let other = Target::with_generation(Rtti::Infantry, 1, 1);
        apc.data.passengers = vec![rider, other];
        apc.detach_target(rider);
        assert_eq!(apc.cargo(), vec![other]);
        assert!(apc.references().contains(&other));
    }
}
