//! Foot soldiers.

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::entity::foot::{
    ambush_mission, approach_and_dock, attack_mission, guard_area_mission, guard_mission,
    hunt_mission, move_mission, navcom_cell, retreat_mission, stop_mission, sticky_mission,
    timed_hunt_mission, DockStep, FootData, MobileObject, MOVE_DELAY,
};
use crate::entity::techno::{CombatData, CombatObject, Weapon};
use crate::entity::{
    clear_refs, Armor, HouseId, MapData, MapObject, MissionObject, Object, ObjectData, RadioData,
    RadioObject,
};
use crate::mission::{Mission, MissionControl, IMMEDIATE_DELAY, SCAN_DELAY};
use crate::pathfinding::PathStatus;
use crate::pool::Handle;
use crate::radio::RadioMessage;
use crate::target::{Rtti, Target};
use crate::terrain::Locomotion;
use crate::world::World;

/// Infantry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfantryKind {
    /// Basic rifle infantry.
    Rifleman,
    /// Lobs grenades over short range.
    Grenadier,
    /// Unarmed; captures and sabotages buildings.
    Engineer,
}

impl InfantryKind {
    /// Full hit points.
    #[must_use]
    pub const fn strength(self) -> i32 {
        match self {
            Self::Rifleman => 50,
            Self::Grenadier => 50,
            Self::Engineer => 25,
        }
    }

    /// Armament.
    #[must_use]
    pub const fn weapon(self) -> Option<Weapon> {
        match self {
            Self::Rifleman => Some(Weapon::RIFLE),
            Self::Grenadier => Some(Weapon::GRENADE),
            Self::Engineer => None,
        }
    }

    /// Leptons per tick.
    #[must_use]
    pub const fn speed(self) -> i32 {
        match self {
            Self::Rifleman | Self::Engineer => 16,
            Self::Grenadier => 12,
        }
    }
}

/// A foot soldier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Infantry {
    object: ObjectData,
    map: MapData,
    mission: MissionControl,
    radio: RadioData,
    combat: CombatData,
    foot: FootData,
    kind: InfantryKind,
}

impl Infantry {
    /// Fresh soldier at `coord`, guarding.
    #[must_use]
    pub fn new(kind: InfantryKind, handle: Handle, owner: HouseId, coord: Coordinate) -> Self {
        let mut foot = FootData::new(Locomotion::Foot, kind.speed());
        foot.home = coord.to_cell();
        Self {
            object: ObjectData::new(Rtti::Infantry, handle, owner, coord),
            map: MapData::new(kind.strength(), Armor::None),
            mission: MissionControl::new(Mission::Guard),
            radio: RadioData::default(),
            combat: CombatData::new(kind.weapon()),
            foot,
            kind,
        }
    }

    /// Soldier type.
    #[must_use]
    pub const fn kind(&self) -> InfantryKind {
        self.kind
    }

    /// Walk next to the navigation target. Returns `Ok(target)` once
    /// adjacent, `Err(delay)` while still approaching or after giving up.
    fn close_on_navcom(&mut self, world: &mut World) -> Result<Target, u32> {
        let target = self.foot.navcom;
        if !world.is_targetable(target) {
            self.stop_moving(world);
            self.foot.navcom = Target::NONE;
            self.enter_idle_mode(world);
            return Err(IMMEDIATE_DELAY);
        }
        if world.is_adjacent(self.cell(), target) {
            self.stop_moving(world);
            return Ok(target);
        }
        if self.is_moving() {
            return Err(MOVE_DELAY);
        }
        let goal = navcom_cell(self, world);
        let result = self.plan_route(world, goal);
        if result.status == PathStatus::Unreachable || result.cells.is_empty() {
            tracing::debug!(entity = %self.as_target(), %target, "cannot reach target");
            self.foot.navcom = Target::NONE;
            self.enter_idle_mode(world);
            return Err(IMMEDIATE_DELAY);
        }
        Err(MOVE_DELAY)
    }

    /// Remove this soldier as part of an action (captured building, boarded).
    fn expend(&mut self, world: &mut World) {
        let me = self.as_target();
        self.object.active = false;
        world.kill(me);
    }
}

impl Object for Infantry {
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
    }

    fn references(&self) -> Vec<Target> {
        vec![
            self.radio.contact,
            self.map.last_attacker,
            self.combat.tarcom,
            self.foot.navcom,
        ]
    }
}

impl MapObject for Infantry {
    fn map(&self) -> &MapData {
        &self.map
    }

    fn map_mut(&mut self) -> &mut MapData {
        &mut self.map
    }
}

impl MissionObject for Infantry {
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

    /// Board the transport named by the navigation target.
    fn mission_enter(&mut self, world: &mut World) -> u32 {
        let host = self.foot.navcom;
        match approach_and_dock(self, world, host, RadioMessage::PickUp) {
            DockStep::Pending(delay) => delay,
            DockStep::Docked => IMMEDIATE_DELAY,
            DockStep::Refused => SCAN_DELAY,
            DockStep::Failed => {
                self.foot.navcom = Target::NONE;
                self.enter_idle_mode(world);
                IMMEDIATE_DELAY
            }
        }
    }

    /// Engineers take over the navigation target building.
    fn mission_capture(&mut self, world: &mut World) -> u32 {
        if self.kind != InfantryKind::Engineer || self.foot.navcom.rtti() != Rtti::Building {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        }
        let building = match self.close_on_navcom(world) {
            Ok(building) => building,
            Err(delay) => return delay,
        };
        let owner = self.owner();
        world.with_object(building, |b, _| b.object_mut().owner = owner);
        tracing::debug!(entity = %self.as_target(), %building, %owner, "building captured");
        self.expend(world);
        IMMEDIATE_DELAY
    }

    /// Engineers destroy the navigation target building.
    fn mission_sabotage(&mut self, world: &mut World) -> u32 {
        if self.kind != InfantryKind::Engineer || self.foot.navcom.rtti() != Rtti::Building {
            self.enter_idle_mode(world);
            return IMMEDIATE_DELAY;
        }
        let building = match self.close_on_navcom(world) {
            Ok(building) => building,
            Err(delay) => return delay,
        };
        world.destroy(building);
        tracing::debug!(entity = %self.as_target(), %building, "building sabotaged");
        self.expend(world);
        IMMEDIATE_DELAY
    }

    /// Escort the navigation target, staying next to it until it is gone.
    fn mission_rescue(&mut self, world: &mut World) -> u32 {
        match self.close_on_navcom(world) {
            Ok(_) => SCAN_DELAY,
            Err(delay) => delay,
        }
    }
}

impl RadioObject for Infantry {
    fn radio(&self) -> &RadioData {
        &self.radio
    }

    fn radio_mut(&mut self) -> &mut RadioData {
        &mut self.radio
    }
}

impl CombatObject for Infantry {
    fn combat(&self) -> &CombatData {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatData {
        &mut self.combat
    }
}

impl MobileObject for Infantry {
    fn foot(&self) -> &FootData {
        &self.foot
    }

    fn foot_mut(&mut self) -> &mut FootData {
        &mut self.foot
    }

    /// Aboard: leave the map and close the link; the transport keeps us.
    fn docked(&mut self, world: &mut World) {
        let host = self.radio.contact;
        self.limbo(world);
        self.release_link(world);
        self.foot.navcom = Target::NONE;
        self.assign_mission(Mission::Sleep);
        tracing::debug!(entity = %self.as_target(), %host, "boarded transport");
    }
}
