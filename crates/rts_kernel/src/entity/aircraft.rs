//! Flying units. They ignore terrain and never hold cells.

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::entity::foot::{
    attack_mission, guard_area_mission, guard_mission, hunt_mission, move_mission,
    retreat_mission, stop_mission, FootData, MobileObject,
};
use crate::entity::techno::{CombatData, CombatObject, Weapon};
use crate::entity::{
    clear_refs, Armor, HouseId, MapData, MapObject, MissionObject, Object, ObjectData, RadioData,
    RadioObject,
};
use crate::mission::{Mission, MissionControl};
use crate::pool::Handle;
use crate::target::{Rtti, Target};
use crate::terrain::Locomotion;
use crate::world::World;

/// Full hit points of an aircraft.
pub const AIRCRAFT_STRENGTH: i32 = 125;
/// Aircraft speed in leptons per tick.
pub const AIRCRAFT_SPEED: i32 = 48;

/// An attack helicopter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aircraft {
    object: ObjectData,
    map: MapData,
    mission: MissionControl,
    radio: RadioData,
    combat: CombatData,
    foot: FootData,
}

impl Aircraft {
    /// Fresh aircraft at `coord`, guarding.
    #[must_use]
    pub fn new(handle: Handle, owner: HouseId, coord: Coordinate) -> Self {
        let mut foot = FootData::new(Locomotion::Fly, AIRCRAFT_SPEED);
        foot.home = coord.to_cell();
        Self {
            object: ObjectData::new(Rtti::Aircraft, handle, owner, coord),
            map: MapData::new(AIRCRAFT_STRENGTH, Armor::Light),
            mission: MissionControl::new(Mission::Guard),
            radio: RadioData::default(),
            combat: CombatData::new(Some(Weapon::ROCKET)),
            foot,
        }
    }
}

impl Object for Aircraft {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn ai(&mut self, world: &mut World) {
        self.foot_ai(world);
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

impl MapObject for Aircraft {
    fn map(&self) -> &MapData {
        &self.map
    }

    fn map_mut(&mut self) -> &mut MapData {
        &mut self.map
    }
}

impl MissionObject for Aircraft {
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

    fn mission_retreat(&mut self, world: &mut World) -> u32 {
        retreat_mission(self, world)
    }

    fn mission_stop(&mut self, world: &mut World) -> u32 {
        stop_mission(self, world)
    }
}

impl RadioObject for Aircraft {
    fn radio(&self) -> &RadioData {
        &self.radio
    }

    fn radio_mut(&mut self) -> &mut RadioData {
        &mut self.radio
    }
}

impl CombatObject for Aircraft {
    fn combat(&self) -> &CombatData {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatData {
        &mut self.combat
    }
}

impl MobileObject for Aircraft {
    fn foot(&self) -> &FootData {
        &self.foot
    }

    fn foot_mut(&mut self) -> &mut FootData {
        &mut self.foot
    }
}
