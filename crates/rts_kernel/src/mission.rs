//! Mission enumeration and the per-entity mission state machine.
//!
//! A mission-bearing entity always has exactly one current [`Mission`].
//! [`MissionControl::override_mission`] parks the current mission in a
//! single suspension slot; a second override before a restore overwrites
//! that slot. This is one level deep on purpose, not a stack.
//!
//! Handlers report how many ticks to wait before they are polled again;
//! the countdown lives in [`MissionControl::timer`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ticks per second of simulated time.
pub const TICKS_PER_SECOND: u32 = 15;

/// Re-poll interval for idle missions.
pub const IDLE_DELAY: u32 = TICKS_PER_SECOND * 4;
/// Re-poll interval for missions watching their surroundings.
pub const SCAN_DELAY: u32 = TICKS_PER_SECOND / 2;
/// Re-poll interval for missions that act every tick.
pub const IMMEDIATE_DELAY: u32 = 1;

/// Behavioural state of a mission-bearing entity.
///
/// Ordinals are persisted in save data and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mission {
    /// Do nothing.
    #[default]
    Sleep = 0,
    /// Engage the current attack target.
    Attack = 1,
    /// Travel to the navigation target.
    Move = 2,
    /// Fall back out of danger.
    Retreat = 3,
    /// Hold position, engage anything in range.
    Guard = 4,
    /// Hold position without chasing.
    Sticky = 5,
    /// Move into another entity (transport, depot, refinery).
    Enter = 6,
    /// Take over a building.
    Capture = 7,
    /// Gather resources.
    Harvest = 8,
    /// Guard an area, chasing briefly then returning.
    GuardArea = 9,
    /// Return to a home structure.
    Return = 10,
    /// Halt everything.
    Stop = 11,
    /// Wait hidden until an enemy approaches.
    Ambush = 12,
    /// Seek out and attack enemies anywhere.
    Hunt = 13,
    /// Hunt after a delay.
    TimedHunt = 14,
    /// Release cargo or passengers.
    Unload = 15,
    /// Enter and destroy a building.
    Sabotage = 16,
    /// Building is being placed.
    Construction = 17,
    /// Building is being sold.
    Deconstruction = 18,
    /// Seek or perform repair.
    Repair = 19,
    /// Recover a special unit.
    Rescue = 20,
    /// Launch a special weapon.
    Missile = 21,
}

impl Mission {
    /// Every mission in ordinal order.
    pub const ALL: [Self; 22] = [
        Self::Sleep,
        Self::Attack,
        Self::Move,
        Self::Retreat,
        Self::Guard,
        Self::Sticky,
        Self::Enter,
        Self::Capture,
        Self::Harvest,
        Self::GuardArea,
        Self::Return,
        Self::Stop,
        Self::Ambush,
        Self::Hunt,
        Self::TimedHunt,
        Self::Unload,
        Self::Sabotage,
        Self::Construction,
        Self::Deconstruction,
        Self::Repair,
        Self::Rescue,
        Self::Missile,
    ];

    /// Decode a persisted ordinal.
    #[must_use]
    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Persisted ordinal.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Whether this mission is a "waiting for orders" state.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Sleep | Self::Guard | Self::Sticky | Self::Stop)
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Mission state owned by each mission-bearing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MissionControl {
    current: Mission,
    suspended: Option<Mission>,
    queued: Option<Mission>,
    /// Handler-private sub-step; reset on every assignment.
    pub status: i32,
    /// Ticks left before the handler is polled again.
    pub timer: u32,
}

impl MissionControl {
    /// Start in `mission` with the handler due immediately.
    #[must_use]
    pub const fn new(mission: Mission) -> Self {
        Self {
            current: mission,
            suspended: None,
            queued: None,
            status: 0,
            timer: 0,
        }
    }

    /// Current mission.
    #[must_use]
    pub const fn current(&self) -> Mission {
        self.current
    }

    /// Mission parked by the last override, if any.
    #[must_use]
    pub const fn suspended(&self) -> Option<Mission> {
        self.suspended
    }

    /// Mission waiting to commence on the next update, if any.
    #[must_use]
    pub const fn queued(&self) -> Option<Mission> {
        self.queued
    }

    /// Make `mission` current, resetting status and timer.
    pub fn assign(&mut self, mission: Mission) {
        self.current = mission;
        self.status = 0;
        self.timer = 0;
    }

    /// Defer `mission` until the owner's next update.
    pub fn queue(&mut self, mission: Mission) {
        self.queued = Some(mission);
    }

    /// Take the queued mission, if any.
    pub fn take_queued(&mut self) -> Option<Mission> {
        self.queued.take()
    }

    /// Suspend the current (or pending queued) mission and assign `mission`.
    ///
    /// Overwrites any previously suspended mission.
    pub fn override_mission(&mut self, mission: Mission) {
        let parked = self.queued.take().unwrap_or(self.current);
        self.suspended = Some(parked);
        self.assign(mission);
    }

    /// Re-assign the suspended mission. Returns `false` (and changes
    /// nothing) when there is none.
    pub fn restore(&mut self) -> bool {
        match self.suspended.take() {
            Some(mission) => {
                self.assign(mission);
                true
            }
            None => false,
        }
    }

    /// Count down one tick. Returns `true` when the handler is due.
    pub fn tick(&mut self) -> bool {
        if self.timer > 0 {
            self.timer -= 1;
        }
        self.timer == 0
    }

    /// Schedule the next poll `delay` ticks from now (at least one).
    pub fn set_delay(&mut self, delay: u32) {
        self.timer = delay.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        for (i, mission) in Mission::ALL.iter().enumerate() {
            assert_eq!(usize::from(mission.ordinal()), i);
            assert_eq!(Mission::from_ordinal(i as u8), Some(*mission));
        }
        assert_eq!(Mission::Missile.ordinal(), 21);
        assert_eq!(Mission::from_ordinal(22), None);
    }

    #[test]
    fn test_assign_resets_status_and_timer() {
        let mut mc = MissionControl::new(Mission::Guard);
        mc.status = 3;
        mc.timer = 40;
        mc.assign(Mission::Move);
        assert_eq!(mc.current(), Mission::Move);
        assert_eq!(mc.status, 0);
        assert_eq!(mc.timer, 0);
    }

    #[test]
    fn test_override_then_restore() {
        let mut mc = MissionControl::new(Mission::Sleep);
        mc.assign(Mission::Guard);
        mc.override_mission(Mission::Attack);
        assert_eq!(mc.current(), Mission::Attack);
        assert_eq!(mc.suspended(), Some(Mission::Guard));
        assert!(mc.restore());
        assert_eq!(mc.current(), Mission::Guard);
        assert_eq!(mc.suspended(), None);
    }

    #[test]
    fn test_second_override_discards_first_suspension() {
        let mut mc = MissionControl::new(Mission::Guard);
        mc.override_mission(Mission::Move);
        mc.override_mission(Mission::Attack);
        assert_eq!(mc.suspended(), Some(Mission::Move));
        assert!(mc.restore());
        assert_eq!(mc.current(), Mission::Move);
        assert!(!mc.restore(), "Guard is gone after the second override");
        assert_eq!(mc.current(), Mission::Move);
    }

    #[test]
    fn test_restore_without_suspension_is_noop() {
        let mut mc = MissionControl::new(Mission::Hunt);
        mc.status = 2;
        assert!(!mc.restore());
        assert_eq!(mc.current(), Mission::Hunt);
        assert_eq!(mc.status, 2);
    }

    #[test]
    fn test_override_parks_pending_queue() {
        let mut mc = MissionControl::new(Mission::Sleep);
        mc.queue(Mission::Harvest);
        mc.override_mission(Mission::Retreat);
        assert_eq!(mc.suspended(), Some(Mission::Harvest));
        assert_eq!(mc.queued(), None);
    }

    #[test]
    fn test_timer_countdown() {
        let mut mc = MissionControl::new(Mission::Sleep);
        assert!(mc.tick(), "fresh mission is due at once");
        mc.set_delay(3);
        assert!(!mc.tick());
        assert!(!mc.tick());
        assert!(mc.tick());
        mc.set_delay(0);
        assert_eq!(mc.timer, 1);
    }
}
