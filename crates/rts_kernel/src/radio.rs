//! Point-to-point radio between two entities.
//!
//! Radio is how two entities coordinate multi-step interactions (docking
//! at a refinery, boarding a transport, repair on a depot). A link is
//! opened with [`RadioMessage::Hello`] and closed with
//! [`RadioMessage::OverOut`]; while open, both sides hold each other as
//! their single `contact`. Any message other than `Hello` from an entity
//! that is not the receiver's contact is refused.
//!
//! Delivery is a direct call into the receiver within the same tick. The
//! sender is checked out of its pool while it runs, so a receiver that
//! tries to transmit straight back gets [`RadioMessage::Negative`]; a
//! reply travels only through the return value and the in/out parameter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::MissionObject;
use crate::mission::Mission;
use crate::target::Target;
use crate::world::World;

/// Radio message and reply vocabulary.
///
/// Ordinals are persisted and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RadioMessage {
    /// "No comment"; the layer did not handle the message.
    #[default]
    Static = 0,
    /// Acknowledged.
    Roger = 1,
    /// Open a link.
    Hello = 2,
    /// Close the link.
    OverOut = 3,
    /// Transport: take me aboard.
    PickUp = 4,
    /// Dock: I am in position, attach me.
    Attach = 5,
    /// Cargo delivered.
    Delivery = 6,
    /// Stop moving; someone is about to dock with you.
    HoldStill = 7,
    /// Unloading complete.
    Unloaded = 8,
    /// Take this much cargo (amount in the parameter).
    Unload = 9,
    /// Refused.
    Negative = 10,
    /// Busy building.
    Building = 11,
    /// Go to the cell in the parameter first.
    NeedToMove = 12,
    /// Repair: I am on the pad.
    OnDepot = 13,
    /// Repair: one increment of hit points (amount in the parameter).
    RepairOneStep = 14,
    /// Ready.
    Prepared = 15,
    /// Back away from the dock.
    BackupNow = 16,
    /// Leave immediately.
    RunAway = 17,
    /// Stay bound to the sender; do not move away.
    Tether = 18,
    /// Binding released.
    Untether = 19,
    /// Repair abandoned by the unit.
    RepairCancelled = 20,
}

impl RadioMessage {
    /// Every message in ordinal order.
    pub const ALL: [Self; 21] = [
        Self::Static,
        Self::Roger,
        Self::Hello,
        Self::OverOut,
        Self::PickUp,
        Self::Attach,
        Self::Delivery,
        Self::HoldStill,
        Self::Unloaded,
        Self::Unload,
        Self::Negative,
        Self::Building,
        Self::NeedToMove,
        Self::OnDepot,
        Self::RepairOneStep,
        Self::Prepared,
        Self::BackupNow,
        Self::RunAway,
        Self::Tether,
        Self::Untether,
        Self::RepairCancelled,
    ];

    /// Decode a persisted ordinal.
    #[must_use]
    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

impl fmt::Display for RadioMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Radio-layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RadioData {
    /// Entity at the other end of the link.
    pub contact: Target,
    /// Last message received.
    pub last_message: RadioMessage,
    /// Bound in place by the contact.
    pub tethered: bool,
}

/// Radio layer.
pub trait RadioObject: MissionObject {
    /// Radio state.
    fn radio(&self) -> &RadioData;
    /// Radio state, mutably.
    fn radio_mut(&mut self) -> &mut RadioData;

    /// Current link partner, [`Target::NONE`] when silent.
    fn contact(&self) -> Target {
        self.radio().contact
    }

    /// Radio-layer per-tick step: drop links the partner no longer holds,
    /// and close links the current mission has no use for.
    fn radio_ai(&mut self, world: &mut World) {
        self.mission_ai(world);
        let contact = self.radio().contact;
        if !self.is_active() || !contact.is_valid() {
            return;
        }
        let me = self.as_target();
        if world.contact_of(contact) != Some(me) {
            tracing::debug!(entity = %me, %contact, "radio link lost");
            let radio = self.radio_mut();
            radio.contact = Target::NONE;
            radio.tethered = false;
            return;
        }
        if !self.holds_radio_link() {
            self.release_link(world);
        }
    }

    /// Whether the current mission still needs an open link.
    fn holds_radio_link(&self) -> bool {
        matches!(
            self.mission().current(),
            Mission::Enter | Mission::Harvest | Mission::Repair | Mission::Unload | Mission::Return
        )
    }

    /// Close the current link.
    fn release_link(&mut self, world: &mut World) {
        let contact = self.radio().contact;
        if contact.is_valid() {
            self.transmit(world, RadioMessage::OverOut, &mut 0, contact);
        }
    }

    /// Send `message` to `to` (or to the current contact when `to` is
    /// [`Target::NONE`]) and return the receiver's reply.
    ///
    /// Only `Hello` may be sent to an entity that is not the contact.
    /// A successful `Hello` replaces any previous link; `OverOut` always
    /// clears the sender's side.
    fn transmit(
        &mut self,
        world: &mut World,
        message: RadioMessage,
        param: &mut i32,
        to: Target,
    ) -> RadioMessage {
        let me = self.as_target();
        let contact = self.radio().contact;
        let to = if to.is_valid() { to } else { contact };
        if !me.is_valid() || !to.is_entity() || to == me {
            return RadioMessage::Negative;
        }
        if message != RadioMessage::Hello && to != contact {
            tracing::trace!(entity = %me, %to, %message, "transmit outside link refused");
            return RadioMessage::Negative;
        }
        if message == RadioMessage::Hello && contact.is_valid() && contact != to {
            self.transmit(world, RadioMessage::OverOut, &mut 0, contact);
        }

        // A destroyed receiver keeps its slot until the graveyard is flushed.
        let reply = if world.is_alive(to) {
            world
                .with_techno(to, |receiver, world| receiver.receive(world, me, message, param))
                .unwrap_or(RadioMessage::Negative)
        } else {
            RadioMessage::Negative
        };
        tracing::trace!(entity = %me, %to, %message, %reply, param = *param, "radio");

        match message {
            RadioMessage::Hello if reply == RadioMessage::Roger => {
                self.radio_mut().contact = to;
            }
            RadioMessage::OverOut => {
                let radio = self.radio_mut();
                radio.contact = Target::NONE;
                radio.tethered = false;
            }
            _ => {}
        }
        reply
    }

    /// Message entry point. Concrete kinds override this to handle their
    /// own vocabulary and fall back to [`RadioObject::radio_receive`].
    fn receive(
        &mut self,
        world: &mut World,
        from: Target,
        message: RadioMessage,
        param: &mut i32,
    ) -> RadioMessage {
        self.radio_receive(world, from, message, param)
    }

    /// Base protocol: link management and tethering. Returns
    /// [`RadioMessage::Static`] for anything left to the concrete kind.
    fn radio_receive(
        &mut self,
        _world: &mut World,
        from: Target,
        message: RadioMessage,
        _param: &mut i32,
    ) -> RadioMessage {
        if !self.is_active() {
            return RadioMessage::Negative;
        }
        let radio = self.radio_mut();
        radio.last_message = message;
        match message {
            RadioMessage::Hello => {
                if radio.contact.is_valid() && radio.contact != from {
                    RadioMessage::Negative
                } else {
                    radio.contact = from;
                    RadioMessage::Roger
                }
            }
            RadioMessage::OverOut => {
                if radio.contact != from {
                    return RadioMessage::Negative;
                }
                radio.contact = Target::NONE;
                radio.tethered = false;
                RadioMessage::Roger
            }
            _ if !from.is_valid() || radio.contact != from => RadioMessage::Negative,
            RadioMessage::Tether => {
                radio.tethered = true;
                RadioMessage::Roger
            }
            RadioMessage::Untether => {
                radio.tethered = false;
                RadioMessage::Roger
            }
            _ => RadioMessage::Static,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        for (i, message) in RadioMessage::ALL.iter().enumerate() {
            assert_eq!(*message as usize, i);
            assert_eq!(RadioMessage::from_ordinal(i as u8), Some(*message));
        }
        assert_eq!(RadioMessage::Negative as u8, 10);
        assert_eq!(RadioMessage::RepairCancelled as u8, 20);
        assert_eq!(RadioMessage::from_ordinal(21), None);
    }

    #[test]
    fn test_default_state_is_silent() {
        let data = RadioData::default();
        assert_eq!(data.contact, Target::NONE);
        assert_eq!(data.last_message, RadioMessage::Static);
        assert!(!data.tethered);
    }
}
