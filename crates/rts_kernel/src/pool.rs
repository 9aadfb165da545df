//! Fixed-capacity object pools ("heaps").
//!
//! Every entity category lives in one [`Pool`] whose capacity is fixed at
//! creation from [`PoolCapacities`]. A slot index stays attached to the
//! same entity for its whole life, which is what makes [`Target`] values
//! stable across save/load and across machines.
//!
//! # Determinism
//!
//! - Allocation always takes the lowest free slot.
//! - Iteration is in slot order.
//! - Exhaustion is fatal through [`Pool::allocate`]; the pool never grows.
//!
//! Each slot carries a generation that advances on every allocation, so a
//! [`Target`] minted for a previous occupant stops resolving as soon as the
//! slot is released, and keeps failing after the slot is reused.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::target::{Rtti, Target, GENERATION_MASK};

/// Stable identity of an allocated slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    /// Slot index inside the category pool.
    pub index: u16,
    /// Generation of the slot when this handle was minted.
    pub generation: u8,
}

impl Handle {
    /// Target addressing this slot in the given category.
    #[must_use]
    pub const fn target(self, rtti: Rtti) -> Target {
        Target::with_generation(rtti, self.index, self.generation)
    }

    /// Handle encoded in a target, if it is a pool target.
    #[must_use]
    pub const fn from_target(target: Target) -> Option<Self> {
        if target.is_entity() {
            Some(Self {
                index: target.index(),
                generation: target.generation(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SlotState<T> {
    Free,
    Active(T),
    /// Checked out by the driver or a radio call; still owned by the slot.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot<T> {
    generation: u8,
    state: SlotState<T>,
}

/// Fixed-capacity slot table for one entity category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool<T> {
    rtti: Rtti,
    slots: Vec<Slot<T>>,
    free: BTreeSet<u16>,
}

impl<T> Pool<T> {
    /// Create an empty pool.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit the 16-bit index space.
    #[must_use]
    pub fn new(rtti: Rtti, capacity: usize) -> Self {
        assert!(capacity > 0, "Pool capacity must be positive");
        assert!(
            capacity < usize::from(Target::INVALID_INDEX),
            "Pool capacity must fit the 16-bit index space"
        );

        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                state: SlotState::Free,
            })
            .collect();
        // Capacity was checked above, so every index fits in u16.
        let free = (0..capacity as u16).collect();

        Self { rtti, slots, free }
    }

    /// Category this pool stores.
    #[must_use]
    pub const fn rtti(&self) -> Rtti {
        self.rtti
    }

    /// Fixed number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots (active or detached).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    /// Whether every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Claim the lowest free slot, building its occupant from the handle.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::PoolExhausted`] when every slot is taken.
    pub fn try_allocate(&mut self, build: impl FnOnce(Handle) -> T) -> Result<Handle> {
        let Some(index) = self.free.pop_first() else {
            return Err(KernelError::PoolExhausted {
                rtti: self.rtti,
                capacity: self.capacity(),
            });
        };

        let slot = &mut self.slots[usize::from(index)];
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        // Generation 0 is what an unpinned `Target::new` carries.
        if slot.generation == 0 {
            slot.generation = 1;
        }
        let handle = Handle {
            index,
            generation: slot.generation,
        };
        slot.state = SlotState::Active(build(handle));
        Ok(handle)
    }

    /// Claim the lowest free slot.
    ///
    /// # Panics
    ///
    /// Exhaustion is fatal: this panics with "pool exhausted" rather than
    /// dropping the entity or growing the pool.
    pub fn allocate(&mut self, build: impl FnOnce(Handle) -> T) -> Handle {
        match self.try_allocate(build) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(rtti = %self.rtti, capacity = self.capacity(), "pool exhausted");
                panic!("pool exhausted: {err}");
            }
        }
    }

    /// Free an active slot and return its occupant.
    ///
    /// Returns `None` for stale handles, free slots and detached slots.
    pub fn release(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        if !matches!(slot.state, SlotState::Active(_)) {
            return None;
        }
        let SlotState::Active(value) = std::mem::replace(&mut slot.state, SlotState::Free) else {
            return None;
        };
        self.free.insert(handle.index);
        Some(value)
    }

    /// Occupant of slot `index`, whatever its generation.
    #[must_use]
    pub fn lookup(&self, index: u16) -> Option<&T> {
        match &self.slots.get(usize::from(index))?.state {
            SlotState::Active(value) => Some(value),
            _ => None,
        }
    }

    /// Occupant addressed by `handle`, if the slot still holds it.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        match &self.slot(handle)?.state {
            SlotState::Active(value) => Some(value),
            _ => None,
        }
    }

    /// Mutable occupant addressed by `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match &mut self.slot_mut(handle)?.state {
            SlotState::Active(value) => Some(value),
            _ => None,
        }
    }

    /// Resolve a target of this pool's category.
    #[must_use]
    pub fn resolve(&self, target: Target) -> Option<&T> {
        if target.rtti() != self.rtti {
            return None;
        }
        self.get(Handle::from_target(target)?)
    }

    /// Resolve a target of this pool's category mutably.
    pub fn resolve_mut(&mut self, target: Target) -> Option<&mut T> {
        if target.rtti() != self.rtti {
            return None;
        }
        self.get_mut(Handle::from_target(target)?)
    }

    /// Whether `handle` addresses an occupied slot (active or detached).
    #[must_use]
    pub fn is_occupied(&self, handle: Handle) -> bool {
        self.slot(handle)
            .is_some_and(|slot| !matches!(slot.state, SlotState::Free))
    }

    /// Check an occupant out of its slot. The slot stays reserved.
    pub fn detach(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        if !matches!(slot.state, SlotState::Active(_)) {
            return None;
        }
        match std::mem::replace(&mut slot.state, SlotState::Detached) {
            SlotState::Active(value) => Some(value),
            _ => None,
        }
    }

    /// Return a detached occupant to its slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not detached under this handle; that would
    /// mean two entities share an index.
    pub fn reattach(&mut self, handle: Handle, value: T) {
        let rtti = self.rtti;
        let slot = self
            .slot_mut(handle)
            .filter(|slot| matches!(slot.state, SlotState::Detached));
        match slot {
            Some(slot) => slot.state = SlotState::Active(value),
            None => panic!("reattach to {rtti} slot {} that is not detached", handle.index),
        }
    }

    /// Handles of all active slots in slot order.
    #[must_use]
    pub fn active_handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Iterate over active occupants in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.state {
            SlotState::Active(value) => Some((
                Handle {
                    index: index as u16,
                    generation: slot.generation,
                },
                value,
            )),
            _ => None,
        })
    }

    /// Iterate mutably over active occupants in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                match &mut slot.state {
                    SlotState::Active(value) => Some((
                        Handle {
                            index: index as u16,
                            generation,
                        },
                        value,
                    )),
                    _ => None,
                }
            })
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation)
    }
}

/// Per-category pool limits, read once before any entity exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolCapacities {
    /// Ground vehicles.
    pub vehicles: usize,
    /// Foot soldiers.
    pub infantry: usize,
    /// Structures.
    pub buildings: usize,
    /// In-flight projectiles.
    pub projectiles: usize,
    /// Transient effects.
    pub effects: usize,
    /// Flying units.
    pub aircraft: usize,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            vehicles: 500,
            infantry: 500,
            buildings: 500,
            projectiles: 50,
            effects: 100,
            aircraft: 100,
        }
    }
}

impl PoolCapacities {
    /// Limit for a category (zero for non-pool categories).
    #[must_use]
    pub const fn capacity_for(&self, rtti: Rtti) -> usize {
        match rtti {
            Rtti::Vehicle => self.vehicles,
            Rtti::Infantry => self.infantry,
            Rtti::Building => self.buildings,
            Rtti::Projectile => self.projectiles,
            Rtti::Effect => self.effects,
            Rtti::Aircraft => self.aircraft,
            Rtti::None | Rtti::Cell => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(capacity: usize) -> Pool<u32> {
        Pool::new(Rtti::Infantry, capacity)
    }

    #[test]
    fn test_allocate_lowest_free_slot() {
        let mut p = pool(4);
        let a = p.allocate(|_| 10);
        let b = p.allocate(|_| 11);
        let c = p.allocate(|_| 12);
        assert_eq!((a.index, b.index, c.index), (0, 1, 2));

        p.release(b);
        let d = p.allocate(|_| 13);
        assert_eq!(d.index, 1, "released slot is reused first");
        assert_ne!(d.generation, b.generation);
    }

    #[test]
    fn test_try_allocate_reports_exhaustion() {
        let mut p = pool(1);
        p.allocate(|_| 1);
        let err = p.try_allocate(|_| 2).unwrap_err();
        assert!(matches!(
            err,
            KernelError::PoolExhausted {
                rtti: Rtti::Infantry,
                capacity: 1
            }
        ));
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn test_allocate_past_capacity_is_fatal() {
        let mut p = pool(2);
        p.allocate(|_| 1);
        p.allocate(|_| 2);
        p.allocate(|_| 3);
    }

    #[test]
    fn test_stale_target_does_not_resolve_after_reuse() {
        let mut p = pool(1);
        let first = p.allocate(|_| 100);
        let stale = first.target(Rtti::Infantry);
        assert_eq!(p.resolve(stale), Some(&100));

        p.release(first);
        assert_eq!(p.resolve(stale), None);

        let second = p.allocate(|_| 200);
        assert_eq!(second.index, first.index);
        assert_eq!(p.resolve(stale), None, "reused slot must not answer old target");
        assert_eq!(p.resolve(second.target(Rtti::Infantry)), Some(&200));
        assert_eq!(p.lookup(first.index), Some(&200));
    }

    #[test]
    fn test_generation_wrap_skips_zero() {
        let mut p = pool(1);
        let unpinned = Target::new(Rtti::Infantry, 0);
        let mut seen = Vec::new();
        for i in 0..300 {
            let h = p.allocate(|_| i);
            assert_ne!(h.generation, 0, "allocation {i} produced generation 0");
            assert_eq!(p.resolve(unpinned), None);
            seen.push(h.generation);
            p.release(h);
        }
        assert_eq!(seen[126], 127);
        assert_eq!(seen[127], 1, "wraps back to 1");
    }

    #[test]
    fn test_resolve_rejects_other_category() {
        let mut p = pool(2);
        let h = p.allocate(|_| 5);
        assert_eq!(p.resolve(h.target(Rtti::Vehicle)), None);
        assert_eq!(p.resolve(Target::NONE), None);
    }

    #[test]
    fn test_builder_sees_own_handle() {
        let mut p: Pool<Handle> = Pool::new(Rtti::Vehicle, 3);
        let h = p.allocate(|handle| handle);
        assert_eq!(p.get(h), Some(&h));
    }

    #[test]
    fn test_detached_slot_is_hidden_and_reserved() {
        let mut p = pool(1);
        let h = p.allocate(|_| 7);
        let value = p.detach(h).unwrap();
        assert_eq!(p.get(h), None);
        assert!(p.is_occupied(h));
        assert!(p.try_allocate(|_| 8).is_err());
        assert_eq!(p.release(h), None, "detached slot cannot be released");
        p.reattach(h, value + 1);
        assert_eq!(p.get(h), Some(&8));
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut p = pool(5);
        let handles: Vec<_> = (0..5).map(|n| p.allocate(|_| n)).collect();
        p.release(handles[1]);
        p.release(handles[3]);
        let seen: Vec<u32> = p.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec![0, 2, 4]);
    }

    #[test]
    fn test_capacity_table_defaults() {
        let caps = PoolCapacities::default();
        assert!(caps.aircraft < caps.infantry);
        assert!(caps.projectiles < caps.infantry);
        assert_eq!(caps.capacity_for(Rtti::Cell), 0);
    }

    proptest! {
        #[test]
        fn prop_active_set_matches_allocations(
            count in 1usize..40,
            releases in proptest::collection::vec(any::<bool>(), 40),
        ) {
            let mut p = pool(40);
            let handles: Vec<_> = (0..count).map(|n| p.allocate(|_| n as u32)).collect();
            let mut expected = Vec::new();
            for (i, handle) in handles.iter().enumerate() {
                if releases[i] {
                    prop_assert!(p.release(*handle).is_some());
                } else {
                    expected.push(handle.index);
                }
            }
            let active: Vec<u16> = p.iter().map(|(h, _)| h.index).collect();
            prop_assert_eq!(active, expected);
            prop_assert_eq!(p.len(), p.iter().count());
        }
    }
}
