// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

//! Storage for entries, addressed by stable [`EntryHandle`]s.
//!
//! ```text
//! slots: [ Occupied(gen 3) | Vacant(gen 1) | Occupied(gen 0) ]
//!              ▲                   ▲
//!      EntryHandle{0,3}     free_list = [1]
//! ```
//!
//! A slot's `generation` is bumped when its entry is removed, so a handle that outlived
//! its entry never matches the next occupant. A slot's `registration_serial` is bumped on
//! every registration and is what goes into the epoll data word (see [`EntryToken`]).

use super::Entry;
use std::fmt::{Display, Formatter};

/// Stable reference to an entry stored in an [`EvLoop`].
///
/// [`EvLoop`]: super::EvLoop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    index: u32,
    generation: u32,
}

impl EntryHandle {
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self { Self { index, generation } }

    #[must_use]
    pub const fn index(self) -> u32 { self.index }

    #[must_use]
    pub const fn generation(self) -> u32 { self.generation }
}

impl Display for EntryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// The value stored in the epoll data word: slot index in the upper half, registration
/// serial in the lower half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryToken(pub(crate) u64);

impl EntryToken {
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub(crate) const fn new(index: u32, serial: u32) -> Self {
        Self(((index as u64) << 32) | serial as u64)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 { (self.0 >> 32) as u32 }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn serial(self) -> u32 { self.0 as u32 }
}

/// An entry plus the arena-side registration state.
#[derive(Debug)]
pub(crate) struct EntryRecord {
    pub entry: Entry,
    /// `true` while the entry's descriptor is in the epoll set.
    pub registered: bool,
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Occupied(EntryRecord),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    registration_serial: u32,
    state: SlotState,
}

#[derive(Debug, Default)]
pub(crate) struct EntryArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    len: usize,
}

impl EntryArena {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of stored entries, registered or not.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Stores `entry` unregistered, reusing a vacant slot when there is one.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, entry: Entry) -> EntryHandle {
        let record = EntryRecord {
            entry,
            registered: false,
        };
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = SlotState::Occupied(record);
            return EntryHandle::new(index, slot.generation);
        }

        let Ok(index) = u32::try_from(self.slots.len()) else {
            panic!("entry arena is full: {} slots", self.slots.len());
        };
        self.slots.push(Slot {
            generation: 0,
            registration_serial: 0,
            state: SlotState::Occupied(record),
        });
        EntryHandle::new(index, 0)
    }

    /// Removes the entry behind `handle`, making the handle stale.
    pub fn remove(&mut self, handle: EntryHandle) -> Option<Entry> {
        let slot = self.live_slot_mut(handle)?;
        let SlotState::Occupied(record) = std::mem::replace(&mut slot.state, SlotState::Vacant)
        else {
            return None;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(record.entry)
    }

    #[must_use]
    pub fn contains(&self, handle: EntryHandle) -> bool { self.get(handle).is_some() }

    #[must_use]
    pub fn get(&self, handle: EntryHandle) -> Option<&EntryRecord> {
        let slot = self.slots.get(handle.index as usize)?;
        match &slot.state {
            SlotState::Occupied(record) if slot.generation == handle.generation => {
                Some(record)
            }
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, handle: EntryHandle) -> Option<&mut EntryRecord> {
        match &mut self.live_slot_mut(handle)?.state {
            SlotState::Occupied(record) => Some(record),
            SlotState::Vacant => None,
        }
    }

    /// Bumps the slot's registration serial and returns the token for the new
    /// registration.
    pub(crate) fn next_token(&mut self, handle: EntryHandle) -> Option<EntryToken> {
        let slot = self.live_slot_mut(handle)?;
        slot.registration_serial = slot.registration_serial.wrapping_add(1);
        Some(EntryToken::new(handle.index, slot.registration_serial))
    }

    /// Resolves a token reported by `epoll_wait` to the handle of a currently registered
    /// entry. Returns `None` for stale tokens: the slot is vacant, the entry is no longer
    /// registered, or it was registered again since the event was reported.
    #[must_use]
    pub(crate) fn resolve(&self, token: EntryToken) -> Option<EntryHandle> {
        let slot = self.slots.get(token.index() as usize)?;
        match &slot.state {
            SlotState::Occupied(record)
                if record.registered && slot.registration_serial == token.serial() =>
            {
                Some(EntryHandle::new(token.index(), slot.generation))
            }
            _ => None,
        }
    }

    /// Handles of every stored entry, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<EntryHandle> {
        self.slots
            .iter()
            .zip(0_u32..)
            .filter(|(slot, _)| matches!(slot.state, SlotState::Occupied(_)))
            .map(|(slot, index)| EntryHandle::new(index, slot.generation))
            .collect()
    }

    fn live_slot_mut(&mut self, handle: EntryHandle) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        let live =
            slot.generation == handle.generation && matches!(slot.state, SlotState::Occupied(_));
        live.then_some(slot)
    }
}
