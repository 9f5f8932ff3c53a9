// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

use super::{EntryArena, EntryHandle, EvLoopError, LoopFlags};
use rustix::{event::epoll, fd::OwnedFd};

/// Maximum number of ready events retrieved by one `epoll_wait` call (one batch).
pub const EPOLL_BATCH_CAPACITY: usize = 64;

/// The loop context.
///
/// Owns exactly one epoll descriptor, the arena of entries, the count of entries that
/// are currently in the readiness set, and the "stop requested" flag.
///
/// # Resources Managed
///
/// | Resource                | Purpose                                           |
/// | :---------------------- | :------------------------------------------------ |
/// | [`epoll_fd`]            | The readiness set, closed on drop                 |
/// | [`entries`]             | Every inserted entry, registered or not           |
/// | [`ready_events_buffer`] | Reused buffer for one batch of ready events       |
///
/// Not thread safe: all operations, including every callback, run on the thread that
/// calls [`run()`]. Callbacks are not [`Send`], so neither is the loop.
///
/// [`entries`]: Self::entries
/// [`epoll_fd`]: Self::epoll_fd
/// [`ready_events_buffer`]: Self::ready_events_buffer
/// [`run()`]: Self::run
pub struct EvLoop {
    /// The epoll instance.
    pub(crate) epoll_fd: OwnedFd,

    /// Flags the loop was created with.
    pub(crate) flags: LoopFlags,

    /// Entries currently in the epoll set. Only changes on a successful
    /// `epoll_ctl(ADD)` / `epoll_ctl(DEL)`, so it never underflows.
    pub(crate) live_entries: usize,

    /// Set by [`request_stop()`], consumed by [`run()`] at the end of a batch.
    ///
    /// [`request_stop()`]: Self::request_stop
    /// [`run()`]: Self::run
    pub(crate) stop_requested: bool,

    /// Entry storage.
    pub(crate) entries: EntryArena,

    /// Buffer for events returned by `epoll_wait`.
    pub(crate) ready_events_buffer: Vec<epoll::Event>,
}

impl EvLoop {
    /// Creates the epoll instance.
    ///
    /// # Errors
    ///
    /// [`EvLoopError::CreateFailed`] if `epoll_create1()` fails.
    pub fn new(flags: LoopFlags) -> Result<Self, EvLoopError> {
        let epoll_fd = epoll::create(flags.to_create_flags())
            .map_err(|errno| EvLoopError::CreateFailed(errno.into()))?;

        tracing::debug!(message = "ev_loop: created", ?flags);

        Ok(Self {
            epoll_fd,
            flags,
            live_entries: 0,
            stop_requested: false,
            entries: EntryArena::new(),
            ready_events_buffer: Vec::with_capacity(EPOLL_BATCH_CAPACITY),
        })
    }

    /// Shorthand for `EvLoop::new(LoopFlags::try_from(bits)?)`.
    ///
    /// # Errors
    ///
    /// [`EvLoopError::InvalidFlags`] for unrecognized bits, otherwise as [`new()`].
    ///
    /// [`new()`]: Self::new
    pub fn from_bits(bits: u32) -> Result<Self, EvLoopError> {
        Self::new(LoopFlags::try_from(bits)?)
    }

    /// Closes the epoll descriptor and clears the loop state. Never fails.
    ///
    /// Free your entries first: any entry still stored in the arena is dropped here
    /// (closing the descriptors the loop created for it) and a warning is logged.
    pub fn destroy(self) { drop(self); }

    /// Asks [`run()`] to return once the current batch has been dispatched. Nothing is
    /// unregistered or freed.
    ///
    /// [`run()`]: Self::run
    pub fn request_stop(&mut self) { self.stop_requested = true; }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool { self.stop_requested }

    /// Number of entries currently in the readiness set.
    #[must_use]
    pub fn live_entries(&self) -> usize { self.live_entries }

    /// Number of stored entries, registered or not.
    #[must_use]
    pub fn stored_entries(&self) -> usize { self.entries.len() }

    #[must_use]
    pub fn flags(&self) -> LoopFlags { self.flags }

    /// `true` if `handle` refers to a stored entry.
    #[must_use]
    pub fn contains(&self, handle: EntryHandle) -> bool { self.entries.contains(handle) }

    /// `true` if `handle` refers to an entry that is in the readiness set.
    #[must_use]
    pub fn is_registered(&self, handle: EntryHandle) -> bool {
        self.entries.get(handle).is_some_and(|record| record.registered)
    }

    /// The entry behind `handle`, for inspection.
    #[must_use]
    pub fn entry(&self, handle: EntryHandle) -> Option<&super::Entry> {
        self.entries.get(handle).map(|record| &record.entry)
    }
}

impl std::fmt::Debug for EvLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvLoop")
            .field("epoll_fd", &self.epoll_fd)
            .field("flags", &self.flags)
            .field("live_entries", &self.live_entries)
            .field("stop_requested", &self.stop_requested)
            .field("stored_entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Drop for EvLoop {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                message = "ev_loop: destroyed with entries still stored, releasing them",
                leftover = ?self.entries.handles(),
                live = self.live_entries
            );
        }
        self.live_entries = 0;
        self.stop_requested = false;
        self.entries = EntryArena::new();
        tracing::debug!(message = "ev_loop: destroyed");
        // `epoll_fd` is closed when the field is dropped.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_loop_is_idle() {
        let ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        assert_eq!(ev_loop.live_entries(), 0);
        assert_eq!(ev_loop.stored_entries(), 0);
        assert!(!ev_loop.is_stop_requested());
        assert_eq!(ev_loop.flags(), LoopFlags::None);
    }

    #[test]
    fn close_on_exec_is_applied_to_the_epoll_descriptor() {
        let with = EvLoop::new(LoopFlags::CloseOnExec).unwrap();
        let without = EvLoop::new(LoopFlags::None).unwrap();
        let cloexec = |ev_loop: &EvLoop| {
            rustix::io::fcntl_getfd(&ev_loop.epoll_fd)
                .unwrap()
                .contains(rustix::io::FdFlags::CLOEXEC)
        };
        assert!(cloexec(&with));
        assert!(!cloexec(&without));
    }

    #[test]
    fn from_bits_rejects_unknown_flags() {
        let result = EvLoop::from_bits(0x80);
        assert!(matches!(result, Err(EvLoopError::InvalidFlags { bits: 0x80 })));
        assert!(EvLoop::from_bits(1).is_ok());
    }

    #[test]
    fn request_stop_sets_the_flag_only() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        ev_loop.request_stop();
        assert!(ev_loop.is_stop_requested());
        assert_eq!(ev_loop.live_entries(), 0);
    }
}
