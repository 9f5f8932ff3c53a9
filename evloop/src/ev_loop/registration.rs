// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll timerfd signalfd

//! Registration, arming, and cancellation of entries.
//!
//! | Operation           | Effect on the readiness set | Effect on the arena |
//! | :------------------ | :-------------------------- | :------------------ |
//! | [`insert()`]        | none                        | entry stored        |
//! | [`register()`]      | `epoll_ctl(ADD)`, live + 1  | descriptor armed    |
//! | [`add()`]           | as [`register()`]           | as [`insert()`]     |
//! | [`unregister()`]    | `epoll_ctl(DEL)`, live - 1  | none                |
//! | [`cancel_timer()`]  | as [`unregister()`]         | none                |
//! | [`free_entry()`]    | none (must be unregistered) | entry removed       |
//!
//! [`add()`]: EvLoop::add
//! [`cancel_timer()`]: EvLoop::cancel_timer
//! [`free_entry()`]: EvLoop::free_entry
//! [`insert()`]: EvLoop::insert
//! [`register()`]: EvLoop::register
//! [`unregister()`]: EvLoop::unregister

use super::{ArmedSource, Entry, EntryHandle, EntryKind, EvLoop, EvLoopError, EventFlags,
            WatchedFd, arm_oneshot_timer, arm_periodic_timer, arm_signal};
use rustix::event::epoll::{self, EventData};

/// Mask used for every descriptor the loop creates itself (timerfd, signalfd).
pub const KERNEL_SOURCE_INTEREST: EventFlags = EventFlags::IN
    .union(EventFlags::PRI)
    .union(EventFlags::ERR)
    .union(EventFlags::HUP);

/// Creates (for timers and signals) or picks (for caller descriptors) the descriptor to
/// watch, along with its epoll mask.
fn arm_source(kind: &EntryKind) -> std::io::Result<ArmedSource> {
    let armed = match kind {
        EntryKind::Raw { fd, interest, .. } => ArmedSource {
            fd: WatchedFd::Borrowed(*fd),
            interest: *interest,
        },
        EntryKind::ReadReady { fd, .. } => ArmedSource {
            fd: WatchedFd::Borrowed(*fd),
            interest: EventFlags::IN,
        },
        EntryKind::WriteReady { fd, .. } => ArmedSource {
            fd: WatchedFd::Borrowed(*fd),
            interest: EventFlags::OUT,
        },
        EntryKind::OneShotTimer { after, .. } => ArmedSource {
            fd: WatchedFd::Owned(arm_oneshot_timer(*after)?),
            interest: KERNEL_SOURCE_INTEREST,
        },
        EntryKind::PeriodicTimer { every, .. } => ArmedSource {
            fd: WatchedFd::Owned(arm_periodic_timer(*every)?),
            interest: KERNEL_SOURCE_INTEREST,
        },
        EntryKind::Signal { signals, .. } => ArmedSource {
            fd: WatchedFd::Owned(arm_signal(signals)?),
            interest: KERNEL_SOURCE_INTEREST,
        },
    };
    Ok(armed)
}

impl EvLoop {
    /// Stores `entry` in the loop without registering it.
    pub fn insert(&mut self, entry: Entry) -> EntryHandle {
        let kind = entry.source_kind();
        let handle = self.entries.insert(entry);
        tracing::debug!(message = "ev_loop: entry inserted", %handle, %kind);
        handle
    }

    /// Arms the entry's source and adds it to the readiness set.
    ///
    /// Timer entries get a fresh timerfd on every registration, so a one-shot timer that
    /// already fired can be registered again and counts its delay from now. Signal
    /// entries block their signal set for the calling thread first.
    ///
    /// # Errors
    ///
    /// - [`EvLoopError::StaleHandle`] if `handle` is dead.
    /// - [`EvLoopError::AlreadyRegistered`] if the entry is in the readiness set.
    /// - [`EvLoopError::RegisterFailed`] if arming or `epoll_ctl(ADD)` fails. The entry
    ///   stays unregistered and any descriptor created for it is closed.
    pub fn register(&mut self, handle: EntryHandle) -> Result<(), EvLoopError> {
        let record = self.entries.get(handle).ok_or(EvLoopError::StaleHandle(handle))?;
        if record.registered {
            return Err(EvLoopError::AlreadyRegistered(handle));
        }

        let kind = record.entry.source_kind();
        let register_failed = |source: std::io::Error| EvLoopError::RegisterFailed {
            handle,
            kind,
            source,
        };

        let armed = arm_source(&record.entry.kind).map_err(register_failed)?;
        let token = self
            .entries
            .next_token(handle)
            .ok_or(EvLoopError::StaleHandle(handle))?;
        let record = self
            .entries
            .get_mut(handle)
            .ok_or(EvLoopError::StaleHandle(handle))?;

        // Replacing the previous registration's source closes its timerfd / signalfd.
        let armed = record.entry.armed.insert(armed);

        // SAFETY: a borrowed descriptor is kept open by the caller while its entry is
        // registered; an owned one lives in the entry.
        let fd = unsafe { armed.fd.borrow() };
        let add_result =
            epoll::add(&self.epoll_fd, fd, EventData::new_u64(token.0), armed.interest);

        if let Err(errno) = add_result {
            record.entry.armed = None;
            tracing::warn!(message = "ev_loop: epoll_ctl(ADD) failed", %handle, %kind, ?errno);
            return Err(register_failed(errno.into()));
        }

        record.registered = true;
        self.live_entries += 1;

        tracing::debug!(
            message = "ev_loop: entry registered",
            %handle,
            %kind,
            live = self.live_entries
        );
        Ok(())
    }

    /// [`insert()`] then [`register()`]. If registration fails the entry is dropped.
    ///
    /// # Errors
    ///
    /// As [`register()`].
    ///
    /// [`insert()`]: Self::insert
    /// [`register()`]: Self::register
    pub fn add(&mut self, entry: Entry) -> Result<EntryHandle, EvLoopError> {
        let handle = self.insert(entry);
        if let Err(err) = self.register(handle) {
            drop(self.entries.remove(handle));
            return Err(err);
        }
        Ok(handle)
    }

    /// Removes the entry from the readiness set. The entry stays stored, so it can be
    /// registered again or freed. Descriptors are not closed.
    ///
    /// # Errors
    ///
    /// - [`EvLoopError::StaleHandle`] if `handle` is dead.
    /// - [`EvLoopError::NotRegistered`] if the entry is not in the readiness set.
    /// - [`EvLoopError::UnregisterFailed`] if `epoll_ctl(DEL)` fails. The entry is still
    ///   considered registered in that case.
    pub fn unregister(&mut self, handle: EntryHandle) -> Result<(), EvLoopError> {
        let record = self
            .entries
            .get_mut(handle)
            .ok_or(EvLoopError::StaleHandle(handle))?;
        if !record.registered {
            return Err(EvLoopError::NotRegistered(handle));
        }
        let Some(armed) = record.entry.armed.as_ref() else {
            return Err(EvLoopError::NotRegistered(handle));
        };

        // SAFETY: the entry is registered, so a borrowed descriptor is still open.
        let fd = unsafe { armed.fd.borrow() };
        epoll::delete(&self.epoll_fd, fd).map_err(|errno| {
            tracing::warn!(message = "ev_loop: epoll_ctl(DEL) failed", %handle, ?errno);
            EvLoopError::UnregisterFailed {
                handle,
                source: errno.into(),
            }
        })?;

        record.registered = false;
        self.live_entries -= 1;

        tracing::debug!(
            message = "ev_loop: entry unregistered",
            %handle,
            live = self.live_entries
        );
        Ok(())
    }

    /// Stops a one-shot or periodic timer before it fires again. Behaves exactly like
    /// [`unregister()`].
    ///
    /// # Errors
    ///
    /// As [`unregister()`].
    ///
    /// [`unregister()`]: Self::unregister
    pub fn cancel_timer(&mut self, handle: EntryHandle) -> Result<(), EvLoopError> {
        self.unregister(handle)
    }

    /// Removes the entry from the loop and hands it back. Dropping the returned entry
    /// closes the timerfd / signalfd the loop created for it; caller descriptors are
    /// left alone.
    ///
    /// Allowed from inside the entry's own callback.
    ///
    /// # Errors
    ///
    /// - [`EvLoopError::StaleHandle`] if `handle` is dead.
    /// - [`EvLoopError::StillRegistered`] if the entry is in the readiness set.
    pub fn free_entry(&mut self, handle: EntryHandle) -> Result<Entry, EvLoopError> {
        let record = self.entries.get(handle).ok_or(EvLoopError::StaleHandle(handle))?;
        if record.registered {
            return Err(EvLoopError::StillRegistered(handle));
        }
        let entry = self
            .entries
            .remove(handle)
            .ok_or(EvLoopError::StaleHandle(handle))?;
        tracing::debug!(message = "ev_loop: entry freed", %handle);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoopFlags, SourceKind, set_non_blocking};
    use pretty_assertions::assert_eq;
    use rustix::fd::AsRawFd as _;
    use std::{io::ErrorKind, time::Duration};

    fn new_loop() -> EvLoop { EvLoop::new(LoopFlags::CloseOnExec).unwrap() }

    #[test]
    fn insert_stores_without_registering() {
        let mut ev_loop = new_loop();
        let handle = ev_loop.insert(Entry::oneshot_timer(Duration::from_secs(1), |_, _| {}));
        assert!(ev_loop.contains(handle));
        assert!(!ev_loop.is_registered(handle));
        assert_eq!(ev_loop.live_entries(), 0);
        assert_eq!(ev_loop.entry(handle).unwrap().watched_fd(), None);
    }

    #[test]
    fn register_then_unregister_tracks_live_count() {
        let mut ev_loop = new_loop();
        let handle = ev_loop.insert(Entry::periodic_timer(
            Duration::from_secs(1),
            |_, _, _| {},
        ));

        ev_loop.register(handle).unwrap();
        assert!(ev_loop.is_registered(handle));
        assert_eq!(ev_loop.live_entries(), 1);
        let entry = ev_loop.entry(handle).unwrap();
        assert!(entry.watched_fd().is_some());
        assert_eq!(entry.armed_interest(), Some(KERNEL_SOURCE_INTEREST));

        ev_loop.cancel_timer(handle).unwrap();
        assert!(!ev_loop.is_registered(handle));
        assert_eq!(ev_loop.live_entries(), 0);
        // The descriptor stays with the entry until it is freed or re-armed.
        assert!(ev_loop.entry(handle).unwrap().watched_fd().is_some());
    }

    #[test]
    fn double_register_is_rejected() {
        let mut ev_loop = new_loop();
        let handle = ev_loop
            .add(Entry::oneshot_timer(Duration::from_secs(5), |_, _| {}))
            .unwrap();
        let err = ev_loop.register(handle).unwrap_err();
        assert!(matches!(err, EvLoopError::AlreadyRegistered(it) if it == handle));
        assert_eq!(ev_loop.live_entries(), 1);
    }

    #[test]
    fn unregister_of_unregistered_entry_is_rejected() {
        let mut ev_loop = new_loop();
        let handle = ev_loop.insert(Entry::oneshot_timer(Duration::from_secs(1), |_, _| {}));
        let err = ev_loop.unregister(handle).unwrap_err();
        assert!(matches!(err, EvLoopError::NotRegistered(_)));
        assert_eq!(ev_loop.live_entries(), 0);
    }

    #[test]
    fn free_of_registered_entry_is_rejected() {
        let mut ev_loop = new_loop();
        let handle = ev_loop
            .add(Entry::oneshot_timer(Duration::from_secs(5), |_, _| {}))
            .unwrap();

        let err = ev_loop.free_entry(handle).unwrap_err();
        assert!(matches!(err, EvLoopError::StillRegistered(_)));
        assert!(ev_loop.contains(handle));

        ev_loop.unregister(handle).unwrap();
        let entry = ev_loop.free_entry(handle).unwrap();
        assert_eq!(entry.source_kind(), SourceKind::OneShotTimer);
        assert!(!ev_loop.contains(handle));
    }

    #[test]
    fn stale_handle_is_rejected_everywhere() {
        let mut ev_loop = new_loop();
        let handle = ev_loop.insert(Entry::oneshot_timer(Duration::from_secs(1), |_, _| {}));
        ev_loop.free_entry(handle).unwrap();

        // The slot gets reused by a new entry, the old handle must not reach it.
        let reused = ev_loop.insert(Entry::oneshot_timer(Duration::from_secs(1), |_, _| {}));
        assert_eq!(reused.index(), handle.index());

        assert!(matches!(ev_loop.register(handle), Err(EvLoopError::StaleHandle(_))));
        assert!(matches!(ev_loop.unregister(handle), Err(EvLoopError::StaleHandle(_))));
        assert!(matches!(ev_loop.free_entry(handle), Err(EvLoopError::StaleHandle(_))));
        assert!(!ev_loop.is_registered(reused));
    }

    #[test]
    fn zero_period_fails_and_add_releases_the_entry() {
        let mut ev_loop = new_loop();
        let err = ev_loop
            .add(Entry::periodic_timer(Duration::ZERO, |_, _, _| {}))
            .unwrap_err();
        match err {
            EvLoopError::RegisterFailed { kind, source, .. } => {
                assert_eq!(kind, SourceKind::PeriodicTimer);
                assert_eq!(source.kind(), ErrorKind::InvalidInput);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ev_loop.stored_entries(), 0);
        assert_eq!(ev_loop.live_entries(), 0);
    }

    #[test]
    fn bad_descriptor_fails_registration() {
        // Far above any descriptor limit, so it is never open.
        const NOT_OPEN: i32 = 1 << 30;
        let mut ev_loop = new_loop();
        let handle = ev_loop.insert(Entry::read_ready(NOT_OPEN, |_, _, _, _| {}));
        let err = ev_loop.register(handle).unwrap_err();
        assert!(matches!(
            err,
            EvLoopError::RegisterFailed {
                kind: SourceKind::ReadReady,
                ..
            }
        ));
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert!(!ev_loop.is_registered(handle));
        assert_eq!(ev_loop.live_entries(), 0);
        assert_eq!(ev_loop.entry(handle).unwrap().watched_fd(), None);
    }

    #[test]
    fn raw_mask_is_used_unmodified() {
        let mut ev_loop = new_loop();
        let (reader, _writer) = rustix::pipe::pipe().unwrap();
        set_non_blocking(&reader).unwrap();
        let mask = EventFlags::IN | EventFlags::RDHUP;
        let handle = ev_loop
            .add(Entry::raw(reader.as_raw_fd(), mask, |_, _, _, _| {}))
            .unwrap();
        let entry = ev_loop.entry(handle).unwrap();
        assert_eq!(entry.armed_interest(), Some(mask));
        assert_eq!(entry.watched_fd(), Some(reader.as_raw_fd()));
        ev_loop.unregister(handle).unwrap();
    }
}
