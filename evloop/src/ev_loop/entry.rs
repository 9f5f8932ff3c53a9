// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll timerfd signalfd siginfo

//! The entry model: one [`Entry`] per monitored source.
//!
//! [`EntryKind`] is a tagged variant where each case carries only its own payload and
//! exactly one callback of the matching shape. A read-ready entry can't hold a timer
//! callback, so dispatch never has to guess which callback field is valid.

use super::{EntryHandle, EvLoop, EventFlags};
use std::{fmt::{Debug, Formatter},
          os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd},
          time::Duration};

/// Called with the watched descriptor and the epoll mask the kernel reported.
pub type RawCallback = Box<dyn FnMut(&mut EvLoop, EntryHandle, RawFd, EventFlags)>;

/// Called with the watched descriptor and the interest it was registered for.
pub type FdCallback = Box<dyn FnMut(&mut EvLoop, EntryHandle, RawFd, FdInterest)>;

/// Called once per registration, after the entry was unregistered.
pub type OneShotCallback = Box<dyn FnMut(&mut EvLoop, EntryHandle)>;

/// Called with the number of expirations since the previous tick. Normally `1`, larger
/// when the loop could not keep up.
pub type PeriodicCallback = Box<dyn FnMut(&mut EvLoop, EntryHandle, u64)>;

/// Called with the delivered signal.
pub type SignalCallback = Box<dyn FnMut(&mut EvLoop, EntryHandle, SignalInfo)>;

/// Which readiness a [`EntryKind::ReadReady`] or [`EntryKind::WriteReady`] entry waits
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdInterest {
    Read,
    Write,
}

impl FdInterest {
    #[must_use]
    pub fn to_event_flags(self) -> EventFlags {
        match self {
            Self::Read => EventFlags::IN,
            Self::Write => EventFlags::OUT,
        }
    }
}

/// Fieldless mirror of [`EntryKind`], for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Raw,
    ReadReady,
    WriteReady,
    OneShotTimer,
    PeriodicTimer,
    Signal,
}

impl SourceKind {
    #[must_use]
    pub const fn is_timer(self) -> bool {
        matches!(self, Self::OneShotTimer | Self::PeriodicTimer)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::ReadReady => "read-ready",
            Self::WriteReady => "write-ready",
            Self::OneShotTimer => "one-shot timer",
            Self::PeriodicTimer => "periodic timer",
            Self::Signal => "signal",
        };
        f.write_str(name)
    }
}

/// A set of signal numbers (`SIGUSR1`, `SIGTERM`, ...) watched by one signal entry.
///
/// Validation happens at registration time, when the set is converted into a kernel
/// `sigset_t`: an invalid number makes [`EvLoop::register()`] fail.
///
/// [`EvLoop::register()`]: super::EvLoop::register
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalSet {
    signals: Vec<i32>,
}

impl SignalSet {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Adds `signo` unless it is already present.
    #[must_use]
    pub fn with(mut self, signo: i32) -> Self {
        if !self.signals.contains(&signo) {
            self.signals.push(signo);
        }
        self
    }

    #[must_use]
    pub fn contains(&self, signo: i32) -> bool { self.signals.contains(&signo) }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.signals.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ { self.signals.iter().copied() }
}

impl FromIterator<i32> for SignalSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}

impl<const N: usize> From<[i32; N]> for SignalSet {
    fn from(signals: [i32; N]) -> Self { signals.into_iter().collect() }
}

/// The part of `signalfd_siginfo` handed to signal callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalInfo {
    /// Signal number.
    pub signo: u32,
    /// Sending process id (`0` for kernel generated signals).
    pub pid: u32,
    /// Real user id of the sender.
    pub uid: u32,
    /// `si_code` of the delivery (`SI_USER`, `SI_TKILL`, ...).
    pub code: i32,
}

/// The logical kind of an [`Entry`] together with its payload and callback.
pub enum EntryKind {
    /// A caller-owned descriptor with a caller-chosen epoll mask, passed to `epoll_ctl`
    /// unmodified.
    Raw {
        fd: RawFd,
        interest: EventFlags,
        on_ready: RawCallback,
    },
    /// A caller-owned descriptor, watched for `EPOLLIN`.
    ReadReady { fd: RawFd, on_ready: FdCallback },
    /// A caller-owned descriptor, watched for `EPOLLOUT`.
    WriteReady { fd: RawFd, on_ready: FdCallback },
    /// Fires once, `after` the moment it is registered.
    OneShotTimer {
        after: Duration,
        on_fire: OneShotCallback,
    },
    /// Fires `every` period, starting one period after it is registered.
    PeriodicTimer {
        every: Duration,
        on_tick: PeriodicCallback,
    },
    /// Fires when a member of `signals` is delivered.
    Signal {
        signals: SignalSet,
        on_signal: SignalCallback,
    },
}

impl EntryKind {
    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Raw { .. } => SourceKind::Raw,
            Self::ReadReady { .. } => SourceKind::ReadReady,
            Self::WriteReady { .. } => SourceKind::WriteReady,
            Self::OneShotTimer { .. } => SourceKind::OneShotTimer,
            Self::PeriodicTimer { .. } => SourceKind::PeriodicTimer,
            Self::Signal { .. } => SourceKind::Signal,
        }
    }
}

impl Debug for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw { fd, interest, .. } => f
                .debug_struct("Raw")
                .field("fd", fd)
                .field("interest", interest)
                .finish_non_exhaustive(),
            Self::ReadReady { fd, .. } => {
                f.debug_struct("ReadReady").field("fd", fd).finish_non_exhaustive()
            }
            Self::WriteReady { fd, .. } => {
                f.debug_struct("WriteReady").field("fd", fd).finish_non_exhaustive()
            }
            Self::OneShotTimer { after, .. } => f
                .debug_struct("OneShotTimer")
                .field("after", after)
                .finish_non_exhaustive(),
            Self::PeriodicTimer { every, .. } => f
                .debug_struct("PeriodicTimer")
                .field("every", every)
                .finish_non_exhaustive(),
            Self::Signal { signals, .. } => f
                .debug_struct("Signal")
                .field("signals", signals)
                .finish_non_exhaustive(),
        }
    }
}

/// The descriptor actually handed to epoll for an entry.
#[derive(Debug)]
pub enum WatchedFd {
    /// The caller's descriptor. The caller keeps it open while the entry is registered.
    Borrowed(RawFd),
    /// A timerfd or signalfd created by the loop. Closed when dropped.
    Owned(OwnedFd),
}

impl WatchedFd {
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd as _;
        match self {
            Self::Borrowed(fd) => *fd,
            Self::Owned(owned) => owned.as_raw_fd(),
        }
    }

    /// # Safety
    ///
    /// For [`WatchedFd::Borrowed`] the caller-supplied descriptor must still be open.
    /// That is the documented contract of raw / read / write entries while they are
    /// registered.
    #[must_use]
    pub unsafe fn borrow(&self) -> BorrowedFd<'_> {
        match self {
            // SAFETY: forwarded to the caller of this function.
            Self::Borrowed(fd) => unsafe { BorrowedFd::borrow_raw(*fd) },
            Self::Owned(owned) => owned.as_fd(),
        }
    }
}

/// Bookkeeping written by the registration layer: the descriptor and the epoll mask
/// that were armed for the current (or most recent) registration.
#[derive(Debug)]
pub struct ArmedSource {
    pub fd: WatchedFd,
    pub interest: EventFlags,
}

/// One monitored source: its [`EntryKind`] plus what the registration layer armed for
/// it.
///
/// Build one with a kind-specific constructor, then hand it to [`EvLoop::insert()`] or
/// [`EvLoop::add()`]. The loop returns an [`EntryHandle`] that you use for everything
/// else. [`EvLoop::free_entry()`] gives the entry back; dropping it closes any
/// descriptor the loop created for it.
///
/// [`EvLoop::add()`]: super::EvLoop::add
/// [`EvLoop::free_entry()`]: super::EvLoop::free_entry
/// [`EvLoop::insert()`]: super::EvLoop::insert
#[derive(Debug)]
pub struct Entry {
    pub kind: EntryKind,
    pub(crate) armed: Option<ArmedSource>,
}

impl Entry {
    #[must_use]
    pub fn new(kind: EntryKind) -> Self { Self { kind, armed: None } }

    /// Watches a caller-owned `fd` with the epoll mask `interest`, used as is. The
    /// callback receives the mask that the kernel reported.
    pub fn raw(
        fd: RawFd,
        interest: EventFlags,
        on_ready: impl FnMut(&mut EvLoop, EntryHandle, RawFd, EventFlags) + 'static,
    ) -> Self {
        Self::new(EntryKind::Raw {
            fd,
            interest,
            on_ready: Box::new(on_ready),
        })
    }

    /// Watches a caller-owned `fd` for readability.
    pub fn read_ready(
        fd: RawFd,
        on_ready: impl FnMut(&mut EvLoop, EntryHandle, RawFd, FdInterest) + 'static,
    ) -> Self {
        Self::new(EntryKind::ReadReady {
            fd,
            on_ready: Box::new(on_ready),
        })
    }

    /// Watches a caller-owned `fd` for writability.
    pub fn write_ready(
        fd: RawFd,
        on_ready: impl FnMut(&mut EvLoop, EntryHandle, RawFd, FdInterest) + 'static,
    ) -> Self {
        Self::new(EntryKind::WriteReady {
            fd,
            on_ready: Box::new(on_ready),
        })
    }

    /// A timer that fires once, `after` the moment it is registered. The entry is
    /// unregistered (but not freed) right before `on_fire` runs, so the callback may
    /// register it again, or free it.
    pub fn oneshot_timer(
        after: Duration,
        on_fire: impl FnMut(&mut EvLoop, EntryHandle) + 'static,
    ) -> Self {
        Self::new(EntryKind::OneShotTimer {
            after,
            on_fire: Box::new(on_fire),
        })
    }

    /// A timer that fires `every` period until it is cancelled. `every` must be
    /// non-zero.
    pub fn periodic_timer(
        every: Duration,
        on_tick: impl FnMut(&mut EvLoop, EntryHandle, u64) + 'static,
    ) -> Self {
        Self::new(EntryKind::PeriodicTimer {
            every,
            on_tick: Box::new(on_tick),
        })
    }

    /// Fires when one of `signals` is delivered. Registration blocks the set for the
    /// calling thread so the signals are only observable through this entry.
    pub fn signal(
        signals: impl Into<SignalSet>,
        on_signal: impl FnMut(&mut EvLoop, EntryHandle, SignalInfo) + 'static,
    ) -> Self {
        Self::new(EntryKind::Signal {
            signals: signals.into(),
            on_signal: Box::new(on_signal),
        })
    }

    #[must_use]
    pub fn source_kind(&self) -> SourceKind { self.kind.source_kind() }

    /// The descriptor of the current (or most recent) registration. `None` for a timer
    /// or signal entry that was never registered.
    #[must_use]
    pub fn watched_fd(&self) -> Option<RawFd> {
        self.armed.as_ref().map(|armed| armed.fd.as_raw_fd())
    }

    /// The epoll mask of the current (or most recent) registration.
    #[must_use]
    pub fn armed_interest(&self) -> Option<EventFlags> {
        self.armed.as_ref().map(|armed| armed.interest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn constructors_pick_the_matching_kind() {
        let noop_fd = |_: &mut EvLoop, _: EntryHandle, _: RawFd, _: FdInterest| {};
        assert_eq!(Entry::read_ready(0, noop_fd).source_kind(), SourceKind::ReadReady);
        assert_eq!(Entry::write_ready(1, noop_fd).source_kind(), SourceKind::WriteReady);
        assert_eq!(
            Entry::raw(0, EventFlags::IN, |_, _, _, _| {}).source_kind(),
            SourceKind::Raw
        );
        assert_eq!(
            Entry::oneshot_timer(Duration::from_secs(1), |_, _| {}).source_kind(),
            SourceKind::OneShotTimer
        );
        assert_eq!(
            Entry::periodic_timer(Duration::from_secs(1), |_, _, _| {}).source_kind(),
            SourceKind::PeriodicTimer
        );
        assert_eq!(
            Entry::signal([libc::SIGUSR1], |_, _, _| {}).source_kind(),
            SourceKind::Signal
        );
    }

    #[test]
    fn unarmed_entry_has_no_descriptor() {
        let entry = Entry::oneshot_timer(Duration::from_millis(5), |_, _| {});
        assert_eq!(entry.watched_fd(), None);
        assert_eq!(entry.armed_interest(), None);
    }

    #[test]
    fn signal_set_deduplicates() {
        let set: SignalSet = [libc::SIGUSR1, libc::SIGUSR2, libc::SIGUSR1].into();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![libc::SIGUSR1, libc::SIGUSR2]);
        assert!(set.contains(libc::SIGUSR2));
        assert!(!set.contains(libc::SIGTERM));
        assert!(SignalSet::new().is_empty());
    }

    #[test]
    fn debug_output_skips_callbacks() {
        let entry = Entry::periodic_timer(Duration::from_millis(250), |_, _, _| {});
        let it = format!("{:?}", entry.kind);
        assert_eq!(it, "PeriodicTimer { every: 250ms, .. }");
    }

    #[test]
    fn fd_interest_maps_to_epoll_flags() {
        assert_eq!(FdInterest::Read.to_event_flags(), EventFlags::IN);
        assert_eq!(FdInterest::Write.to_event_flags(), EventFlags::OUT);
    }
}
