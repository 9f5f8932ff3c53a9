// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll errno

//! The fixed error domain of the event loop.
//!
//! Callers only need to branch on the variant. The underlying OS error, when there is
//! one, is kept as the [`source`] and is available via [`EvLoopError::raw_os_error()`]
//! for diagnostics.
//!
//! Internal consistency violations (a timer descriptor that was reported ready can't be
//! drained) are not represented here: they panic, see [`handler_timer`].
//!
//! [`handler_timer`]: super::handler_timer
//! [`source`]: std::error::Error::source

use super::{EntryHandle, SourceKind};
use miette::Diagnostic;

/// Everything that [`EvLoop`] operations can fail with.
///
/// [`EvLoop`]: super::EvLoop
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum EvLoopError {
    /// [`LoopFlags::try_from()`] got bits other than `0` or `EV_CLOEXEC`.
    ///
    /// [`LoopFlags::try_from()`]: super::LoopFlags
    #[error("Unsupported event loop flags: {bits:#x}")]
    #[diagnostic(
        code(r3bl_evloop::create::invalid_flags),
        help("The only recognized flag is close-on-exec (0x1)")
    )]
    InvalidFlags { bits: u32 },

    /// `epoll_create1()` failed.
    #[error("Failed to create the epoll instance")]
    #[diagnostic(
        code(r3bl_evloop::create::epoll),
        help("This usually means the process ran out of file descriptors")
    )]
    CreateFailed(#[source] std::io::Error),

    /// Arming the backing kernel object, or adding it to the readiness set, failed. The
    /// entry stays unregistered and any descriptor created during the attempt has
    /// already been closed.
    #[error("Failed to register {kind} entry {handle}")]
    #[diagnostic(code(r3bl_evloop::register::failed))]
    RegisterFailed {
        handle: EntryHandle,
        kind: SourceKind,
        #[source]
        source: std::io::Error,
    },

    /// The entry is already in the readiness set.
    #[error("Entry {0} is already registered")]
    #[diagnostic(
        code(r3bl_evloop::register::already_registered),
        help("Unregister (or cancel) the entry before registering it again")
    )]
    AlreadyRegistered(EntryHandle),

    /// `epoll_ctl(EPOLL_CTL_DEL)` failed.
    #[error("Failed to unregister entry {handle}")]
    #[diagnostic(code(r3bl_evloop::unregister::failed))]
    UnregisterFailed {
        handle: EntryHandle,
        #[source]
        source: std::io::Error,
    },

    /// The entry is not in the readiness set. One-shot timers are unregistered
    /// automatically right before their callback runs.
    #[error("Entry {0} is not registered")]
    #[diagnostic(code(r3bl_evloop::unregister::not_registered))]
    NotRegistered(EntryHandle),

    /// [`EvLoop::free_entry()`] was called on an entry that is still in the readiness
    /// set.
    ///
    /// [`EvLoop::free_entry()`]: super::EvLoop::free_entry
    #[error("Entry {0} is still registered")]
    #[diagnostic(
        code(r3bl_evloop::free::still_registered),
        help("Call unregister() or cancel_timer() before free_entry()")
    )]
    StillRegistered(EntryHandle),

    /// The handle refers to an arena slot that was freed (and possibly reused).
    #[error("Entry handle {0} does not refer to a live entry")]
    #[diagnostic(code(r3bl_evloop::handle::stale))]
    StaleHandle(EntryHandle),

    /// `epoll_wait()` failed with something other than `EINTR`.
    #[error("Failed to wait for ready events")]
    #[diagnostic(code(r3bl_evloop::run::wait))]
    WaitFailed(#[source] std::io::Error),
}

impl EvLoopError {
    /// The errno behind this error, if it came from a syscall.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::CreateFailed(source)
            | Self::WaitFailed(source)
            | Self::RegisterFailed { source, .. }
            | Self::UnregisterFailed { source, .. } => source.raw_os_error(),
            Self::InvalidFlags { .. }
            | Self::AlreadyRegistered(_)
            | Self::NotRegistered(_)
            | Self::StillRegistered(_)
            | Self::StaleHandle(_) => None,
        }
    }
}
