// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll timerfd signalfd demultiplexes

//! The event loop: an [`EvLoop`] owns one epoll instance and an arena of [`Entry`]
//! records, and demultiplexes each batch of ready descriptors to the closure stored in
//! the matching entry.
//!
//! # Layers
//!
//! | Layer                   | Files                                                 |
//! | :---------------------- | :---------------------------------------------------- |
//! | Loop context            | [`ev_loop_struct`], [`loop_flags`], [`non_blocking`]  |
//! | Entry model             | [`entry`], [`entry_arena`]                            |
//! | Registration / arming   | [`registration`], [`kernel_sources`]                  |
//! | Dispatch                | [`dispatcher`], [`handler_fd`], [`handler_timer`], [`handler_signal`] |
//! | Errors                  | [`ev_loop_error`]                                     |
//!
//! # How an epoll tag maps back to an entry
//!
//! The epoll data word of every registration holds an [`EntryToken`]: the arena slot
//! index in the upper 32 bits and the slot's registration serial in the lower 32 bits.
//! The serial is bumped on every [`register()`], so a ready event that was reported for
//! a registration that no longer exists (unregistered, freed, or re-armed earlier in the
//! same batch) is recognized as stale and skipped. No raw pointers are handed to the
//! kernel.
//!
//! Tokens are only minted by [`register()`], and only [`EvLoop::run()`] /
//! [`EvLoop::poll_once()`] route them to the handlers. Neither is reachable from outside
//! the crate:
//!
//! ```compile_fail
//! # use r3bl_evloop::{EntryToken, EvLoop, EventFlags, LoopFlags};
//! let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
//! ev_loop.dispatch(EntryToken::new(0, 1), EventFlags::IN);
//! ```
//!
//! ```compile_fail
//! use r3bl_evloop::ev_loop::handler_timer::handle_periodic_timer;
//! ```
//!
//! [`register()`]: EvLoop::register

// Attach sources.
pub mod entry;
pub mod ev_loop_error;
pub mod ev_loop_struct;
pub mod kernel_sources;
pub mod loop_flags;
pub mod non_blocking;
pub mod registration;

// Dispatch internals: only visible for tests and docs.
#[cfg(any(test, doc))]
pub mod dispatcher;
#[cfg(not(any(test, doc)))]
mod dispatcher;

#[cfg(any(test, doc))]
pub mod entry_arena;
#[cfg(not(any(test, doc)))]
mod entry_arena;

#[cfg(any(test, doc))]
pub mod handler_fd;
#[cfg(not(any(test, doc)))]
mod handler_fd;

#[cfg(any(test, doc))]
pub mod handler_signal;
#[cfg(not(any(test, doc)))]
mod handler_signal;

#[cfg(any(test, doc))]
pub mod handler_timer;
#[cfg(not(any(test, doc)))]
mod handler_timer;

// Re-export.
pub use entry::*;
pub use entry_arena::*;
pub use ev_loop_error::*;
pub use ev_loop_struct::*;
pub use kernel_sources::*;
pub use loop_flags::*;
pub use non_blocking::*;

/// The epoll flag type used by raw entries, re-exported so callers don't need a direct
/// `rustix` dependency.
pub use rustix::event::epoll::EventFlags;
