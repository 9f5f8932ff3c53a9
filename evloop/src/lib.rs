// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll timerfd signalfd sigprocmask demultiplex EINTR

//! # r3bl_evloop
//!
//! A single threaded, readiness driven event loop for Linux. You register heterogeneous
//! event sources with an [`EvLoop`], and it calls your closures exactly when each source
//! becomes actionable, without polling or busy waiting:
//!
//! | Source                  | Backing kernel object                  | Closure receives         |
//! | :---------------------- | :------------------------------------- | :----------------------- |
//! | [`Entry::raw()`]        | your descriptor, your [`EventFlags`]   | fd + reported mask       |
//! | [`Entry::read_ready()`] | your descriptor, `EPOLLIN`             | fd + [`FdInterest`]      |
//! | [`Entry::write_ready()`]| your descriptor, `EPOLLOUT`            | fd + [`FdInterest`]      |
//! | [`Entry::oneshot_timer()`] | `timerfd` (absolute deadline)       | nothing                  |
//! | [`Entry::periodic_timer()`]| `timerfd` (interval)                | missed expirations       |
//! | [`Entry::signal()`]     | `signalfd` (set is blocked first)      | [`SignalInfo`]           |
//!
//! Every closure also receives `&mut EvLoop` and its own [`EntryHandle`], so it can
//! register new entries, cancel itself, or free itself.
//!
//! # Lifecycle
//!
//! ```text
//! EvLoop::new() ─► insert(entry) ─► register(handle) ─► run() ─► destroy()
//!                        ▲                 │    ▲
//!                        │                 ▼    │
//!                  free_entry(handle) ◄── unregister(handle)
//! ```
//!
//! [`run()`] blocks in `epoll_wait` and drains ready batches until the live entry count
//! drops to zero, or until a callback calls [`request_stop()`]. The stop request is
//! honored at the end of the current batch, so every event that was already reported
//! in that batch is still dispatched.
//!
//! # Example
//!
//! ```no_run
//! use r3bl_evloop::{Entry, EvLoop, LoopFlags};
//! use std::time::Duration;
//!
//! let mut ev_loop = EvLoop::new(LoopFlags::CloseOnExec)?;
//! ev_loop.add(Entry::oneshot_timer(Duration::from_millis(10), |ev_loop, me| {
//!     println!("fired");
//!     ev_loop.free_entry(me).ok();
//! }))?;
//! ev_loop.run()?;
//! # Ok::<(), r3bl_evloop::EvLoopError>(())
//! ```
//!
//! [`request_stop()`]: EvLoop::request_stop
//! [`run()`]: EvLoop::run

// Enforce strict error handling in production library code only. Tests are allowed to
// use .unwrap() (workspace `Cargo.toml` config allows it).
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach modules (re-exported below to provide clean public API).
pub mod common;
pub mod demo;
pub mod ev_loop;
pub mod log;

// Re-export.
pub use common::*;
pub use ev_loop::*;
pub use log::*;

/// Flip to `true` to log every dispatched event and every stale token that gets skipped.
/// Off by default since this is the hot path.
pub const DEBUG_EVLOOP_DISPATCH: bool = false;
