// Copyright (c) 2023-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Control flow signal for the event loop.
///
/// Returned by [`EvLoop::poll_once()`] to tell [`EvLoop::run()`] whether another
/// `epoll_wait` round is needed.
///
/// [`EvLoop::poll_once()`]: crate::EvLoop::poll_once
/// [`EvLoop::run()`]: crate::EvLoop::run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Continue to the next iteration.
    #[default]
    Continue,

    /// Stop processing and return from the loop. Either the live entry count reached
    /// zero, or a callback requested a stop.
    Stop,
}
