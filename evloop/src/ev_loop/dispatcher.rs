// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll EINTR

//! The run loop and event dispatching.
//!
//! [`EvLoop::run()`] calls [`EvLoop::poll_once()`] until the live entry count drops to
//! zero or a stop is requested. Each [`poll_once()`] blocks in `epoll_wait` for one
//! batch (at most [`EPOLL_BATCH_CAPACITY`] events) and hands every event to
//! [`dispatch()`], which resolves its [`EntryToken`] and calls exactly one handler based
//! on the entry's [`SourceKind`].
//!
//! # EINTR handling
//!
//! A signal that interrupts `epoll_wait` is not an error. [`poll_once()`] returns
//! [`Continuation::Continue`] and [`run()`] simply waits again.
//!
//! [`dispatch()`]: EvLoop::dispatch
//! [`poll_once()`]: EvLoop::poll_once
//! [`run()`]: EvLoop::run

use super::{EPOLL_BATCH_CAPACITY, EntryToken, EvLoop, EvLoopError, EventFlags, SourceKind,
            handler_fd::{handle_fd_ready, handle_raw_ready},
            handler_signal::handle_signal,
            handler_timer::{handle_oneshot_timer, handle_periodic_timer}};
use crate::{Continuation, DEBUG_EVLOOP_DISPATCH};
use rustix::{buffer::spare_capacity, event::epoll, io::Errno};

impl EvLoop {
    /// Blocks and dispatches ready events until there are no live entries left, or until
    /// a callback calls [`request_stop()`].
    ///
    /// A stop request is honored once the batch it was made in has been fully
    /// dispatched, and it is cleared on the way out, so `run()` can be called again.
    /// Returns immediately if nothing is registered, dropping any pending stop request.
    ///
    /// # Errors
    ///
    /// [`EvLoopError::WaitFailed`] if `epoll_wait` fails with anything but `EINTR`.
    ///
    /// # Panics
    ///
    /// If a timer or signal descriptor that was reported ready can't be read. See
    /// [`handle_oneshot_timer()`] and [`handle_signal()`].
    ///
    /// [`handle_oneshot_timer()`]: super::handler_timer::handle_oneshot_timer
    /// [`handle_signal()`]: super::handler_signal::handle_signal
    /// [`request_stop()`]: Self::request_stop
    pub fn run(&mut self) -> Result<(), EvLoopError> {
        tracing::debug!(message = "ev_loop: run started", live = self.live_entries);

        while self.poll_once()? == Continuation::Continue {}

        tracing::debug!(message = "ev_loop: run finished", live = self.live_entries);
        Ok(())
    }

    /// Performs one iteration of the run loop: waits for one batch of ready events and
    /// dispatches all of them.
    ///
    /// # Returns
    ///
    /// - [`Continuation::Continue`]: the batch was dispatched (or the wait was
    ///   interrupted by a signal) and there are live entries left.
    /// - [`Continuation::Stop`]: a stop was requested during the batch (the request is
    ///   consumed), or no live entries are left. Never blocks when nothing is
    ///   registered, and any pending stop request is consumed in that case as well.
    ///
    /// # Errors
    ///
    /// [`EvLoopError::WaitFailed`] if `epoll_wait` fails with anything but `EINTR`.
    ///
    /// # Panics
    ///
    /// As [`run()`].
    ///
    /// [`run()`]: Self::run
    pub fn poll_once(&mut self) -> Result<Continuation, EvLoopError> {
        // Breaks borrow so dispatch can use `&mut self`.
        fn collect_ready_events(events: &[epoll::Event]) -> Vec<(EntryToken, EventFlags)> {
            events
                .iter()
                .map(|event| (EntryToken(event.data.u64()), event.flags))
                .collect()
        }

        // Nothing to wait on. A pending stop request is consumed here too, so it doesn't
        // cut the next run short.
        if self.live_entries == 0 {
            self.stop_requested = false;
            return Ok(Continuation::Stop);
        }

        // Block until at least one registered source is ready.
        self.ready_events_buffer.clear();
        let wait_result = epoll::wait(
            &self.epoll_fd,
            spare_capacity(&mut self.ready_events_buffer),
            None,
        );

        if let Err(errno) = wait_result {
            // EINTR - retry (signal interrupted syscall).
            if errno == Errno::INTR {
                DEBUG_EVLOOP_DISPATCH.then(|| {
                    tracing::debug!(message = "ev_loop: epoll_wait interrupted, retrying");
                });
                return Ok(Continuation::Continue);
            }
            tracing::error!(message = "ev_loop: epoll_wait failed", ?errno);
            return Err(EvLoopError::WaitFailed(errno.into()));
        }

        let ready_events = collect_ready_events(&self.ready_events_buffer);
        DEBUG_EVLOOP_DISPATCH.then(|| {
            tracing::debug!(
                message = "ev_loop: batch ready",
                count = ready_events.len(),
                max = EPOLL_BATCH_CAPACITY
            );
        });

        // Every event of the batch is dispatched, even if a stop gets requested midway.
        for (token, reported) in ready_events {
            self.dispatch(token, reported);
        }

        if self.stop_requested {
            self.stop_requested = false;
            tracing::debug!(message = "ev_loop: stop requested, leaving run loop");
            return Ok(Continuation::Stop);
        }

        if self.live_entries == 0 {
            return Ok(Continuation::Stop);
        }

        Ok(Continuation::Continue)
    }

    /// Dispatches to the appropriate handler based on the kind of the entry that
    /// `token` refers to. Stale tokens are skipped.
    pub(crate) fn dispatch(&mut self, token: EntryToken, reported: EventFlags) {
        let Some(handle) = self.entries.resolve(token) else {
            handle_stale(token);
            return;
        };
        let Some(kind) = self.entry(handle).map(super::Entry::source_kind) else {
            handle_stale(token);
            return;
        };

        DEBUG_EVLOOP_DISPATCH.then(|| {
            tracing::debug!(
                message = "ev_loop: dispatching",
                %handle,
                %kind,
                ?reported
            );
        });

        match kind {
            SourceKind::Raw => handle_raw_ready(self, handle, reported),
            SourceKind::ReadReady | SourceKind::WriteReady => handle_fd_ready(self, handle),
            SourceKind::OneShotTimer => handle_oneshot_timer(self, handle),
            SourceKind::PeriodicTimer => handle_periodic_timer(self, handle),
            SourceKind::Signal => handle_signal(self, handle),
        }
    }
}

/// An event for a registration that no longer exists: the entry was unregistered,
/// freed, or re-armed earlier in the same batch.
pub(crate) fn handle_stale(token: EntryToken) {
    DEBUG_EVLOOP_DISPATCH.then(|| {
        tracing::debug!(
            message = "ev_loop: skipping stale token",
            index = token.index(),
            serial = token.serial()
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Entry, LoopFlags};
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc, time::Duration};

    #[test]
    fn run_returns_immediately_when_nothing_is_registered() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        ev_loop.insert(Entry::oneshot_timer(Duration::from_secs(60), |_, _| {}));
        ev_loop.run().unwrap();
        assert_eq!(ev_loop.poll_once().unwrap(), Continuation::Stop);
    }

    #[test]
    fn stale_token_is_skipped() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();
        let handle = ev_loop
            .add(Entry::periodic_timer(Duration::from_secs(60), move |_, _, _| {
                *fired_clone.borrow_mut() += 1;
            }))
            .unwrap();

        // A token of a registration that was superseded, and one for an empty slot.
        ev_loop.dispatch(EntryToken::new(handle.index(), 0), EventFlags::IN);
        ev_loop.dispatch(EntryToken::new(99, 1), EventFlags::IN);
        assert_eq!(*fired.borrow(), 0);

        ev_loop.cancel_timer(handle).unwrap();
    }

    #[test]
    fn stop_request_is_consumed_by_run() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        let ticks = Rc::new(RefCell::new(0_u64));
        let ticks_clone = ticks.clone();
        let handle = ev_loop
            .add(Entry::periodic_timer(
                Duration::from_millis(5),
                move |ev_loop, _, _| {
                    *ticks_clone.borrow_mut() += 1;
                    ev_loop.request_stop();
                },
            ))
            .unwrap();

        ev_loop.run().unwrap();
        assert_eq!(*ticks.borrow(), 1);
        assert!(!ev_loop.is_stop_requested());
        assert!(ev_loop.is_registered(handle));

        // The loop can be resumed.
        ev_loop.run().unwrap();
        assert_eq!(*ticks.borrow(), 2);

        ev_loop.cancel_timer(handle).unwrap();
        ev_loop.free_entry(handle).unwrap();
    }

    #[test]
    fn stop_requested_on_an_idle_loop_does_not_carry_over() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        ev_loop.request_stop();
        ev_loop.run().unwrap();
        assert!(!ev_loop.is_stop_requested());

        let ticks = Rc::new(RefCell::new(0_u64));
        let ticks_clone = ticks.clone();
        let handle = ev_loop
            .add(Entry::periodic_timer(
                Duration::from_millis(5),
                move |ev_loop, me, _| {
                    *ticks_clone.borrow_mut() += 1;
                    if *ticks_clone.borrow() == 3 {
                        ev_loop.cancel_timer(me).unwrap();
                    }
                },
            ))
            .unwrap();

        // A leftover request would have ended this run after the first tick.
        ev_loop.run().unwrap();
        assert_eq!(*ticks.borrow(), 3);

        ev_loop.free_entry(handle).unwrap();
    }
}
