// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words timerfd

//! Event handlers for one-shot and periodic timers.

use super::{ArmedSource, EntryHandle, EntryKind, EvLoop, OneShotCallback,
            PeriodicCallback, WatchedFd, drain_timer};
use crate::DEBUG_EVLOOP_DISPATCH;
use std::io::{Error, ErrorKind};

/// Handles an expired one-shot timer: drains its timerfd, unregisters the entry (the
/// descriptor stays open and the entry stays stored), then calls the callback. The
/// callback can register the entry again to re-arm it, or free it.
///
/// # Panics
///
/// If the timerfd can't be drained. The kernel reported it readable, so a failing read
/// means the loop's bookkeeping is broken.
pub fn handle_oneshot_timer(ev_loop: &mut EvLoop, handle: EntryHandle) {
    let expirations = drain_or_panic(ev_loop, handle);

    if let Err(err) = ev_loop.unregister(handle) {
        tracing::warn!(
            message = "ev_loop: could not unregister expired one-shot timer",
            %handle,
            error = %err
        );
    }

    DEBUG_EVLOOP_DISPATCH.then(|| {
        tracing::debug!(message = "ev_loop: one-shot timer fired", %handle, expirations);
    });

    let Some(mut on_fire) = take_oneshot_callback(ev_loop, handle) else {
        return;
    };
    on_fire(ev_loop, handle);
    if let Some(EntryKind::OneShotTimer { on_fire: slot, .. }) = ev_loop
        .entries
        .get_mut(handle)
        .map(|record| &mut record.entry.kind)
    {
        *slot = on_fire;
    }
}

/// Handles a periodic timer tick: drains its timerfd and calls the callback with the
/// number of expirations since the previous read. The entry stays registered.
///
/// # Panics
///
/// If the timerfd can't be drained, as for [`handle_oneshot_timer()`].
pub fn handle_periodic_timer(ev_loop: &mut EvLoop, handle: EntryHandle) {
    let missed = drain_or_panic(ev_loop, handle);

    DEBUG_EVLOOP_DISPATCH.then(|| {
        tracing::debug!(message = "ev_loop: periodic timer tick", %handle, missed);
    });

    let Some(mut on_tick) = take_periodic_callback(ev_loop, handle) else {
        return;
    };
    on_tick(ev_loop, handle, missed);
    if let Some(EntryKind::PeriodicTimer { on_tick: slot, .. }) = ev_loop
        .entries
        .get_mut(handle)
        .map(|record| &mut record.entry.kind)
    {
        *slot = on_tick;
    }
}

fn drain_or_panic(ev_loop: &EvLoop, handle: EntryHandle) -> u64 {
    let armed = ev_loop
        .entries
        .get(handle)
        .and_then(|record| record.entry.armed.as_ref());
    let result = match armed {
        Some(ArmedSource {
            fd: WatchedFd::Owned(timer_fd),
            ..
        }) => drain_timer(timer_fd),
        _ => Err(Error::new(ErrorKind::NotFound, "timer entry has no timerfd")),
    };
    match result {
        Ok(expirations) => expirations,
        Err(err) => {
            tracing::error!(message = "ev_loop: timerfd drain failed", %handle, error = %err);
            panic!("timer {handle} was reported ready but could not be drained: {err}");
        }
    }
}

fn noop_oneshot(_: &mut EvLoop, _: EntryHandle) {}

fn noop_periodic(_: &mut EvLoop, _: EntryHandle, _: u64) {}

fn take_oneshot_callback(ev_loop: &mut EvLoop, handle: EntryHandle) -> Option<OneShotCallback> {
    match &mut ev_loop.entries.get_mut(handle)?.entry.kind {
        EntryKind::OneShotTimer { on_fire, .. } => {
            Some(std::mem::replace(on_fire, Box::new(noop_oneshot)))
        }
        _ => None,
    }
}

fn take_periodic_callback(
    ev_loop: &mut EvLoop,
    handle: EntryHandle,
) -> Option<PeriodicCallback> {
    match &mut ev_loop.entries.get_mut(handle)?.entry.kind {
        EntryKind::PeriodicTimer { on_tick, .. } => {
            Some(std::mem::replace(on_tick, Box::new(noop_periodic)))
        }
        _ => None,
    }
}
