// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

//! Event handlers for caller-owned descriptors (raw, read-ready, write-ready).
//!
//! While a callback runs, its slot holds a no-op closure of the same shape, so the
//! callback is free to use `&mut EvLoop` on its own entry. The real closure is put back
//! afterwards, unless the callback freed the entry.

use super::{EntryHandle, EntryKind, EvLoop, EventFlags, FdCallback, FdInterest,
            RawCallback};
use std::os::fd::RawFd;

/// Calls the raw callback with the mask that the kernel reported.
pub fn handle_raw_ready(ev_loop: &mut EvLoop, handle: EntryHandle, reported: EventFlags) {
    let Some((fd, mut on_ready)) = take_raw_callback(ev_loop, handle) else {
        return;
    };
    on_ready(ev_loop, handle, fd, reported);
    restore_raw_callback(ev_loop, handle, on_ready);
}

/// Calls the read-ready or write-ready callback with the interest it was registered
/// for.
pub fn handle_fd_ready(ev_loop: &mut EvLoop, handle: EntryHandle) {
    let Some((fd, interest, mut on_ready)) = take_fd_callback(ev_loop, handle) else {
        return;
    };
    on_ready(ev_loop, handle, fd, interest);
    restore_fd_callback(ev_loop, handle, on_ready);
}

fn noop_raw(_: &mut EvLoop, _: EntryHandle, _: RawFd, _: EventFlags) {}

fn noop_fd(_: &mut EvLoop, _: EntryHandle, _: RawFd, _: FdInterest) {}

fn take_raw_callback(
    ev_loop: &mut EvLoop,
    handle: EntryHandle,
) -> Option<(RawFd, RawCallback)> {
    match &mut ev_loop.entries.get_mut(handle)?.entry.kind {
        EntryKind::Raw { fd, on_ready, .. } => {
            Some((*fd, std::mem::replace(on_ready, Box::new(noop_raw))))
        }
        _ => None,
    }
}

fn restore_raw_callback(ev_loop: &mut EvLoop, handle: EntryHandle, callback: RawCallback) {
    if let Some(EntryKind::Raw { on_ready, .. }) = ev_loop
        .entries
        .get_mut(handle)
        .map(|record| &mut record.entry.kind)
    {
        *on_ready = callback;
    }
}

fn take_fd_callback(
    ev_loop: &mut EvLoop,
    handle: EntryHandle,
) -> Option<(RawFd, FdInterest, FdCallback)> {
    match &mut ev_loop.entries.get_mut(handle)?.entry.kind {
        EntryKind::ReadReady { fd, on_ready } => {
            Some((*fd, FdInterest::Read, std::mem::replace(on_ready, Box::new(noop_fd))))
        }
        EntryKind::WriteReady { fd, on_ready } => {
            Some((*fd, FdInterest::Write, std::mem::replace(on_ready, Box::new(noop_fd))))
        }
        _ => None,
    }
}

fn restore_fd_callback(ev_loop: &mut EvLoop, handle: EntryHandle, callback: FdCallback) {
    if let Some(
        EntryKind::ReadReady { on_ready, .. } | EntryKind::WriteReady { on_ready, .. },
    ) = ev_loop
        .entries
        .get_mut(handle)
        .map(|record| &mut record.entry.kind)
    {
        *on_ready = callback;
    }
}
