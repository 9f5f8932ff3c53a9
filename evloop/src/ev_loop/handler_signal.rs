// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words signalfd siginfo EAGAIN

//! Event handler for signal entries.

use super::{ArmedSource, EntryHandle, EntryKind, EvLoop, SignalCallback, SignalInfo,
            SignalRead, WatchedFd, read_signal};
use crate::DEBUG_EVLOOP_DISPATCH;
use std::io::{Error, ErrorKind};

/// Reads one `signalfd_siginfo` record and calls the callback with it.
///
/// If the read comes back short, or nothing is pending (`EAGAIN`, for instance because
/// the signal was consumed some other way), the wakeup is dropped and the callback is
/// not called. Several deliveries of the same standard signal may coalesce into one
/// record, as usual for signals.
///
/// # Panics
///
/// On any other read error, since the descriptor was just reported readable.
pub fn handle_signal(ev_loop: &mut EvLoop, handle: EntryHandle) {
    let info = match read_or_panic(ev_loop, handle) {
        SignalRead::Delivered(info) => info,
        SignalRead::Incomplete => {
            DEBUG_EVLOOP_DISPATCH.then(|| {
                tracing::debug!(message = "ev_loop: incomplete signalfd read", %handle);
            });
            return;
        }
    };

    DEBUG_EVLOOP_DISPATCH.then(|| {
        tracing::debug!(message = "ev_loop: signal received", %handle, ?info);
    });

    let Some(mut on_signal) = take_signal_callback(ev_loop, handle) else {
        return;
    };
    on_signal(ev_loop, handle, info);
    if let Some(EntryKind::Signal { on_signal: slot, .. }) = ev_loop
        .entries
        .get_mut(handle)
        .map(|record| &mut record.entry.kind)
    {
        *slot = on_signal;
    }
}

fn read_or_panic(ev_loop: &EvLoop, handle: EntryHandle) -> SignalRead {
    let armed = ev_loop
        .entries
        .get(handle)
        .and_then(|record| record.entry.armed.as_ref());
    let result = match armed {
        Some(ArmedSource {
            fd: WatchedFd::Owned(signal_fd),
            ..
        }) => read_signal(signal_fd),
        _ => Err(Error::new(ErrorKind::NotFound, "signal entry has no signalfd")),
    };
    match result {
        Ok(read) => read,
        Err(err) => {
            tracing::error!(message = "ev_loop: signalfd read failed", %handle, error = %err);
            panic!("signal entry {handle} was reported ready but could not be read: {err}");
        }
    }
}

fn noop_signal(_: &mut EvLoop, _: EntryHandle, _: SignalInfo) {}

fn take_signal_callback(ev_loop: &mut EvLoop, handle: EntryHandle) -> Option<SignalCallback> {
    match &mut ev_loop.entries.get_mut(handle)?.entry.kind {
        EntryKind::Signal { on_signal, .. } => {
            Some(std::mem::replace(on_signal, Box::new(noop_signal)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Entry, LoopFlags};
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use signal_hook::{consts::SIGUSR2, low_level::raise};
    use std::{cell::RefCell, rc::Rc};

    #[test]
    #[serial]
    fn nothing_pending_means_no_callback() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        let handle = ev_loop
            .add(Entry::signal([SIGUSR2], move |_, _, _| {
                *calls_clone.borrow_mut() += 1;
            }))
            .unwrap();

        handle_signal(&mut ev_loop, handle);
        assert_eq!(*calls.borrow(), 0);

        ev_loop.unregister(handle).unwrap();
    }

    #[test]
    #[serial]
    fn delivered_signal_reaches_the_callback() {
        let mut ev_loop = EvLoop::new(LoopFlags::None).unwrap();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        let handle = ev_loop
            .add(Entry::signal([SIGUSR2], move |_, _, info| {
                received_clone.borrow_mut().push(info);
            }))
            .unwrap();

        raise(SIGUSR2).unwrap();
        handle_signal(&mut ev_loop, handle);

        let received = received.borrow();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].signo, u32::try_from(SIGUSR2).unwrap());
        assert_eq!(received[0].pid, std::process::id());

        ev_loop.unregister(handle).unwrap();
    }
}
