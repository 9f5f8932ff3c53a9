// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words timerfd signalfd fcntl GETFD EBADF

//! Which descriptors the loop closes, and when.
//!
//! Every test here is `#[serial]`: a descriptor number that was just closed can be handed
//! out again by the next `open`, so nothing else in this binary may create descriptors
//! while a test checks one.

use pretty_assertions::assert_eq;
use r3bl_evloop::{Entry, EvLoop, EventFlags, LoopFlags, set_non_blocking};
use rustix::fd::AsRawFd as _;
use serial_test::serial;
use std::{os::fd::RawFd, time::Duration};

fn new_loop() -> EvLoop { EvLoop::new(LoopFlags::CloseOnExec).unwrap() }

/// `Ok(())` if `fd` is open, otherwise the errno of `fcntl(F_GETFD)`.
fn fd_status(fd: RawFd) -> Result<(), i32> {
    // SAFETY: F_GETFD only inspects the descriptor table, it never touches memory.
    let rc = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if rc == -1 {
        Err(std::io::Error::last_os_error().raw_os_error().unwrap_or_default())
    } else {
        Ok(())
    }
}

#[test]
#[serial]
fn freeing_a_timer_closes_its_timerfd() {
    let mut ev_loop = new_loop();
    let handle = ev_loop
        .add(Entry::oneshot_timer(Duration::from_secs(60), |_, _| {}))
        .unwrap();
    let timer_fd = ev_loop.entry(handle).unwrap().watched_fd().unwrap();
    assert_eq!(fd_status(timer_fd), Ok(()));

    // Unregistering keeps the descriptor, only freeing releases it.
    ev_loop.cancel_timer(handle).unwrap();
    assert_eq!(fd_status(timer_fd), Ok(()));

    drop(ev_loop.free_entry(handle).unwrap());
    assert_eq!(fd_status(timer_fd), Err(libc::EBADF));
}

#[test]
#[serial]
fn freeing_a_signal_entry_closes_its_signalfd() {
    let mut ev_loop = new_loop();
    let handle = ev_loop
        .add(Entry::signal(
            [signal_hook::consts::SIGUSR2],
            |_, _, _| {},
        ))
        .unwrap();
    let signal_fd = ev_loop.entry(handle).unwrap().watched_fd().unwrap();
    assert_eq!(fd_status(signal_fd), Ok(()));

    ev_loop.unregister(handle).unwrap();
    drop(ev_loop.free_entry(handle).unwrap());
    assert_eq!(fd_status(signal_fd), Err(libc::EBADF));
}

#[test]
#[serial]
fn freeing_caller_descriptor_entries_leaves_them_open() {
    let mut ev_loop = new_loop();
    let (reader, writer) = rustix::pipe::pipe().unwrap();
    set_non_blocking(&reader).unwrap();

    let raw = ev_loop
        .add(Entry::raw(reader.as_raw_fd(), EventFlags::IN, |_, _, _, _| {}))
        .unwrap();
    let write = ev_loop
        .add(Entry::write_ready(writer.as_raw_fd(), |_, _, _, _| {}))
        .unwrap();

    for handle in [raw, write] {
        ev_loop.unregister(handle).unwrap();
        drop(ev_loop.free_entry(handle).unwrap());
    }
    assert_eq!(fd_status(reader.as_raw_fd()), Ok(()));
    assert_eq!(fd_status(writer.as_raw_fd()), Ok(()));

    // The same descriptor can be watched again.
    let read = ev_loop
        .add(Entry::read_ready(reader.as_raw_fd(), |_, _, _, _| {}))
        .unwrap();
    ev_loop.unregister(read).unwrap();
    drop(ev_loop.free_entry(read).unwrap());
    assert_eq!(fd_status(reader.as_raw_fd()), Ok(()));
}

#[test]
#[serial]
fn registering_a_timer_again_closes_the_previous_timerfd() {
    let mut ev_loop = new_loop();
    let handle = ev_loop
        .add(Entry::oneshot_timer(Duration::from_millis(5), |_, _| {}))
        .unwrap();
    let first_fd = ev_loop.entry(handle).unwrap().watched_fd().unwrap();

    // The timer fires, is unregistered, and keeps its timerfd.
    ev_loop.run().unwrap();
    assert!(!ev_loop.is_registered(handle));
    assert_eq!(fd_status(first_fd), Ok(()));

    ev_loop.register(handle).unwrap();
    let second_fd = ev_loop.entry(handle).unwrap().watched_fd().unwrap();
    assert_ne!(first_fd, second_fd);
    assert_eq!(fd_status(first_fd), Err(libc::EBADF));
    assert_eq!(fd_status(second_fd), Ok(()));

    ev_loop.cancel_timer(handle).unwrap();
    drop(ev_loop.free_entry(handle).unwrap());
    assert_eq!(fd_status(second_fd), Err(libc::EBADF));
}

#[test]
#[serial]
fn destroying_the_loop_closes_descriptors_of_leftover_entries() {
    let mut ev_loop = new_loop();
    let handle = ev_loop
        .add(Entry::periodic_timer(Duration::from_secs(60), |_, _, _| {}))
        .unwrap();
    let timer_fd = ev_loop.entry(handle).unwrap().watched_fd().unwrap();

    ev_loop.destroy();
    assert_eq!(fd_status(timer_fd), Err(libc::EBADF));
}
