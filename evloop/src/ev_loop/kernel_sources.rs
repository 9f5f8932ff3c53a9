// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll timerfd signalfd sigprocmask sigset siginfo sigemptyset sigaddset
// cspell:words settime gettime ABSTIME CLOEXEC ssi_signo ssi_pid ssi_uid ssi_code EAGAIN

//! Creation, arming, and draining of the kernel objects that back timer and signal
//! entries.
//!
//! Every constructor here returns an [`OwnedFd`]. If a later step fails (arming,
//! switching to non-blocking), the descriptor is dropped on the `?` path and closed, so
//! a failed registration never leaves an orphaned timerfd or signalfd behind.

use super::{SignalInfo, SignalSet, set_non_blocking};
use rustix::{fd::{AsFd, FromRawFd as _, OwnedFd},
             io::Errno,
             time::{ClockId, Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags,
                    Timespec, clock_gettime, timerfd_create, timerfd_settime}};
use std::{io::{Error, ErrorKind},
          mem::{MaybeUninit, size_of},
          ptr,
          time::Duration};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Size of one `struct signalfd_siginfo` record.
pub const SIGINFO_SIZE: usize = size_of::<libc::signalfd_siginfo>();

/// Size of the expiration counter read from a timerfd.
pub const TIMER_COUNTER_SIZE: usize = size_of::<u64>();

const ZERO_TIMESPEC: Timespec = Timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

/// Converts a relative duration into a kernel [`Timespec`].
///
/// # Errors
///
/// [`ErrorKind::InvalidInput`] if the seconds don't fit the kernel type.
pub fn duration_to_timespec(duration: Duration) -> std::io::Result<Timespec> {
    let tv_sec = i64::try_from(duration.as_secs())
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "duration too large for timespec"))?;
    Ok(Timespec {
        tv_sec,
        tv_nsec: i64::from(duration.subsec_nanos()),
    })
}

/// Absolute deadline `now + after`, with any nanosecond carry moved into the seconds
/// field (`timerfd_settime()` rejects `tv_nsec >= 1e9`).
///
/// # Errors
///
/// [`ErrorKind::InvalidInput`] if the deadline overflows.
pub fn deadline_after(now: Timespec, after: Duration) -> std::io::Result<Timespec> {
    let overflow = || Error::new(ErrorKind::InvalidInput, "timer deadline overflows");
    let after = duration_to_timespec(after)?;

    let mut tv_sec = now.tv_sec.checked_add(after.tv_sec).ok_or_else(overflow)?;
    let mut tv_nsec = now.tv_nsec + after.tv_nsec;
    if tv_nsec >= NANOS_PER_SEC {
        tv_sec = tv_sec.checked_add(1).ok_or_else(overflow)?;
        tv_nsec -= NANOS_PER_SEC;
    }
    Ok(Timespec { tv_sec, tv_nsec })
}

fn new_monotonic_timerfd() -> std::io::Result<OwnedFd> {
    Ok(timerfd_create(
        TimerfdClockId::Monotonic,
        TimerfdFlags::CLOEXEC,
    )?)
}

/// Creates a monotonic timerfd that expires once, `after` from now.
///
/// The deadline is computed up front and armed with `TFD_TIMER_ABSTIME`, so time spent
/// between this call and the next `epoll_wait` does not push the deadline out.
///
/// # Errors
///
/// Any failure of `timerfd_create()`, `timerfd_settime()`, or `fcntl()`.
pub fn arm_oneshot_timer(after: Duration) -> std::io::Result<OwnedFd> {
    let deadline = deadline_after(clock_gettime(ClockId::Monotonic), after)?;
    let fd = new_monotonic_timerfd()?;
    timerfd_settime(
        &fd,
        TimerfdTimerFlags::ABSTIME,
        &Itimerspec {
            it_interval: ZERO_TIMESPEC,
            it_value: deadline,
        },
    )?;
    set_non_blocking(&fd)?;
    Ok(fd)
}

/// Creates a monotonic timerfd that first expires `every` from now, then every `every`
/// after that.
///
/// # Errors
///
/// [`ErrorKind::InvalidInput`] for a zero period (an all-zero `it_value` would disarm
/// the timer and the entry would never fire), or any syscall failure.
pub fn arm_periodic_timer(every: Duration) -> std::io::Result<OwnedFd> {
    if every.is_zero() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "periodic timer needs a non-zero period",
        ));
    }
    let period = duration_to_timespec(every)?;
    let fd = new_monotonic_timerfd()?;
    timerfd_settime(
        &fd,
        TimerfdTimerFlags::empty(),
        &Itimerspec {
            it_interval: period,
            it_value: period,
        },
    )?;
    set_non_blocking(&fd)?;
    Ok(fd)
}

/// Builds the kernel `sigset_t` for `signals`.
///
/// # Errors
///
/// `EINVAL` from `sigaddset()` for an invalid signal number, or
/// [`ErrorKind::InvalidInput`] for an empty set.
pub fn to_sigset(signals: &SignalSet) -> std::io::Result<libc::sigset_t> {
    if signals.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput, "signal set is empty"));
    }

    let mut mask = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: sigemptyset initializes the whole set behind a valid pointer.
    if unsafe { libc::sigemptyset(mask.as_mut_ptr()) } < 0 {
        return Err(Error::last_os_error());
    }
    for signo in signals.iter() {
        // SAFETY: the set was initialized by sigemptyset above.
        if unsafe { libc::sigaddset(mask.as_mut_ptr(), signo) } < 0 {
            return Err(Error::last_os_error());
        }
    }
    // SAFETY: initialized by sigemptyset.
    Ok(unsafe { mask.assume_init() })
}

/// Blocks `signals` with `sigprocmask(SIG_BLOCK)` and creates a signalfd that becomes
/// readable when one of them is pending.
///
/// On Linux `sigprocmask()` changes the mask of the calling thread, which is the whole
/// process in a single threaded program. Call this from the thread that runs the loop,
/// before other threads are spawned, if the signals must not be delivered to them. The
/// set stays blocked after the entry is freed.
///
/// # Errors
///
/// Any failure of `sigaddset()`, `sigprocmask()`, `signalfd()`, or `fcntl()`.
pub fn arm_signal(signals: &SignalSet) -> std::io::Result<OwnedFd> {
    let mask = to_sigset(signals)?;

    // SAFETY: `mask` is a valid, initialized set; the old mask is not requested.
    if unsafe { libc::sigprocmask(libc::SIG_BLOCK, &raw const mask, ptr::null_mut()) } < 0 {
        return Err(Error::last_os_error());
    }

    // SAFETY: -1 asks for a new descriptor; `mask` is valid for the duration of the call.
    let raw_fd = unsafe { libc::signalfd(-1, &raw const mask, libc::SFD_CLOEXEC) };
    if raw_fd < 0 {
        return Err(Error::last_os_error());
    }
    // SAFETY: `raw_fd` was just returned by signalfd() and is owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

    set_non_blocking(&fd)?;
    Ok(fd)
}

/// Reads the 8 byte expiration counter of a timerfd.
///
/// # Errors
///
/// The `read()` error, or [`ErrorKind::UnexpectedEof`] for a short read.
pub fn drain_timer(fd: impl AsFd) -> std::io::Result<u64> {
    let mut buf = [0_u8; TIMER_COUNTER_SIZE];
    let count = rustix::io::read(fd, &mut buf[..])?;
    if count != TIMER_COUNTER_SIZE {
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            format!("short timerfd read: {count} bytes"),
        ));
    }
    Ok(u64::from_ne_bytes(buf))
}

/// Outcome of reading one record from a signalfd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRead {
    /// A complete `signalfd_siginfo` record.
    Delivered(SignalInfo),
    /// The read returned fewer bytes than one record, or nothing was pending
    /// (`EAGAIN`). There is nothing to report for this wakeup.
    Incomplete,
}

/// Reads exactly one `signalfd_siginfo` record.
///
/// # Errors
///
/// Any `read()` error other than `EAGAIN`.
pub fn read_signal(fd: impl AsFd) -> std::io::Result<SignalRead> {
    let mut buf = [0_u8; SIGINFO_SIZE];
    match rustix::io::read(fd, &mut buf[..]) {
        Ok(SIGINFO_SIZE) => Ok(SignalRead::Delivered(parse_siginfo(&buf))),
        Ok(_) => Ok(SignalRead::Incomplete),
        Err(errno) if errno == Errno::AGAIN => Ok(SignalRead::Incomplete),
        Err(errno) => Err(errno.into()),
    }
}

/// Picks the fields of `struct signalfd_siginfo` (see `signalfd(2)`):
/// `ssi_signo` at 0, `ssi_errno` at 4, `ssi_code` at 8, `ssi_pid` at 12, `ssi_uid` at 16.
#[must_use]
pub fn parse_siginfo(buf: &[u8; SIGINFO_SIZE]) -> SignalInfo {
    let word = |offset: usize| {
        [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]
    };
    SignalInfo {
        signo: u32::from_ne_bytes(word(0)),
        code: i32::from_ne_bytes(word(8)),
        pid: u32::from_ne_bytes(word(12)),
        uid: u32::from_ne_bytes(word(16)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(10, 500_000_000, Duration::from_millis(200), 10, 700_000_000; "no carry")]
    #[test_case(10, 900_000_000, Duration::from_millis(200), 11, 100_000_000; "carry")]
    #[test_case(10, 999_999_999, Duration::from_nanos(1), 11, 0; "exact carry")]
    #[test_case(0, 0, Duration::from_secs(3), 3, 0; "whole seconds")]
    fn deadline_normalizes_nanoseconds(
        now_sec: i64,
        now_nsec: i64,
        after: Duration,
        expected_sec: i64,
        expected_nsec: i64,
    ) {
        let now = Timespec {
            tv_sec: now_sec,
            tv_nsec: now_nsec,
        };
        let it = deadline_after(now, after).unwrap();
        assert_eq!((it.tv_sec, it.tv_nsec), (expected_sec, expected_nsec));
    }

    #[test]
    fn deadline_overflow_is_rejected() {
        let now = Timespec {
            tv_sec: i64::MAX,
            tv_nsec: 0,
        };
        let err = deadline_after(now, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = arm_periodic_timer(Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn oneshot_timerfd_is_non_blocking_until_it_expires() {
        let fd = arm_oneshot_timer(Duration::from_millis(20)).unwrap();
        let flags = rustix::fs::fcntl_getfl(&fd).unwrap();
        assert!(flags.contains(rustix::fs::OFlags::NONBLOCK));

        // Not expired yet: the read must not block.
        let err = drain_timer(&fd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        std::thread::sleep(Duration::from_millis(35));
        assert_eq!(drain_timer(&fd).unwrap(), 1);
    }

    #[test]
    fn periodic_timerfd_counts_missed_expirations() {
        let fd = arm_periodic_timer(Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(55));
        let expirations = drain_timer(&fd).unwrap();
        assert!(expirations >= 4, "expirations = {expirations}");
    }

    #[test]
    fn siginfo_fields_are_read_from_kernel_offsets() {
        let mut buf = [0_u8; SIGINFO_SIZE];
        buf[0..4].copy_from_slice(&10_u32.to_ne_bytes());
        buf[8..12].copy_from_slice(&(-6_i32).to_ne_bytes());
        buf[12..16].copy_from_slice(&4242_u32.to_ne_bytes());
        buf[16..20].copy_from_slice(&1000_u32.to_ne_bytes());
        assert_eq!(
            parse_siginfo(&buf),
            SignalInfo {
                signo: 10,
                pid: 4242,
                uid: 1000,
                code: -6,
            }
        );
    }

    #[test]
    fn empty_signal_set_is_rejected() {
        let err = to_sigset(&SignalSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn invalid_signal_number_is_rejected() {
        let err = to_sigset(&SignalSet::from([-1])).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
