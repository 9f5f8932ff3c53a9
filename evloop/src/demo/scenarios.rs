// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll oneshot signalfd

//! Self-contained programs built on [`EvLoop`], one per [`CLICommand`]. Each creates its
//! own loop, runs it until it drains, and reports what its callbacks observed.
//!
//! Callbacks can't return errors to [`EvLoop::run()`], so a failed loop operation inside
//! a callback is logged and the scenario carries on.

use super::CLICommand;
use crate::{Entry, EvLoop, EvLoopError, EventFlags, LoopFlags, SignalInfo,
            set_non_blocking};
use miette::IntoDiagnostic as _;
use rustix::fd::AsRawFd as _;
use std::{cell::{Cell, RefCell},
          fmt::{Display, Formatter},
          rc::Rc,
          time::{Duration, Instant}};

/// What a scenario observed, printed by the `evloop` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioReport {
    OneShot { fired_after: Option<Duration> },
    Periodic(PeriodicReport),
    Cancel(CancelReport),
    Raw { reported: Option<EventFlags> },
    Chain { fired_at: Vec<Duration> },
    Signal { received: Option<SignalInfo> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodicReport {
    /// Number of times the callback ran.
    pub ticks: u64,
    /// Expirations that were folded into a later tick because the loop fell behind.
    pub missed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CancelReport {
    pub cancelled: bool,
    pub timeout_fired: bool,
}

/// Mask used by the raw scenario, the same one the loop uses for its own descriptors.
pub const RAW_SCENARIO_INTEREST: EventFlags = EventFlags::IN
    .union(EventFlags::PRI)
    .union(EventFlags::ERR)
    .union(EventFlags::HUP);

/// Runs the scenario selected on the command line.
///
/// # Errors
///
/// Whatever the scenario's loop setup or [`EvLoop::run()`] fails with, as a
/// [`miette::Report`] that keeps the [`EvLoopError`] diagnostic.
pub fn run_command(command: &CLICommand, flags: LoopFlags) -> miette::Result<ScenarioReport> {
    let millis = Duration::from_millis;
    match *command {
        CLICommand::Oneshot { delay_ms } => run_oneshot(flags, millis(delay_ms)),
        CLICommand::Periodic { every_ms, runs } => {
            run_periodic(flags, millis(every_ms), runs).map(ScenarioReport::Periodic)
        }
        CLICommand::Cancel {
            cancel_after_ms,
            timeout_ms,
        } => run_cancel(flags, millis(cancel_after_ms), millis(timeout_ms))
            .map(ScenarioReport::Cancel),
        CLICommand::Raw {} => run_raw(flags),
        CLICommand::Chain { interval_ms, count } => {
            run_chain(flags, millis(interval_ms), count)
        }
        CLICommand::Signal { delay_ms } => run_signal(flags, millis(delay_ms)),
    }
}

fn warn_on_err<T>(operation: &'static str, result: Result<T, EvLoopError>) {
    if let Err(err) = result {
        tracing::warn!(
            message = "evloop demo: loop operation failed inside a callback",
            operation,
            error = %err
        );
    }
}

/// Fires one timer `delay` after registration. The callback frees its own entry, which
/// is the last one, so [`EvLoop::run()`] returns.
///
/// # Errors
///
/// Loop creation, registration, or wait failures.
pub fn run_oneshot(flags: LoopFlags, delay: Duration) -> miette::Result<ScenarioReport> {
    let mut ev_loop = EvLoop::new(flags)?;
    let started = Instant::now();
    let fired_after = Rc::new(Cell::new(None));

    let fired_after_clone = fired_after.clone();
    ev_loop.add(Entry::oneshot_timer(delay, move |ev_loop, me| {
        fired_after_clone.set(Some(started.elapsed()));
        tracing::info!(message = "evloop demo: one-shot timer fired", %me);
        warn_on_err("free_entry", ev_loop.free_entry(me));
    }))?;

    ev_loop.run()?;
    ev_loop.destroy();

    Ok(ScenarioReport::OneShot {
        fired_after: fired_after.get(),
    })
}

/// Ticks a periodic timer `runs` times, then cancels and frees it from inside its own
/// callback.
///
/// # Errors
///
/// Loop creation, registration (a zero `every` is rejected), or wait failures.
pub fn run_periodic(
    flags: LoopFlags,
    every: Duration,
    runs: u64,
) -> miette::Result<PeriodicReport> {
    let mut ev_loop = EvLoop::new(flags)?;
    let report = Rc::new(Cell::new(PeriodicReport::default()));

    let report_clone = report.clone();
    ev_loop.add(Entry::periodic_timer(every, move |ev_loop, me, expirations| {
        let mut it = report_clone.get();
        it.ticks += 1;
        it.missed += expirations.saturating_sub(1);
        report_clone.set(it);

        tracing::info!(
            message = "evloop demo: periodic timer tick",
            ticks = it.ticks,
            expirations
        );

        if it.ticks >= runs {
            warn_on_err("cancel_timer", ev_loop.cancel_timer(me));
            warn_on_err("free_entry", ev_loop.free_entry(me));
        }
    }))?;

    ev_loop.run()?;
    ev_loop.destroy();

    Ok(report.get())
}

/// Registers a `timeout` timer and a shorter `cancel_after` timer whose callback
/// cancels and frees the first one. The long timer never fires.
///
/// # Errors
///
/// Loop creation, registration, or wait failures.
pub fn run_cancel(
    flags: LoopFlags,
    cancel_after: Duration,
    timeout: Duration,
) -> miette::Result<CancelReport> {
    let mut ev_loop = EvLoop::new(flags)?;
    let report = Rc::new(Cell::new(CancelReport::default()));

    let report_clone = report.clone();
    let long_timer = ev_loop.add(Entry::oneshot_timer(timeout, move |ev_loop, me| {
        let mut it = report_clone.get();
        it.timeout_fired = true;
        report_clone.set(it);
        warn_on_err("free_entry", ev_loop.free_entry(me));
    }))?;

    let report_clone = report.clone();
    ev_loop.add(Entry::oneshot_timer(cancel_after, move |ev_loop, me| {
        let cancel_result = ev_loop.cancel_timer(long_timer);
        if cancel_result.is_ok() {
            let mut it = report_clone.get();
            it.cancelled = true;
            report_clone.set(it);
            warn_on_err("free_entry", ev_loop.free_entry(long_timer));
        }
        warn_on_err("cancel_timer", cancel_result);
        warn_on_err("free_entry", ev_loop.free_entry(me));
    }))?;

    ev_loop.run()?;
    ev_loop.destroy();

    Ok(report.get())
}

/// Watches the read end of a pipe with [`RAW_SCENARIO_INTEREST`], writes one byte, and
/// reports the mask the callback received.
///
/// # Errors
///
/// Pipe creation or write failures, and loop creation, registration, or wait failures.
pub fn run_raw(flags: LoopFlags) -> miette::Result<ScenarioReport> {
    let mut ev_loop = EvLoop::new(flags)?;
    let (reader, writer) = rustix::pipe::pipe().into_diagnostic()?;
    set_non_blocking(&reader).into_diagnostic()?;

    let reported = Rc::new(Cell::new(None));
    let reported_clone = reported.clone();
    let handle = ev_loop.add(Entry::raw(
        reader.as_raw_fd(),
        RAW_SCENARIO_INTEREST,
        move |ev_loop, me, fd, mask| {
            tracing::info!(message = "evloop demo: raw descriptor ready", fd, ?mask);
            reported_clone.set(Some(mask));
            warn_on_err("unregister", ev_loop.unregister(me));
        },
    ))?;

    rustix::io::write(&writer, b"1").into_diagnostic()?;

    ev_loop.run()?;
    ev_loop.free_entry(handle)?;
    ev_loop.destroy();

    Ok(ScenarioReport::Raw {
        reported: reported.get(),
    })
}

/// Registers a one-shot timer whose callback registers the next one, `count` firings
/// in total. Each firing is at least `interval` after the previous one.
///
/// # Errors
///
/// Loop creation, registration, or wait failures.
pub fn run_chain(
    flags: LoopFlags,
    interval: Duration,
    count: u32,
) -> miette::Result<ScenarioReport> {
    fn chained_timer(
        interval: Duration,
        remaining: u32,
        started: Instant,
        fired_at: Rc<RefCell<Vec<Duration>>>,
    ) -> Entry {
        Entry::oneshot_timer(interval, move |ev_loop, me| {
            fired_at.borrow_mut().push(started.elapsed());
            tracing::info!(message = "evloop demo: chained timer fired", remaining);
            warn_on_err("free_entry", ev_loop.free_entry(me));
            if remaining > 1 {
                let next = chained_timer(interval, remaining - 1, started, fired_at.clone());
                warn_on_err("add", ev_loop.add(next));
            }
        })
    }

    let mut ev_loop = EvLoop::new(flags)?;
    let fired_at = Rc::new(RefCell::new(Vec::new()));
    if count > 0 {
        ev_loop.add(chained_timer(interval, count, Instant::now(), fired_at.clone()))?;
    }

    ev_loop.run()?;
    ev_loop.destroy();

    Ok(ScenarioReport::Chain {
        fired_at: fired_at.take(),
    })
}

/// Blocks `SIGUSR1` behind a signal entry, raises it from a one-shot timer `delay`
/// later, and reports what the signalfd delivered.
///
/// # Errors
///
/// Loop creation, registration, or wait failures.
pub fn run_signal(flags: LoopFlags, delay: Duration) -> miette::Result<ScenarioReport> {
    use signal_hook::{consts::SIGUSR1, low_level::raise};

    let mut ev_loop = EvLoop::new(flags)?;
    let received = Rc::new(Cell::new(None));

    let received_clone = received.clone();
    let signal_entry = ev_loop.add(Entry::signal([SIGUSR1], move |ev_loop, me, info| {
        tracing::info!(message = "evloop demo: signal received", ?info);
        received_clone.set(Some(info));
        warn_on_err("unregister", ev_loop.unregister(me));
        warn_on_err("free_entry", ev_loop.free_entry(me));
    }))?;

    ev_loop.add(Entry::oneshot_timer(delay, move |ev_loop, me| {
        if let Err(err) = raise(SIGUSR1) {
            // Nothing will arrive, release the signal entry so the loop can drain.
            tracing::error!(message = "evloop demo: raise(SIGUSR1) failed", error = %err);
            warn_on_err("unregister", ev_loop.unregister(signal_entry));
            warn_on_err("free_entry", ev_loop.free_entry(signal_entry));
        }
        warn_on_err("free_entry", ev_loop.free_entry(me));
    }))?;

    ev_loop.run()?;
    ev_loop.destroy();

    Ok(ScenarioReport::Signal {
        received: received.get(),
    })
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneShot { fired_after } => match fired_after {
                Some(after) => write!(f, "one-shot timer fired after {after:?}"),
                None => write!(f, "one-shot timer never fired"),
            },
            Self::Periodic(PeriodicReport { ticks, missed }) => {
                write!(f, "periodic timer ticked {ticks} times, missed {missed} expirations")
            }
            Self::Cancel(CancelReport {
                cancelled,
                timeout_fired,
            }) => write!(
                f,
                "long timer cancelled: {cancelled}, long timer fired: {timeout_fired}"
            ),
            Self::Raw { reported } => match reported {
                Some(mask) => write!(f, "raw descriptor reported {mask:?}"),
                None => write!(f, "raw descriptor never became ready"),
            },
            Self::Chain { fired_at } => {
                write!(f, "chained timers fired {} times at {fired_at:?}", fired_at.len())
            }
            Self::Signal { received } => match received {
                Some(info) => write!(
                    f,
                    "received signal {} from pid {} (uid {}, code {})",
                    info.signo, info.pid, info.uid, info.code
                ),
                None => write!(f, "no signal received"),
            },
        }
    }
}
