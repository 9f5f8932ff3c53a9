// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words fcntl getfl setfl

use rustix::{fd::AsFd,
             fs::{OFlags, fcntl_getfl, fcntl_setfl}};

/// Switches `fd` into non-blocking mode, keeping its other status flags.
///
/// Every descriptor that takes part in the loop must be non-blocking, so that a drain
/// read on a descriptor that turned out not to be ready returns `EAGAIN` instead of
/// stalling the whole loop. Descriptors created by the loop itself (timers, signals) go
/// through this before they are registered. Call it on your own descriptors before you
/// wrap them in a raw / read / write entry, unless they were opened with `O_NONBLOCK`.
///
/// # Errors
///
/// Returns the `fcntl()` error if the flags can't be read or written.
pub fn set_non_blocking(fd: impl AsFd) -> std::io::Result<()> {
    let fd = fd.as_fd();
    let flags = fcntl_getfl(fd)?;
    if flags.contains(OFlags::NONBLOCK) {
        return Ok(());
    }
    fcntl_setfl(fd, flags | OFlags::NONBLOCK)?;
    Ok(())
}
