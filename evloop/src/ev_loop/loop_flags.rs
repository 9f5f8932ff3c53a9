// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll cloexec

use super::EvLoopError;
use rustix::event::epoll::CreateFlags;

/// Bit value accepted by [`LoopFlags::try_from()`] for close-on-exec.
pub const EV_CLOEXEC: u32 = 1 << 0;

/// Creation options for [`EvLoop::new()`].
///
/// [`EvLoop::new()`]: super::EvLoop::new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopFlags {
    /// The epoll descriptor is inherited across `exec()`.
    #[default]
    None,
    /// The epoll descriptor is created with `EPOLL_CLOEXEC`.
    CloseOnExec,
}

impl LoopFlags {
    /// The matching `epoll_create1()` flags.
    #[must_use]
    pub fn to_create_flags(self) -> CreateFlags {
        match self {
            Self::None => CreateFlags::empty(),
            Self::CloseOnExec => CreateFlags::CLOEXEC,
        }
    }
}

impl TryFrom<u32> for LoopFlags {
    type Error = EvLoopError;

    /// `0` and [`EV_CLOEXEC`] are recognized, everything else is a configuration error.
    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(Self::None),
            EV_CLOEXEC => Ok(Self::CloseOnExec),
            _ => Err(EvLoopError::InvalidFlags { bits }),
        }
    }
}
