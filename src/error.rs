//! Kernel error codes.

use core::fmt;

/// Errors reported synchronously by the kernel API. Each failed call has
/// no effect on scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The TCB table already holds `MAX_TASKS` tasks.
    CapacityExceeded,
    /// Tasks can only be created before the scheduler starts.
    AlreadyStarted,
    /// `kernel::init()` has not been called.
    NotInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded => f.write_str("no room in TCB table"),
            Error::AlreadyStarted => f.write_str("scheduler already started"),
            Error::NotInitialized => f.write_str("kernel not initialized"),
        }
    }
}
