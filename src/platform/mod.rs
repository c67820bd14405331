// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::io;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

// Re-export the platform-specific implementation under a uniform name.

#[cfg(unix)]
pub use posix::PlatformMutex;

#[cfg(windows)]
pub use windows::PlatformMutex;

/// How long a single wait may suspend the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Forever,
    /// Zero wait.
    Poll,
    Millis(u64),
}

/// Raw result of one OS wait.
#[derive(Debug)]
pub enum WaitStatus {
    Acquired,
    /// Acquired; the previous owner died holding the lock.
    Abandoned,
    TimedOut,
    Failed(io::Error),
}

/// The platform seam: one named, OS-level wait/signal object.
pub trait NamedLock: Sized {
    /// Create the named object, or open it if it already exists. Unowned.
    fn create(name: &str) -> io::Result<Self>;

    fn wait(&self, wait: Wait) -> WaitStatus;

    /// Give up ownership held by the calling thread.
    fn signal(&self) -> io::Result<()>;

    /// Close the local handle. The named object survives while other
    /// handles refer to it.
    fn close(self) -> io::Result<()>;

    /// Remove backing storage left behind by dead processes.
    fn clear_storage(name: &str);
}
