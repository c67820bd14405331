// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the named mutex.
// Only `CreationError` ever leaves a call as an `Err`; the others travel as
// diagnostics (acquire outcomes and tracing events).

use std::io;

use thiserror::Error;

/// Constructing a `NamedMutex` failed. The instance never existed.
#[derive(Debug, Error)]
#[error("cannot create named mutex `{name}`: {message}")]
pub struct CreationError {
    /// Name the caller asked for.
    pub name: String,
    /// Raw OS error code, when the failure came from the OS.
    pub code: Option<i32>,
    pub message: String,
}

impl CreationError {
    pub(crate) fn invalid_name(name: &str, why: &str) -> Self {
        Self {
            name: name.to_string(),
            code: None,
            message: format!("invalid name: {why}"),
        }
    }

    pub(crate) fn from_io(name: &str, err: &io::Error) -> Self {
        Self {
            name: name.to_string(),
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// The OS wait call failed while acquiring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("acquire failed: {message}")]
pub struct AcquireError {
    pub code: Option<i32>,
    pub message: String,
}

impl From<io::Error> for AcquireError {
    fn from(err: io::Error) -> Self {
        Self {
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// A release that did nothing. Reported, never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseWarning {
    #[error("release called while the lock is not held by this instance")]
    NotOwned,
    #[error("OS refused release: {message}")]
    Os { code: Option<i32>, message: String },
}

impl From<io::Error> for ReleaseWarning {
    fn from(err: io::Error) -> Self {
        Self::Os {
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// Drop-time teardown failure. Swallowed after being logged.
#[derive(Debug, Error)]
pub enum CleanupFailure {
    #[error("release during cleanup failed: {0}")]
    Release(ReleaseWarning),
    #[error("closing the handle failed: {0}")]
    Close(io::Error),
}

/// Tagged result of one acquisition attempt.
///
/// `NamedMutex::acquire` collapses this to a `bool`: both `Acquired` and
/// `Abandoned` are `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Lock obtained cleanly.
    Acquired,
    /// Lock obtained, but the previous holder exited without releasing.
    /// The data it protects may be inconsistent.
    Abandoned,
    /// Timeout elapsed, or the lock was busy on a non-blocking attempt.
    TimedOut,
    Failed(AcquireError),
}

impl AcquireOutcome {
    /// Whether the caller now holds the lock.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired | Self::Abandoned)
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned)
    }
}
