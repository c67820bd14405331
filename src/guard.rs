// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard for scoped acquisition of a named mutex.

use crate::error::AcquireOutcome;
use crate::NamedMutex;

/// Returned by [`NamedMutex::lock`]. Calls `release()` on drop, whether the
/// scope ends normally, returns early, or unwinds.
///
/// The guard exists even when acquisition failed, so always check
/// [`acquired`](Self::acquired) first.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mtx: &'a NamedMutex,
    outcome: AcquireOutcome,
}

impl<'a> MutexGuard<'a> {
    pub(crate) fn new(mtx: &'a NamedMutex, outcome: AcquireOutcome) -> Self {
        Self { mtx, outcome }
    }

    /// `true` if the lock was obtained, including from a dead holder.
    pub fn acquired(&self) -> bool {
        self.outcome.is_acquired()
    }

    pub fn outcome(&self) -> &AcquireOutcome {
        &self.outcome
    }

    pub fn mutex(&self) -> &NamedMutex {
        self.mtx
    }
}

impl<'a> Drop for MutexGuard<'a> {
    fn drop(&mut self) {
        self.mtx.release();
    }
}
