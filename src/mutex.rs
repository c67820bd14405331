// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named inter-process mutex.
// Delegates to platform::PlatformMutex (POSIX or Windows) and reports every
// state transition as a tracing event.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::error::{AcquireError, AcquireOutcome, CleanupFailure, CreationError, ReleaseWarning};
use crate::guard::MutexGuard;
use crate::mutex_name;
use crate::platform::{NamedLock, PlatformMutex, Wait, WaitStatus};

/// A named, inter-process mutex.
///
/// Every `NamedMutex` opened with the same name, in any process on the host,
/// refers to the same OS object. On POSIX that is a robust, process-shared
/// `pthread_mutex_t` in the shared memory object `/<name>`; on Windows a
/// kernel mutex from `CreateMutexW`.
///
/// Ownership belongs to the thread that acquired the lock. Waiters are not
/// served in FIFO order, and an infinite wait cannot be interrupted; use a
/// timeout and retry if you need to give up.
///
/// `acquire` never fails outward: contention, timeouts and OS wait failures
/// all come back as `false`, with the detail in a tracing event (or through
/// [`NamedMutex::acquire_outcome`]).
pub struct NamedMutex {
    name: String,
    inner: ManuallyDrop<PlatformMutex>,
    auto_cleanup: bool,
    owned: AtomicBool,
}

impl NamedMutex {
    /// Open (or create) a named mutex that releases and closes itself on drop.
    pub fn new(name: &str) -> Result<Self, CreationError> {
        Self::with_auto_cleanup(name, true)
    }

    /// Open (or create) a named mutex.
    ///
    /// With `auto_cleanup` false, dropping the instance neither releases the
    /// lock nor closes the handle: the named object is kept alive for other
    /// processes and the caller owns its lifetime.
    pub fn with_auto_cleanup(name: &str, auto_cleanup: bool) -> Result<Self, CreationError> {
        if let Err(why) = mutex_name::validate(name) {
            let err = CreationError::invalid_name(name, why);
            error!(name, "{err}");
            return Err(err);
        }
        let inner = PlatformMutex::create(name).map_err(|e| {
            let err = CreationError::from_io(name, &e);
            error!(name, code = ?err.code, "{err}");
            err
        })?;
        debug!(name, auto_cleanup, "named mutex opened");
        Ok(Self {
            name: name.to_string(),
            inner: ManuallyDrop::new(inner),
            auto_cleanup,
            owned: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn auto_cleanup(&self) -> bool {
        self.auto_cleanup
    }

    /// Whether this instance currently holds the lock.
    pub fn is_owned(&self) -> bool {
        self.owned.load(Ordering::Acquire)
    }

    /// Try to take the lock. Returns `true` when this instance now holds it.
    ///
    /// | blocking | timeout   | wait                               |
    /// |----------|-----------|------------------------------------|
    /// | true     | None      | forever                            |
    /// | true     | Some(t)   | `t`, truncated to whole ms         |
    /// | false    | any       | none; a timeout is ignored (warns) |
    ///
    /// `true` is also returned when the previous holder died without
    /// releasing: the lock is yours, but the state it protects may be
    /// inconsistent.
    pub fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> bool {
        self.acquire_outcome(blocking, timeout).is_acquired()
    }

    /// `acquire`, returning the tagged outcome instead of a `bool`.
    pub fn acquire_outcome(&self, blocking: bool, timeout: Option<Duration>) -> AcquireOutcome {
        let wait = match (blocking, timeout) {
            (true, None) => Wait::Forever,
            (true, Some(t)) => Wait::Millis(u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            (false, None) => Wait::Poll,
            (false, Some(t)) => {
                warn!(
                    name = %self.name,
                    timeout_ms = u64::try_from(t.as_millis()).unwrap_or(u64::MAX),
                    "timeout ignored for non-blocking acquire"
                );
                Wait::Poll
            }
        };
        trace!(name = %self.name, ?wait, "acquiring");

        let outcome = match self.inner.wait(wait) {
            WaitStatus::Acquired => AcquireOutcome::Acquired,
            WaitStatus::Abandoned => AcquireOutcome::Abandoned,
            WaitStatus::TimedOut => AcquireOutcome::TimedOut,
            WaitStatus::Failed(e) => AcquireOutcome::Failed(AcquireError::from(e)),
        };

        match &outcome {
            AcquireOutcome::Acquired => {
                debug!(name = %self.name, "acquired");
            }
            AcquireOutcome::Abandoned => {
                warn!(
                    name = %self.name,
                    "acquired abandoned mutex; protected state may be inconsistent"
                );
            }
            AcquireOutcome::TimedOut => {
                debug!(name = %self.name, blocking, "not acquired");
            }
            AcquireOutcome::Failed(err) => {
                error!(name = %self.name, code = ?err.code, "{err}");
            }
        }
        if outcome.is_acquired() {
            self.owned.store(true, Ordering::Release);
        }
        outcome
    }

    /// Give the lock back. Never fails: releasing a lock this instance does
    /// not hold, or one the OS refuses to release, is only reported.
    pub fn release(&self) {
        if let Err(warning) = self.try_release() {
            warn!(name = %self.name, "{warning}");
        }
    }

    fn try_release(&self) -> Result<(), ReleaseWarning> {
        if !self.owned.load(Ordering::Acquire) {
            return Err(ReleaseWarning::NotOwned);
        }
        self.inner.signal()?;
        self.owned.store(false, Ordering::Release);
        debug!(name = %self.name, "released");
        Ok(())
    }

    /// Blocking acquire with no timeout, released when the guard drops.
    ///
    /// Check [`MutexGuard::acquired`] before touching protected state.
    pub fn lock(&self) -> MutexGuard<'_> {
        let outcome = self.acquire_outcome(true, None);
        MutexGuard::new(self, outcome)
    }

    /// Run `f` under the lock. `f` receives the acquisition result; the lock
    /// is released however `f` exits, including by panic.
    pub fn with_lock<R>(&self, f: impl FnOnce(bool) -> R) -> R {
        let guard = self.lock();
        f(guard.acquired())
    }

    /// Release (if held) and close now, whatever `auto_cleanup` says.
    pub fn close(self) {
        let mut this = ManuallyDrop::new(self);
        this.teardown();
        drop(std::mem::take(&mut this.name));
    }

    fn teardown(&mut self) {
        if self.owned.load(Ordering::Acquire) {
            if let Err(warning) = self.try_release() {
                let failure = CleanupFailure::Release(warning);
                debug!(name = %self.name, "{failure}");
            }
        }
        // Safety: teardown runs once, from `close` or `drop`.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        match inner.close() {
            Ok(()) => debug!(name = %self.name, "named mutex closed"),
            Err(e) => {
                let failure = CleanupFailure::Close(e);
                debug!(name = %self.name, "{failure}");
            }
        }
    }

    /// Remove backing storage for `name` left by processes that never closed
    /// it (POSIX shared memory). No-op on Windows.
    ///
    /// Only call this when no other process uses `name`. Instances already
    /// open keep the old object, while the next `new` creates a separate one,
    /// so the two no longer exclude each other. The same split can happen on
    /// POSIX without this call: the last instance to close unlinks the name,
    /// and a process opening it at that moment ends up on the unlinked copy.
    pub fn clear_storage(name: &str) {
        PlatformMutex::clear_storage(name);
    }
}

impl std::fmt::Debug for NamedMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedMutex")
            .field("name", &self.name)
            .field("auto_cleanup", &self.auto_cleanup)
            .field("owned", &self.is_owned())
            .finish()
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        if self.auto_cleanup {
            self.teardown();
        } else {
            // The platform handle stays open on purpose.
            debug!(name = %self.name, owned = self.is_owned(), "cleanup skipped");
        }
    }
}
