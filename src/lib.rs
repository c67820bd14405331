// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named cross-process mutex with abandonment detection, plus the winglet
// run-directory, configuration and log-file glue.

pub mod mutex_name;

mod platform;

mod error;
pub use error::{AcquireError, AcquireOutcome, CleanupFailure, CreationError, ReleaseWarning};

mod mutex;
pub use mutex::NamedMutex;

mod guard;
pub use guard::MutexGuard;

pub mod config;
pub mod logging;
pub mod paths;
