// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Subscriber setup. The library only emits tracing events; binaries pick a
// sink here: a per-run file under <root>/logs, or stderr.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::paths::{Paths, PathsError};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    Paths(#[from] PathsError),
    #[error("cannot create log file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// `RUST_LOG`, falling back to `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Runs started within the same second share a file name; append so
/// neither truncates the other.
fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Send all events to a fresh log file in `paths.log_dir()`.
/// Returns the file's path.
pub fn init(paths: &Paths) -> Result<PathBuf, LoggingError> {
    paths.init_dirs()?;
    let path = paths.log_file();
    let file = open_log(&path).map_err(|source| LoggingError::File {
        path: path.clone(),
        source,
    })?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    Ok(path)
}

/// Send all events to stderr, keeping stdout free for program output.
pub fn init_stderr() -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
