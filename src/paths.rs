// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// winglet run-directory layout:
//   <root>/config.json
//   <root>/logs/log-<YYYYmmdd-HHMMSS>-UTC.txt
// <root> is $WINGLET_PATH, or ~/.winglet.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Environment variable overriding the root directory.
pub const ROOT_ENV: &str = "WINGLET_PATH";

const DEFAULT_DIR: &str = ".winglet";

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("cannot determine the home directory; set the \"WINGLET_PATH\" environment variable")]
    NoHome,
    #[error("{message}")]
    PermissionDenied {
        what: &'static str,
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot create {what} directory at {}: {source}", .path.display())]
    Io {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn permission_message(what: &str, path: &Path, custom_root: bool) -> String {
    let mut msg = format!("Cannot create winglet {what} directory at {}.", path.display());
    if !custom_root {
        msg.push_str(&format!(
            " You can change the location by setting the \"{ROOT_ENV}\" environment variable."
        ));
    }
    msg
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
    /// Whether `root` came from `WINGLET_PATH`.
    custom_root: bool,
}

impl Paths {
    /// Resolve from `WINGLET_PATH` and the user's home directory.
    pub fn from_env() -> Result<Self, PathsError> {
        Self::resolve(std::env::var_os(ROOT_ENV), dirs::home_dir())
    }

    /// Resolve from an explicit override and home directory.
    /// An empty override counts as unset.
    pub fn resolve(custom: Option<OsString>, home: Option<PathBuf>) -> Result<Self, PathsError> {
        match custom.filter(|c| !c.is_empty()) {
            Some(root) => Ok(Self {
                root: PathBuf::from(root),
                custom_root: true,
            }),
            None => {
                let home = home.ok_or(PathsError::NoHome)?;
                Ok(Self {
                    root: home.join(DEFAULT_DIR),
                    custom_root: false,
                })
            }
        }
    }

    /// Use `root` directly, as if it came from `WINGLET_PATH`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            custom_root: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// A fresh per-run log file path stamped with the current UTC time.
    pub fn log_file(&self) -> PathBuf {
        self.log_file_at(Utc::now())
    }

    pub fn log_file_at(&self, now: DateTime<Utc>) -> PathBuf {
        self.log_dir()
            .join(format!("log-{}-UTC.txt", now.format("%Y%m%d-%H%M%S")))
    }

    /// Create the root and log directories if missing.
    pub fn init_dirs(&self) -> Result<(), PathsError> {
        self.create("config", &self.root)?;
        self.create("log", &self.log_dir())
    }

    fn create(&self, what: &'static str, path: &Path) -> Result<(), PathsError> {
        fs::create_dir_all(path).map_err(|source| {
            let path = path.to_path_buf();
            if source.kind() == io::ErrorKind::PermissionDenied {
                PathsError::PermissionDenied {
                    what,
                    message: permission_message(what, &path, self.custom_root),
                    path,
                    source,
                }
            } else {
                PathsError::Io { what, path, source }
            }
        })
    }
}
