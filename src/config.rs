// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// JSON configuration store at <root>/config.json.
// Missing file: defaults are written out. Missing keys: defaults, with a
// warning. Unknown keys: ignored, with a warning.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::{Paths, PathsError};

pub const APP_COUNT_MAX_KEY: &str = "app_count_max";
pub const IDLE_APP_COUNT_KEY: &str = "idle_app_count";
pub const CONFIG_KEYS: &[&str] = &[APP_COUNT_MAX_KEY, IDLE_APP_COUNT_KEY];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Paths(#[from] PathsError),
    #[error("cannot access config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid winglet config file format. expected dict with keys: {}", CONFIG_KEYS.join(", "))]
    InvalidFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_count_max: u32,
    pub idle_app_count: u32,
}

impl Config {
    pub const DEFAULT_APP_COUNT_MAX: u32 = 5;
    pub const DEFAULT_IDLE_APP_COUNT: u32 = 2;

    /// Create the run directories, then load `config.json` from them.
    pub fn load(paths: &Paths) -> Result<Self, ConfigError> {
        paths.init_dirs()?;
        Self::load_from(&paths.config_file())
    }

    /// Load from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json_err = |source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        };

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                let out = serde_json::to_string(&config).map_err(json_err)?;
                fs::write(path, out).map_err(io_err)?;
                debug!(path = %path.display(), "wrote default config");
                return Ok(config);
            }
            Err(e) => return Err(io_err(e)),
        };

        let value: serde_json::Value = serde_json::from_str(&text).map_err(json_err)?;
        let Some(object) = value.as_object() else {
            return Err(ConfigError::InvalidFormat);
        };

        let expected: BTreeSet<&str> = CONFIG_KEYS.iter().copied().collect();
        let found: BTreeSet<&str> = object.keys().map(String::as_str).collect();
        let expected_list = join(expected.iter());

        let missing: Vec<_> = expected.difference(&found).collect();
        if !missing.is_empty() {
            warn!(
                "missing key(s) found in winglet config file: {}. expected keys: {expected_list}",
                join(missing.into_iter()),
            );
        }
        let unexpected: Vec<_> = found.difference(&expected).collect();
        if !unexpected.is_empty() {
            warn!(
                "unexpected key(s) found in winglet config file: {}. expected keys: {expected_list}",
                join(unexpected.into_iter()),
            );
        }

        serde_json::from_value(value).map_err(json_err)
    }
}

fn join<'a, 'b: 'a>(keys: impl Iterator<Item = &'a &'b str>) -> String {
    keys.copied().collect::<Vec<_>>().join(", ")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_count_max: Self::DEFAULT_APP_COUNT_MAX,
            idle_app_count: Self::DEFAULT_IDLE_APP_COUNT,
        }
    }
}
