//-
// Copyright (c) 2020, 2024, Jason Lingle
//
// This file is part of Ferrymap.
//
// Ferrymap is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ferrymap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Ferrymap. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The system-wide configuration for Ferrymap.
///
/// This is stored in a file named `ferrymap.toml` under the configuration
/// root. Every section is optional.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Options affecting how responses are synthesised.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where to find the logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The domain used to synthesise `Message-ID` values.
    ///
    /// Message IDs are never taken from the stored message. Instead, each
    /// message is given the id `<{email-id}@{domain}>`.
    pub domain: String,

    /// If true, send non-ASCII strings in responses as raw UTF-8 instead of
    /// downgrading them to RFC 2047 encoded words.
    ///
    /// This corresponds to the client having enabled `UTF8=ACCEPT`.
    pub unicode_aware: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            domain: "localhost".to_owned(),
            unicode_aware: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to a log4rs configuration file.
    ///
    /// Relative paths are resolved against the configuration root. If unset,
    /// `logging.toml` in the configuration root is used when it exists;
    /// otherwise everything at `INFO` and above goes to standard error.
    pub config: Option<PathBuf>,
}

impl SystemConfig {
    /// Load `ferrymap.toml` from `root`.
    ///
    /// A missing file yields the default configuration.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join("ferrymap.toml");
        if !path.is_file() {
            return Ok(SystemConfig::default());
        }

        let data = fs::read(&path)?;
        Ok(toml::from_slice(&data)?)
    }

    /// Resolve the log4rs configuration file to use, if any.
    pub fn log_config_path(&self, root: &Path) -> Option<PathBuf> {
        match self.logging.config {
            Some(ref path) => Some(root.join(path)),
            None => {
                let implicit = root.join("logging.toml");
                if implicit.is_file() {
                    Some(implicit)
                } else {
                    None
                }
            }
        }
    }
}
