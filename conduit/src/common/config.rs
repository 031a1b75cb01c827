/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::common::Wait;

/// Default value of a connection's `enabled` property.
pub const DEFAULT_CONNECTION_ENABLED: bool = false;
/// Default value of a connection's `port` property.
pub const DEFAULT_CONNECTION_PORT: u16 = 8181;
/// Default value of a connection's `host` property.
pub const DEFAULT_CONNECTION_HOST: &str = "localhost";
/// Default value of a connection's `name` property.
pub const DEFAULT_CONNECTION_NAME: &str = "mtrouter";

/// Errors raised while loading configuration explicitly.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration text is not valid TOML for [`ConduitConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the Conduit framework.
///
/// Loaded from TOML files in XDG-compliant directories. Every section has
/// defaults, so a partial file is enough.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConduitConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
    /// Timer manager configuration
    pub timer: TimerConfig,
    /// Remote transport sections, keyed by section name.
    ///
    /// Kept as a raw table so each property can fall back to its default on
    /// its own when absent or malformed.
    pub connections: toml::Table,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long `Runtime` waits for a dispatcher thread to start running, in milliseconds
    pub thread_start_ms: u64,
    /// How long a thread is given to complete before it is abandoned, in milliseconds
    pub thread_stop_ms: u64,
    /// Overall shutdown budget for the runtime, in milliseconds
    pub shutdown_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Queue length above which a dispatcher logs a backlog warning
    pub dispatcher_backlog_warning: usize,
}

/// Tracing and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Write logs to a file in addition to stderr
    pub file_enabled: bool,
    /// Directory for log files
    pub log_directory: String,
    /// Log file name; `%appname%` and `%pid%` are expanded
    pub log_file: String,
}

/// Timer manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Name of the timer manager thread
    pub thread_name: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            thread_start_ms: 5_000,
            thread_stop_ms: 10_000,
            shutdown_ms: 30_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            dispatcher_backlog_warning: 1_024,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            log_directory: "logs".to_string(),
            log_file: "%appname%_%pid%.log".to_string(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "_conduit_timer_manager_".to_string(),
        }
    }
}

impl TimeoutConfig {
    /// Wait used when starting threads.
    #[must_use]
    pub const fn thread_start(&self) -> Wait {
        Wait::millis(self.thread_start_ms)
    }

    /// Wait used when stopping threads.
    #[must_use]
    pub const fn thread_stop(&self) -> Wait {
        Wait::millis(self.thread_stop_ms)
    }

    /// Overall shutdown budget.
    #[must_use]
    pub const fn shutdown(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }
}

impl ConduitConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or a typed
    /// section has values of the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Self>(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `conduit/config.toml` under the XDG configuration directories.
    /// If no file is found, or the file cannot be read or parsed, the error is
    /// logged and defaults are returned.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("conduit") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => {
                info!("Successfully loaded configuration");
                config
            }
            Err(e) => {
                error!("{}", e);
                Self::default()
            }
        }
    }

    fn connection_property(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.connections
            .get(section)
            .and_then(toml::Value::as_table)
            .and_then(|table| table.get(key))
    }

    /// Whether the transport in `section` is enabled. Defaults to `false`.
    #[must_use]
    pub fn connection_enable_flag(&self, section: &str) -> bool {
        self.connection_property(section, "enabled")
            .and_then(toml::Value::as_bool)
            .unwrap_or(DEFAULT_CONNECTION_ENABLED)
    }

    /// Port of the transport in `section`. Defaults to `8181` when absent or
    /// outside the `u16` range.
    #[must_use]
    pub fn connection_port(&self, section: &str) -> u16 {
        self.connection_property(section, "port")
            .and_then(toml::Value::as_integer)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_CONNECTION_PORT)
    }

    /// Host of the transport in `section`. Defaults to `"localhost"`.
    #[must_use]
    pub fn connection_host(&self, section: &str) -> String {
        self.connection_property(section, "host")
            .and_then(toml::Value::as_str)
            .filter(|host| !host.is_empty())
            .unwrap_or(DEFAULT_CONNECTION_HOST)
            .to_string()
    }

    /// Name of the transport in `section`. Defaults to `"mtrouter"`.
    #[must_use]
    pub fn connection_name(&self, section: &str) -> String {
        self.connection_property(section, "name")
            .and_then(toml::Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CONNECTION_NAME)
            .to_string()
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: ConduitConfig = ConduitConfig::load();
}
