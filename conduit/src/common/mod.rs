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

//! Shared building blocks: wait timeouts, synchronization events, process
//! identity, configuration and logging.
//!
//! # Key Re-exported Components:
//!
//! *   [`Wait`]: Bounded, unbounded or non-blocking waits used by every blocking call.
//! *   [`SyncEvent`]: Manual- and auto-reset events built on `parking_lot`.
//! *   [`Process`]: Identity of the running process, used for thread naming and
//!     path templates.
//! *   [`ConduitConfig`]: TOML configuration loaded from XDG locations.

// --- Public Re-exports ---
pub use config::{ConduitConfig, ConfigError};
pub use logging::{LogGuard, LoggingError};
pub use process::Process;
pub use sync_event::SyncEvent;
pub use types::*;

// --- Submodules ---

/// Defines [`Wait`] and identifier aliases.
mod types;
/// Defines [`SyncEvent`].
mod sync_event;
/// Defines [`Process`].
mod process;
/// Defines the configuration system.
pub mod config;
/// Installs the global `tracing` subscriber.
pub mod logging;
