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

//! OS threads bound to consumers, their per-thread storage, and the registry
//! that makes live threads addressable by handle, name and number.
//!
//! # Key Re-exported Components:
//!
//! *   [`Thread`]: Spawns, registers, stops and joins one OS thread.
//! *   [`ThreadConsumer`]: The callbacks a thread drives.
//! *   [`ThreadRegistry`]: Triple-keyed lookup of live threads.
//! *   [`local_storage`]: Per-thread key/value storage and
//!     [`current_consumer`](local_storage::current_consumer).

// --- Public Re-exports ---
pub use consumer::{ExitCode, ThreadConsumer, ThreadInfo, UnknownExitCode};
pub use local_storage::{current_consumer, StorageError, StorageValue};
pub use priority::ThreadPriority;
pub use registry::{RegistryError, ResourceRegistry, ThreadRegistry};
pub use state::{RegistrationState, ThreadCompletion};
pub use worker::{Thread, INVALID_THREAD_NUMBER};

// --- Submodules ---

/// Defines [`ThreadConsumer`] and [`ExitCode`].
mod consumer;
/// Per-thread key/value storage.
pub mod local_storage;
/// Native scheduling calls.
mod native;
/// Defines [`ThreadPriority`].
mod priority;
/// Defines [`ResourceRegistry`] and [`ThreadRegistry`].
mod registry;
/// Defines [`RegistrationState`] and [`ThreadCompletion`].
mod state;
/// Defines [`Thread`].
mod worker;
