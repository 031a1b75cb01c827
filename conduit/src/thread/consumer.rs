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

use std::fmt;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use crate::common::ThreadNumber;

/// Exit status a [`ThreadConsumer`] reports when its thread finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExitCode {
    /// The consumer finished its work normally.
    #[default]
    Completed,
    /// The consumer was asked to stop before finishing.
    Terminated,
    /// The consumer was started without the parameters it needs.
    NoParam,
    /// The consumer failed, or never ran because registration failed.
    Error,
    /// No status has been reported.
    Undefined,
}

impl ExitCode {
    /// The canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Terminated => "Terminated",
            Self::NoParam => "NoParam",
            Self::Error => "Error",
            Self::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no [`ExitCode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exit code: {0}")]
pub struct UnknownExitCode(pub String);

impl FromStr for ExitCode {
    type Err = UnknownExitCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Completed" => Ok(Self::Completed),
            "Terminated" => Ok(Self::Terminated),
            "NoParam" => Ok(Self::NoParam),
            "Error" => Ok(Self::Error),
            "Undefined" => Ok(Self::Undefined),
            other => Err(UnknownExitCode(other.to_string())),
        }
    }
}

/// Identity of a registered thread, handed to [`ThreadConsumer::on_registered`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Unique thread name.
    pub name: String,
    /// Numeric thread id.
    pub number: ThreadNumber,
    /// Native handle of the spawned OS thread.
    pub handle: std::thread::ThreadId,
}

/// The work bound to a [`Thread`](super::Thread).
///
/// The thread drives the callbacks in a fixed order:
///
/// 1. `on_registered` on the *starting* thread, right after the OS thread has
///    been created and entered into the registry. Returning `false` rolls the
///    registration back and makes `start` fail.
/// 2. `run` on the new thread.
/// 3. `exit` on the new thread once `run` returns; its value becomes the
///    thread's exit code.
///
/// `on_unregistering` is called on the *stopping* thread when the thread is
/// removed from the registry, before it is waited for.
///
/// Consumers are shared between the starting thread and the running thread,
/// so callbacks take `&self`.
pub trait ThreadConsumer: Send + Sync + 'static {
    /// Called after registration. Return `false` to refuse to run.
    fn on_registered(&self, _thread: &ThreadInfo) -> bool {
        true
    }

    /// The thread body. Long-running bodies should return once `cancel` is
    /// cancelled; a body that ignores it is abandoned when a bounded stop
    /// times out.
    fn run(&self, cancel: &CancellationToken);

    /// Called when the thread is being unregistered.
    fn on_unregistering(&self) {}

    /// Called after `run` returns.
    fn exit(&self) -> ExitCode {
        ExitCode::Completed
    }
}
