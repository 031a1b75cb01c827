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

//! Shared type aliases and small value types used across Conduit.

use std::time::Duration;

/// How long a blocking call may wait for a synchronization event.
///
/// Every blocking point in Conduit takes a `Wait`; unbounded blocking only
/// happens when a caller explicitly passes [`Wait::Infinite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wait {
    /// Do not block at all.
    DoNotWait,
    /// Block for at most the given duration.
    For(Duration),
    /// Block until the event is signalled.
    #[default]
    Infinite,
}

impl Wait {
    /// Builds a bounded wait from milliseconds. `0` means [`Wait::DoNotWait`].
    #[must_use]
    pub const fn millis(ms: u64) -> Self {
        if ms == 0 {
            Self::DoNotWait
        } else {
            Self::For(Duration::from_millis(ms))
        }
    }

    /// Returns `true` for [`Wait::DoNotWait`].
    #[inline]
    #[must_use]
    pub const fn is_no_wait(&self) -> bool {
        matches!(self, Self::DoNotWait)
    }
}

impl From<Duration> for Wait {
    fn from(value: Duration) -> Self {
        if value.is_zero() {
            Self::DoNotWait
        } else {
            Self::For(value)
        }
    }
}

/// Numeric identifier of a [`Thread`](crate::thread::Thread). `0` is invalid.
pub type ThreadNumber = u64;

/// Identifier of a component inside its dispatcher. Doubles as the consumer id
/// a proxy notifies.
pub type ComponentId = u32;

/// Identifier of a proxy inside its dispatcher.
pub type ProxyId = u32;

/// Identifier of a timer.
pub type TimerId = u64;
