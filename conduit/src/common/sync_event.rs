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

//! Manual- and auto-reset synchronization events.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::common::Wait;

/// A signalled/non-signalled flag threads can block on.
///
/// A *manual-reset* event stays signalled until [`SyncEvent::reset`] is called
/// and releases every waiter. An *auto-reset* event releases one waiter and
/// returns to the non-signalled state.
#[derive(Debug)]
pub struct SyncEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
    auto_reset: bool,
}

impl SyncEvent {
    /// Creates a manual-reset event.
    #[must_use]
    pub fn manual_reset(initially_signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(initially_signaled),
            cond: Condvar::new(),
            auto_reset: false,
        }
    }

    /// Creates an auto-reset event.
    #[must_use]
    pub fn auto_reset(initially_signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(initially_signaled),
            cond: Condvar::new(),
            auto_reset: true,
        }
    }

    /// Signals the event.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        if self.auto_reset {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    /// Returns the event to the non-signalled state.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Reports whether the event is currently signalled without consuming it.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is signalled or `wait` elapses.
    ///
    /// Returns `true` if the event was signalled. An auto-reset event is
    /// consumed by a successful wait.
    pub fn wait(&self, wait: Wait) -> bool {
        let mut signaled = self.signaled.lock();
        match wait {
            Wait::DoNotWait => {}
            Wait::Infinite => {
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
            }
            Wait::For(duration) => {
                let deadline = Instant::now() + duration;
                while !*signaled {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
            }
        }

        let result = *signaled;
        if result && self.auto_reset {
            *signaled = false;
        }
        result
    }
}
