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

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::common::TimerId;
use crate::timer::{ExpiredTimerInfo, TimerInfo, TimerState};

/// Started timers keyed by id.
///
/// Entries live here only while they are idle, pending or expired.
#[derive(Debug, Default)]
pub struct TimerTable {
    entries: DashMap<TimerId, TimerInfo>,
}

impl TimerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `info`, returning the record it replaces.
    pub fn insert(&self, info: TimerInfo) -> Option<TimerInfo> {
        self.entries.insert(info.id(), info)
    }

    /// Removes and invalidates the record of `timer`.
    pub fn remove(&self, timer: TimerId) -> Option<TimerInfo> {
        self.entries.remove(&timer).map(|(_, mut info)| {
            info.invalidate();
            info
        })
    }

    /// Runs `f` on the record of `timer`.
    ///
    /// `f` runs under the table's shard lock and must not touch the table.
    pub fn update<R>(&self, timer: TimerId, f: impl FnOnce(&mut TimerInfo) -> R) -> Option<R> {
        self.entries.get_mut(&timer).map(|mut entry| f(entry.value_mut()))
    }

    /// State of `timer`, [`TimerState::Invalid`] when it has no record.
    #[must_use]
    pub fn state(&self, timer: TimerId) -> TimerState {
        self.entries
            .get(&timer)
            .map_or(TimerState::Invalid, |entry| entry.value().state())
    }

    /// Whether `timer` has a record.
    #[must_use]
    pub fn contains(&self, timer: TimerId) -> bool {
        self.entries.contains_key(&timer)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timer has a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// FIFO of fired timers awaiting processing.
#[derive(Debug, Default)]
pub struct ExpiredTimers {
    queue: Mutex<VecDeque<ExpiredTimerInfo>>,
}

impl ExpiredTimers {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a firing.
    pub fn push(&self, expired: ExpiredTimerInfo) {
        self.queue.lock().push_back(expired);
    }

    /// Takes every queued firing, oldest first.
    pub fn drain(&self) -> Vec<ExpiredTimerInfo> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued firings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
