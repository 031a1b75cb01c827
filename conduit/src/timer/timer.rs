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

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derive_new::new;

use crate::common::{ComponentId, TimerId};
use crate::timer::join_time;

/// Event count of a timer that fires until stopped.
pub const CONTINUOUSLY: u32 = u32::MAX;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// What the timer subsystem asks of a timer.
pub trait TimerControl: Send + Sync {
    /// Whether the timer may be armed now.
    fn can_arm(&self) -> bool;
    /// The timer fired at the UTC time `high:low` (microseconds).
    fn on_fired(&self, high: u32, low: u32);
    /// Whether the timer wants to fire again.
    fn is_still_active(&self) -> bool;
}

/// A one-shot, counted or continuous timer owned by a component.
#[derive(Debug)]
pub struct Timer {
    id: TimerId,
    name: String,
    timeout: Duration,
    event_count: u32,
    dispatcher: String,
    consumer: ComponentId,
    fired: AtomicU32,
    last_fired: AtomicU64,
    active: AtomicBool,
}

impl Timer {
    /// Creates an inactive timer firing `event_count` times every `timeout`
    /// on behalf of component `consumer` in dispatcher `dispatcher`.
    pub fn new(
        name: impl Into<String>,
        timeout: Duration,
        event_count: u32,
        dispatcher: impl Into<String>,
        consumer: ComponentId,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            timeout,
            event_count,
            dispatcher: dispatcher.into(),
            consumer,
            fired: AtomicU32::new(0),
            last_fired: AtomicU64::new(0),
            active: AtomicBool::new(false),
        })
    }

    /// Process-unique id.
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Period.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// How many times the timer fires per start, [`CONTINUOUSLY`] for no limit.
    #[must_use]
    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    /// Dispatcher receiving the timer events.
    #[must_use]
    pub fn dispatcher(&self) -> &str {
        &self.dispatcher
    }

    /// Component receiving the timer events.
    #[must_use]
    pub fn consumer(&self) -> ComponentId {
        self.consumer
    }

    /// Times fired since the last start.
    #[must_use]
    pub fn fired_count(&self) -> u32 {
        self.fired.load(Ordering::Acquire)
    }

    /// UTC microseconds of the last firing, `0` if none.
    #[must_use]
    pub fn last_fired(&self) -> u64 {
        self.last_fired.load(Ordering::Acquire)
    }

    /// Whether the timer is started.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn activate(&self) {
        self.fired.store(0, Ordering::Release);
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl TimerControl for Timer {
    fn can_arm(&self) -> bool {
        self.is_active() && !self.timeout.is_zero() && self.event_count > 0
    }

    fn on_fired(&self, high: u32, low: u32) {
        self.fired.fetch_add(1, Ordering::AcqRel);
        self.last_fired.store(join_time(high, low), Ordering::Release);
    }

    fn is_still_active(&self) -> bool {
        self.is_active()
            && (self.event_count == CONTINUOUSLY || self.fired_count() < self.event_count)
    }
}

/// Delivered to a component when one of its timers fires.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    /// The timer.
    pub timer: TimerId,
    /// Its name.
    pub name: String,
    /// Receiving component.
    pub consumer: ComponentId,
    /// UTC microseconds of the firing.
    pub fired_at: u64,
    /// Times fired since the timer was started, this one included.
    pub fire_count: u32,
}
