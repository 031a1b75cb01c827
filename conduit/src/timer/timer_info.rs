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

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use derive_new::new;
use tracing::trace;

use crate::common::TimerId;
use crate::timer::{Timer, TimerControl};

/// Splits UTC microseconds into high and low 32-bit words.
#[must_use]
pub const fn split_time(micros: u64) -> (u32, u32) {
    ((micros >> 32) as u32, micros as u32)
}

/// Joins high and low 32-bit words into UTC microseconds.
#[must_use]
pub const fn join_time(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Current UTC time in microseconds since the Unix epoch.
#[must_use]
pub fn utc_now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
}

/// State of a [`TimerInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerState {
    /// Not registered. Never leaves this state.
    #[default]
    Invalid,
    /// Registered, not armed.
    Idle,
    /// Armed, waiting to fire.
    Pending,
    /// Fired and still wanted.
    Expired,
}

/// Bookkeeping for one started timer.
///
/// ```text
/// Idle --can_start--> Pending --on_expire--> Expired --rearm--> Pending
///                                       \--> Idle (no longer wanted)
/// ```
#[derive(Debug)]
pub struct TimerInfo<T: ?Sized = Timer> {
    timer: Arc<T>,
    id: TimerId,
    handle: u64,
    dispatcher: String,
    started: (u32, u32),
    expired: (u32, u32),
    state: TimerState,
}

impl<T: TimerControl + ?Sized> TimerInfo<T> {
    /// An idle record for `timer`. `handle` tells successive starts of the
    /// same timer apart.
    pub fn new(timer: Arc<T>, id: TimerId, handle: u64, dispatcher: impl Into<String>) -> Self {
        Self {
            timer,
            id,
            handle,
            dispatcher: dispatcher.into(),
            started: (0, 0),
            expired: (0, 0),
            state: TimerState::Idle,
        }
    }

    /// Arms an idle timer that still wants to run, recording `now` as its
    /// start time.
    pub fn can_start(&mut self, now: u64) -> bool {
        if self.state != TimerState::Idle || !self.timer.can_arm() {
            return false;
        }
        self.started = split_time(now);
        self.expired = (0, 0);
        self.state = TimerState::Pending;
        true
    }

    /// Fires a pending timer at `high:low`.
    ///
    /// Ticks earlier than the start time or than the previous expiration are
    /// ignored and `false` is returned, as are ticks for a timer that is not
    /// pending.
    pub fn on_expire(&mut self, high: u32, low: u32) -> bool {
        if self.state != TimerState::Pending {
            return false;
        }
        let fired = join_time(high, low);
        if fired < self.start_time() || fired < self.last_expired() {
            trace!(timer = self.id, fired, start = self.start_time(), "out-of-order tick ignored");
            return false;
        }
        self.expired = (high, low);
        self.timer.on_fired(high, low);
        self.state = if self.timer.is_still_active() {
            TimerState::Expired
        } else {
            TimerState::Idle
        };
        true
    }

    /// Arms an expired timer again.
    pub fn rearm(&mut self) -> bool {
        if self.state == TimerState::Expired && self.timer.is_still_active() {
            self.state = TimerState::Pending;
            true
        } else {
            false
        }
    }

    /// Disarms the timer.
    pub fn stop(&mut self) {
        if self.state != TimerState::Invalid {
            self.state = TimerState::Idle;
        }
    }

    /// Marks the record as unregistered.
    pub fn invalidate(&mut self) {
        self.state = TimerState::Invalid;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Timer id.
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Start generation.
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Dispatcher owning the timer.
    #[must_use]
    pub fn dispatcher(&self) -> &str {
        &self.dispatcher
    }

    /// The timer.
    #[must_use]
    pub fn timer(&self) -> &Arc<T> {
        &self.timer
    }

    /// UTC microseconds of the start.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        join_time(self.started.0, self.started.1)
    }

    /// UTC microseconds of the last expiration, `0` if none.
    #[must_use]
    pub fn last_expired(&self) -> u64 {
        join_time(self.expired.0, self.expired.1)
    }
}

/// A timer that fired, queued for the dispatcher draining expirations.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredTimerInfo {
    /// The timer.
    pub timer: TimerId,
    /// Start generation the firing belongs to.
    pub handle: u64,
    /// High word of the UTC firing time.
    pub high: u32,
    /// Low word of the UTC firing time.
    pub low: u32,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct Control {
        armable: AtomicBool,
        remaining: AtomicU32,
        fired: AtomicU32,
    }

    impl Control {
        fn new(times: u32) -> Arc<Self> {
            Arc::new(Self {
                armable: AtomicBool::new(true),
                remaining: AtomicU32::new(times),
                fired: AtomicU32::new(0),
            })
        }
    }

    impl TimerControl for Control {
        fn can_arm(&self) -> bool {
            self.armable.load(Ordering::SeqCst)
        }

        fn on_fired(&self, _high: u32, _low: u32) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            self.remaining.fetch_sub(1, Ordering::SeqCst);
        }

        fn is_still_active(&self) -> bool {
            self.remaining.load(Ordering::SeqCst) > 0
        }
    }

    #[test]
    fn time_words_round_trip() {
        let micros = 0x0001_2345_6789_abcd;
        let (high, low) = split_time(micros);
        assert_eq!(high, 0x0001_2345);
        assert_eq!(low, 0x6789_abcd);
        assert_eq!(join_time(high, low), micros);
    }

    #[test]
    fn start_requires_idle_and_armable() {
        let control = Control::new(1);
        let mut info = TimerInfo::new(Arc::clone(&control), 1, 1, "d");
        control.armable.store(false, Ordering::SeqCst);
        assert!(!info.can_start(10));
        assert_eq!(info.state(), TimerState::Idle);

        control.armable.store(true, Ordering::SeqCst);
        assert!(info.can_start(10));
        assert_eq!(info.state(), TimerState::Pending);
        assert!(!info.can_start(11));
    }

    #[test]
    fn tick_before_start_is_ignored() {
        let control = Control::new(1);
        let mut info = TimerInfo::new(Arc::clone(&control), 1, 1, "d");
        let start = 1_000_000;
        assert!(info.can_start(start));

        let (high, low) = split_time(start - 1);
        assert!(!info.on_expire(high, low));
        assert_eq!(info.state(), TimerState::Pending);
        assert_eq!(control.fired.load(Ordering::SeqCst), 0);

        let (high, low) = split_time(start);
        assert!(info.on_expire(high, low));
        assert_eq!(info.state(), TimerState::Idle);
        assert!(!info.on_expire(high, low));
        assert_eq!(control.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_timer_rearms_and_rejects_stale_ticks() {
        let control = Control::new(3);
        let mut info = TimerInfo::new(Arc::clone(&control), 1, 1, "d");
        assert!(info.can_start(100));

        let (h, l) = split_time(200);
        assert!(info.on_expire(h, l));
        assert_eq!(info.state(), TimerState::Expired);
        assert!(info.rearm());

        let (h, l) = split_time(150);
        assert!(!info.on_expire(h, l));
        let (h, l) = split_time(300);
        assert!(info.on_expire(h, l));
        assert_eq!(info.last_expired(), 300);

        info.stop();
        assert_eq!(info.state(), TimerState::Idle);
        info.invalidate();
        info.stop();
        assert_eq!(info.state(), TimerState::Invalid);
    }
}
