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

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{TimerId, Wait};
use crate::component::{DispatchItem, Router};
use crate::thread::{ExitCode, Thread, ThreadConsumer, ThreadRegistry};
use crate::timer::{
    join_time, split_time, utc_now_micros, ExpiredTimerInfo, ExpiredTimers, Timer, TimerEvent,
    TimerInfo, TimerState, TimerTable,
};

const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Failures of the timer service.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The timer thread did not start.
    #[error("timer thread {0:?} failed to start")]
    ThreadStart(String),
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    timer: TimerId,
    handle: u64,
    at: Instant,
}

struct TimerShared {
    table: TimerTable,
    expired: ExpiredTimers,
    router: Router,
    next_handle: AtomicU64,
}

/// Handle to the process's timer thread.
///
/// Started timers are armed on a dedicated thread; each firing is delivered
/// to the timer's dispatcher as a [`TimerEvent`]. Cheap to clone.
#[derive(Clone)]
pub struct TimerManager {
    shared: Arc<TimerShared>,
    commands: UnboundedSender<Deadline>,
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("timers", &self.shared.table.len())
            .field("expired", &self.shared.expired.len())
            .finish()
    }
}

impl TimerManager {
    /// Starts the timer thread `name` in `registry`, delivering through
    /// `router`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ThreadStart`] if the thread could not be started.
    #[instrument(skip(router, registry))]
    pub fn launch(
        router: Router,
        registry: Arc<ThreadRegistry>,
        name: &str,
        wait: Wait,
    ) -> Result<(Self, Arc<Thread>), TimerError> {
        let (commands, receiver) = unbounded_channel();
        let shared = Arc::new(TimerShared {
            table: TimerTable::new(),
            expired: ExpiredTimers::new(),
            router,
            next_handle: AtomicU64::new(1),
        });
        let consumer = Arc::new(TimerThread {
            shared: Arc::clone(&shared),
            commands: Mutex::new(Some(receiver)),
            failed: AtomicBool::new(false),
        });
        let thread = Thread::with_registry(consumer, Some(name), registry);
        if !thread.start(wait) {
            return Err(TimerError::ThreadStart(name.to_string()));
        }
        debug!("timer thread started");
        Ok((Self { shared, commands }, thread))
    }

    /// Starts (or restarts) `timer`.
    ///
    /// Returns `false` if the timer cannot be armed or the timer thread is
    /// gone. A restart discards firings of the previous start.
    pub fn start_timer(&self, timer: &Arc<Timer>) -> bool {
        timer.activate();
        let handle = self.shared.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut info = TimerInfo::new(Arc::clone(timer), timer.id(), handle, timer.dispatcher());
        if !info.can_start(utc_now_micros()) {
            timer.deactivate();
            return false;
        }
        self.shared.table.insert(info);

        let deadline = Deadline {
            timer: timer.id(),
            handle,
            at: Instant::now() + timer.timeout(),
        };
        if self.commands.send(deadline).is_err() {
            warn!(timer = timer.name(), "timer thread is gone");
            self.shared.table.remove(timer.id());
            timer.deactivate();
            return false;
        }
        trace!(timer = timer.name(), handle, "timer started");
        true
    }

    /// Stops `timer`. Returns `false` if it was not started.
    pub fn stop_timer(&self, timer: TimerId) -> bool {
        match self.shared.table.remove(timer) {
            Some(info) => {
                info.timer().deactivate();
                trace!(timer, "timer stopped");
                true
            }
            None => false,
        }
    }

    /// Whether `timer` is armed or has fired and will fire again.
    #[must_use]
    pub fn is_active(&self, timer: TimerId) -> bool {
        matches!(
            self.shared.table.state(timer),
            TimerState::Pending | TimerState::Expired
        )
    }

    /// Started timers.
    #[must_use]
    pub fn table(&self) -> &TimerTable {
        &self.shared.table
    }
}

enum Firing {
    Stale,
    Ignored,
    Fired {
        event: TimerEvent,
        dispatcher: String,
        again: Option<Duration>,
    },
}

impl TimerShared {
    async fn run(&self, commands: &mut UnboundedReceiver<Deadline>, cancel: &CancellationToken) {
        let mut schedule: BinaryHeap<Reverse<(Instant, TimerId, u64)>> = BinaryHeap::new();
        loop {
            let next = schedule
                .peek()
                .map_or_else(|| Instant::now() + IDLE_TICK, |Reverse((at, _, _))| *at);
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(deadline) => schedule.push(Reverse((deadline.at, deadline.timer, deadline.handle))),
                    None => break,
                },
                () = tokio::time::sleep_until(next.into()) => {
                    let now = Instant::now();
                    while let Some(Reverse((at, timer, handle))) = schedule.peek().copied() {
                        if at > now {
                            break;
                        }
                        schedule.pop();
                        let (high, low) = split_time(utc_now_micros());
                        self.expired.push(ExpiredTimerInfo::new(timer, handle, high, low));
                    }
                    for deadline in self.process_expired() {
                        schedule.push(Reverse((deadline.at, deadline.timer, deadline.handle)));
                    }
                }
            }
        }
        trace!(pending = schedule.len(), "timer loop finished");
    }

    /// Turns queued firings into timer events. Returns the deadlines of
    /// timers that fire again.
    fn process_expired(&self) -> Vec<Deadline> {
        let mut rescheduled = Vec::new();
        for expired in self.expired.drain() {
            let firing = self
                .table
                .update(expired.timer, |info| fire(info, expired))
                .unwrap_or(Firing::Stale);
            match firing {
                Firing::Stale => trace!(timer = expired.timer, "stale firing dropped"),
                Firing::Ignored => trace!(timer = expired.timer, "firing ignored"),
                Firing::Fired {
                    event,
                    dispatcher,
                    again,
                } => {
                    let timer = event.timer;
                    // A final firing retires the timer before its event is
                    // visible to the dispatcher.
                    if again.is_none() {
                        self.retire(timer);
                    }
                    if let Err(e) = self.router.post(&dispatcher, DispatchItem::Timer(event)) {
                        warn!(error = %e, timer, "timer event undeliverable; stopping timer");
                        self.retire(timer);
                        continue;
                    }
                    if let Some(timeout) = again {
                        rescheduled.push(Deadline {
                            timer,
                            handle: expired.handle,
                            at: Instant::now() + timeout,
                        });
                    }
                }
            }
        }
        rescheduled
    }

    fn retire(&self, timer: TimerId) {
        if let Some(info) = self.table.remove(timer) {
            info.timer().deactivate();
        }
    }
}

fn fire(info: &mut TimerInfo, expired: ExpiredTimerInfo) -> Firing {
    if info.handle() != expired.handle {
        return Firing::Stale;
    }
    if !info.on_expire(expired.high, expired.low) {
        return Firing::Ignored;
    }
    let timer = Arc::clone(info.timer());
    let event = TimerEvent::new(
        timer.id(),
        timer.name().to_string(),
        timer.consumer(),
        join_time(expired.high, expired.low),
        timer.fired_count(),
    );
    let again = info.rearm().then(|| timer.timeout());
    Firing::Fired {
        event,
        dispatcher: info.dispatcher().to_string(),
        again,
    }
}

struct TimerThread {
    shared: Arc<TimerShared>,
    commands: Mutex<Option<UnboundedReceiver<Deadline>>>,
    failed: AtomicBool,
}

impl ThreadConsumer for TimerThread {
    fn run(&self, cancel: &CancellationToken) {
        let Some(mut commands) = self.commands.lock().take() else {
            error!("timer thread started twice");
            self.failed.store(true, Ordering::Release);
            return;
        };
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "cannot build timer runtime");
                self.failed.store(true, Ordering::Release);
                return;
            }
        };
        runtime.block_on(self.shared.run(&mut commands, cancel));
    }

    fn exit(&self) -> ExitCode {
        if self.failed.load(Ordering::Acquire) {
            ExitCode::Error
        } else {
            ExitCode::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::thread::ThreadCompletion;

    fn recv_timer(rx: &mut UnboundedReceiver<DispatchItem>) -> TimerEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match rx.try_recv() {
                Ok(DispatchItem::Timer(event)) => return event,
                Ok(other) => panic!("unexpected item {other:?}"),
                Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(2)),
                Err(e) => panic!("no timer event: {e}"),
            }
        }
    }

    #[test]
    fn counted_timer_fires_its_events_in_order() {
        let router = Router::new();
        let (tx, mut rx) = unbounded_channel();
        router.register_dispatcher("timer_test_dispatcher", tx).unwrap();
        let registry = Arc::new(ThreadRegistry::new());
        let (manager, thread) =
            TimerManager::launch(router, registry, "timer_test_thread", Wait::Infinite).unwrap();

        let timer = Timer::new("tick", Duration::from_millis(5), 3, "timer_test_dispatcher", 4);
        assert!(manager.start_timer(&timer));

        let mut last = 0;
        for count in 1..=3 {
            let event = recv_timer(&mut rx);
            assert_eq!(event.fire_count, count);
            assert_eq!(event.consumer, 4);
            assert!(event.fired_at >= last);
            last = event.fired_at;
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        assert!(!manager.is_active(timer.id()));
        assert!(!timer.is_active());

        assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
        assert_eq!(thread.exit_code(), ExitCode::Completed);
    }

    #[test]
    fn stopped_timer_does_not_fire() {
        let router = Router::new();
        let (tx, mut rx) = unbounded_channel();
        router.register_dispatcher("stop_test_dispatcher", tx).unwrap();
        let (manager, thread) = TimerManager::launch(
            router,
            Arc::new(ThreadRegistry::new()),
            "stop_test_thread",
            Wait::Infinite,
        )
        .unwrap();

        let timer = Timer::new("late", Duration::from_millis(50), 1, "stop_test_dispatcher", 1);
        assert!(manager.start_timer(&timer));
        assert!(manager.is_active(timer.id()));
        assert!(manager.stop_timer(timer.id()));
        assert!(!manager.stop_timer(timer.id()));

        std::thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
        thread.stop(Wait::Infinite);
    }
}
