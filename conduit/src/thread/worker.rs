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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{Process, SyncEvent, ThreadNumber, Wait};
use crate::thread::local_storage::{self, LocalStorageScope};
use crate::thread::{
    native, ExitCode, RegistrationState, ThreadCompletion, ThreadConsumer, ThreadInfo,
    ThreadPriority, ThreadRegistry,
};

static NEXT_THREAD_NUMBER: AtomicU64 = AtomicU64::new(1);
static NEXT_AUTO_NAME: AtomicU32 = AtomicU32::new(1);

/// Invalid thread number.
pub const INVALID_THREAD_NUMBER: ThreadNumber = 0;

/// A named OS thread driving a [`ThreadConsumer`].
///
/// A `Thread` is created unstarted and is always handled through an `Arc`.
/// [`start`](Self::start) spawns the OS thread, enters it into its
/// [`ThreadRegistry`] under its handle, name and number, and asks the consumer
/// to accept the registration. [`stop`](Self::stop) removes it from the
/// registry, cancels the consumer's token and waits for the body to finish.
///
/// The thread is *valid* while an OS thread is attached, which is not the same
/// as *running*: running covers only the consumer's `run()`.
///
/// Stopping is cooperative. The consumer's `run()` receives a
/// [`CancellationToken`] that is cancelled on `stop`. When a bounded stop times
/// out the OS thread is detached and abandoned, still holding whatever it
/// holds, and `stop` reports [`ThreadCompletion::Terminated`].
pub struct Thread {
    name: String,
    consumer: Arc<dyn ThreadConsumer>,
    registry: Arc<ThreadRegistry>,
    this: Weak<Thread>,
    inner: Mutex<ThreadInner>,
}

#[derive(Default)]
struct ThreadInner {
    handle: Option<JoinHandle<()>>,
    native_id: Option<std::thread::ThreadId>,
    number: ThreadNumber,
    priority: ThreadPriority,
    cancel: CancellationToken,
    run: Arc<ThreadShared>,
}

/// State shared with one body. Every start gets its own, so an abandoned body
/// never signals a later run.
struct ThreadShared {
    running: Mutex<bool>,
    state: Mutex<RegistrationState>,
    exit_code: Mutex<ExitCode>,
    wait_for_run: SyncEvent,
    wait_for_exit: SyncEvent,
    resume: SyncEvent,
}

impl Default for ThreadShared {
    fn default() -> Self {
        Self {
            running: Mutex::new(false),
            state: Mutex::new(RegistrationState::Created),
            exit_code: Mutex::new(ExitCode::Undefined),
            wait_for_run: SyncEvent::manual_reset(false),
            wait_for_exit: SyncEvent::manual_reset(false),
            resume: SyncEvent::manual_reset(false),
        }
    }
}

impl ThreadShared {
    fn transition(&self, next: RegistrationState) {
        let mut state = self.state.lock();
        if !state.can_transition(next) {
            debug!(from = ?*state, to = ?next, "unexpected registration transition");
        }
        *state = next;
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("number", &self.number())
            .field("state", &self.registration_state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Thread {
    /// Creates an unstarted thread in the process-wide registry.
    ///
    /// Without a name, one is generated from the process name and a sequence
    /// number.
    pub fn new(consumer: Arc<dyn ThreadConsumer>, name: Option<&str>) -> Arc<Self> {
        Self::with_registry(consumer, name, ThreadRegistry::global())
    }

    /// Creates an unstarted thread that registers in `registry`.
    pub fn with_registry(
        consumer: Arc<dyn ThreadConsumer>,
        name: Option<&str>,
        registry: Arc<ThreadRegistry>,
    ) -> Arc<Self> {
        let name = match name {
            Some(name) if !name.is_empty() => native::sanitize_name(name),
            _ => format!(
                "{}_thread_{:03}",
                Process::current().name(),
                NEXT_AUTO_NAME.fetch_add(1, Ordering::Relaxed)
            ),
        };
        Arc::new_cyclic(|this| Self {
            name,
            consumer,
            registry,
            this: Weak::clone(this),
            inner: Mutex::new(ThreadInner::default()),
        })
    }

    /// The thread registered for the calling OS thread in `registry`.
    #[must_use]
    pub fn current(registry: &ThreadRegistry) -> Option<Arc<Self>> {
        registry.find_by_handle(std::thread::current().id())
    }

    /// Spawns and registers the OS thread, then waits up to `wait` for the
    /// consumer's `run()` to begin.
    ///
    /// Returns `false` if the thread is already valid, the OS refused to spawn,
    /// a registry key was taken, or the consumer refused registration. A wait
    /// that times out is logged; the thread stays started and `true` is
    /// returned.
    ///
    /// `on_registered` is called on the calling thread while the thread's lock
    /// is held, so it must not call back into this `Thread`.
    #[instrument(skip(self), fields(thread = %self.name))]
    pub fn start(&self, wait: Wait) -> bool {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            warn!("thread is already started");
            return false;
        }

        let run = Arc::new(ThreadShared::default());
        inner.run = Arc::clone(&run);

        let cancel = CancellationToken::new();
        let number = NEXT_THREAD_NUMBER.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&run);
        let consumer = Arc::clone(&self.consumer);
        let body_cancel = cancel.clone();

        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || thread_entry(&shared, consumer, &body_cancel));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "failed to spawn OS thread");
                return false;
            }
        };
        let native_id = handle.thread().id();

        run.transition(RegistrationState::Registering);
        if let Err(e) = self.registry.register(native_id, &self.name, number, &self.this) {
            error!(error = %e, "thread registration failed");
            Self::roll_back(&run, handle);
            return false;
        }

        let info = ThreadInfo {
            name: self.name.clone(),
            number,
            handle: native_id,
        };
        if !self.consumer.on_registered(&info) {
            warn!("consumer refused registration");
            self.registry.unregister(native_id, &self.name, number);
            Self::roll_back(&run, handle);
            return false;
        }

        run.transition(RegistrationState::Registered);
        inner.handle = Some(handle);
        inner.native_id = Some(native_id);
        inner.number = number;
        inner.priority = ThreadPriority::Normal;
        inner.cancel = cancel;
        run.resume.set();
        drop(inner);

        if wait.is_no_wait() {
            std::thread::yield_now();
        } else if !run.wait_for_run.wait(wait) {
            warn!(?wait, "thread did not begin running in time");
        }
        trace!(number, "thread started");
        true
    }

    fn roll_back(run: &ThreadShared, handle: JoinHandle<()>) {
        run.transition(RegistrationState::RegistrationFailed);
        run.resume.set();
        if handle.join().is_err() {
            error!("thread body panicked during registration rollback");
        }
    }

    /// Unregisters the thread, cancels its consumer and waits up to `wait`
    /// for it to finish.
    ///
    /// Returns [`ThreadCompletion::Invalid`] when nothing is started,
    /// [`ThreadCompletion::Completed`] when the body finished in time or
    /// `wait` is [`Wait::DoNotWait`], and [`ThreadCompletion::Terminated`]
    /// when the wait timed out and the OS thread was abandoned.
    ///
    /// Called from the thread itself, the wait is skipped.
    #[instrument(skip(self), fields(thread = %self.name))]
    pub fn stop(&self, wait: Wait) -> ThreadCompletion {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle.take() else {
            return ThreadCompletion::Invalid;
        };
        let native_id = inner.native_id.take();
        let number = std::mem::replace(&mut inner.number, INVALID_THREAD_NUMBER);
        inner.priority = ThreadPriority::Undefined;

        self.consumer.on_unregistering();
        if let Some(native_id) = native_id {
            self.registry.unregister(native_id, &self.name, number);
        }
        let run = Arc::clone(&inner.run);
        run.transition(RegistrationState::Destroyed);
        inner.cancel.cancel();
        drop(inner);

        let on_itself = native_id == Some(std::thread::current().id());
        let wait = if on_itself { Wait::DoNotWait } else { wait };

        if wait.is_no_wait() {
            trace!(number, "thread stop requested without waiting");
            return ThreadCompletion::Completed;
        }
        if run.wait_for_exit.wait(wait) {
            if handle.join().is_err() {
                error!("thread body panicked after signalling exit");
            }
            trace!(number, "thread completed");
            ThreadCompletion::Completed
        } else {
            warn!(number, ?wait, "thread did not finish in time; abandoning it");
            ThreadCompletion::Terminated
        }
    }

    /// Waits up to `wait` for the thread to finish, without stopping it.
    ///
    /// Returns `true` if nothing is started, the body has finished or finishes
    /// in time, or `wait` is [`Wait::DoNotWait`].
    pub fn join(&self, wait: Wait) -> bool {
        let run = {
            let inner = self.inner.lock();
            if wait.is_no_wait() || inner.handle.is_none() {
                return true;
            }
            if inner.native_id == Some(std::thread::current().id()) {
                return false;
            }
            Arc::clone(&inner.run)
        };
        run.wait_for_exit.wait(wait)
    }

    /// Changes the scheduling priority. Returns the previous priority, or
    /// [`ThreadPriority::Undefined`] when the thread is not valid.
    ///
    /// Where the platform refuses the change the stored priority is kept.
    pub fn set_priority(&self, priority: ThreadPriority) -> ThreadPriority {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle.as_ref() else {
            return ThreadPriority::Undefined;
        };
        let previous = inner.priority;
        if native::apply_priority(handle, priority) {
            inner.priority = priority;
        } else {
            debug!(thread = %self.name, ?priority, "priority change not applied");
        }
        previous
    }

    /// Current priority, [`ThreadPriority::Undefined`] when not valid.
    #[must_use]
    pub fn priority(&self) -> ThreadPriority {
        self.inner.lock().priority
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number, or [`INVALID_THREAD_NUMBER`] when not valid.
    #[must_use]
    pub fn number(&self) -> ThreadNumber {
        self.inner.lock().number
    }

    /// Native handle of the attached OS thread.
    #[must_use]
    pub fn native_id(&self) -> Option<std::thread::ThreadId> {
        self.inner.lock().native_id
    }

    /// Whether an OS thread is attached.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let inner = self.inner.lock();
        inner.handle.is_some() && inner.number != INVALID_THREAD_NUMBER
    }

    fn current_run(&self) -> Arc<ThreadShared> {
        Arc::clone(&self.inner.lock().run)
    }

    /// Whether the consumer's `run()` of the latest start is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.current_run().running.lock()
    }

    /// Exit code of the latest start, [`ExitCode::Undefined`] until its body
    /// finishes.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        *self.current_run().exit_code.lock()
    }

    /// Registration lifecycle state of the latest start.
    #[must_use]
    pub fn registration_state(&self) -> RegistrationState {
        *self.current_run().state.lock()
    }

    /// The bound consumer.
    #[must_use]
    pub fn consumer(&self) -> &Arc<dyn ThreadConsumer> {
        &self.consumer
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.inner.get_mut().handle.is_some() {
            debug!(thread = %self.name, "dropping a started thread; stopping it");
            self.stop(Wait::DoNotWait);
        }
    }
}

fn thread_entry(shared: &ThreadShared, consumer: Arc<dyn ThreadConsumer>, cancel: &CancellationToken) {
    shared.resume.wait(Wait::Infinite);
    let registered = *shared.state.lock() == RegistrationState::Registered;

    let exit_code = {
        let _storage = LocalStorageScope::create();
        local_storage::bind_consumer(Arc::clone(&consumer));
        *shared.running.lock() = true;
        shared.wait_for_run.set();

        let code = if registered {
            let ran = catch_unwind(AssertUnwindSafe(|| consumer.run(cancel)));
            *shared.running.lock() = false;
            let exit = catch_unwind(AssertUnwindSafe(|| consumer.exit()));
            match (ran, exit) {
                (Ok(()), Ok(code)) => code,
                (Err(_), _) => {
                    error!("consumer run() panicked");
                    ExitCode::Error
                }
                (Ok(()), Err(_)) => {
                    error!("consumer exit() panicked");
                    ExitCode::Error
                }
            }
        } else {
            *shared.running.lock() = false;
            ExitCode::Error
        };

        local_storage::unbind_consumer();
        code
    };

    *shared.exit_code.lock() = exit_code;
    shared.wait_for_exit.set();
    std::thread::yield_now();
}
