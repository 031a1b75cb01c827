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
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit::prelude::*;
use conduit::thread::local_storage::{self, StorageValue};
use conduit::thread::{RegistrationState, INVALID_THREAD_NUMBER};

use crate::setup::initialize_tracing;

mod setup;

/// Runs until cancelled and records what it saw from inside its thread.
#[derive(Default)]
struct Observer {
    refuse: bool,
    saw_itself: AtomicBool,
    kept_storage: AtomicBool,
}

impl Observer {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }
}

impl ThreadConsumer for Observer {
    fn on_registered(&self, _info: &ThreadInfo) -> bool {
        !self.refuse
    }

    fn run(&self, cancel: &CancellationToken) {
        let me = self as *const Self as *const ();
        let bound = current_consumer().is_some_and(|c| Arc::as_ptr(&c) as *const () == me);
        self.saw_itself.store(bound, Ordering::SeqCst);

        let stored = local_storage::set("answer", StorageValue::U32(42)).is_ok()
            && local_storage::get_u32("answer").ok() == Some(42)
            && local_storage::get_u64("answer").is_err();
        self.kept_storage.store(stored, Ordering::SeqCst);

        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Ignores cancellation for a while.
struct Stubborn;

impl ThreadConsumer for Stubborn {
    fn run(&self, _cancel: &CancellationToken) {
        std::thread::sleep(Duration::from_millis(300));
    }
}

/// Ignores cancellation on its first run only; later runs stop when asked.
#[derive(Default)]
struct SlowFirstRun {
    runs: AtomicU32,
}

impl ThreadConsumer for SlowFirstRun {
    fn run(&self, cancel: &CancellationToken) {
        if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(200));
            return;
        }
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Finishes on its own.
struct OneShot;

impl ThreadConsumer for OneShot {
    fn run(&self, _cancel: &CancellationToken) {}

    fn exit(&self) -> ExitCode {
        ExitCode::NoParam
    }
}

struct Panicking;

impl ThreadConsumer for Panicking {
    fn run(&self, _cancel: &CancellationToken) {
        panic!("consumer failure");
    }
}

fn spawn(
    consumer: Arc<dyn ThreadConsumer>,
    name: &str,
    registry: &Arc<ThreadRegistry>,
) -> Arc<Thread> {
    Thread::with_registry(consumer, Some(name), Arc::clone(registry))
}

/// Tests a full start/stop cycle.
///
/// **Verification:**
/// - The thread is reachable by handle, name and number while started, and
///   by none of them afterwards.
/// - Inside `run()` the bound consumer is the thread's own consumer and the
///   thread-local storage is usable.
/// - A second start fails, a second stop reports `Invalid`.
#[test]
fn test_thread_lifecycle() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let observer = Arc::new(Observer::default());
    let thread = spawn(Arc::clone(&observer) as Arc<dyn ThreadConsumer>, "observer_thread", &registry);

    assert!(!thread.is_valid());
    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Invalid);

    assert!(thread.start(Wait::Infinite));
    assert!(thread.is_valid());
    assert!(thread.is_running());
    assert!(!thread.start(Wait::Infinite));
    assert_eq!(thread.registration_state(), RegistrationState::Registered);

    let number = thread.number();
    assert_ne!(number, INVALID_THREAD_NUMBER);
    let handle = thread.native_id().ok_or_else(|| anyhow::anyhow!("no native id"))?;
    assert!(registry.find_by_name("observer_thread").is_some_and(|t| Arc::ptr_eq(&t, &thread)));
    assert!(registry.find_by_number(number).is_some_and(|t| Arc::ptr_eq(&t, &thread)));
    assert!(registry.find_by_handle(handle).is_some_and(|t| Arc::ptr_eq(&t, &thread)));
    assert_eq!(registry.len(), 1);

    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
    assert!(observer.saw_itself.load(Ordering::SeqCst));
    assert!(observer.kept_storage.load(Ordering::SeqCst));
    assert_eq!(thread.exit_code(), ExitCode::Completed);
    assert!(!thread.is_running());
    assert!(!thread.is_valid());
    assert!(registry.find_by_number(number).is_none());
    assert!(registry.find_by_name("observer_thread").is_none());
    assert!(registry.is_empty());
    assert_eq!(thread.registration_state(), RegistrationState::Destroyed);

    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Invalid);
    Ok(())
}

/// Tests that a stopped thread can be started again under a new number.
#[test]
fn test_thread_restart() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let thread = spawn(Arc::new(Observer::default()), "restart_thread", &registry);

    assert!(thread.start(Wait::Infinite));
    let first = thread.number();
    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);

    assert!(thread.start(Wait::Infinite));
    assert_ne!(thread.number(), first);
    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
    Ok(())
}

/// Tests that a consumer refusing registration makes `start` fail and
/// leaves nothing registered.
#[test]
fn test_refused_registration() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let observer = Arc::new(Observer::refusing());
    let thread = spawn(Arc::clone(&observer) as Arc<dyn ThreadConsumer>, "refused_thread", &registry);

    assert!(!thread.start(Wait::Infinite));
    assert!(!thread.is_valid());
    assert!(registry.is_empty());
    assert_eq!(thread.registration_state(), RegistrationState::RegistrationFailed);
    assert_eq!(thread.exit_code(), ExitCode::Error);
    assert!(!observer.saw_itself.load(Ordering::SeqCst));
    Ok(())
}

/// Tests that two live threads cannot share a name.
#[test]
fn test_duplicate_names_are_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let first = spawn(Arc::new(Observer::default()), "twin", &registry);
    let second = spawn(Arc::new(Observer::default()), "twin", &registry);

    assert!(first.start(Wait::Infinite));
    assert!(!second.start(Wait::Infinite));
    assert_eq!(registry.len(), 1);

    first.stop(Wait::Infinite);
    assert!(second.start(Wait::Infinite));
    second.stop(Wait::Infinite);
    Ok(())
}

/// Tests that a bounded stop abandons a thread that does not finish in time.
#[test]
fn test_stop_timeout_terminates() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let thread = spawn(Arc::new(Stubborn), "stubborn_thread", &registry);

    assert!(thread.start(Wait::Infinite));
    assert_eq!(
        thread.stop(Wait::For(Duration::from_millis(20))),
        ThreadCompletion::Terminated
    );
    assert!(registry.is_empty());
    assert!(!thread.is_valid());
    Ok(())
}

/// Tests a restart after a bounded stop abandoned the previous body.
///
/// **Verification:**
/// - When the abandoned body finally ends it does not mark the new run as
///   finished: the new run is still running and cannot be joined.
/// - Stopping the new run waits for the new body, not the old one.
#[test]
fn test_restart_after_abandoned_stop() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let consumer = Arc::new(SlowFirstRun::default());
    let thread = spawn(
        Arc::clone(&consumer) as Arc<dyn ThreadConsumer>,
        "restarted_after_abandon",
        &registry,
    );

    assert!(thread.start(Wait::Infinite));
    assert_eq!(
        thread.stop(Wait::For(Duration::from_millis(20))),
        ThreadCompletion::Terminated
    );

    assert!(thread.start(Wait::Infinite));
    std::thread::sleep(Duration::from_millis(400));

    assert_eq!(consumer.runs.load(Ordering::SeqCst), 2);
    assert!(thread.is_running());
    assert_eq!(thread.exit_code(), ExitCode::Undefined);
    assert!(!thread.join(Wait::For(Duration::from_millis(10))));

    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
    assert!(!thread.is_running());
    assert_eq!(thread.exit_code(), ExitCode::Completed);
    Ok(())
}

/// Tests `join` on a consumer that returns by itself, and its exit code.
#[test]
fn test_join_finished_thread() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let thread = spawn(Arc::new(OneShot), "one_shot_thread", &registry);

    assert!(thread.join(Wait::Infinite));
    assert!(thread.start(Wait::Infinite));
    assert!(thread.join(Wait::For(Duration::from_secs(5))));
    assert_eq!(thread.exit_code(), ExitCode::NoParam);
    assert!(!thread.is_running());
    assert!(thread.is_valid());
    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
    Ok(())
}

/// Tests that a panic in `run()` is contained and reported as an error.
#[test]
fn test_panicking_consumer() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let thread = spawn(Arc::new(Panicking), "panicking_thread", &registry);

    assert!(thread.start(Wait::Infinite));
    assert!(thread.join(Wait::For(Duration::from_secs(5))));
    assert_eq!(thread.exit_code(), ExitCode::Error);
    assert_eq!(thread.stop(Wait::Infinite), ThreadCompletion::Completed);
    Ok(())
}

/// Tests priority bookkeeping.
#[test]
fn test_priority() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = Arc::new(ThreadRegistry::new());
    let thread = spawn(Arc::new(Observer::default()), "priority_thread", &registry);

    assert_eq!(thread.set_priority(ThreadPriority::High), ThreadPriority::Undefined);
    assert!(thread.start(Wait::Infinite));
    assert_eq!(thread.priority(), ThreadPriority::Normal);
    assert_eq!(thread.set_priority(ThreadPriority::Low), ThreadPriority::Normal);
    thread.stop(Wait::Infinite);
    assert_eq!(thread.priority(), ThreadPriority::Undefined);
    Ok(())
}

/// Tests that thread-local storage is only reachable from consumer threads.
#[test]
fn test_storage_outside_consumer_thread() {
    assert!(!local_storage::is_available());
    assert!(current_consumer().is_none());
    assert!(local_storage::set("key", StorageValue::U32(1)).is_err());
    assert!(local_storage::get("key").is_none());
}
