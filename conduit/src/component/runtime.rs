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
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::config::CONFIG;
use crate::common::{ConduitConfig, Wait};
use crate::component::{Component, ComponentContext, DispatchItem, Dispatcher, Router};
use crate::message::MessageError;
use crate::thread::{Thread, ThreadCompletion, ThreadConsumer, ThreadRegistry};
use crate::timer::{TimerError, TimerManager};

/// Failures of the dispatcher runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A dispatcher thread did not start, or its components did not come up
    /// in time.
    #[error("dispatcher {0:?} failed to start")]
    DispatcherStart(String),
    /// No dispatcher with this name is running.
    #[error("no dispatcher named {0:?}")]
    UnknownDispatcher(String),
    /// The dispatcher was created without a timer service.
    #[error("no timer service available")]
    NoTimerService,
    /// The timer cannot be armed.
    #[error("timer {0:?} cannot be started")]
    TimerRejected(String),
    /// Threads that did not finish within the shutdown budget.
    #[error("threads abandoned during shutdown: {0:?}")]
    Abandoned(Vec<String>),
    /// The timer service failed.
    #[error(transparent)]
    Timer(#[from] TimerError),
    /// Routing failed.
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// The running framework: a timer thread plus dispatcher threads hosting
/// components, connected by one [`Router`].
pub struct Runtime {
    config: ConduitConfig,
    router: Router,
    registry: Arc<ThreadRegistry>,
    timers: TimerManager,
    timer_thread: Arc<Thread>,
    dispatchers: Mutex<Vec<Arc<Thread>>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("router", &self.router)
            .field("threads", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Launches with the process configuration.
    ///
    /// # Errors
    ///
    /// The timer thread failed to start.
    pub fn launch() -> Result<Self, RuntimeError> {
        Self::launch_with(CONFIG.clone())
    }

    /// Launches with `config`.
    ///
    /// Each runtime keeps its own thread registry, so several runtimes may
    /// coexist in one process.
    ///
    /// # Errors
    ///
    /// The timer thread failed to start.
    #[instrument(skip(config))]
    pub fn launch_with(config: ConduitConfig) -> Result<Self, RuntimeError> {
        let router = Router::new();
        let registry = Arc::new(ThreadRegistry::new());
        let (timers, timer_thread) = TimerManager::launch(
            router.clone(),
            Arc::clone(&registry),
            &config.timer.thread_name,
            config.timeouts.thread_start(),
        )?;
        trace!("runtime launched");
        Ok(Self {
            config,
            router,
            registry,
            timers,
            timer_thread,
            dispatchers: Mutex::new(Vec::new()),
        })
    }

    /// Starts dispatcher thread `name` hosting `components` and waits for
    /// their `startup` to return.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DispatcherStart`] if the thread did not start (for
    /// example because the name is taken) or the components did not come up
    /// within the configured start timeout.
    #[instrument(skip(self, components), fields(components = components.len()))]
    pub fn spawn_dispatcher(
        &self,
        name: &str,
        components: Vec<Box<dyn Component>>,
    ) -> Result<Arc<Thread>, RuntimeError> {
        let dispatcher = Arc::new(Dispatcher::new(
            name,
            self.router.clone(),
            Some(self.timers.clone()),
            components,
            self.config.limits.dispatcher_backlog_warning,
        ));
        let thread = Thread::with_registry(
            Arc::clone(&dispatcher) as Arc<dyn ThreadConsumer>,
            Some(name),
            Arc::clone(&self.registry),
        );
        let wait = self.config.timeouts.thread_start();
        if !thread.start(wait) {
            return Err(RuntimeError::DispatcherStart(name.to_string()));
        }
        if !dispatcher.wait_ready(wait) {
            error!("components did not start in time");
            thread.stop(Wait::DoNotWait);
            return Err(RuntimeError::DispatcherStart(name.to_string()));
        }
        self.dispatchers.lock().push(Arc::clone(&thread));
        debug!("dispatcher spawned");
        Ok(thread)
    }

    /// Runs `action` on dispatcher `dispatcher` in the context of the
    /// component playing `role`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownDispatcher`] if no such dispatcher is running.
    pub fn invoke<F>(&self, dispatcher: &str, role: &str, action: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut ComponentContext<'_>) + Send + 'static,
    {
        self.router
            .post(
                dispatcher,
                DispatchItem::Action {
                    role: role.to_string(),
                    action: Box::new(action),
                },
            )
            .map_err(|_| RuntimeError::UnknownDispatcher(dispatcher.to_string()))
    }

    /// Stops dispatcher `name`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownDispatcher`] if no such dispatcher is running.
    pub fn stop_dispatcher(&self, name: &str) -> Result<ThreadCompletion, RuntimeError> {
        let thread = {
            let mut dispatchers = self.dispatchers.lock();
            let index = dispatchers
                .iter()
                .position(|thread| thread.name() == name)
                .ok_or_else(|| RuntimeError::UnknownDispatcher(name.to_string()))?;
            dispatchers.remove(index)
        };
        Ok(thread.stop(self.config.timeouts.thread_stop()))
    }

    /// The router connecting the dispatchers.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Registry of this runtime's threads.
    #[must_use]
    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    /// The timer service.
    #[must_use]
    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    /// Stops every dispatcher, newest first, then the timer thread.
    ///
    /// Each thread gets the configured stop timeout, bounded by what is left
    /// of the overall shutdown budget.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Abandoned`] naming the threads that did not finish.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + self.config.timeouts.shutdown();
        let mut threads: Vec<Arc<Thread>> = self.dispatchers.lock().drain(..).rev().collect();
        threads.push(Arc::clone(&self.timer_thread));

        let mut abandoned = Vec::new();
        for thread in threads {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let wait = match self.config.timeouts.thread_stop() {
                Wait::For(limit) => Wait::For(limit.min(remaining)),
                Wait::Infinite => Wait::For(remaining),
                Wait::DoNotWait => Wait::DoNotWait,
            };
            if thread.stop(wait) == ThreadCompletion::Terminated {
                warn!(thread = thread.name(), "thread abandoned");
                abandoned.push(thread.name().to_string());
            }
        }
        if abandoned.is_empty() {
            trace!("runtime shut down");
            Ok(())
        } else {
            Err(RuntimeError::Abandoned(abandoned))
        }
    }
}
