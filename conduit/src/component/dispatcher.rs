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

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{ComponentId, ProxyId, SyncEvent, TimerId, Wait};
use crate::component::{Component, ComponentContext, DispatchItem, Router};
use crate::message::{NotificationEvent, RequestEvent, ResponseEvent, ServiceKey};
use crate::service::{Proxy, ServiceFault, Stub};
use crate::thread::{ExitCode, ThreadConsumer, ThreadInfo};
use crate::timer::{Timer, TimerControl, TimerEvent, TimerManager};

/// Everything a dispatcher owns besides its components.
pub(crate) struct DispatcherState {
    pub(crate) name: String,
    pub(crate) router: Router,
    pub(crate) timers: Option<TimerManager>,
    pub(crate) stubs: HashMap<ServiceKey, HostedStub>,
    pub(crate) proxies: HashMap<ProxyId, Proxy>,
    pub(crate) proxy_index: HashMap<ServiceKey, ProxyId>,
    pub(crate) next_proxy: ProxyId,
    pub(crate) timers_owned: HashMap<TimerId, Arc<Timer>>,
}

pub(crate) struct HostedStub {
    pub(crate) owner: ComponentId,
    pub(crate) stub: Stub,
}

struct Slot {
    id: ComponentId,
    role: String,
    component: Box<dyn Component>,
}

impl Slot {
    fn context<'a>(&'a mut self, state: &'a mut DispatcherState) -> (&'a mut dyn Component, ComponentContext<'a>) {
        (self.component.as_mut(), ComponentContext::new(self.id, &self.role, state))
    }
}

/// A thread consumer running an event loop for a set of components.
///
/// Requests, responses, notifications, timer events and actions addressed to
/// the dispatcher are queued and handled one at a time on its thread, so
/// components, stubs and proxies never need locking.
pub struct Dispatcher {
    name: String,
    router: Router,
    timers: Option<TimerManager>,
    backlog_warning: usize,
    sender: UnboundedSender<DispatchItem>,
    receiver: Mutex<Option<UnboundedReceiver<DispatchItem>>>,
    components: Mutex<Option<Vec<Box<dyn Component>>>>,
    ready: SyncEvent,
    failed: AtomicBool,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("ready", &self.ready.is_signaled())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher named `name` hosting `components`.
    ///
    /// Warns once the queue holds more than `backlog_warning` items.
    pub fn new(
        name: impl Into<String>,
        router: Router,
        timers: Option<TimerManager>,
        components: Vec<Box<dyn Component>>,
        backlog_warning: usize,
    ) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            name: name.into(),
            router,
            timers,
            backlog_warning,
            sender,
            receiver: Mutex::new(Some(receiver)),
            components: Mutex::new(Some(components)),
            ready: SyncEvent::manual_reset(false),
            failed: AtomicBool::new(false),
        }
    }

    /// Dispatcher name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits up to `wait` for every component's `startup` to return.
    pub fn wait_ready(&self, wait: Wait) -> bool {
        self.ready.wait(wait)
    }

    fn handle_request(slots: &mut [Slot], state: &mut DispatcherState, event: &RequestEvent) {
        let key = &event.target.key;
        let Some(hosted) = state.stubs.get_mut(key) else {
            debug!(stub = %event.target, "no such stub here");
            state.router.bounce(event);
            return;
        };
        let owner = hosted.owner;
        let Some(call) = hosted.stub.begin_request(event) else {
            return;
        };

        let outcome = match slots.iter_mut().find(|slot| slot.id == owner) {
            Some(slot) => {
                let (component, mut ctx) = slot.context(state);
                component.process_request(&mut ctx, &call)
            }
            None => Err(ServiceFault::Failed(format!("component {owner} is gone"))),
        };
        if let Some(hosted) = state.stubs.get_mut(key) {
            hosted.stub.finish_request(&call, outcome);
        }
    }

    fn handle_response(slots: &mut [Slot], state: &mut DispatcherState, event: &ResponseEvent) {
        let Some(proxy) = state.proxies.get_mut(&event.target.proxy) else {
            debug!(proxy = event.target.proxy, message = %event.message_id, "response for an unknown proxy");
            return;
        };
        for notification in proxy.process_response(event) {
            Self::notify(slots, state, &notification);
        }
    }

    fn notify(slots: &mut [Slot], state: &mut DispatcherState, event: &NotificationEvent) {
        match slots.iter_mut().find(|slot| slot.id == event.consumer) {
            Some(slot) => {
                let (component, mut ctx) = slot.context(state);
                component.on_notification(&mut ctx, event);
            }
            None => trace!(consumer = event.consumer, "notification for an unknown component"),
        }
    }

    fn handle_timer(slots: &mut [Slot], state: &mut DispatcherState, event: &TimerEvent) {
        let Some(timer) = state.timers_owned.get(&event.timer).cloned() else {
            trace!(timer = event.timer, "event of a stopped timer dropped");
            return;
        };
        if !timer.is_still_active() {
            state.timers_owned.remove(&event.timer);
        }
        match slots.iter_mut().find(|slot| slot.id == event.consumer) {
            Some(slot) => {
                let (component, mut ctx) = slot.context(state);
                component.on_timer(&mut ctx, event);
            }
            None => trace!(consumer = event.consumer, "timer event for an unknown component"),
        }
    }

    fn shut_down(&self, slots: &mut [Slot], state: &mut DispatcherState) {
        for slot in slots.iter_mut() {
            let (component, mut ctx) = slot.context(state);
            component.shutdown(&mut ctx);
        }
        for (key, mut hosted) in state.stubs.drain() {
            self.router.unregister_service(&key);
            hosted.stub.close();
        }
        for proxy in state.proxies.values_mut() {
            proxy.disconnect();
        }
        if let Some(manager) = &state.timers {
            for timer in state.timers_owned.keys() {
                manager.stop_timer(*timer);
            }
        }
        state.timers_owned.clear();
        self.router.unregister_dispatcher(&self.name);
    }
}

impl ThreadConsumer for Dispatcher {
    fn on_registered(&self, info: &ThreadInfo) -> bool {
        match self.router.register_dispatcher(&self.name, self.sender.clone()) {
            Ok(()) => {
                trace!(thread = %info.name, number = info.number, "dispatcher registered");
                true
            }
            Err(e) => {
                error!(error = %e, "dispatcher cannot be routed");
                false
            }
        }
    }

    #[instrument(skip(self, cancel), fields(dispatcher = %self.name))]
    fn run(&self, cancel: &CancellationToken) {
        let (Some(mut receiver), Some(components)) =
            (self.receiver.lock().take(), self.components.lock().take())
        else {
            error!("dispatcher started twice");
            self.failed.store(true, Ordering::Release);
            return;
        };

        let mut roles = HashSet::new();
        let mut slots: Vec<Slot> = Vec::with_capacity(components.len());
        for (index, component) in components.into_iter().enumerate() {
            let role = component.role().to_string();
            if !roles.insert(role.clone()) {
                warn!(%role, "role hosted twice in one dispatcher");
            }
            slots.push(Slot {
                id: ComponentId::try_from(index + 1).unwrap_or(ComponentId::MAX),
                role,
                component,
            });
        }

        let mut state = DispatcherState {
            name: self.name.clone(),
            router: self.router.clone(),
            timers: self.timers.clone(),
            stubs: HashMap::new(),
            proxies: HashMap::new(),
            proxy_index: HashMap::new(),
            next_proxy: 0,
            timers_owned: HashMap::new(),
        };

        for slot in &mut slots {
            let (component, mut ctx) = slot.context(&mut state);
            component.startup(&mut ctx);
        }
        self.ready.set();
        debug!(components = slots.len(), "dispatcher running");

        while !cancel.is_cancelled() {
            let Some(item) = receiver.blocking_recv() else {
                break;
            };
            let backlog = receiver.len();
            if backlog > self.backlog_warning {
                warn!(backlog, "dispatcher queue is backing up");
            }
            match item {
                DispatchItem::Request(event) => Self::handle_request(&mut slots, &mut state, &event),
                DispatchItem::Response(event) => Self::handle_response(&mut slots, &mut state, &event),
                DispatchItem::Notify(event) => Self::notify(&mut slots, &mut state, &event),
                DispatchItem::Timer(event) => Self::handle_timer(&mut slots, &mut state, &event),
                DispatchItem::Action { role, action } => {
                    match slots.iter_mut().find(|slot| slot.role == role) {
                        Some(slot) => {
                            let (_, mut ctx) = slot.context(&mut state);
                            action(&mut ctx);
                        }
                        None => warn!(%role, "action for a role not hosted here"),
                    }
                }
                DispatchItem::Exit => break,
            }
        }

        self.shut_down(&mut slots, &mut state);
        debug!("dispatcher finished");
    }

    fn on_unregistering(&self) {
        self.router.unregister_dispatcher(&self.name);
        if self.sender.send(DispatchItem::Exit).is_err() {
            trace!(dispatcher = %self.name, "queue already closed");
        }
    }

    fn exit(&self) -> ExitCode {
        if self.failed.load(Ordering::Acquire) {
            ExitCode::Error
        } else {
            ExitCode::Completed
        }
    }
}
