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
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use crate::common::{ComponentId, ProxyId, TimerId};
use crate::component::dispatcher::{DispatcherState, HostedStub};
use crate::component::{Router, RuntimeError};
use crate::message::{
    ArgumentStream, InterfaceDescriptor, MessageError, MessageId, NotificationEvent,
    SequenceNumber, ServiceKey, StubAddress,
};
use crate::service::{Proxy, RequestCall, ServiceFault, Stub};
use crate::timer::{Timer, TimerEvent};

/// User code hosted by a dispatcher thread.
///
/// Every callback runs on the dispatcher's thread, one at a time, with a
/// [`ComponentContext`] giving access to the component's stubs, proxies and
/// timers.
pub trait Component: Send + 'static {
    /// Role name, unique within the process. Services are provided under it.
    fn role(&self) -> &str;

    /// Called once when the dispatcher starts, before any event.
    fn startup(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Called once when the dispatcher stops, after the last event.
    fn shutdown(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Handles a request on one of the component's stubs.
    ///
    /// Answer through [`ComponentContext::stub_mut`]. A returned fault is
    /// reported to the caller as an error or cancellation.
    fn process_request(
        &mut self,
        _ctx: &mut ComponentContext<'_>,
        call: &RequestCall,
    ) -> Result<(), ServiceFault> {
        Err(ServiceFault::Failed(format!(
            "{} does not handle {}",
            self.role(),
            call.message_id
        )))
    }

    /// Receives a response or attribute update from one of its proxies.
    fn on_notification(&mut self, _ctx: &mut ComponentContext<'_>, _event: &NotificationEvent) {}

    /// Receives a firing of one of its timers.
    fn on_timer(&mut self, _ctx: &mut ComponentContext<'_>, _event: &TimerEvent) {}
}

/// What a component may touch while one of its callbacks runs.
pub struct ComponentContext<'a> {
    id: ComponentId,
    role: &'a str,
    state: &'a mut DispatcherState,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(id: ComponentId, role: &'a str, state: &'a mut DispatcherState) -> Self {
        Self { id, role, state }
    }

    /// Id of the component within its dispatcher.
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Role of the component.
    #[must_use]
    pub fn role(&self) -> &str {
        self.role
    }

    /// Name of the hosting dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &str {
        &self.state.name
    }

    /// The process router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.state.router
    }

    /// Publishes `descriptor` under this component's role and returns the new
    /// stub's address.
    ///
    /// # Errors
    ///
    /// The descriptor is malformed, or the role already provides the service.
    pub fn provide_service(
        &mut self,
        descriptor: &'static InterfaceDescriptor,
    ) -> Result<StubAddress, MessageError> {
        descriptor.validate()?;
        let address = StubAddress {
            key: ServiceKey::new(self.role, descriptor.service_name),
            version: descriptor.version,
            dispatcher: self.state.name.clone(),
        };
        self.state.router.register_service(address.clone())?;
        let stub = Stub::new(address.clone(), descriptor, self.state.router.clone());
        self.state.stubs.insert(
            address.key.clone(),
            HostedStub {
                owner: self.id,
                stub,
            },
        );
        debug!(stub = %address, "service provided");
        Ok(address)
    }

    /// This component's stub of `service`.
    #[must_use]
    pub fn stub(&self, service: &str) -> Option<&Stub> {
        self.state
            .stubs
            .get(&ServiceKey::new(self.role, service))
            .filter(|hosted| hosted.owner == self.id)
            .map(|hosted| &hosted.stub)
    }

    /// This component's stub of `service`, mutably.
    pub fn stub_mut(&mut self, service: &str) -> Option<&mut Stub> {
        let id = self.id;
        self.state
            .stubs
            .get_mut(&ServiceKey::new(self.role, service))
            .filter(|hosted| hosted.owner == id)
            .map(|hosted| &mut hosted.stub)
    }

    /// Connects to the stub of `descriptor`'s service provided by `role`.
    ///
    /// Components of one dispatcher share one proxy per stub; asking again
    /// returns the existing proxy.
    ///
    /// # Errors
    ///
    /// No stub provides the service, or it implements an incompatible version.
    pub fn create_proxy(
        &mut self,
        role: &str,
        descriptor: &'static InterfaceDescriptor,
    ) -> Result<ProxyId, MessageError> {
        let key = ServiceKey::new(role, descriptor.service_name);
        if let Some(id) = self.state.proxy_index.get(&key) {
            return Ok(*id);
        }
        let stub = self
            .state
            .router
            .find_service(&key)
            .ok_or_else(|| MessageError::UnknownService {
                role: key.role.clone(),
                service: key.service.clone(),
            })?;
        if !stub.version.is_compatible_with(&descriptor.version) {
            return Err(MessageError::IncompatibleVersion {
                service: key.service.clone(),
                expected: descriptor.version,
                provided: stub.version,
            });
        }
        self.state.next_proxy += 1;
        let id = self.state.next_proxy;
        let proxy = Proxy::new(id, &self.state.name, stub, descriptor, self.state.router.clone());
        trace!(proxy = %proxy.address(), "proxy created");
        self.state.proxies.insert(id, proxy);
        self.state.proxy_index.insert(key, id);
        Ok(id)
    }

    /// A proxy of this dispatcher.
    #[must_use]
    pub fn proxy(&self, proxy: ProxyId) -> Option<&Proxy> {
        self.state.proxies.get(&proxy)
    }

    /// A proxy of this dispatcher, mutably.
    pub fn proxy_mut(&mut self, proxy: ProxyId) -> Option<&mut Proxy> {
        self.state.proxies.get_mut(&proxy)
    }

    fn expect_proxy(&mut self, proxy: ProxyId) -> Result<&mut Proxy, MessageError> {
        self.state
            .proxies
            .get_mut(&proxy)
            .ok_or(MessageError::UnknownProxy(proxy))
    }

    /// Sends `request` with `args` through `proxy`; this component is
    /// notified of the outcome.
    ///
    /// # Errors
    ///
    /// Unknown proxy or request, or `args` cannot be encoded.
    pub fn call<T: Serialize + ?Sized>(
        &mut self,
        proxy: ProxyId,
        request: MessageId,
        args: &T,
    ) -> Result<SequenceNumber, MessageError> {
        let args = ArgumentStream::encode(args)?;
        let caller = self.id;
        self.expect_proxy(proxy)?.call(caller, request, args)
    }

    /// Subscribes this component to `id` on `proxy`.
    ///
    /// # Errors
    ///
    /// Unknown proxy, or `id` is neither an attribute nor a response.
    pub fn set_notification(
        &mut self,
        proxy: ProxyId,
        id: MessageId,
        notify_always: bool,
    ) -> Result<(), MessageError> {
        let consumer = self.id;
        self.expect_proxy(proxy)?
            .set_notification(id, consumer, notify_always)
    }

    /// Unsubscribes this component from `id` on `proxy`.
    ///
    /// # Errors
    ///
    /// Unknown proxy.
    pub fn clear_notification(&mut self, proxy: ProxyId, id: MessageId) -> Result<(), MessageError> {
        let consumer = self.id;
        self.expect_proxy(proxy)?.clear_notification(id, consumer);
        Ok(())
    }

    /// Starts a timer firing `event_count` times every `timeout`.
    ///
    /// # Errors
    ///
    /// The dispatcher has no timer service, or the timer cannot be armed.
    pub fn start_timer(
        &mut self,
        name: &str,
        timeout: Duration,
        event_count: u32,
    ) -> Result<TimerId, RuntimeError> {
        let manager = self
            .state
            .timers
            .as_ref()
            .ok_or(RuntimeError::NoTimerService)?;
        let timer = Timer::new(name, timeout, event_count, self.state.name.clone(), self.id);
        if !manager.start_timer(&timer) {
            return Err(RuntimeError::TimerRejected(name.to_string()));
        }
        let id = timer.id();
        self.state.timers_owned.insert(id, Arc::clone(&timer));
        Ok(id)
    }

    /// Stops one of this component's timers. Returns `false` if it was not
    /// running.
    pub fn stop_timer(&mut self, timer: TimerId) -> bool {
        let Some(owned) = self.state.timers_owned.get(&timer) else {
            return false;
        };
        if owned.consumer() != self.id {
            return false;
        }
        self.state.timers_owned.remove(&timer);
        self.state
            .timers
            .as_ref()
            .is_some_and(|manager| manager.stop_timer(timer))
    }
}
