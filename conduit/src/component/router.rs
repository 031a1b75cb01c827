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

//! Process-local routing of events between dispatcher threads.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, trace, warn};

use crate::component::ComponentContext;
use crate::message::{
    ArgumentStream, MessageError, NotificationEvent, RequestEvent, RequestKind, ResponseEvent,
    ResultType, ServiceKey, StubAddress,
};
use crate::thread::RegistryError;
use crate::timer::TimerEvent;

/// A closure run on a dispatcher thread with a component's context.
pub type ComponentAction = Box<dyn for<'a> FnOnce(&mut ComponentContext<'a>) + Send>;

/// One entry of a dispatcher's queue.
pub enum DispatchItem {
    /// Deliver to the addressed stub.
    Request(RequestEvent),
    /// Deliver to the addressed proxy.
    Response(ResponseEvent),
    /// Deliver to a component from one of its proxies.
    Notify(NotificationEvent),
    /// Deliver a fired timer to its component.
    Timer(TimerEvent),
    /// Run a closure in the context of the component playing `role`.
    Action {
        /// Role of the target component.
        role: String,
        /// The closure.
        action: ComponentAction,
    },
    /// Leave the dispatch loop.
    Exit,
}

impl fmt::Debug for DispatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(event) => f.debug_tuple("Request").field(event).finish(),
            Self::Response(event) => f.debug_tuple("Response").field(event).finish(),
            Self::Notify(event) => f.debug_tuple("Notify").field(event).finish(),
            Self::Timer(event) => f.debug_tuple("Timer").field(event).finish(),
            Self::Action { role, .. } => f.debug_struct("Action").field("role", role).finish(),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

/// Directory of dispatcher queues and of the stubs they host.
///
/// Cheap to clone; clones share the same directory.
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    dispatchers: DashMap<String, UnboundedSender<DispatchItem>>,
    services: DashMap<ServiceKey, StubAddress>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("dispatchers", &self.inner.dispatchers.len())
            .field("services", &self.inner.services.len())
            .finish()
    }
}

impl Router {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the queue of dispatcher `name` reachable.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if the name is taken.
    pub fn register_dispatcher(
        &self,
        name: &str,
        sender: UnboundedSender<DispatchItem>,
    ) -> Result<(), RegistryError> {
        match self.inner.dispatchers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateKey {
                registry: "dispatcher directory",
                key: format!("{name:?}"),
            }),
            Entry::Vacant(slot) => {
                slot.insert(sender);
                trace!(dispatcher = name, "dispatcher connected");
                Ok(())
            }
        }
    }

    /// Removes dispatcher `name` and every service it hosts.
    pub fn unregister_dispatcher(&self, name: &str) {
        self.inner.dispatchers.remove(name);
        self.inner
            .services
            .retain(|_, address| address.dispatcher != name);
        trace!(dispatcher = name, "dispatcher disconnected");
    }

    /// Whether dispatcher `name` is reachable.
    #[must_use]
    pub fn is_connected(&self, name: &str) -> bool {
        self.inner.dispatchers.contains_key(name)
    }

    /// Queues `item` on dispatcher `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::NotConnected`] if the dispatcher is unknown or
    /// its queue is closed.
    pub fn post(&self, dispatcher: &str, item: DispatchItem) -> Result<(), MessageError> {
        let sender = self
            .inner
            .dispatchers
            .get(dispatcher)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MessageError::NotConnected(dispatcher.to_string()))?;
        sender
            .send(item)
            .map_err(|_| MessageError::NotConnected(dispatcher.to_string()))
    }

    /// Delivers a request to its stub's dispatcher, bouncing it back to the
    /// calling proxy as [`ResultType::MessageUndelivered`] if that fails.
    pub fn send_request(&self, event: RequestEvent) {
        let dispatcher = event.target.dispatcher.clone();
        if let Err(e) = self.post(&dispatcher, DispatchItem::Request(event.clone())) {
            warn!(error = %e, target = %event.target, message = %event.message_id, "request undeliverable");
            self.bounce(&event);
        }
    }

    /// Answers `event` with [`ResultType::MessageUndelivered`].
    ///
    /// Subscription removals are dropped silently; nobody waits on them.
    pub(crate) fn bounce(&self, event: &RequestEvent) {
        if matches!(event.kind, RequestKind::StopNotify | RequestKind::RemoveAllNotify) {
            return;
        }
        let reply = ResponseEvent::new(
            event.target.clone(),
            event.source.clone(),
            event.message_id,
            ResultType::MessageUndelivered,
            event.sequence_nr,
            ArgumentStream::empty(),
        );
        if let Err(e) = self.post(&event.source.dispatcher, DispatchItem::Response(reply)) {
            error!(error = %e, source = %event.source, "cannot bounce undelivered request");
        }
    }

    /// Delivers a response to its proxy's dispatcher. Undeliverable responses
    /// are logged and dropped.
    pub fn send_response(&self, event: ResponseEvent) {
        let dispatcher = event.target.dispatcher.clone();
        let message = event.message_id;
        if let Err(e) = self.post(&dispatcher, DispatchItem::Response(event)) {
            warn!(error = %e, %message, "response undeliverable");
        }
    }

    /// Adds a stub to the service directory.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::DuplicateService`] if the role already provides
    /// the service.
    pub fn register_service(&self, address: StubAddress) -> Result<(), MessageError> {
        match self.inner.services.entry(address.key.clone()) {
            Entry::Occupied(_) => Err(MessageError::DuplicateService {
                role: address.key.role,
                service: address.key.service,
            }),
            Entry::Vacant(slot) => {
                trace!(stub = %address, "service registered");
                slot.insert(address);
                Ok(())
            }
        }
    }

    /// Removes a stub from the service directory.
    pub fn unregister_service(&self, key: &ServiceKey) {
        self.inner.services.remove(key);
    }

    /// Looks up the stub providing `key`.
    #[must_use]
    pub fn find_service(&self, key: &ServiceKey) -> Option<StubAddress> {
        self.inner.services.get(key).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::message::{InterfaceVersion, MessageId, ProxyAddress};

    fn addresses() -> (ProxyAddress, StubAddress) {
        let key = ServiceKey::new("server", "Sample");
        (
            ProxyAddress {
                key: key.clone(),
                dispatcher: "client_thread".into(),
                proxy: 1,
            },
            StubAddress {
                key,
                version: InterfaceVersion::new(1, 0, 0),
                dispatcher: "server_thread".into(),
            },
        )
    }

    #[test]
    fn duplicate_dispatcher_names_are_refused() {
        let router = Router::new();
        let (tx, _rx) = unbounded_channel();
        router.register_dispatcher("a", tx.clone()).unwrap();
        assert!(router.register_dispatcher("a", tx).is_err());
        router.unregister_dispatcher("a");
        assert!(!router.is_connected("a"));
    }

    #[test]
    fn undeliverable_request_bounces_to_caller() {
        let router = Router::new();
        let (tx, mut rx) = unbounded_channel();
        router.register_dispatcher("client_thread", tx).unwrap();
        let (proxy, stub) = addresses();

        router.send_request(RequestEvent::new(
            proxy,
            stub,
            MessageId::request(0),
            7,
            RequestKind::Call,
            ArgumentStream::empty(),
        ));

        match rx.try_recv().unwrap() {
            DispatchItem::Response(reply) => {
                assert_eq!(reply.result, ResultType::MessageUndelivered);
                assert_eq!(reply.sequence_nr, 7);
                assert_eq!(reply.message_id, MessageId::request(0));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn services_are_dropped_with_their_dispatcher() {
        let router = Router::new();
        let (tx, _rx) = unbounded_channel();
        router.register_dispatcher("server_thread", tx).unwrap();
        let (_, stub) = addresses();
        router.register_service(stub.clone()).unwrap();
        assert!(matches!(
            router.register_service(stub.clone()),
            Err(MessageError::DuplicateService { .. })
        ));
        assert_eq!(router.find_service(&stub.key), Some(stub.clone()));
        router.unregister_dispatcher("server_thread");
        assert_eq!(router.find_service(&stub.key), None);
    }
}
