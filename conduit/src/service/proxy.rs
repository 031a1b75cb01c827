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

//! Client side of a service.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace, warn};

use crate::common::{ComponentId, ProxyId};
use crate::component::{DispatchItem, Router};
use crate::message::{
    ArgumentStream, DataState, InterfaceDescriptor, MessageError, MessageId, NotificationEvent,
    ProxyAddress, RequestEvent, RequestKind, ResponseEvent, ResultType, SequenceNumber,
    StubAddress,
};
use crate::service::{CachedValue, ProxyListener};

/// Client-side handle of one service in one dispatcher thread.
///
/// Keeps the last received attribute values and response parameters, issues
/// sequence numbers, and knows which components wait on which message.
/// Owned and used by a single dispatcher thread.
#[derive(Debug)]
pub struct Proxy {
    address: ProxyAddress,
    stub: StubAddress,
    descriptor: &'static InterfaceDescriptor,
    router: Router,
    sequence: SequenceNumber,
    attributes: HashMap<MessageId, CachedValue>,
    responses: HashMap<MessageId, CachedValue>,
    listeners: HashMap<MessageId, Vec<ProxyListener>>,
}

impl Proxy {
    /// Creates a proxy with id `id` on dispatcher `dispatcher`, connected to
    /// `stub`.
    #[must_use]
    pub fn new(
        id: ProxyId,
        dispatcher: &str,
        stub: StubAddress,
        descriptor: &'static InterfaceDescriptor,
        router: Router,
    ) -> Self {
        Self {
            address: ProxyAddress {
                key: stub.key.clone(),
                dispatcher: dispatcher.to_string(),
                proxy: id,
            },
            stub,
            descriptor,
            router,
            sequence: 0,
            attributes: HashMap::new(),
            responses: HashMap::new(),
            listeners: HashMap::new(),
        }
    }

    /// Proxy id within its dispatcher.
    #[must_use]
    pub fn id(&self) -> ProxyId {
        self.address.proxy
    }

    /// Where the proxy lives.
    #[must_use]
    pub fn address(&self) -> &ProxyAddress {
        &self.address
    }

    /// The stub the proxy talks to.
    #[must_use]
    pub fn stub_address(&self) -> &StubAddress {
        &self.stub
    }

    /// The service interface.
    #[must_use]
    pub fn descriptor(&self) -> &'static InterfaceDescriptor {
        self.descriptor
    }

    /// The last sequence number issued, `0` before the first call.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Sends `request` on behalf of `caller` and returns its sequence number.
    ///
    /// Requests without a response are fire-and-forget: they return `0` and
    /// consume no sequence number. For the others, `caller` is notified once
    /// with the outcome.
    ///
    /// # Errors
    ///
    /// [`MessageError::UnknownMessage`] if `request` is not a request of the
    /// service.
    #[instrument(skip(self, args), fields(proxy = %self.address))]
    pub fn call(
        &mut self,
        caller: ComponentId,
        request: MessageId,
        args: ArgumentStream,
    ) -> Result<SequenceNumber, MessageError> {
        if !self.descriptor.has_request(request) {
            return Err(MessageError::UnknownMessage {
                id: request,
                service: self.descriptor.service_name,
            });
        }
        let response = self.descriptor.response_id(request);
        let sequence_nr = if response.is_not_processed() {
            0
        } else {
            self.sequence += 1;
            self.listeners
                .entry(response)
                .or_default()
                .push(ProxyListener::call(caller, self.sequence));
            self.sequence
        };
        trace!(sequence_nr, "request sent");
        self.send(request, sequence_nr, RequestKind::Call, args);
        Ok(sequence_nr)
    }

    /// Classifies a response from the stub, updates the caches and returns
    /// the notifications to deliver, at most one per component.
    ///
    /// A response answering a call (non-zero sequence number) goes to the
    /// caller only. A broadcast (zero sequence number) goes to every
    /// subscriber of the message.
    #[instrument(skip(self, event), fields(proxy = %self.address, message = %event.message_id, result = ?event.result))]
    pub fn process_response(&mut self, event: &ResponseEvent) -> Vec<NotificationEvent> {
        let id = event.message_id;
        let (resolved, request_id) = match event.result {
            ResultType::RequestOk | ResultType::DataOk => {
                let valid = CachedValue::valid(event.args.clone());
                if self.descriptor.has_attribute(id) {
                    self.attributes.insert(id, valid);
                    (id, MessageId::NOT_PROCESSED)
                } else if self.descriptor.has_response(id) {
                    self.responses.insert(id, valid);
                    (id, self.descriptor.request_id(id))
                } else {
                    warn!("response for a message outside the service");
                    return Vec::new();
                }
            }
            ResultType::RequestBusy | ResultType::RequestError | ResultType::RequestCanceled => {
                let response = if id.is_request() {
                    self.descriptor.response_id(id)
                } else {
                    id
                };
                if response.is_not_processed() || response == MessageId::INVALID {
                    return Vec::new();
                }
                self.responses.entry(response).or_default().state = DataState::Invalid;
                (response, self.descriptor.request_id(response))
            }
            ResultType::RequestInvalid | ResultType::DataInvalid => (id, MessageId::NOT_PROCESSED),
            ResultType::MessageUndelivered => {
                if id.is_request() {
                    let response = self.descriptor.response_id(id);
                    if response.is_not_processed() || response == MessageId::INVALID {
                        debug!("fire-and-forget request undelivered");
                        return Vec::new();
                    }
                    (response, id)
                } else {
                    (id, MessageId::NOT_PROCESSED)
                }
            }
        };
        self.take_listeners(resolved, request_id, event.result, event.sequence_nr)
    }

    fn take_listeners(
        &mut self,
        id: MessageId,
        request_id: MessageId,
        result: ResultType,
        sequence_nr: SequenceNumber,
    ) -> Vec<NotificationEvent> {
        let Some(entry) = self.listeners.get_mut(&id) else {
            return Vec::new();
        };
        let mut consumers: Vec<ComponentId> = Vec::new();
        if sequence_nr == 0 {
            for listener in entry.iter().filter(|l| !l.one_shot) {
                if !consumers.contains(&listener.consumer) {
                    consumers.push(listener.consumer);
                }
            }
        } else {
            entry.retain(|l| {
                if l.one_shot && l.sequence_nr == sequence_nr {
                    if !consumers.contains(&l.consumer) {
                        consumers.push(l.consumer);
                    }
                    false
                } else {
                    true
                }
            });
            if entry.is_empty() {
                self.listeners.remove(&id);
            }
        }
        let proxy = self.id();
        consumers
            .into_iter()
            .map(|consumer| NotificationEvent::new(proxy, consumer, id, request_id, result, sequence_nr))
            .collect()
    }

    /// Subscribes `consumer` to `id`, an attribute or a response.
    ///
    /// The first subscriber asks the stub to start sending updates; the stub
    /// answers with the current value if it has one. Later subscribers are
    /// served from the cache when it is valid. Re-subscribing with
    /// `notify_always` repeats the cached value.
    ///
    /// # Errors
    ///
    /// [`MessageError::UnknownMessage`] if `id` is neither an attribute nor a
    /// response of the service.
    pub fn set_notification(
        &mut self,
        id: MessageId,
        consumer: ComponentId,
        notify_always: bool,
    ) -> Result<(), MessageError> {
        if !(self.descriptor.has_attribute(id) || self.descriptor.has_response(id)) {
            return Err(MessageError::UnknownMessage {
                id,
                service: self.descriptor.service_name,
            });
        }
        let entry = self.listeners.entry(id).or_default();
        let first = !entry.iter().any(|l| !l.one_shot);
        let already = entry.iter().any(|l| !l.one_shot && l.consumer == consumer);

        if already {
            if notify_always {
                self.notify_cached(id, consumer);
            }
            return Ok(());
        }

        entry.push(ProxyListener::subscription(consumer));
        if first {
            self.send(id, 0, RequestKind::StartNotify, ArgumentStream::empty());
        } else {
            self.notify_cached(id, consumer);
        }
        Ok(())
    }

    /// Removes `consumer`'s subscription to `id`. The stub is told to stop
    /// once nobody is subscribed.
    pub fn clear_notification(&mut self, id: MessageId, consumer: ComponentId) {
        let Some(entry) = self.listeners.get_mut(&id) else {
            return;
        };
        let before = entry.iter().filter(|l| !l.one_shot).count();
        entry.retain(|l| l.one_shot || l.consumer != consumer);
        let after = entry.iter().filter(|l| !l.one_shot).count();
        if entry.is_empty() {
            self.listeners.remove(&id);
        }
        if before > 0 && after == 0 {
            self.send(id, 0, RequestKind::StopNotify, ArgumentStream::empty());
        }
    }

    /// Removes every subscription of `consumer`.
    pub fn clear_all_notifications(&mut self, consumer: ComponentId) {
        let subscribed: Vec<MessageId> = self
            .listeners
            .iter()
            .filter(|(_, entry)| entry.iter().any(|l| !l.one_shot && l.consumer == consumer))
            .map(|(id, _)| *id)
            .collect();
        for id in subscribed {
            self.clear_notification(id, consumer);
        }
    }

    /// Whether `consumer` is subscribed to `id`.
    #[must_use]
    pub fn is_subscribed(&self, id: MessageId, consumer: ComponentId) -> bool {
        self.listeners
            .get(&id)
            .is_some_and(|entry| entry.iter().any(|l| !l.one_shot && l.consumer == consumer))
    }

    /// Tells the stub to forget this proxy and drops every listener.
    pub fn disconnect(&mut self) {
        self.listeners.clear();
        self.send(MessageId::NOT_PROCESSED, 0, RequestKind::RemoveAllNotify, ArgumentStream::empty());
    }

    /// The cached value of an attribute.
    ///
    /// # Errors
    ///
    /// [`MessageError::NoData`] if none was received or it is not valid.
    pub fn attribute<T: DeserializeOwned>(&self, id: MessageId) -> Result<T, MessageError> {
        self.attributes
            .get(&id)
            .ok_or(MessageError::NoData(id))?
            .decode(id)
    }

    /// Validity of a cached attribute.
    #[must_use]
    pub fn attribute_state(&self, id: MessageId) -> DataState {
        self.attributes.get(&id).map_or(DataState::Undefined, |c| c.state)
    }

    /// The last received parameters of a response.
    ///
    /// # Errors
    ///
    /// [`MessageError::NoData`] if none were received or the last call failed.
    pub fn response<T: DeserializeOwned>(&self, id: MessageId) -> Result<T, MessageError> {
        self.responses
            .get(&id)
            .ok_or(MessageError::NoData(id))?
            .decode(id)
    }

    /// Validity of the cached response parameters.
    #[must_use]
    pub fn response_state(&self, id: MessageId) -> DataState {
        self.responses.get(&id).map_or(DataState::Undefined, |c| c.state)
    }

    fn cached(&self, id: MessageId) -> Option<&CachedValue> {
        self.attributes.get(&id).or_else(|| self.responses.get(&id))
    }

    fn notify_cached(&self, id: MessageId, consumer: ComponentId) {
        if !self.cached(id).is_some_and(CachedValue::is_valid) {
            return;
        }
        let result = if id.is_attribute() {
            ResultType::DataOk
        } else {
            ResultType::RequestOk
        };
        let request_id = if id.is_attribute() {
            MessageId::NOT_PROCESSED
        } else {
            self.descriptor.request_id(id)
        };
        let event = NotificationEvent::new(self.id(), consumer, id, request_id, result, 0);
        if let Err(e) = self.router.post(&self.address.dispatcher, DispatchItem::Notify(event)) {
            warn!(error = %e, proxy = %self.address, "cannot post cached notification");
        }
    }

    fn send(&self, id: MessageId, sequence_nr: SequenceNumber, kind: RequestKind, args: ArgumentStream) {
        self.router.send_request(RequestEvent::new(
            self.address.clone(),
            self.stub.clone(),
            id,
            sequence_nr,
            kind,
            args,
        ));
    }
}
