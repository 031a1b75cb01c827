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

//! Server side of a service.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::component::Router;
use crate::message::{
    ArgumentStream, DataState, InterfaceDescriptor, MessageError, MessageId, MessageKind,
    ProxyAddress, RequestEvent, RequestKind, ResponseEvent, ResultType, SequenceNumber,
    StubAddress,
};
use crate::service::{CachedValue, StubListener};

/// Why a request handler did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceFault {
    /// The handler failed. Callers waiting on the response get
    /// [`ResultType::RequestError`].
    #[error("request failed: {0}")]
    Failed(String),
    /// The handler gave up. Callers waiting on the response get
    /// [`ResultType::RequestCanceled`].
    #[error("request canceled")]
    Canceled,
    /// The arguments could not be decoded, or the reply encoded.
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// A request accepted by a stub and handed to its handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCall {
    /// The request.
    pub message_id: MessageId,
    /// The response answering it, [`MessageId::NOT_PROCESSED`] if none.
    pub response_id: MessageId,
    /// Caller's sequence number.
    pub sequence_nr: SequenceNumber,
    /// Calling proxy.
    pub source: ProxyAddress,
    /// Encoded arguments.
    pub args: ArgumentStream,
}

impl RequestCall {
    /// Decodes the call arguments.
    ///
    /// # Errors
    ///
    /// [`MessageError::Decode`] if the arguments are not a `T`.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        self.args.decode()
    }
}

/// Server-side handle of one service: authoritative attribute values and the
/// proxies listening for responses and attribute updates.
///
/// A stub is owned by one dispatcher thread. Only the listener set is locked,
/// since it is the one structure shared with routing.
#[derive(Debug)]
pub struct Stub {
    address: StubAddress,
    descriptor: &'static InterfaceDescriptor,
    router: Router,
    attributes: HashMap<MessageId, CachedValue>,
    listeners: Mutex<HashMap<MessageId, Vec<StubListener>>>,
    current: Option<RequestCall>,
}

impl Stub {
    /// Creates a stub at `address` serving `descriptor`.
    #[must_use]
    pub fn new(address: StubAddress, descriptor: &'static InterfaceDescriptor, router: Router) -> Self {
        Self {
            address,
            descriptor,
            router,
            attributes: HashMap::new(),
            listeners: Mutex::new(HashMap::new()),
            current: None,
        }
    }

    /// Where the stub lives.
    #[must_use]
    pub fn address(&self) -> &StubAddress {
        &self.address
    }

    /// The served interface.
    #[must_use]
    pub fn descriptor(&self) -> &'static InterfaceDescriptor {
        self.descriptor
    }

    /// The request being handled, if any.
    #[must_use]
    pub fn current_request(&self) -> Option<&RequestCall> {
        self.current.as_ref()
    }

    /// Number of listeners on `id`.
    #[must_use]
    pub fn listener_count(&self, id: MessageId) -> usize {
        self.listeners.lock().get(&id).map_or(0, Vec::len)
    }

    /// Handles the bookkeeping part of an incoming request.
    ///
    /// Subscription requests are handled completely and yield `None`. A call
    /// yields the [`RequestCall`] to hand to the handler, unless it is unknown
    /// (answered with [`ResultType::RequestInvalid`]) or the same proxy already
    /// waits on its response (answered with [`ResultType::RequestBusy`]).
    ///
    /// Every `Some` must be followed by [`finish_request`](Self::finish_request).
    #[instrument(skip(self, event), fields(stub = %self.address, message = %event.message_id))]
    pub fn begin_request(&mut self, event: &RequestEvent) -> Option<RequestCall> {
        match event.kind {
            RequestKind::StartNotify => {
                self.start_notify(event);
                None
            }
            RequestKind::StopNotify => {
                self.stop_notify(event.message_id, &event.source);
                None
            }
            RequestKind::RemoveAllNotify => {
                self.remove_listener(&event.source);
                None
            }
            RequestKind::Call => self.accept_call(event),
        }
    }

    fn accept_call(&mut self, event: &RequestEvent) -> Option<RequestCall> {
        if !self.descriptor.has_request(event.message_id) {
            warn!("unknown request");
            self.reply(&event.source, event.message_id, ResultType::RequestInvalid, event.sequence_nr, ArgumentStream::empty());
            return None;
        }

        let response_id = self.descriptor.response_id(event.message_id);
        if !response_id.is_not_processed() {
            let mut listeners = self.listeners.lock();
            let waiting = listeners.entry(response_id).or_default();
            if waiting.iter().any(|l| l.one_shot && l.proxy == event.source) {
                drop(listeners);
                debug!(caller = %event.source, "request busy");
                self.reply(&event.source, response_id, ResultType::RequestBusy, event.sequence_nr, ArgumentStream::empty());
                return None;
            }
            waiting.push(StubListener::call(event.source.clone(), event.sequence_nr));
        }

        let call = RequestCall {
            message_id: event.message_id,
            response_id,
            sequence_nr: event.sequence_nr,
            source: event.source.clone(),
            args: event.args.clone(),
        };
        self.current = Some(call.clone());
        Some(call)
    }

    /// Completes a call handed out by [`begin_request`](Self::begin_request).
    ///
    /// A failed outcome is reported to the waiting callers through
    /// [`error_request`](Self::error_request). The current-request marker is
    /// cleared either way.
    pub fn finish_request(&mut self, call: &RequestCall, outcome: Result<(), ServiceFault>) {
        if let Err(fault) = outcome {
            warn!(stub = %self.address, message = %call.message_id, error = %fault, "request handler failed");
            self.error_request(call.message_id, matches!(fault, ServiceFault::Canceled));
        }
        self.current = None;
    }

    /// Runs `handler` for `event` between
    /// [`begin_request`](Self::begin_request) and
    /// [`finish_request`](Self::finish_request).
    pub fn process_request_event<F>(&mut self, event: &RequestEvent, handler: F)
    where
        F: FnOnce(&mut Self, &RequestCall) -> Result<(), ServiceFault>,
    {
        if let Some(call) = self.begin_request(event) {
            let outcome = handler(self, &call);
            self.finish_request(&call, outcome);
        }
    }

    /// Sends `params` as `response` to every listener on it.
    ///
    /// Returns the number of listeners reached; pending calls are dropped
    /// once answered.
    ///
    /// # Errors
    ///
    /// [`MessageError::UnknownMessage`] if `response` is not a response of the
    /// service, [`MessageError::Encode`] if `params` cannot be encoded.
    pub fn send_response<T: Serialize + ?Sized>(
        &mut self,
        response: MessageId,
        params: &T,
    ) -> Result<usize, MessageError> {
        if !self.descriptor.has_response(response) {
            return Err(MessageError::UnknownMessage {
                id: response,
                service: self.descriptor.service_name,
            });
        }
        let args = ArgumentStream::encode(params)?;
        Ok(self.broadcast(response, ResultType::RequestOk, &args))
    }

    /// Updates an attribute and notifies its listeners.
    ///
    /// Setting the value an attribute already validly holds does nothing.
    /// Returns whether listeners were notified.
    ///
    /// # Errors
    ///
    /// [`MessageError::UnknownMessage`] if `attribute` is not an attribute of
    /// the service, [`MessageError::Encode`] if `value` cannot be encoded.
    pub fn set_attribute<T: Serialize + ?Sized>(
        &mut self,
        attribute: MessageId,
        value: &T,
    ) -> Result<bool, MessageError> {
        if !self.descriptor.has_attribute(attribute) {
            return Err(MessageError::UnknownMessage {
                id: attribute,
                service: self.descriptor.service_name,
            });
        }
        let args = ArgumentStream::encode(value)?;
        let cached = self.attributes.entry(attribute).or_default();
        if cached.is_valid() && cached.args == args {
            trace!(stub = %self.address, %attribute, "attribute unchanged");
            return Ok(false);
        }
        *cached = CachedValue::valid(args.clone());
        self.broadcast(attribute, ResultType::DataOk, &args);
        Ok(true)
    }

    /// The current value of an attribute.
    ///
    /// # Errors
    ///
    /// [`MessageError::NoData`] if it is not valid.
    pub fn attribute<T: DeserializeOwned>(&self, attribute: MessageId) -> Result<T, MessageError> {
        self.attributes
            .get(&attribute)
            .ok_or(MessageError::NoData(attribute))?
            .decode(attribute)
    }

    /// Validity of an attribute.
    #[must_use]
    pub fn attribute_state(&self, attribute: MessageId) -> DataState {
        self.attributes
            .get(&attribute)
            .map_or(DataState::Undefined, |cached| cached.state)
    }

    /// Reports a failure on `id` to its listeners and returns the number of
    /// events sent.
    ///
    /// * attribute: marked invalid, listeners get [`ResultType::DataInvalid`].
    /// * response: listeners get [`ResultType::RequestInvalid`].
    /// * request: the listeners on its response get
    ///   [`ResultType::RequestCanceled`] when `is_cancel`, otherwise
    ///   [`ResultType::RequestError`], and are removed. A request without a
    ///   response has no listeners, so nothing is sent.
    #[instrument(skip(self), fields(stub = %self.address))]
    pub fn error_request(&mut self, id: MessageId, is_cancel: bool) -> usize {
        match self.descriptor.kind_of(id) {
            MessageKind::Attribute => {
                self.attributes.entry(id).or_default().state = DataState::Invalid;
                self.broadcast(id, ResultType::DataInvalid, &ArgumentStream::empty())
            }
            MessageKind::Response => {
                self.broadcast(id, ResultType::RequestInvalid, &ArgumentStream::empty())
            }
            MessageKind::Request => {
                let response = self.descriptor.response_id(id);
                if response.is_not_processed() {
                    return 0;
                }
                let result = if is_cancel {
                    ResultType::RequestCanceled
                } else {
                    ResultType::RequestError
                };
                let sent = self.broadcast(response, result, &ArgumentStream::empty());
                self.listeners.lock().remove(&response);
                sent
            }
            MessageKind::NotProcessed | MessageKind::Invalid => {
                warn!(message = %id, "error reported for a message outside the service");
                0
            }
        }
    }

    /// Invalidates an attribute. Shorthand for `error_request(attribute, false)`.
    pub fn invalidate_attribute(&mut self, attribute: MessageId) -> usize {
        self.error_request(attribute, false)
    }

    /// Cancels every pending call and invalidates every attribute, as when the
    /// stub goes away.
    pub fn close(&mut self) {
        let pending: Vec<MessageId> = self
            .listeners
            .lock()
            .iter()
            .filter(|(id, listeners)| id.is_response() && listeners.iter().any(|l| l.one_shot))
            .map(|(id, _)| *id)
            .collect();
        for response in pending {
            let request = self.descriptor.request_id(response);
            if !request.is_not_processed() {
                self.error_request(request, true);
            }
        }
        let attributes: Vec<MessageId> = self.descriptor.attributes.to_vec();
        for attribute in attributes {
            if self.attribute_state(attribute).is_valid() {
                self.invalidate_attribute(attribute);
            }
        }
        self.listeners.lock().clear();
    }

    fn start_notify(&mut self, event: &RequestEvent) {
        let id = event.message_id;
        let subscribable = self.descriptor.has_attribute(id) || self.descriptor.has_response(id);
        if !subscribable {
            warn!(message = %id, "subscription to a message that is not an attribute or response");
            self.reply(&event.source, id, ResultType::RequestInvalid, 0, ArgumentStream::empty());
            return;
        }
        {
            let mut listeners = self.listeners.lock();
            let entry = listeners.entry(id).or_default();
            if !entry.iter().any(|l| !l.one_shot && l.proxy == event.source) {
                entry.push(StubListener::subscription(event.source.clone()));
            }
        }
        if let Some(cached) = self.attributes.get(&id).filter(|cached| cached.is_valid()) {
            let args = cached.args.clone();
            self.reply(&event.source, id, ResultType::DataOk, 0, args);
        }
    }

    fn stop_notify(&self, id: MessageId, proxy: &ProxyAddress) {
        let mut listeners = self.listeners.lock();
        if let Some(entry) = listeners.get_mut(&id) {
            entry.retain(|l| l.one_shot || &l.proxy != proxy);
            if entry.is_empty() {
                listeners.remove(&id);
            }
        }
    }

    fn remove_listener(&self, proxy: &ProxyAddress) {
        let mut listeners = self.listeners.lock();
        for entry in listeners.values_mut() {
            entry.retain(|l| &l.proxy != proxy);
        }
        listeners.retain(|_, entry| !entry.is_empty());
    }

    fn broadcast(&self, id: MessageId, result: ResultType, args: &ArgumentStream) -> usize {
        let targets: Vec<StubListener> = {
            let mut listeners = self.listeners.lock();
            let Some(entry) = listeners.get_mut(&id) else {
                return 0;
            };
            let targets = entry.clone();
            entry.retain(|l| !l.one_shot);
            if entry.is_empty() {
                listeners.remove(&id);
            }
            targets
        };
        for listener in &targets {
            self.reply(&listener.proxy, id, result, listener.sequence_nr, args.clone());
        }
        targets.len()
    }

    fn reply(
        &self,
        proxy: &ProxyAddress,
        id: MessageId,
        result: ResultType,
        sequence_nr: SequenceNumber,
        args: ArgumentStream,
    ) {
        self.router.send_response(ResponseEvent::new(
            self.address.clone(),
            proxy.clone(),
            id,
            result,
            sequence_nr,
            args,
        ));
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;
    use crate::component::DispatchItem;
    use crate::message::{InterfaceVersion, ServiceKey};

    const REQ_HELLO: MessageId = MessageId::request(0);
    const REQ_FOO: MessageId = MessageId::request(1);
    const RESP_HELLO: MessageId = MessageId::response(0);
    const ATTR_COUNT: MessageId = MessageId::attribute(0);

    static DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
        service_name: "Sample",
        version: InterfaceVersion::new(1, 0, 0),
        requests: &[REQ_HELLO, REQ_FOO],
        responses: &[RESP_HELLO],
        attributes: &[ATTR_COUNT],
        request_map: &[(REQ_HELLO, RESP_HELLO), (REQ_FOO, MessageId::NOT_PROCESSED)],
        response_params: &[(RESP_HELLO, 1)],
    };

    fn fixture() -> (Stub, UnboundedReceiver<DispatchItem>) {
        let router = Router::new();
        let (tx, rx) = unbounded_channel();
        router.register_dispatcher("client", tx).unwrap();
        let address = StubAddress {
            key: ServiceKey::new("server", "Sample"),
            version: DESCRIPTOR.version,
            dispatcher: "server".into(),
        };
        (Stub::new(address, &DESCRIPTOR, router), rx)
    }

    fn proxy(id: u32) -> ProxyAddress {
        ProxyAddress {
            key: ServiceKey::new("server", "Sample"),
            dispatcher: "client".into(),
            proxy: id,
        }
    }

    fn request(source: ProxyAddress, id: MessageId, seq: SequenceNumber, kind: RequestKind) -> RequestEvent {
        let stub = StubAddress {
            key: ServiceKey::new("server", "Sample"),
            version: DESCRIPTOR.version,
            dispatcher: "server".into(),
        };
        RequestEvent::new(source, stub, id, seq, kind, ArgumentStream::empty())
    }

    fn responses(rx: &mut UnboundedReceiver<DispatchItem>) -> Vec<ResponseEvent> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let DispatchItem::Response(event) = item {
                out.push(event);
            }
        }
        out
    }

    #[test]
    fn response_carries_the_callers_sequence_number() {
        let (mut stub, mut rx) = fixture();
        stub.process_request_event(&request(proxy(1), REQ_HELLO, 4, RequestKind::Call), |stub, call| {
            assert_eq!(stub.current_request().map(|c| c.sequence_nr), Some(4));
            stub.send_response(call.response_id, &"hi")?;
            Ok(())
        });
        let sent = responses(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].result, ResultType::RequestOk);
        assert_eq!(sent[0].sequence_nr, 4);
        assert!(stub.current_request().is_none());
        assert_eq!(stub.listener_count(RESP_HELLO), 0);
    }

    #[test]
    fn second_call_from_same_proxy_is_busy() {
        let (mut stub, mut rx) = fixture();
        assert!(stub.begin_request(&request(proxy(1), REQ_HELLO, 1, RequestKind::Call)).is_some());
        assert!(stub.begin_request(&request(proxy(1), REQ_HELLO, 2, RequestKind::Call)).is_none());
        assert!(stub.begin_request(&request(proxy(2), REQ_HELLO, 1, RequestKind::Call)).is_some());

        let sent = responses(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].result, ResultType::RequestBusy);
        assert_eq!(sent[0].sequence_nr, 2);
        assert_eq!(sent[0].message_id, RESP_HELLO);
    }

    #[test]
    fn unknown_request_is_answered_invalid() {
        let (mut stub, mut rx) = fixture();
        assert!(stub
            .begin_request(&request(proxy(1), MessageId::request(9), 3, RequestKind::Call))
            .is_none());
        let sent = responses(&mut rx);
        assert_eq!(sent[0].result, ResultType::RequestInvalid);
    }

    #[test]
    fn failed_unmapped_request_sends_nothing() {
        let (mut stub, mut rx) = fixture();
        stub.process_request_event(&request(proxy(1), REQ_FOO, 0, RequestKind::Call), |_, _| {
            Err(ServiceFault::Failed("boom".into()))
        });
        assert!(responses(&mut rx).is_empty());
        assert!(stub.current_request().is_none());
    }

    #[test]
    fn failed_mapped_request_sends_one_error() {
        let (mut stub, mut rx) = fixture();
        stub.process_request_event(&request(proxy(1), REQ_HELLO, 5, RequestKind::Call), |_, _| {
            Err(ServiceFault::Failed("boom".into()))
        });
        let sent = responses(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].result, ResultType::RequestError);
        assert_eq!(sent[0].sequence_nr, 5);
        assert_eq!(stub.listener_count(RESP_HELLO), 0);
    }

    #[test]
    fn canceled_request_reports_canceled() {
        let (mut stub, mut rx) = fixture();
        stub.process_request_event(&request(proxy(1), REQ_HELLO, 2, RequestKind::Call), |_, _| {
            Err(ServiceFault::Canceled)
        });
        assert_eq!(responses(&mut rx)[0].result, ResultType::RequestCanceled);
    }

    #[test]
    fn unchanged_attribute_is_not_broadcast() {
        let (mut stub, mut rx) = fixture();
        stub.begin_request(&request(proxy(1), ATTR_COUNT, 0, RequestKind::StartNotify));
        assert!(responses(&mut rx).is_empty());

        assert!(stub.set_attribute(ATTR_COUNT, &1u32).unwrap());
        assert!(!stub.set_attribute(ATTR_COUNT, &1u32).unwrap());
        assert!(stub.set_attribute(ATTR_COUNT, &2u32).unwrap());

        let sent = responses(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.result == ResultType::DataOk));
        assert_eq!(stub.attribute::<u32>(ATTR_COUNT).unwrap(), 2);
    }

    #[test]
    fn late_subscriber_gets_current_value_alone() {
        let (mut stub, mut rx) = fixture();
        stub.begin_request(&request(proxy(1), ATTR_COUNT, 0, RequestKind::StartNotify));
        stub.set_attribute(ATTR_COUNT, &3u32).unwrap();
        responses(&mut rx);

        stub.begin_request(&request(proxy(2), ATTR_COUNT, 0, RequestKind::StartNotify));
        let sent = responses(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, proxy(2));
        assert_eq!(sent[0].args.decode::<u32>().unwrap(), 3);
    }

    #[test]
    fn invalidated_attribute_broadcasts_data_invalid() {
        let (mut stub, mut rx) = fixture();
        stub.begin_request(&request(proxy(1), ATTR_COUNT, 0, RequestKind::StartNotify));
        stub.set_attribute(ATTR_COUNT, &3u32).unwrap();
        responses(&mut rx);

        assert_eq!(stub.invalidate_attribute(ATTR_COUNT), 1);
        assert_eq!(responses(&mut rx)[0].result, ResultType::DataInvalid);
        assert_eq!(stub.attribute_state(ATTR_COUNT), DataState::Invalid);
        assert!(stub.set_attribute(ATTR_COUNT, &3u32).unwrap());
    }

    #[test]
    fn remove_all_notify_drops_every_listener_of_the_proxy() {
        let (mut stub, _rx) = fixture();
        stub.begin_request(&request(proxy(1), ATTR_COUNT, 0, RequestKind::StartNotify));
        stub.begin_request(&request(proxy(1), REQ_HELLO, 1, RequestKind::Call));
        stub.begin_request(&request(proxy(2), ATTR_COUNT, 0, RequestKind::StartNotify));
        stub.begin_request(&request(proxy(1), MessageId::NOT_PROCESSED, 0, RequestKind::RemoveAllNotify));
        assert_eq!(stub.listener_count(ATTR_COUNT), 1);
        assert_eq!(stub.listener_count(RESP_HELLO), 0);
    }
}
