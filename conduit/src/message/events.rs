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

use derive_new::new;

use crate::common::{ComponentId, ProxyId};
use crate::message::{
    ArgumentStream, MessageId, ProxyAddress, ResultType, SequenceNumber, StubAddress,
};

/// What a [`RequestEvent`] asks the stub to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Run the request handler.
    Call,
    /// Start sending updates of the message to the proxy.
    StartNotify,
    /// Stop sending updates of the message to the proxy.
    StopNotify,
    /// Drop every subscription and pending reply of the proxy.
    RemoveAllNotify,
}

/// Proxy to stub.
#[derive(new, Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Calling proxy.
    pub source: ProxyAddress,
    /// Target stub.
    pub target: StubAddress,
    /// Request, or the subscribed id for notify kinds.
    pub message_id: MessageId,
    /// Caller's sequence number, `0` for fire-and-forget and notify kinds.
    pub sequence_nr: SequenceNumber,
    /// What to do.
    pub kind: RequestKind,
    /// Call arguments.
    pub args: ArgumentStream,
}

/// Stub to proxy.
#[derive(new, Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    /// Answering stub.
    pub source: StubAddress,
    /// Receiving proxy.
    pub target: ProxyAddress,
    /// Response, attribute, or the failed request.
    pub message_id: MessageId,
    /// Outcome.
    pub result: ResultType,
    /// Sequence number of the request being answered, `0` for broadcasts.
    pub sequence_nr: SequenceNumber,
    /// Response parameters or attribute value.
    pub args: ArgumentStream,
}

/// Proxy to one of its consumers, on the proxy's dispatcher thread.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Notifying proxy.
    pub proxy: ProxyId,
    /// Component being notified.
    pub consumer: ComponentId,
    /// Response or attribute the notification is about.
    pub message_id: MessageId,
    /// Request that produced it, [`MessageId::NOT_PROCESSED`] for broadcasts
    /// and attribute updates.
    pub request_id: MessageId,
    /// Outcome.
    pub result: ResultType,
    /// Sequence number of the originating request, `0` for broadcasts.
    pub sequence_nr: SequenceNumber,
}
