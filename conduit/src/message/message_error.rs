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

use thiserror::Error;

use crate::common::ProxyId;
use crate::message::{InterfaceVersion, MessageId, MessageKind};

/// Errors raised on the local side of the messaging layer.
///
/// Failures that cross the proxy/stub boundary travel as
/// [`ResultType`](super::ResultType) values instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Arguments could not be written to an argument stream.
    #[error("failed to encode arguments: {0}")]
    Encode(String),
    /// An argument stream does not hold the expected payload.
    #[error("failed to decode arguments: {0}")]
    Decode(String),
    /// The id is not of the kind the operation needs.
    #[error("message {id} is not a {expected:?}")]
    UnexpectedKind {
        /// Offending id.
        id: MessageId,
        /// Kind the operation needs.
        expected: MessageKind,
    },
    /// The id is not part of the service interface.
    #[error("message {id} is not part of service {service}")]
    UnknownMessage {
        /// Offending id.
        id: MessageId,
        /// Service name.
        service: &'static str,
    },
    /// No proxy with this id in the dispatcher.
    #[error("unknown proxy {0}")]
    UnknownProxy(ProxyId),
    /// No stub provides the service under this role.
    #[error("no stub provides {service} as {role}")]
    UnknownService {
        /// Role name.
        role: String,
        /// Service name.
        service: String,
    },
    /// A stub for this role and service already exists.
    #[error("{service} is already provided as {role}")]
    DuplicateService {
        /// Role name.
        role: String,
        /// Service name.
        service: String,
    },
    /// The stub implements an incompatible interface version.
    #[error("{service} version {provided} is incompatible with {expected}")]
    IncompatibleVersion {
        /// Service name.
        service: String,
        /// Version the proxy was generated for.
        expected: InterfaceVersion,
        /// Version the stub implements.
        provided: InterfaceVersion,
    },
    /// The target dispatcher is not reachable.
    #[error("dispatcher {0} is not connected")]
    NotConnected(String),
    /// The cached value has not been received or is invalid.
    #[error("message {0} has no valid data")]
    NoData(MessageId),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MessageError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::NotConnected("channel closed".into())
    }
}
