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

//! Static description of a service interface.
//!
//! A generated service module exposes its name, its version, its message ids
//! and one [`InterfaceDescriptor`] tying them together:
//!
//! ```ignore
//! pub const SERVICE_NAME: &str = "HelloService";
//! pub const VERSION: InterfaceVersion = InterfaceVersion::new(1, 0, 0);
//!
//! pub const REQUEST_HELLO: MessageId = MessageId::request(0);
//! pub const RESPONSE_HELLO: MessageId = MessageId::response(0);
//!
//! pub static DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
//!     service_name: SERVICE_NAME,
//!     version: VERSION,
//!     requests: &[REQUEST_HELLO],
//!     responses: &[RESPONSE_HELLO],
//!     attributes: &[],
//!     request_map: &[(REQUEST_HELLO, RESPONSE_HELLO)],
//!     response_params: &[(RESPONSE_HELLO, 1)],
//! };
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::{MessageError, MessageId, MessageKind};

/// Semantic version of a service interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceVersion {
    /// Incompatible changes.
    pub major: u16,
    /// Compatible additions.
    pub minor: u16,
    /// Fixes.
    pub patch: u16,
}

impl InterfaceVersion {
    /// Builds a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a stub implementing `self` can serve a proxy built for
    /// `required`: same major, and at least the required minor.
    #[must_use]
    pub const fn is_compatible_with(&self, required: &Self) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The table a generated service module provides.
#[derive(Debug)]
pub struct InterfaceDescriptor {
    /// Service name.
    pub service_name: &'static str,
    /// Interface version.
    pub version: InterfaceVersion,
    /// Request ids.
    pub requests: &'static [MessageId],
    /// Response ids.
    pub responses: &'static [MessageId],
    /// Attribute ids.
    pub attributes: &'static [MessageId],
    /// Every request paired with its response, or with
    /// [`MessageId::NOT_PROCESSED`] for requests without one.
    pub request_map: &'static [(MessageId, MessageId)],
    /// Number of parameters each response carries.
    pub response_params: &'static [(MessageId, u32)],
}

impl InterfaceDescriptor {
    /// The response answering `request`.
    ///
    /// [`MessageId::NOT_PROCESSED`] for a request without a response and
    /// [`MessageId::INVALID`] for an id that is not a request of this service.
    #[must_use]
    pub fn response_id(&self, request: MessageId) -> MessageId {
        self.request_map
            .iter()
            .find(|(req, _)| *req == request)
            .map_or(MessageId::INVALID, |(_, resp)| *resp)
    }

    /// The first request answered by `response`, or
    /// [`MessageId::NOT_PROCESSED`] when the response is a pure broadcast.
    #[must_use]
    pub fn request_id(&self, response: MessageId) -> MessageId {
        self.request_map
            .iter()
            .find(|(_, resp)| *resp == response)
            .map_or(MessageId::NOT_PROCESSED, |(req, _)| *req)
    }

    /// Number of parameters carried by `response`.
    #[must_use]
    pub fn param_count(&self, response: MessageId) -> Option<u32> {
        self.response_params
            .iter()
            .find(|(resp, _)| *resp == response)
            .map(|(_, count)| *count)
    }

    /// Whether `id` is a request of this service.
    #[must_use]
    pub fn has_request(&self, id: MessageId) -> bool {
        self.requests.contains(&id)
    }

    /// Whether `id` is a response of this service.
    #[must_use]
    pub fn has_response(&self, id: MessageId) -> bool {
        self.responses.contains(&id)
    }

    /// Whether `id` is an attribute of this service.
    #[must_use]
    pub fn has_attribute(&self, id: MessageId) -> bool {
        self.attributes.contains(&id)
    }

    /// The kind of `id` within this service, [`MessageKind::Invalid`] when the
    /// service does not declare it.
    #[must_use]
    pub fn kind_of(&self, id: MessageId) -> MessageKind {
        if self.has_request(id) {
            MessageKind::Request
        } else if self.has_response(id) {
            MessageKind::Response
        } else if self.has_attribute(id) {
            MessageKind::Attribute
        } else if id.is_not_processed() {
            MessageKind::NotProcessed
        } else {
            MessageKind::Invalid
        }
    }

    /// Checks that the tables agree with each other and with the id ranges.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), MessageError> {
        let check = |ids: &[MessageId], expected: MessageKind| {
            ids.iter().try_for_each(|id| {
                if id.kind() == expected {
                    Ok(())
                } else {
                    Err(MessageError::UnexpectedKind { id: *id, expected })
                }
            })
        };
        check(self.requests, MessageKind::Request)?;
        check(self.responses, MessageKind::Response)?;
        check(self.attributes, MessageKind::Attribute)?;

        for request in self.requests {
            let response = self.response_id(*request);
            if response == MessageId::INVALID {
                return Err(MessageError::UnknownMessage {
                    id: *request,
                    service: self.service_name,
                });
            }
            if !response.is_not_processed() && !self.has_response(response) {
                return Err(MessageError::UnknownMessage {
                    id: response,
                    service: self.service_name,
                });
            }
        }
        Ok(())
    }
}
