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

//! Message ids, interface descriptors and the events exchanged between
//! proxies and stubs.
//!
//! # Key Re-exported Components:
//!
//! *   [`MessageId`]: Partitioned id space of a service interface.
//! *   [`InterfaceDescriptor`]: The static table a generated service provides.
//! *   [`RequestEvent`], [`ResponseEvent`], [`NotificationEvent`]: Value objects
//!     routed between dispatcher threads.
//! *   [`ResultType`]: Outcome carried by responses and notifications.

// --- Public Re-exports ---
pub use address::{ProxyAddress, ServiceKey, StubAddress};
pub use argument_stream::ArgumentStream;
pub use events::{NotificationEvent, RequestEvent, RequestKind, ResponseEvent};
pub use interface::{InterfaceDescriptor, InterfaceVersion};
pub use message_error::MessageError;
pub use message_id::{MessageId, MessageKind, SequenceNumber};
pub use result_type::{DataState, ResultType};

// --- Submodules ---

mod address;
mod argument_stream;
mod events;
pub mod interface;
mod message_error;
mod message_id;
mod result_type;
