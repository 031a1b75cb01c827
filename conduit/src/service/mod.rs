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

//! Proxies and stubs: the two ends of a service.
//!
//! A [`Stub`] holds a service's authoritative attribute values and answers
//! requests; a [`Proxy`] calls it, caches what it answers and notifies the
//! components listening on it. Both are owned by one dispatcher thread and
//! exchange [`RequestEvent`](crate::message::RequestEvent)s and
//! [`ResponseEvent`](crate::message::ResponseEvent)s through the
//! [`Router`](crate::component::Router).

pub use listener::{CachedValue, ProxyListener, StubListener};
pub use proxy::Proxy;
pub use stub::{RequestCall, ServiceFault, Stub};

mod listener;
mod proxy;
mod stub;
