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

//! Dispatcher threads, the components they host, and the router between them.

pub use component::{Component, ComponentContext};
pub use dispatcher::Dispatcher;
pub use router::{ComponentAction, DispatchItem, Router};
pub use runtime::{Runtime, RuntimeError};

#[allow(clippy::module_inception)]
mod component;
mod dispatcher;
mod router;
mod runtime;
