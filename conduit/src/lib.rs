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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Conduit
//!
//! An event-driven messaging framework built on OS threads.
//!
//! ## Key Concepts
//!
//! - **Threads (`Thread`)**: named OS threads driving a `ThreadConsumer`, with
//!   bounded start/stop waits, priorities, and per-thread storage that binds the
//!   consumer to the thread running it.
//! - **Registry (`ThreadRegistry`)**: live threads addressable by OS handle,
//!   name and number.
//! - **Timers (`TimerManager`)**: one-shot, counted and continuous timers fired on
//!   a dedicated thread and delivered to the owning dispatcher.
//! - **Services (`Stub`, `Proxy`)**: a stub holds a service's attributes and
//!   answers requests; proxies call it, cache what it answers and notify the
//!   components listening on them.
//! - **Dispatchers (`Dispatcher`, `Component`)**: single-threaded event loops
//!   hosting components, connected by a `Router`.
//! - **Runtime (`Runtime`)**: launches the timer thread and dispatchers, and
//!   shuts them down.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//!
//! #[component]
//! struct Greeter;
//!
//! impl Component for Greeter {
//!     fn role(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn startup(&mut self, ctx: &mut ComponentContext<'_>) {
//!         let _ = ctx.provide_service(&hello::DESCRIPTOR);
//!     }
//! }
//!
//! let runtime = Runtime::launch()?;
//! runtime.spawn_dispatcher("greeter_thread", vec![Box::new(Greeter)])?;
//! runtime.shutdown()?;
//! ```

/// Configuration, logging, process identity and shared small types.
pub mod common;

/// Threads, their consumers, thread-local storage and the thread registry.
pub mod thread;

/// Timers and the timer thread.
pub mod timer;

/// Message ids, events, argument streams and service interfaces.
pub mod message;

/// Proxies and stubs.
pub mod service;

/// Dispatchers, components, routing and the runtime.
pub mod component;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `conduit-macro`)
/// *   [`conduit_macro::service_payload`]: Attribute macro for service payload types.
/// *   [`conduit_macro::component`]: Attribute macro for component state types.
///
/// ## Core Types
/// *   [`crate::component::Runtime`]: Launches and shuts down the framework.
/// *   [`crate::component::Component`] and [`crate::component::ComponentContext`]: user code and its view of the dispatcher.
/// *   [`crate::thread::Thread`] and [`crate::thread::ThreadConsumer`]: OS threads and what they run.
/// *   [`crate::service::Proxy`] and [`crate::service::Stub`]: the two ends of a service.
/// *   [`crate::message::MessageId`], [`crate::message::ResultType`] and friends.
pub mod prelude {
    pub use conduit_macro::{component, service_payload};

    pub use crate::common::{ComponentId, ConduitConfig, ProxyId, SyncEvent, TimerId, Wait};
    pub use crate::component::{Component, ComponentContext, Router, Runtime, RuntimeError};
    pub use crate::message::{
        ArgumentStream, DataState, InterfaceDescriptor, InterfaceVersion, MessageError,
        MessageId, NotificationEvent, ResultType, SequenceNumber,
    };
    pub use crate::service::{Proxy, RequestCall, ServiceFault, Stub};
    pub use crate::thread::{
        current_consumer, ExitCode, Thread, ThreadCompletion, ThreadConsumer, ThreadInfo,
        ThreadPriority, ThreadRegistry,
    };
    pub use crate::timer::{TimerEvent, CONTINUOUSLY};
    pub use tokio_util::sync::CancellationToken;
}

static_assertions::assert_impl_all!(thread::Thread: Send, Sync);
static_assertions::assert_impl_all!(thread::ThreadRegistry: Send, Sync);
static_assertions::assert_impl_all!(component::Router: Send, Sync, Clone);
static_assertions::assert_impl_all!(component::Dispatcher: Send, Sync);
static_assertions::assert_impl_all!(timer::TimerManager: Send, Sync, Clone);
static_assertions::assert_impl_all!(message::RequestEvent: Send, Clone);
