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
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use conduit::prelude::*;

use super::hello_service::*;

pub const SERVER_ROLE: &str = "hello_server";

/// Serves `HelloWorld`.
#[component]
pub struct HelloServer {
    served: u32,
}

impl HelloServer {
    pub fn new() -> Self {
        Self { served: 0 }
    }
}

impl Component for HelloServer {
    fn role(&self) -> &str {
        SERVER_ROLE
    }

    fn startup(&mut self, ctx: &mut ComponentContext<'_>) {
        ctx.provide_service(&DESCRIPTOR).expect("service provided");
        ctx.stub_mut(SERVICE_NAME)
            .expect("stub exists")
            .set_attribute(ATTRIBUTE_COUNT, &self.served)
            .expect("attribute set");
    }

    fn process_request(
        &mut self,
        ctx: &mut ComponentContext<'_>,
        call: &RequestCall,
    ) -> Result<(), ServiceFault> {
        let stub = ctx
            .stub_mut(SERVICE_NAME)
            .ok_or_else(|| ServiceFault::Failed("stub missing".into()))?;
        match call.message_id {
            REQUEST_HELLO => {
                let args: HelloArgs = call.args()?;
                self.served += 1;
                stub.send_response(
                    RESPONSE_HELLO,
                    &HelloReply {
                        greeting: format!("Hello, {}!", args.client),
                        served: self.served,
                    },
                )?;
                stub.set_attribute(ATTRIBUTE_COUNT, &self.served)?;
                Ok(())
            }
            REQUEST_REFUSE => Err(ServiceFault::Failed("refused".into())),
            REQUEST_SLOW => Ok(()),
            REQUEST_FOO => Err(ServiceFault::Failed("foo is not supported".into())),
            _ => Err(ServiceFault::Canceled),
        }
    }
}

/// A notification as seen by a [`Recorder`].
#[derive(Debug, Clone)]
pub struct Seen {
    pub role: String,
    pub event: NotificationEvent,
    pub reply: Option<HelloReply>,
    pub count: Option<u32>,
}

/// Client component reporting every notification it receives.
#[component]
pub struct Recorder {
    role: String,
    seen: Sender<Seen>,
}

impl Recorder {
    pub fn new(role: &str, seen: Sender<Seen>) -> Self {
        Self {
            role: role.to_string(),
            seen,
        }
    }
}

impl Component for Recorder {
    fn role(&self) -> &str {
        &self.role
    }

    fn on_notification(&mut self, ctx: &mut ComponentContext<'_>, event: &NotificationEvent) {
        let proxy = ctx.proxy(event.proxy);
        let reply = proxy
            .filter(|_| event.message_id == RESPONSE_HELLO && event.result.is_ok())
            .and_then(|proxy| proxy.response::<HelloReply>(RESPONSE_HELLO).ok());
        let count = proxy
            .filter(|_| event.message_id == ATTRIBUTE_COUNT && event.result.is_ok())
            .and_then(|proxy| proxy.attribute::<u32>(ATTRIBUTE_COUNT).ok());
        let _ = self.seen.send(Seen {
            role: self.role.clone(),
            event: event.clone(),
            reply,
            count,
        });
    }
}

/// Starts a counted timer on startup and reports each firing.
#[component]
pub struct Ticker {
    period: Duration,
    count: u32,
    fired: Sender<TimerEvent>,
}

impl Ticker {
    pub fn new(period: Duration, count: u32, fired: Sender<TimerEvent>) -> Self {
        Self {
            period,
            count,
            fired,
        }
    }
}

impl Component for Ticker {
    fn role(&self) -> &str {
        "ticker"
    }

    fn startup(&mut self, ctx: &mut ComponentContext<'_>) {
        ctx.start_timer("tick", self.period, self.count)
            .expect("timer started");
    }

    fn on_timer(&mut self, _ctx: &mut ComponentContext<'_>, event: &TimerEvent) {
        let _ = self.fired.send(event.clone());
    }
}

/// Receives the next item or fails after a generous timeout.
pub fn next<T>(rx: &Receiver<T>) -> anyhow::Result<T> {
    Ok(rx.recv_timeout(Duration::from_secs(5))?)
}

/// Asserts nothing more arrives within a short quiet period.
pub fn assert_quiet<T: std::fmt::Debug>(rx: &Receiver<T>) {
    match rx.recv_timeout(Duration::from_millis(100)) {
        Err(RecvTimeoutError::Timeout) => {}
        other => panic!("unexpected {other:?}"),
    }
}
