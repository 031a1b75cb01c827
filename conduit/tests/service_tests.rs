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
#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver};

use conduit::prelude::*;

use crate::setup::components::{assert_quiet, next, HelloServer, Recorder, Seen, SERVER_ROLE};
use crate::setup::hello_service::*;
use crate::setup::initialize_tracing;

mod setup;

const SERVER: &str = "server_thread";
const CLIENT: &str = "client_thread";

/// A runtime with the hello server and one recorder per role in `clients`.
fn launch(clients: &[&str]) -> anyhow::Result<(Runtime, Receiver<Seen>)> {
    initialize_tracing();
    let (seen_tx, seen) = mpsc::channel();
    let runtime = Runtime::launch_with(ConduitConfig::default())?;
    runtime.spawn_dispatcher(SERVER, vec![Box::new(HelloServer::new())])?;
    let recorders: Vec<Box<dyn Component>> = clients
        .iter()
        .map(|role| Box::new(Recorder::new(role, seen_tx.clone())) as Box<dyn Component>)
        .collect();
    runtime.spawn_dispatcher(CLIENT, recorders)?;
    Ok((runtime, seen))
}

/// Runs `f` with a proxy to the hello server on behalf of `role` and returns
/// its result.
fn with_proxy<T, F>(runtime: &Runtime, role: &str, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut ComponentContext<'_>, ProxyId) -> Result<T, MessageError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    runtime.invoke(CLIENT, role, move |ctx| {
        let result = ctx
            .create_proxy(SERVER_ROLE, &DESCRIPTOR)
            .and_then(|proxy| f(ctx, proxy));
        let _ = tx.send(result);
    })?;
    Ok(next(&rx)??)
}

fn hello(runtime: &Runtime, role: &'static str) -> anyhow::Result<SequenceNumber> {
    with_proxy(runtime, role, move |ctx, proxy| {
        ctx.call(proxy, REQUEST_HELLO, &HelloArgs { client: role.into() })
    })
}

fn subscribe(runtime: &Runtime, role: &str) -> anyhow::Result<()> {
    with_proxy(runtime, role, |ctx, proxy| {
        ctx.set_notification(proxy, ATTRIBUTE_COUNT, false)
    })
}

/// Tests that each response reaches only the component that made the call,
/// tagged with that call's sequence number.
#[test]
fn test_request_response_correlation() -> anyhow::Result<()> {
    let (runtime, seen) = launch(&["client_a", "client_b"])?;

    let seq_a = hello(&runtime, "client_a")?;
    let seq_b = hello(&runtime, "client_b")?;
    assert_ne!(seq_a, 0);
    assert_ne!(seq_a, seq_b);

    for _ in 0..2 {
        let seen = next(&seen)?;
        assert_eq!(seen.event.message_id, RESPONSE_HELLO);
        assert_eq!(seen.event.request_id, REQUEST_HELLO);
        assert_eq!(seen.event.result, ResultType::RequestOk);
        let reply = seen.reply.ok_or_else(|| anyhow::anyhow!("no reply cached"))?;
        match seen.role.as_str() {
            "client_a" => {
                assert_eq!(seen.event.sequence_nr, seq_a);
                assert_eq!(reply.greeting, "Hello, client_a!");
                assert_eq!(reply.served, 1);
            }
            "client_b" => {
                assert_eq!(seen.event.sequence_nr, seq_b);
                assert_eq!(reply.greeting, "Hello, client_b!");
                assert_eq!(reply.served, 2);
            }
            other => panic!("unexpected recipient {other}"),
        }
    }
    assert_quiet(&seen);

    runtime.shutdown()?;
    Ok(())
}

/// Tests that setting an attribute to the value it already holds notifies
/// nobody.
#[test]
fn test_unchanged_attribute_is_not_broadcast() -> anyhow::Result<()> {
    let (runtime, seen) = launch(&["client_a"])?;

    subscribe(&runtime, "client_a")?;
    let initial = next(&seen)?;
    assert_eq!(initial.event.message_id, ATTRIBUTE_COUNT);
    assert_eq!(initial.event.result, ResultType::DataOk);
    assert_eq!(initial.event.sequence_nr, 0);
    assert_eq!(initial.count, Some(0));

    let (tx, rx) = mpsc::channel();
    runtime.invoke(SERVER, SERVER_ROLE, move |ctx| {
        let outcome = ctx.stub_mut(SERVICE_NAME).map(|stub| {
            (
                stub.set_attribute(ATTRIBUTE_COUNT, &5u32),
                stub.set_attribute(ATTRIBUTE_COUNT, &5u32),
            )
        });
        let _ = tx.send(outcome);
    })?;
    let (first, second) = next(&rx)?.ok_or_else(|| anyhow::anyhow!("stub missing"))?;
    assert!(first?);
    assert!(!second?);

    let update = next(&seen)?;
    assert_eq!(update.count, Some(5));
    assert_quiet(&seen);

    runtime.shutdown()?;
    Ok(())
}

/// Tests that a component subscribing after another one is served the cached
/// value by its proxy.
#[test]
fn test_late_subscriber_gets_cached_value() -> anyhow::Result<()> {
    let (runtime, seen) = launch(&["client_a", "client_b"])?;

    subscribe(&runtime, "client_a")?;
    let first = next(&seen)?;
    assert_eq!(first.role, "client_a");
    assert_eq!(first.count, Some(0));

    subscribe(&runtime, "client_b")?;
    let late = next(&seen)?;
    assert_eq!(late.role, "client_b");
    assert_eq!(late.event.message_id, ATTRIBUTE_COUNT);
    assert_eq!(late.event.result, ResultType::DataOk);
    assert_eq!(late.count, Some(0));
    assert_quiet(&seen);

    hello(&runtime, "client_a")?;
    let mut updates = 0;
    let mut responses = 0;
    for _ in 0..3 {
        let seen = next(&seen)?;
        if seen.event.message_id == ATTRIBUTE_COUNT {
            assert_eq!(seen.count, Some(1));
            updates += 1;
        } else {
            assert_eq!(seen.role, "client_a");
            responses += 1;
        }
    }
    assert_eq!((updates, responses), (2, 1));
    assert_quiet(&seen);

    runtime.shutdown()?;
    Ok(())
}

/// Tests failure reporting: a failing request with a response reports
/// `RequestError` to its caller; a failing fire-and-forget request reports
/// nothing.
#[test]
fn test_failed_requests() -> anyhow::Result<()> {
    let (runtime, seen) = launch(&["client_a"])?;

    let (refused, foo) = with_proxy(&runtime, "client_a", |ctx, proxy| {
        let refused = ctx.call(proxy, REQUEST_REFUSE, &())?;
        let foo = ctx.call(proxy, REQUEST_FOO, &())?;
        Ok((refused, foo))
    })?;
    assert_ne!(refused, 0);
    assert_eq!(foo, 0);

    let failure = next(&seen)?;
    assert_eq!(failure.event.message_id, RESPONSE_REFUSE);
    assert_eq!(failure.event.request_id, REQUEST_REFUSE);
    assert_eq!(failure.event.result, ResultType::RequestError);
    assert_eq!(failure.event.sequence_nr, refused);
    assert_quiet(&seen);

    runtime.shutdown()?;
    Ok(())
}

/// Tests the busy guard, cancellation of pending calls when the server goes
/// away, and undelivered requests afterwards.
#[test]
fn test_busy_cancel_and_undelivered() -> anyhow::Result<()> {
    let (runtime, seen) = launch(&["client_a"])?;

    let (pending, busy) = with_proxy(&runtime, "client_a", |ctx, proxy| {
        let pending = ctx.call(proxy, REQUEST_SLOW, &())?;
        let busy = ctx.call(proxy, REQUEST_SLOW, &())?;
        Ok((pending, busy))
    })?;

    let rejected = next(&seen)?;
    assert_eq!(rejected.event.message_id, RESPONSE_SLOW);
    assert_eq!(rejected.event.result, ResultType::RequestBusy);
    assert_eq!(rejected.event.sequence_nr, busy);
    assert_quiet(&seen);

    assert_eq!(runtime.stop_dispatcher(SERVER)?, ThreadCompletion::Completed);
    let canceled = next(&seen)?;
    assert_eq!(canceled.event.message_id, RESPONSE_SLOW);
    assert_eq!(canceled.event.result, ResultType::RequestCanceled);
    assert_eq!(canceled.event.sequence_nr, pending);

    let orphan = hello(&runtime, "client_a")?;
    let undelivered = next(&seen)?;
    assert_eq!(undelivered.event.message_id, RESPONSE_HELLO);
    assert_eq!(undelivered.event.request_id, REQUEST_HELLO);
    assert_eq!(undelivered.event.result, ResultType::MessageUndelivered);
    assert_eq!(undelivered.event.sequence_nr, orphan);
    assert_quiet(&seen);

    runtime.shutdown()?;
    Ok(())
}

/// Tests proxy creation failures and calls outside the interface.
#[test]
fn test_proxy_errors() -> anyhow::Result<()> {
    let (runtime, _seen) = launch(&["client_a"])?;

    let (tx, rx) = mpsc::channel();
    runtime.invoke(CLIENT, "client_a", move |ctx| {
        let incompatible = ctx.create_proxy(SERVER_ROLE, &DESCRIPTOR_V2);
        let missing = ctx.create_proxy("nobody", &DESCRIPTOR);
        let first = ctx.create_proxy(SERVER_ROLE, &DESCRIPTOR);
        let again = ctx.create_proxy(SERVER_ROLE, &DESCRIPTOR);
        let unknown = first
            .clone()
            .and_then(|proxy| ctx.call(proxy, MessageId::request(9), &()));
        let _ = tx.send((incompatible, missing, first, again, unknown));
    })?;
    let (incompatible, missing, first, again, unknown) = next(&rx)?;

    assert!(matches!(incompatible, Err(MessageError::IncompatibleVersion { .. })));
    assert!(matches!(missing, Err(MessageError::UnknownService { .. })));
    assert_eq!(first?, again?);
    assert!(matches!(unknown, Err(MessageError::UnknownMessage { .. })));

    assert!(matches!(
        runtime.invoke("no_such_thread", "client_a", |_| {}),
        Err(RuntimeError::UnknownDispatcher(_))
    ));
    assert!(matches!(
        runtime.spawn_dispatcher(SERVER, vec![Box::new(HelloServer::new())]),
        Err(RuntimeError::DispatcherStart(_))
    ));

    runtime.shutdown()?;
    Ok(())
}
