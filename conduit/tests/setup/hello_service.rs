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

//! The `HelloWorld` service, written the way a generated interface module
//! looks.

use conduit::prelude::*;

pub const SERVICE_NAME: &str = "HelloWorld";
pub const VERSION: InterfaceVersion = InterfaceVersion::new(1, 2, 0);

/// Greets the caller. Answered by [`RESPONSE_HELLO`].
pub const REQUEST_HELLO: MessageId = MessageId::request(0);
/// Always fails. Answered by [`RESPONSE_REFUSE`].
pub const REQUEST_REFUSE: MessageId = MessageId::request(1);
/// Accepted and never answered. Answered by [`RESPONSE_SLOW`].
pub const REQUEST_SLOW: MessageId = MessageId::request(2);
/// Fire-and-forget; its handler fails.
pub const REQUEST_FOO: MessageId = MessageId::request(3);

pub const RESPONSE_HELLO: MessageId = MessageId::response(0);
pub const RESPONSE_REFUSE: MessageId = MessageId::response(1);
pub const RESPONSE_SLOW: MessageId = MessageId::response(2);

/// Number of greetings served.
pub const ATTRIBUTE_COUNT: MessageId = MessageId::attribute(0);

const HELLO_WORLD: InterfaceDescriptor = InterfaceDescriptor {
    service_name: SERVICE_NAME,
    version: VERSION,
    requests: &[REQUEST_HELLO, REQUEST_REFUSE, REQUEST_SLOW, REQUEST_FOO],
    responses: &[RESPONSE_HELLO, RESPONSE_REFUSE, RESPONSE_SLOW],
    attributes: &[ATTRIBUTE_COUNT],
    request_map: &[
        (REQUEST_HELLO, RESPONSE_HELLO),
        (REQUEST_REFUSE, RESPONSE_REFUSE),
        (REQUEST_SLOW, RESPONSE_SLOW),
        (REQUEST_FOO, MessageId::NOT_PROCESSED),
    ],
    response_params: &[(RESPONSE_HELLO, 1), (RESPONSE_REFUSE, 0), (RESPONSE_SLOW, 0)],
};

pub static DESCRIPTOR: InterfaceDescriptor = HELLO_WORLD;

/// The same service as seen by a client built for an incompatible version.
pub static DESCRIPTOR_V2: InterfaceDescriptor = InterfaceDescriptor {
    version: InterfaceVersion::new(2, 0, 0),
    ..HELLO_WORLD
};

#[service_payload]
pub struct HelloArgs {
    pub client: String,
}

#[service_payload]
pub struct HelloReply {
    pub greeting: String,
    pub served: u32,
}
