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

use serde::de::DeserializeOwned;

use crate::common::ComponentId;
use crate::message::{ArgumentStream, DataState, MessageError, MessageId, ProxyAddress, SequenceNumber};

/// A proxy waiting on a stub's response or attribute.
///
/// One-shot listeners stand for a single pending call and are dropped once
/// answered; the others are subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubListener {
    /// Waiting proxy.
    pub proxy: ProxyAddress,
    /// Sequence number echoed back, `0` for subscriptions.
    pub sequence_nr: SequenceNumber,
    /// Whether the listener stands for one call.
    pub one_shot: bool,
}

impl StubListener {
    /// A pending call.
    #[must_use]
    pub fn call(proxy: ProxyAddress, sequence_nr: SequenceNumber) -> Self {
        Self {
            proxy,
            sequence_nr,
            one_shot: true,
        }
    }

    /// A subscription.
    #[must_use]
    pub fn subscription(proxy: ProxyAddress) -> Self {
        Self {
            proxy,
            sequence_nr: 0,
            one_shot: false,
        }
    }
}

/// A component waiting on a proxy's response or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyListener {
    /// Notified component.
    pub consumer: ComponentId,
    /// Sequence number of the pending call, `0` for subscriptions.
    pub sequence_nr: SequenceNumber,
    /// Whether the listener stands for one call.
    pub one_shot: bool,
}

impl ProxyListener {
    /// A pending call.
    #[must_use]
    pub const fn call(consumer: ComponentId, sequence_nr: SequenceNumber) -> Self {
        Self {
            consumer,
            sequence_nr,
            one_shot: true,
        }
    }

    /// A subscription.
    #[must_use]
    pub const fn subscription(consumer: ComponentId) -> Self {
        Self {
            consumer,
            sequence_nr: 0,
            one_shot: false,
        }
    }
}

/// A cached attribute value or response parameter set with its validity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedValue {
    /// Encoded value.
    pub args: ArgumentStream,
    /// Validity.
    pub state: DataState,
}

impl CachedValue {
    /// A valid value.
    #[must_use]
    pub fn valid(args: ArgumentStream) -> Self {
        Self {
            args,
            state: DataState::Ok,
        }
    }

    /// Whether the value is valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Decodes the value if it is valid.
    ///
    /// # Errors
    ///
    /// [`MessageError::NoData`] when not valid, [`MessageError::Decode`] when
    /// the bytes do not decode as `T`.
    pub fn decode<T: DeserializeOwned>(&self, id: MessageId) -> Result<T, MessageError> {
        if !self.is_valid() {
            return Err(MessageError::NoData(id));
        }
        self.args.decode()
    }
}
