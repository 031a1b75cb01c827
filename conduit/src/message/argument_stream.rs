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
use serde::Serialize;

use crate::message::MessageError;

/// Opaque serialized arguments of a request, response or attribute.
///
/// Payloads are written as `MessagePack` arrays, one element per field in
/// declaration order, so both sides only need to agree on the field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentStream(Vec<u8>);

impl ArgumentStream {
    /// A stream carrying no arguments.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Serializes `value`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Encode`] if the value cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, MessageError> {
        rmp_serde::to_vec(value)
            .map(Self)
            .map_err(|e| MessageError::Encode(e.to_string()))
    }

    /// Deserializes the stream as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Decode`] if the stream is empty or holds a
    /// different payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        if self.0.is_empty() {
            return Err(MessageError::Decode("empty argument stream".into()));
        }
        rmp_serde::from_slice(&self.0).map_err(|e| MessageError::Decode(e.to_string()))
    }

    /// Whether the stream carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ArgumentStream {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
