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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-proxy counter correlating a request with its reply. `0` means none.
///
/// 64 bits wide so a proxy never exhausts it and numbers stay strictly
/// increasing.
pub type SequenceNumber = u64;

/// Identifies a request, response or attribute within one service interface.
///
/// The id space is split into contiguous ranges:
///
/// | Range | Kind |
/// |---|---|
/// | `0` | [`MessageId::NOT_PROCESSED`] |
/// | `0x1000..0x2000` | requests |
/// | `0x2000..0x3000` | responses |
/// | `0x3000..0x4000` | attributes |
/// | `u32::MAX` | [`MessageId::INVALID`] |
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u32);

/// The range a [`MessageId`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client-to-server call.
    Request,
    /// Server-to-client reply or broadcast.
    Response,
    /// Subscribable server-side value.
    Attribute,
    /// "No message": a request that has no response.
    NotProcessed,
    /// Outside every range.
    Invalid,
}

impl MessageId {
    /// Placeholder for "no response".
    pub const NOT_PROCESSED: Self = Self(0);
    /// Never a valid message.
    pub const INVALID: Self = Self(u32::MAX);

    /// First id of the request range.
    pub const FIRST_REQUEST: u32 = 0x0000_1000;
    /// First id of the response range.
    pub const FIRST_RESPONSE: u32 = 0x0000_2000;
    /// First id of the attribute range.
    pub const FIRST_ATTRIBUTE: u32 = 0x0000_3000;
    /// One past the last attribute id.
    pub const END_ATTRIBUTE: u32 = 0x0000_4000;
    /// Number of ids in each range; indexes must stay below it.
    pub const RANGE_WIDTH: u32 = Self::FIRST_RESPONSE - Self::FIRST_REQUEST;

    /// The `index`-th request id of an interface.
    #[must_use]
    pub const fn request(index: u32) -> Self {
        debug_assert!(index < Self::RANGE_WIDTH, "request index out of range");
        Self(Self::FIRST_REQUEST + index)
    }

    /// The `index`-th response id of an interface.
    #[must_use]
    pub const fn response(index: u32) -> Self {
        debug_assert!(index < Self::RANGE_WIDTH, "response index out of range");
        Self(Self::FIRST_RESPONSE + index)
    }

    /// The `index`-th attribute id of an interface.
    #[must_use]
    pub const fn attribute(index: u32) -> Self {
        debug_assert!(index < Self::RANGE_WIDTH, "attribute index out of range");
        Self(Self::FIRST_ATTRIBUTE + index)
    }

    /// Wraps a raw id.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// The raw id.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Which range the id belongs to.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self.0 {
            0 => MessageKind::NotProcessed,
            v if v >= Self::FIRST_REQUEST && v < Self::FIRST_RESPONSE => MessageKind::Request,
            v if v >= Self::FIRST_RESPONSE && v < Self::FIRST_ATTRIBUTE => MessageKind::Response,
            v if v >= Self::FIRST_ATTRIBUTE && v < Self::END_ATTRIBUTE => MessageKind::Attribute,
            _ => MessageKind::Invalid,
        }
    }

    /// Whether the id is in the request range.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self.kind(), MessageKind::Request)
    }

    /// Whether the id is in the response range.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self.kind(), MessageKind::Response)
    }

    /// Whether the id is in the attribute range.
    #[must_use]
    pub const fn is_attribute(&self) -> bool {
        matches!(self.kind(), MessageKind::Attribute)
    }

    /// Whether the id is [`MessageId::NOT_PROCESSED`].
    #[must_use]
    pub const fn is_not_processed(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({:#06x})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
