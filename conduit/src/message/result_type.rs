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

use serde::{Deserialize, Serialize};

/// Outcome carried by every response and notification.
///
/// This is the only error channel between proxies and stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultType {
    /// A request completed and its response parameters are valid.
    RequestOk,
    /// An attribute value is valid.
    DataOk,
    /// An attribute was invalidated by the server.
    DataInvalid,
    /// The message is not understood by the receiver.
    RequestInvalid,
    /// The server failed to process the request.
    RequestError,
    /// The same client already has this request pending.
    RequestBusy,
    /// The server cancelled the request.
    RequestCanceled,
    /// The message could not be delivered to its target.
    MessageUndelivered,
}

impl ResultType {
    /// Whether the result carries valid data.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::RequestOk | Self::DataOk)
    }

    /// Whether the result reports a failed request that maps to a response.
    #[must_use]
    pub const fn is_request_failure(&self) -> bool {
        matches!(
            self,
            Self::RequestBusy | Self::RequestError | Self::RequestCanceled
        )
    }
}

/// Validity of a cached attribute or response parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataState {
    /// Never received.
    #[default]
    Undefined,
    /// The cached value is current.
    Ok,
    /// The last update failed or invalidated the value.
    Invalid,
}

impl DataState {
    /// Whether the cached value can be read.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Ok)
    }
}
