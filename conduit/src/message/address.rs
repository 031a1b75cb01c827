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

use crate::common::ProxyId;
use crate::message::InterfaceVersion;

/// Service identity: the role a component plays and the interface it serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    /// Role name of the providing component.
    pub role: String,
    /// Service interface name.
    pub service: String,
}

impl ServiceKey {
    /// Builds a key.
    pub fn new(role: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.service)
    }
}

/// Where a stub lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubAddress {
    /// Role and service.
    pub key: ServiceKey,
    /// Implemented interface version.
    pub version: InterfaceVersion,
    /// Name of the dispatcher thread hosting the stub.
    pub dispatcher: String,
}

impl StubAddress {
    /// Role name.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.key.role
    }

    /// Service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.key.service
    }
}

impl fmt::Display for StubAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub {}@{} v{}", self.key, self.dispatcher, self.version)
    }
}

/// Where a proxy lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyAddress {
    /// Role and service the proxy is connected to.
    pub key: ServiceKey,
    /// Name of the dispatcher thread hosting the proxy.
    pub dispatcher: String,
    /// Proxy id within its dispatcher.
    pub proxy: ProxyId,
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy #{} {}@{}", self.proxy, self.key, self.dispatcher)
    }
}
