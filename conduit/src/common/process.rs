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

//! Identity of the running process.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use tracing::trace;

/// Placeholder replaced by the executable name in path templates.
pub const TEMPLATE_APP_NAME: &str = "%appname%";
/// Placeholder replaced by the process id in path templates.
pub const TEMPLATE_PROCESS_ID: &str = "%pid%";

lazy_static! {
    static ref CURRENT: Process = Process::detect();
}

/// The current process: id, executable name and location.
///
/// Obtained through [`Process::current`], which builds the value on first use
/// and keeps it for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Process {
    id: u32,
    name: String,
    path: PathBuf,
    directory: PathBuf,
}

impl Process {
    /// Returns the process-wide identity.
    pub fn current() -> &'static Self {
        &CURRENT
    }

    fn detect() -> Self {
        let path = std::env::current_exe().unwrap_or_default();
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("conduit")
            .to_string();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let process = Self {
            id: std::process::id(),
            name,
            path,
            directory,
        };
        trace!(pid = process.id, name = %process.name, "Detected process identity");
        process
    }

    /// The OS process id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// The executable name without extension.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the executable.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the executable.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reads an environment variable of this process.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    /// Replaces `%appname%` and `%pid%` in `template`.
    #[must_use]
    pub fn expand_template(&self, template: &str) -> String {
        template
            .replace(TEMPLATE_APP_NAME, &self.name)
            .replace(TEMPLATE_PROCESS_ID, &self.id.to_string())
    }
}
