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

/// Scheduling priority of a [`Thread`](super::Thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreadPriority {
    /// Bottom of the native range.
    Lowest,
    /// One quarter up the native range.
    Low,
    /// Middle of the native range.
    Normal,
    /// Three quarters up the native range.
    High,
    /// Top of the native range.
    Highest,
    /// The thread is not running, or the platform has no priorities.
    #[default]
    Undefined,
}

impl ThreadPriority {
    /// Position of the priority among the five levels, `None` for `Undefined`.
    #[must_use]
    pub const fn bucket(&self) -> Option<i32> {
        match self {
            Self::Lowest => Some(0),
            Self::Low => Some(1),
            Self::Normal => Some(2),
            Self::High => Some(3),
            Self::Highest => Some(4),
            Self::Undefined => None,
        }
    }

    /// Spreads the five levels evenly over the native `min..=max` range.
    ///
    /// Returns `None` for `Undefined`.
    #[must_use]
    pub fn interpolate(&self, min: i32, max: i32) -> Option<i32> {
        let bucket = self.bucket()?;
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        Some(low + (high - low) * bucket / 4)
    }
}
