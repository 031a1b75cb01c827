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

//! Timers fired on a dedicated thread and delivered to dispatchers.

pub use timer::{Timer, TimerControl, TimerEvent, CONTINUOUSLY};
pub use timer_info::{
    join_time, split_time, utc_now_micros, ExpiredTimerInfo, TimerInfo, TimerState,
};
pub use timer_manager::{TimerError, TimerManager};
pub use timer_table::{ExpiredTimers, TimerTable};

#[allow(clippy::module_inception)]
mod timer;
mod timer_info;
mod timer_manager;
mod timer_table;
