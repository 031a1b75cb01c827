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

/// Where a [`Thread`](super::Thread) is in its registration lifecycle.
///
/// ```text
/// Created -> Registering -> Registered -> Destroyed
///                       \-> RegistrationFailed -> Destroyed
/// ```
///
/// A stopped thread may be started again, which moves it back to `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegistrationState {
    /// Constructed, or reset for a new start. Nothing is spawned.
    #[default]
    Created,
    /// The OS thread exists and is being entered into the registry.
    Registering,
    /// Registered and accepted by the consumer's `on_registered` hook.
    Registered,
    /// The registry or the consumer refused the thread; it was rolled back.
    RegistrationFailed,
    /// Unregistered by `stop`.
    Destroyed,
}

impl RegistrationState {
    /// Whether moving from `self` to `next` is a legal step.
    #[must_use]
    pub const fn can_transition(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Registering)
                | (Self::Registering, Self::Registered)
                | (Self::Registering, Self::RegistrationFailed)
                | (Self::Registered, Self::Destroyed)
                | (Self::RegistrationFailed, Self::Destroyed)
                | (Self::Destroyed, Self::Created)
                | (Self::RegistrationFailed, Self::Created)
        )
    }
}

/// How a [`Thread::stop`](super::Thread::stop) call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadCompletion {
    /// The thread was not stopped in time and has been abandoned.
    Terminated,
    /// The thread finished, or the caller chose not to wait.
    Completed,
    /// There was no live thread to stop.
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_path_is_a_legal_transition() {
        let state = RegistrationState::Registering;
        assert!(state.can_transition(RegistrationState::RegistrationFailed));
        assert!(RegistrationState::RegistrationFailed.can_transition(RegistrationState::Destroyed));
        assert!(!RegistrationState::Created.can_transition(RegistrationState::Registered));
        assert!(!RegistrationState::Destroyed.can_transition(RegistrationState::Registered));
    }
}
