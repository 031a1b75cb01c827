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

//! Native scheduling calls. The only module that talks to the OS directly.

#![allow(unsafe_code)]

use std::thread::JoinHandle;

use crate::thread::ThreadPriority;

/// Applies `priority` to the thread behind `handle` within its current
/// scheduling policy. Returns `false` when the platform or the policy does not
/// allow it.
#[cfg(unix)]
pub(crate) fn apply_priority(handle: &JoinHandle<()>, priority: ThreadPriority) -> bool {
    use std::os::unix::thread::JoinHandleExt;

    let thread = handle.as_pthread_t();
    let mut policy: libc::c_int = 0;
    // SAFETY: `sched_param` is a plain C struct for which all-zero is valid.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };

    // SAFETY: `thread` comes from a JoinHandle we still hold, so the thread has
    // been neither joined nor detached and its pthread_t is live.
    let rc = unsafe { libc::pthread_getschedparam(thread, &mut policy, &mut param) };
    if rc != 0 {
        tracing::warn!(errno = rc, "pthread_getschedparam failed");
        return false;
    }

    // SAFETY: pure queries on a policy value returned by the kernel.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(policy),
            libc::sched_get_priority_max(policy),
        )
    };
    if min < 0 || max < 0 {
        tracing::warn!(policy, "scheduling policy reports no priority range");
        return false;
    }

    let Some(value) = priority.interpolate(min, max) else {
        return false;
    };
    param.sched_priority = value;

    // SAFETY: same live pthread_t as above; `param` is initialised.
    let rc = unsafe { libc::pthread_setschedparam(thread, policy, &param) };
    if rc != 0 {
        tracing::warn!(errno = rc, native = value, "pthread_setschedparam failed");
        return false;
    }
    true
}

#[cfg(not(unix))]
pub(crate) fn apply_priority(_handle: &JoinHandle<()>, _priority: ThreadPriority) -> bool {
    false
}

/// Makes `name` acceptable as a native thread name.
///
/// Interior NUL bytes are replaced, since the OS cannot represent them.
pub(crate) fn sanitize_name(name: &str) -> String {
    if name.contains('\0') {
        tracing::warn!(name = %name.escape_debug(), "thread name contains NUL bytes; replacing");
        name.replace('\0', "_")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_bytes_are_replaced_in_names() {
        assert_eq!(sanitize_name("a\0b"), "a_b");
        assert_eq!(sanitize_name("worker"), "worker");
    }

    #[cfg(unix)]
    #[test]
    fn normal_priority_applies_under_default_policy() {
        let handle = std::thread::spawn(|| std::thread::sleep(std::time::Duration::from_millis(50)));
        // SCHED_OTHER has a collapsed range, so every level maps to 0 and is accepted.
        assert!(apply_priority(&handle, ThreadPriority::Normal));
        assert!(!apply_priority(&handle, ThreadPriority::Undefined));
        handle.join().unwrap();
    }
}
