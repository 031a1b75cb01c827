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

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{trace, warn};

use crate::common::ThreadNumber;
use crate::thread::Thread;

/// Errors raised when entering resources into a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The key is already taken by a live resource.
    #[error("{registry} already contains key {key}")]
    DuplicateKey {
        /// Which registry refused the key.
        registry: &'static str,
        /// The key, formatted with `Debug`.
        key: String,
    },
}

/// A lock-guarded map from a key to a borrowed resource handle.
///
/// Every operation takes the single registry-wide lock. Iterating callers take
/// it explicitly with [`lock`](Self::lock) for the whole iteration.
#[derive(Debug)]
pub struct ResourceRegistry<K, V> {
    label: &'static str,
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> ResourceRegistry<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    /// Creates an empty registry; `label` names it in errors and logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if `key` is present; the
    /// existing entry is left in place.
    pub fn register(&self, key: K, value: V) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            warn!(registry = self.label, ?key, "duplicate registration refused");
            return Err(RegistryError::DuplicateKey {
                registry: self.label,
                key: format!("{key:?}"),
            });
        }
        trace!(registry = self.label, ?key, "registered");
        entries.insert(key, value);
        Ok(())
    }

    /// Removes and returns the entry under `key`. Absent keys are a no-op.
    pub fn unregister<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let removed = entries.remove(key);
        if entries.is_empty() {
            entries.shrink_to_fit();
        }
        removed
    }

    /// Returns a clone of the entry under `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().contains_key(key)
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Locks the registry for a snapshot iteration.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.entries.lock()
    }
}

/// The three lookup tables of live [`Thread`]s: by native handle, by name and
/// by number.
///
/// Entries are weak: the registry never keeps a thread alive. A thread is
/// present in all three tables or in none of them.
#[derive(Debug)]
pub struct ThreadRegistry {
    by_handle: ResourceRegistry<std::thread::ThreadId, Weak<Thread>>,
    by_name: ResourceRegistry<String, Weak<Thread>>,
    by_number: ResourceRegistry<ThreadNumber, Weak<Thread>>,
    gate: Mutex<()>,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<ThreadRegistry> = Arc::new(ThreadRegistry::new());
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    /// Creates an isolated registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_handle: ResourceRegistry::new("thread-handle registry"),
            by_name: ResourceRegistry::new("thread-name registry"),
            by_number: ResourceRegistry::new("thread-number registry"),
            gate: Mutex::new(()),
        }
    }

    /// The process-wide registry, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Enters `thread` under all three keys, or under none.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if any key is already taken.
    /// Names are unique: a second live thread with the same name is refused.
    pub(crate) fn register(
        &self,
        handle: std::thread::ThreadId,
        name: &str,
        number: ThreadNumber,
        thread: &Weak<Thread>,
    ) -> Result<(), RegistryError> {
        let _gate = self.gate.lock();
        self.by_handle.register(handle, Weak::clone(thread))?;
        if let Err(e) = self.by_name.register(name.to_string(), Weak::clone(thread)) {
            self.by_handle.unregister(&handle);
            return Err(e);
        }
        if let Err(e) = self.by_number.register(number, Weak::clone(thread)) {
            self.by_handle.unregister(&handle);
            self.by_name.unregister(name);
            return Err(e);
        }
        Ok(())
    }

    /// Removes `thread`'s three keys. Missing keys are ignored.
    pub(crate) fn unregister(&self, handle: std::thread::ThreadId, name: &str, number: ThreadNumber) {
        let _gate = self.gate.lock();
        self.by_handle.unregister(&handle);
        self.by_name.unregister(name);
        self.by_number.unregister(&number);
    }

    /// Finds a live thread by native handle.
    #[must_use]
    pub fn find_by_handle(&self, handle: std::thread::ThreadId) -> Option<Arc<Thread>> {
        self.by_handle.find(&handle).and_then(|weak| weak.upgrade())
    }

    /// Finds a live thread by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Thread>> {
        self.by_name.find(name).and_then(|weak| weak.upgrade())
    }

    /// Finds a live thread by number.
    #[must_use]
    pub fn find_by_number(&self, number: ThreadNumber) -> Option<Arc<Thread>> {
        self.by_number.find(&number).and_then(|weak| weak.upgrade())
    }

    /// Whether no thread is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Number of registered threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Live threads at the time of the call, ordered by number.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Thread>> {
        let entries = self.by_number.lock();
        let mut numbered: Vec<_> = entries
            .iter()
            .filter_map(|(number, weak)| weak.upgrade().map(|thread| (*number, thread)))
            .collect();
        drop(entries);
        numbered.sort_by_key(|(number, _)| *number);
        numbered.into_iter().map(|(_, thread)| thread).collect()
    }
}
