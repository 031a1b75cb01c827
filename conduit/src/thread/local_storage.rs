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

//! Per-thread key/value storage.
//!
//! Each [`Thread`](super::Thread) owns exactly one storage instance. It exists
//! from just before the consumer's `run()` until just after its `exit()`
//! returns, and is only reachable from code running on that thread. Outside
//! that window the free functions here behave as if the storage were empty and
//! `set` reports [`StorageError::Unavailable`].
//!
//! Entries are kept in insertion order, newest first. `set` never replaces:
//! a second `set` under the same key shadows the first until it is removed.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tracing::{trace, warn};

use crate::thread::ThreadConsumer;

/// Reserved key under which a thread's consumer is stored.
pub const CONSUMER_KEY: &str = "_conduit_thread_consumer_";

/// A value held in thread-local storage.
#[derive(Clone)]
pub enum StorageValue {
    /// Any shared object.
    Object(Rc<dyn Any>),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// Double precision float.
    F64(f64),
}

impl StorageValue {
    /// Wraps `value` as an object entry.
    pub fn object<T: Any>(value: T) -> Self {
        Self::Object(Rc::new(value))
    }

    /// Name of the stored shape, for diagnostics.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::F64(_) => "f64",
        }
    }
}

impl std::fmt::Debug for StorageValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Object(..)"),
            Self::U32(v) => f.debug_tuple("U32").field(v).finish(),
            Self::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Self::F64(v) => f.debug_tuple("F64").field(v).finish(),
        }
    }
}

/// Errors reported by the typed accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No entry under the key.
    #[error("no thread-local entry named {0:?}")]
    NotFound(String),
    /// The entry exists but holds a different shape.
    #[error("thread-local entry {key:?} holds {stored}, not {requested}")]
    ShapeMismatch {
        /// Key looked up.
        key: String,
        /// Shape requested by the caller.
        requested: &'static str,
        /// Shape actually stored.
        stored: &'static str,
    },
    /// The calling thread has no storage (not a Conduit thread, or outside
    /// the consumer's lifetime).
    #[error("no thread-local storage on this thread")]
    Unavailable,
}

#[derive(Default)]
struct ThreadLocalStorage {
    entries: VecDeque<(String, StorageValue)>,
}

thread_local! {
    static STORAGE: RefCell<Option<ThreadLocalStorage>> = const { RefCell::new(None) };
}

fn with_storage<R>(f: impl FnOnce(&mut ThreadLocalStorage) -> R) -> Option<R> {
    STORAGE
        .try_with(|cell| cell.borrow_mut().as_mut().map(f))
        .ok()
        .flatten()
}

/// Owns the calling thread's storage for as long as it lives.
///
/// Created by the thread entry before the consumer runs and dropped after its
/// `exit()` returns. Dropping removes every entry.
pub(crate) struct LocalStorageScope {
    _not_send: std::marker::PhantomData<Rc<()>>,
}

impl LocalStorageScope {
    pub(crate) fn create() -> Self {
        STORAGE.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_some() {
                warn!("thread-local storage already exists on this thread; replacing");
            }
            *slot = Some(ThreadLocalStorage::default());
        });
        trace!("thread-local storage created");
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for LocalStorageScope {
    fn drop(&mut self) {
        // Values are dropped outside the borrow so their destructors may touch storage.
        let storage = STORAGE.try_with(|cell| cell.borrow_mut().take()).ok().flatten();
        drop(storage);
        trace!("thread-local storage destroyed");
    }
}

/// Whether the calling thread currently has storage.
#[must_use]
pub fn is_available() -> bool {
    with_storage(|_| ()).is_some()
}

/// Pushes `value` under `key` without checking for existing entries.
///
/// # Errors
///
/// Returns [`StorageError::Unavailable`] outside a thread's lifetime.
pub fn set(key: impl Into<String>, value: StorageValue) -> Result<(), StorageError> {
    let key = key.into();
    with_storage(move |storage| storage.entries.push_front((key, value)))
        .ok_or(StorageError::Unavailable)
}

/// Returns the newest entry under `key`, or `None` if absent or outside a
/// thread's lifetime.
#[must_use]
pub fn get(key: &str) -> Option<StorageValue> {
    with_storage(|storage| {
        storage
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .flatten()
}

/// Removes and returns the newest entry under `key`.
pub fn remove(key: &str) -> Option<StorageValue> {
    with_storage(|storage| {
        let index = storage.entries.iter().position(|(k, _)| k == key)?;
        storage.entries.remove(index).map(|(_, v)| v)
    })
    .flatten()
}

/// Whether any entry is stored under `key`.
#[must_use]
pub fn exists(key: &str) -> bool {
    with_storage(|storage| storage.entries.iter().any(|(k, _)| k == key)).unwrap_or(false)
}

/// Removes every entry, including the consumer binding.
pub fn clear_all() {
    let drained = with_storage(|storage| std::mem::take(&mut storage.entries));
    drop(drained);
}

fn lookup(key: &str) -> Result<StorageValue, StorageError> {
    if !is_available() {
        return Err(StorageError::Unavailable);
    }
    get(key).ok_or_else(|| StorageError::NotFound(key.to_string()))
}

fn mismatch(key: &str, requested: &'static str, stored: &StorageValue) -> StorageError {
    StorageError::ShapeMismatch {
        key: key.to_string(),
        requested,
        stored: stored.shape(),
    }
}

/// Reads a `u32` entry.
///
/// # Errors
///
/// [`StorageError`] when unavailable, missing or stored with another shape.
pub fn get_u32(key: &str) -> Result<u32, StorageError> {
    match lookup(key)? {
        StorageValue::U32(v) => Ok(v),
        other => Err(mismatch(key, "u32", &other)),
    }
}

/// Reads a `u64` entry.
///
/// # Errors
///
/// [`StorageError`] when unavailable, missing or stored with another shape.
pub fn get_u64(key: &str) -> Result<u64, StorageError> {
    match lookup(key)? {
        StorageValue::U64(v) => Ok(v),
        other => Err(mismatch(key, "u64", &other)),
    }
}

/// Reads an `f64` entry.
///
/// # Errors
///
/// [`StorageError`] when unavailable, missing or stored with another shape.
pub fn get_f64(key: &str) -> Result<f64, StorageError> {
    match lookup(key)? {
        StorageValue::F64(v) => Ok(v),
        other => Err(mismatch(key, "f64", &other)),
    }
}

/// Reads an object entry of type `T`.
///
/// # Errors
///
/// [`StorageError`] when unavailable, missing, not an object, or an object
/// of another type.
pub fn get_object<T: Any>(key: &str) -> Result<Rc<T>, StorageError> {
    match lookup(key)? {
        StorageValue::Object(object) => object
            .downcast::<T>()
            .map_err(|_| StorageError::ShapeMismatch {
                key: key.to_string(),
                requested: std::any::type_name::<T>(),
                stored: "object",
            }),
        other => Err(mismatch(key, std::any::type_name::<T>(), &other)),
    }
}

pub(crate) fn bind_consumer(consumer: Arc<dyn ThreadConsumer>) {
    if set(CONSUMER_KEY, StorageValue::object(consumer)).is_err() {
        warn!("cannot bind consumer: no thread-local storage");
    }
}

pub(crate) fn unbind_consumer() {
    drop(remove(CONSUMER_KEY));
}

/// The consumer whose `run()` is executing on the calling thread.
///
/// `None` on threads not started by a [`Thread`](super::Thread), and outside
/// the consumer's lifetime.
#[must_use]
pub fn current_consumer() -> Option<Arc<dyn ThreadConsumer>> {
    get_object::<Arc<dyn ThreadConsumer>>(CONSUMER_KEY)
        .ok()
        .map(|consumer| Arc::clone(&*consumer))
}
