//! Store Read Views
//!
//! A [`StoreView`] points at one location in the store. Navigating with
//! [`StoreView::at`] inside a computation subscribes the computation to that
//! one key of the parent container, so writing a sibling key does not wake
//! it.
//!
//! # Triggers
//!
//! For every container path that has been read reactively the store keeps:
//!
//! - one trigger per key read so far, created on first read
//! - one structure trigger, notified when a key is added or removed or an
//!   array changes length
//!
//! Triggers are never created for keys nobody reads, and are swept once
//! nobody reads them any more: after a write that changed the shape of the
//! data, and periodically as new triggers are created.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ReactiveError, StoreError};
use crate::reactive::{ReactiveContext, Runtime, SweepSchedule, Trigger};

use super::path::{child, value_at, Key, Path};
use super::writer::StoreWriter;

struct PathTriggers {
    keys: IndexMap<Key, Trigger>,
    structure: Trigger,
}

impl PathTriggers {
    fn new() -> Self {
        Self {
            keys: IndexMap::new(),
            structure: Trigger::new(),
        }
    }
}

pub(crate) struct StoreInner {
    pub(crate) data: RefCell<Value>,
    triggers: RefCell<HashMap<Path, PathTriggers>>,
    sweeps: SweepSchedule,
    reshaped: Cell<bool>,
}

impl StoreInner {
    fn new(data: Value) -> Self {
        Self {
            data: RefCell::new(data),
            triggers: RefCell::new(HashMap::new()),
            sweeps: SweepSchedule::new(),
            reshaped: Cell::new(false),
        }
    }

    /// Subscribe to `key` of the container at `path`, plus the container's
    /// structure when the key is absent.
    fn track_key(&self, path: &[Key], key: &Key, present: bool) {
        if !ReactiveContext::is_active() {
            return;
        }
        let mut created = 0;
        let (key_trigger, structure) = {
            let mut triggers = self.triggers.borrow_mut();
            let node = triggers.entry(path.to_vec()).or_insert_with(|| {
                created += 1;
                PathTriggers::new()
            });
            let key_trigger = node
                .keys
                .entry(key.clone())
                .or_insert_with(|| {
                    created += 1;
                    Trigger::new()
                })
                .clone();
            (key_trigger, (!present).then(|| node.structure.clone()))
        };
        key_trigger.track();
        if let Some(structure) = structure {
            structure.track();
        }
        self.after_creating(created);
    }

    fn track_structure(&self, path: &[Key]) {
        if !ReactiveContext::is_active() {
            return;
        }
        let mut created = 0;
        let structure = self
            .triggers
            .borrow_mut()
            .entry(path.to_vec())
            .or_insert_with(|| {
                created += 1;
                PathTriggers::new()
            })
            .structure
            .clone();
        structure.track();
        self.after_creating(created);
    }

    /// Sweep once enough triggers were created. Runs after the new ones are
    /// tracked so they are never swept unobserved.
    fn after_creating(&self, created: usize) {
        let mut due = false;
        for _ in 0..created {
            due |= self.sweeps.record_creation();
        }
        if due {
            self.sweep();
        }
    }

    /// Drop key triggers nobody observes, and paths left with nothing
    /// observed.
    fn sweep(&self) {
        let (removed, live) = {
            let mut triggers = self.triggers.borrow_mut();
            let mut removed = Vec::new();
            triggers.retain(|_, node| {
                node.keys.retain(|_, trigger| {
                    let observed = trigger.is_observed();
                    if !observed {
                        removed.push(trigger.clone());
                    }
                    observed
                });
                !node.keys.is_empty() || node.structure.is_observed()
            });
            let live: usize = triggers.values().map(|node| node.keys.len() + 1).sum();
            (removed, live)
        };
        tracing::trace!(removed = removed.len(), live, "swept store triggers");
        self.sweeps.swept(live);
    }

    /// Sweep if a write changed the shape of the data, once the batch that
    /// carried it has flushed and its readers have re-run.
    pub(crate) fn settle(&self) {
        if !Runtime::is_batching() && self.reshaped.replace(false) {
            self.sweep();
        }
    }

    /// Subscribe to every key below `path`.
    fn track_deep(&self, path: &[Key], value: &Value) {
        let mut child_path = path.to_vec();
        match value {
            Value::Object(map) => {
                self.track_structure(path);
                for (name, item) in map {
                    let key = Key::Field(name.clone());
                    self.track_key(path, &key, true);
                    child_path.push(key);
                    self.track_deep(&child_path, item);
                    child_path.pop();
                }
            }
            Value::Array(items) => {
                self.track_structure(path);
                for (index, item) in items.iter().enumerate() {
                    let key = Key::Index(index);
                    self.track_key(path, &key, true);
                    child_path.push(key);
                    self.track_deep(&child_path, item);
                    child_path.pop();
                }
            }
            _ => {}
        }
    }

    /// Notify readers of `keys` under `path`, and of its structure if
    /// `structural`. Must be called inside a batch.
    pub(crate) fn notify(&self, path: &[Key], keys: &[Key], structural: bool) -> Result<(), ReactiveError> {
        if structural {
            self.reshaped.set(true);
        }
        let affected: Vec<Trigger> = {
            let triggers = self.triggers.borrow();
            match triggers.get(path) {
                Some(node) => keys
                    .iter()
                    .filter_map(|key| node.keys.get(key).cloned())
                    .chain(structural.then(|| node.structure.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        for trigger in affected {
            trigger.try_notify()?;
        }
        Ok(())
    }

    /// Notify every key reader of the container at `path`.
    pub(crate) fn notify_all(&self, path: &[Key]) -> Result<(), ReactiveError> {
        let keys: Vec<Key> = self
            .triggers
            .borrow()
            .get(path)
            .map(|node| node.keys.keys().cloned().collect())
            .unwrap_or_default();
        self.notify(path, &keys, true)
    }

    pub(crate) fn snapshot_at(&self, path: &[Key]) -> Option<Value> {
        value_at(&self.data.borrow(), path).cloned()
    }

    #[cfg(test)]
    pub(crate) fn trigger_count(&self) -> usize {
        self.triggers.borrow().values().map(|node| node.keys.len()).sum()
    }
}

/// Read handle to a reactive store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Self {
        Self { inner }
    }

    /// A view of the whole store.
    pub fn view(&self) -> StoreView {
        StoreView {
            inner: Rc::clone(&self.inner),
            path: Vec::new(),
        }
    }

    /// Shorthand for `view().at(key)`.
    pub fn at(&self, key: impl Into<Key>) -> StoreView {
        self.view().at(key)
    }

    /// An untracked copy of the whole store.
    pub fn snapshot(&self) -> Value {
        self.inner.data.borrow().clone()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &StoreInner {
        &self.inner
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("data", &*self.inner.data.borrow()).finish()
    }
}

/// Create a store holding `value`, returning its read and write handles.
pub fn create_store(value: Value) -> (Store, StoreWriter) {
    let inner = Rc::new(StoreInner::new(value));
    (Store::from_inner(Rc::clone(&inner)), StoreWriter::new(inner))
}

/// Create a store from any serializable value.
pub fn create_store_from<T: Serialize>(value: &T) -> Result<(Store, StoreWriter), StoreError> {
    Ok(create_store(serde_json::to_value(value)?))
}

/// A tracked view of one location in a store.
#[derive(Clone)]
pub struct StoreView {
    inner: Rc<StoreInner>,
    path: Path,
}

impl StoreView {
    pub fn path(&self) -> &[Key] {
        &self.path
    }

    /// Step into `key`, subscribing to it when tracking.
    pub fn at(&self, key: impl Into<Key>) -> StoreView {
        let key = key.into();
        let present = {
            let data = self.inner.data.borrow();
            value_at(&data, &self.path)
                .and_then(|value| child(value, &key))
                .is_some()
        };
        self.inner.track_key(&self.path, &key, present);
        let mut path = self.path.clone();
        path.push(key);
        StoreView {
            inner: Rc::clone(&self.inner),
            path,
        }
    }

    /// Whether anything is stored here. Subscriptions come from `at`.
    pub fn exists(&self) -> bool {
        value_at(&self.inner.data.borrow(), &self.path).is_some()
    }

    /// A deep copy of the value here, subscribing to every key below it.
    pub fn value(&self) -> Option<Value> {
        let value = self.snapshot()?;
        if ReactiveContext::is_active() {
            self.inner.track_deep(&self.path, &value);
        }
        Some(value)
    }

    /// Deserialize the value here, subscribing deeply.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let value = self.value().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// An untracked deep copy of the value here.
    pub fn snapshot(&self) -> Option<Value> {
        self.inner.snapshot_at(&self.path)
    }

    fn scalar<T>(&self, read: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
        value_at(&self.inner.data.borrow(), &self.path).and_then(read)
    }

    pub fn as_str(&self) -> Option<String> {
        self.scalar(|value| value.as_str().map(str::to_string))
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.scalar(Value::as_i64)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.scalar(Value::as_u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.scalar(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.scalar(Value::as_bool)
    }

    /// Number of entries of the container here, subscribing to its
    /// structure. Scalars have length zero.
    pub fn len(&self) -> usize {
        self.inner.track_structure(&self.path);
        self.scalar(|value| match value {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        })
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the container here, in order, subscribing to its structure.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.track_structure(&self.path);
        self.scalar(|value| match value {
            Value::Array(items) => Some((0..items.len()).map(Key::Index).collect()),
            Value::Object(map) => Some(map.keys().cloned().map(Key::Field).collect()),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// Views of every entry of the container here.
    pub fn items(&self) -> Vec<StoreView> {
        self.keys().into_iter().map(|key| self.at(key)).collect()
    }
}

impl fmt::Debug for StoreView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreView")
            .field("path", &super::path::display_path(&self.path))
            .finish()
    }
}
