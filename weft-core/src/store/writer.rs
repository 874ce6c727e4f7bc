//! Store Writer
//!
//! All mutation goes through [`StoreWriter`]. Every call runs inside one
//! batch, so a write that touches many keys (a filter over a list, a merge of
//! several fields) produces one propagation pass and each reader runs once.
//!
//! # Notifications
//!
//! | Change                          | Notified                              |
//! |---------------------------------|---------------------------------------|
//! | value of an existing key        | that key                              |
//! | key added or removed            | that key and the container structure  |
//! | array element removed           | the shifted indices and the structure |
//! | array grown or truncated        | the affected indices and the structure|
//! | equal value written             | nothing                               |

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::StoreError;
use crate::reactive::try_batch;

use super::path::{display_path, value_at, Key, Path, PathPart};
use super::update::Update;
use super::view::{Store, StoreInner};

/// Keys touched by one slot write.
struct SlotChange {
    keys: Vec<Key>,
    structural: bool,
}

impl SlotChange {
    fn none() -> Self {
        Self {
            keys: Vec::new(),
            structural: false,
        }
    }

    fn key(key: Key, structural: bool) -> Self {
        Self {
            keys: vec![key],
            structural,
        }
    }
}

fn value_at_mut<'a>(root: &'a mut Value, path: &[Key]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |value, key| match (value, key) {
        (Value::Object(map), Key::Field(name)) => map.get_mut(name),
        (Value::Array(items), Key::Index(index)) => items.get_mut(*index),
        _ => None,
    })
}

/// Write `value` into `key` of `container`, or remove the key for `None`.
/// Returns `None` if the container cannot hold `key`.
fn write_slot(container: &mut Value, key: &Key, value: Option<Value>) -> Option<SlotChange> {
    match (container, key) {
        (Value::Object(map), Key::Field(name)) => Some(match value {
            Some(value) if map.get(name) == Some(&value) => SlotChange::none(),
            Some(value) => {
                let added = map.insert(name.clone(), value).is_none();
                SlotChange::key(key.clone(), added)
            }
            None => match map.shift_remove(name) {
                Some(_) => SlotChange::key(key.clone(), true),
                None => SlotChange::none(),
            },
        }),
        (Value::Array(items), Key::Index(index)) => {
            let index = *index;
            let len = items.len();
            Some(match value {
                Some(value) if index < len && items[index] == value => SlotChange::none(),
                Some(value) if index < len => {
                    items[index] = value;
                    SlotChange::key(key.clone(), false)
                }
                Some(value) => {
                    items.resize(index, Value::Null);
                    items.push(value);
                    SlotChange {
                        keys: (len..=index).map(Key::Index).collect(),
                        structural: true,
                    }
                }
                None if index < len => {
                    items.remove(index);
                    SlotChange {
                        keys: (index..len).map(Key::Index).collect(),
                        structural: true,
                    }
                }
                None => SlotChange::none(),
            })
        }
        _ => None,
    }
}

fn same_container_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}

impl StoreInner {
    /// Walk `parts`, fanning out over selectors, and apply `update` at every
    /// selected location.
    fn update_path(&self, mut path: Path, parts: &[PathPart], update: &Update) -> Result<(), StoreError> {
        let Some((part, rest)) = parts.split_first() else {
            return self.apply(&path, update);
        };
        if let PathPart::Key(key) = part {
            path.push(key.clone());
            return self.update_path(path, rest, update);
        }
        for index in self.select_indices(&path, part)? {
            let mut selected = path.clone();
            selected.push(Key::Index(index));
            self.update_path(selected, rest, update)?;
        }
        Ok(())
    }

    fn select_indices(&self, path: &[Key], part: &PathPart) -> Result<Vec<usize>, StoreError> {
        let data = self.data.borrow();
        let Some(Value::Array(items)) = value_at(&data, path) else {
            return Err(StoreError::NotAnArray {
                path: display_path(path),
            });
        };
        Ok(match part {
            PathPart::Key(Key::Index(index)) => vec![*index],
            PathPart::Key(Key::Field(_)) => Vec::new(),
            PathPart::Indices(indices) => indices.clone(),
            PathPart::Range(range) => range.indices(items.len()),
            PathPart::Filter(predicate) => items
                .iter()
                .enumerate()
                .filter(|(index, item)| predicate(item, *index))
                .map(|(index, _)| index)
                .collect(),
        })
    }

    fn apply(&self, path: &[Key], update: &Update) -> Result<(), StoreError> {
        match update {
            Update::With(producer) => {
                let current = self.snapshot_at(path).unwrap_or(Value::Null);
                let next = producer(&current);
                self.apply(path, &next)
            }
            Update::Reconcile(value) => self.reconcile(path, value.clone()),
            Update::Set(value) => match path.split_last() {
                Some((key, parent)) => self.set_property(parent, key, Some(value.clone())),
                None => self.reconcile(path, value.clone()),
            },
            Update::Remove => match path.split_last() {
                Some((key, parent)) => self.set_property(parent, key, None),
                None => Err(StoreError::InvalidPath {
                    path: display_path(path),
                }),
            },
            Update::Merge(fields) => {
                let is_object = matches!(value_at(&self.data.borrow(), path), Some(Value::Object(_)));
                if !is_object {
                    return self.apply(path, &Update::Set(Value::Object(fields.clone())));
                }
                for (name, value) in fields {
                    self.set_property(path, &Key::Field(name.clone()), Some(value.clone()))?;
                }
                Ok(())
            }
        }
    }

    fn set_property(&self, parent: &[Key], key: &Key, value: Option<Value>) -> Result<(), StoreError> {
        let change = {
            let mut data = self.data.borrow_mut();
            let container = value_at_mut(&mut data, parent).ok_or_else(|| StoreError::InvalidPath {
                path: display_path(parent),
            })?;
            write_slot(container, key, value).ok_or_else(|| StoreError::InvalidPath {
                path: format!("{}/{key}", display_path(parent).trim_end_matches('/')),
            })?
        };
        if change.keys.is_empty() && !change.structural {
            return Ok(());
        }
        self.notify(parent, &change.keys, change.structural)?;
        Ok(())
    }

    /// Diff `next` into the value at `path`, recursing through containers of
    /// the same kind so only changed leaves are written.
    fn reconcile(&self, path: &[Key], next: Value) -> Result<(), StoreError> {
        match (self.snapshot_at(path), next) {
            (Some(Value::Object(old)), Value::Object(new)) => {
                for name in old.keys().filter(|name| !new.contains_key(*name)) {
                    self.set_property(path, &Key::Field(name.clone()), None)?;
                }
                for (name, value) in new {
                    let previous = old.get(&name);
                    self.reconcile_child(path, Key::Field(name), previous, value)?;
                }
                Ok(())
            }
            (Some(Value::Array(old)), Value::Array(new)) => {
                let new_len = new.len();
                for (index, value) in new.into_iter().enumerate() {
                    self.reconcile_child(path, Key::Index(index), old.get(index), value)?;
                }
                if new_len < old.len() {
                    self.truncate(path, new_len, old.len())?;
                }
                Ok(())
            }
            (_, next) => match path.split_last() {
                Some((key, parent)) => self.set_property(parent, key, Some(next)),
                None => self.replace_root(next),
            },
        }
    }

    fn reconcile_child(&self, parent: &[Key], key: Key, previous: Option<&Value>, next: Value) -> Result<(), StoreError> {
        match previous {
            Some(previous) if same_container_kind(previous, &next) => {
                let mut path = parent.to_vec();
                path.push(key);
                self.reconcile(&path, next)
            }
            _ => self.set_property(parent, &key, Some(next)),
        }
    }

    fn truncate(&self, path: &[Key], len: usize, old_len: usize) -> Result<(), StoreError> {
        if let Some(Value::Array(items)) = value_at_mut(&mut self.data.borrow_mut(), path) {
            items.truncate(len);
        }
        let removed: Vec<Key> = (len..old_len).map(Key::Index).collect();
        self.notify(path, &removed, true)?;
        Ok(())
    }

    fn replace_root(&self, next: Value) -> Result<(), StoreError> {
        let previous = std::mem::replace(&mut *self.data.borrow_mut(), next);
        drop(previous);
        self.notify_all(&[])?;
        Ok(())
    }
}

/// Write handle to a reactive store.
#[derive(Clone)]
pub struct StoreWriter {
    inner: Rc<StoreInner>,
}

impl StoreWriter {
    pub(crate) fn new(inner: Rc<StoreInner>) -> Self {
        Self { inner }
    }

    /// A read handle to the same store.
    pub fn store(&self) -> Store {
        Store::from_inner(Rc::clone(&self.inner))
    }

    /// Apply `update` at every location `path` selects, in one batch.
    ///
    /// Locations already updated stay updated if a later one fails.
    pub fn update(&self, path: &[PathPart], update: Update) -> Result<(), StoreError> {
        let result = try_batch(|| self.inner.update_path(Vec::new(), path, &update));
        self.inner.settle();
        result?
    }

    pub fn set(&self, path: &[PathPart], value: impl Into<Value>) -> Result<(), StoreError> {
        self.update(path, Update::Set(value.into()))
    }

    /// Shallow-merge the fields of `value` (an object) at `path`.
    pub fn merge(&self, path: &[PathPart], value: Value) -> Result<(), StoreError> {
        self.update(path, Update::merge(value)?)
    }

    pub fn remove(&self, path: &[PathPart]) -> Result<(), StoreError> {
        self.update(path, Update::Remove)
    }

    pub fn reconcile(&self, path: &[PathPart], value: Value) -> Result<(), StoreError> {
        self.update(path, Update::Reconcile(value))
    }

    /// Mutate a copy of the value at `path` and reconcile the result back.
    pub fn produce(&self, path: &[PathPart], recipe: impl Fn(&mut Value) + 'static) -> Result<(), StoreError> {
        self.update(
            path,
            Update::with(move |current| {
                let mut draft = current.clone();
                recipe(&mut draft);
                Update::Reconcile(draft)
            }),
        )
    }

    /// Run several writes as one batch.
    pub fn batch_update(&self, writes: impl FnOnce(&StoreWriter) -> Result<(), StoreError>) -> Result<(), StoreError> {
        let result = try_batch(|| writes(self));
        self.inner.settle();
        result?
    }
}

impl fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, Effect};
    use crate::store::{create_store, Range};
    use crate::store_path;
    use serde_json::json;

    fn watch(run: impl Fn() + 'static) -> Effect {
        create_root(|_| Effect::new(run))
    }

    #[test]
    fn set_notifies_only_the_written_key() {
        let (store, writer) = create_store(json!({ "a": 1, "b": 2 }));
        let a = store.view();
        let on_a = watch(move || {
            a.at("a").as_i64();
        });
        let b = store.view();
        let on_b = watch(move || {
            b.at("b").as_i64();
        });

        writer.set(&store_path!["a"], 10).unwrap();
        assert_eq!((on_a.run_count(), on_b.run_count()), (2, 1));
        assert_eq!(store.at("a").as_i64(), Some(10));

        writer.set(&store_path!["a"], 10).unwrap();
        assert_eq!(on_a.run_count(), 2);
    }

    #[test]
    fn adding_a_key_wakes_readers_of_the_missing_key() {
        let (store, writer) = create_store(json!({}));
        let view = store.view();
        let effect = watch(move || {
            view.at("later").exists();
        });
        writer.set(&store_path!["later"], true).unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(store.at("later").as_bool(), Some(true));
    }

    #[test]
    fn length_readers_see_structural_changes() {
        let (store, writer) = create_store(json!({ "items": [1, 2, 3] }));
        let view = store.view();
        let effect = watch(move || {
            view.at("items").len();
        });

        writer.set(&store_path!["items", 0], 9).unwrap();
        assert_eq!(effect.run_count(), 1);

        writer.remove(&store_path!["items", 1]).unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(store.at("items").snapshot(), Some(json!([9, 3])));

        writer.set(&store_path!["items", 4], 5).unwrap();
        assert_eq!(store.at("items").snapshot(), Some(json!([9, 3, null, null, 5])));
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn filter_selector_updates_in_one_pass() {
        let (store, writer) = create_store(json!({
            "todos": [
                { "title": "a", "done": false },
                { "title": "b", "done": true },
                { "title": "c", "done": false },
            ]
        }));
        let view = store.view();
        let effect = watch(move || {
            view.at("todos").value();
        });

        writer
            .set(
                &store_path!["todos", PathPart::filter(|todo, _| todo["done"] == json!(false)), "done"],
                true,
            )
            .unwrap();
        assert_eq!(effect.run_count(), 2);
        let done: Vec<bool> = store
            .at("todos")
            .items()
            .iter()
            .filter_map(|todo| todo.at("done").as_bool())
            .collect();
        assert_eq!(done, vec![true, true, true]);
    }

    #[test]
    fn range_selector_with_step() {
        let (store, writer) = create_store(json!([0, 0, 0, 0, 0]));
        writer.set(&store_path![Range::new(0, 4).by(2)], 1).unwrap();
        assert_eq!(store.snapshot(), json!([1, 0, 1, 0, 1]));
        writer.set(&store_path![PathPart::indices([1, 3])], 2).unwrap();
        assert_eq!(store.snapshot(), json!([1, 2, 1, 2, 1]));
    }

    #[test]
    fn selectors_require_arrays() {
        let (_, writer) = create_store(json!({ "a": 1 }));
        let err = writer.set(&store_path![Range::all()], 1).unwrap_err();
        assert!(matches!(err, StoreError::NotAnArray { .. }));
        let err = writer.set(&store_path!["a", "b"], 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }

    #[test]
    fn merge_touches_only_given_fields() {
        let (store, writer) = create_store(json!({ "user": { "name": "ada", "age": 36 } }));
        let view = store.view();
        let on_name = watch(move || {
            view.at("user").at("name").as_str();
        });

        writer.merge(&store_path!["user"], json!({ "age": 37, "city": "london" })).unwrap();
        assert_eq!(on_name.run_count(), 1);
        assert_eq!(
            store.at("user").snapshot(),
            Some(json!({ "name": "ada", "age": 37, "city": "london" }))
        );
    }

    #[test]
    fn function_updates_see_current_value() {
        let (store, writer) = create_store(json!({ "count": 1 }));
        writer
            .update(
                &store_path!["count"],
                Update::with(|current| Update::set(current.as_i64().unwrap_or(0) + 1)),
            )
            .unwrap();
        assert_eq!(store.at("count").as_i64(), Some(2));
    }

    #[test]
    fn reconcile_notifies_changed_leaves_only() {
        let (store, writer) = create_store(json!({ "a": { "x": 1, "y": 2 }, "b": [1, 2, 3] }));
        let view = store.view();
        let on_x = watch(move || {
            view.at("a").at("x").as_i64();
        });
        let view = store.view();
        let on_y = watch(move || {
            view.at("a").at("y").as_i64();
        });
        let view = store.view();
        let on_len = watch(move || {
            view.at("b").len();
        });

        writer
            .reconcile(&[], json!({ "a": { "x": 1, "y": 5 }, "b": [1, 2] }))
            .unwrap();
        assert_eq!(on_x.run_count(), 1);
        assert_eq!(on_y.run_count(), 2);
        assert_eq!(on_len.run_count(), 2);
        assert_eq!(store.snapshot(), json!({ "a": { "x": 1, "y": 5 }, "b": [1, 2] }));
    }

    #[test]
    fn produce_edits_a_draft() {
        let (store, writer) = create_store(json!({ "todos": [{ "title": "a" }] }));
        writer
            .produce(&store_path!["todos"], |todos| {
                if let Value::Array(items) = todos {
                    items.push(json!({ "title": "b" }));
                }
            })
            .unwrap();
        assert_eq!(store.at("todos").len(), 2);
    }

    #[test]
    fn removing_root_is_rejected() {
        let (_, writer) = create_store(json!({}));
        assert!(matches!(writer.remove(&[]), Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn batch_update_coalesces_writes() {
        let (store, writer) = create_store(json!({ "a": 0, "b": 0 }));
        let view = store.view();
        let effect = watch(move || {
            view.value();
        });
        writer
            .batch_update(|w| {
                w.set(&store_path!["a"], 1)?;
                w.set(&store_path!["b"], 1)
            })
            .unwrap();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn triggers_of_removed_keys_are_released() {
        let (store, writer) = create_store(json!({ "byId": {} }));
        let view = store.view();
        let effect = watch(move || {
            view.at("byId").value();
        });
        let baseline = crate::reactive::Runtime::node_count();

        for id in 0..1000 {
            let key = format!("item-{id}");
            writer.set(&store_path!["byId", key.clone()], json!({ "title": id })).unwrap();
            writer.remove(&store_path!["byId", key]).unwrap();
        }

        assert_eq!(store.snapshot(), json!({ "byId": {} }));
        assert_eq!(effect.run_count(), 2001);
        assert_eq!(crate::reactive::Runtime::node_count(), baseline);
        assert_eq!(store.inner().trigger_count(), 1);

        // The surviving subscription still works.
        writer.set(&store_path!["byId", "kept"], 1).unwrap();
        assert_eq!(effect.run_count(), 2002);
    }
}
