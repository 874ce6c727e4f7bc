//! Store Persistence
//!
//! Mirrors a store into a key/value [`Storage`] and loads it back.
//! [`persist`] installs an effect that rewrites the stored copy whenever any
//! part of the store changes; [`restore`] reconciles a stored copy into a
//! store, so readers of unchanged keys stay asleep.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::reactive::Effect;

use super::view::Store;
use super::writer::StoreWriter;

/// A key/value byte store, such as browser local storage or a file.
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<Vec<u8>>;
    fn set_item(&self, key: &str, value: Vec<u8>);
    fn remove_item(&self, key: &str);
}

/// In-memory [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<Vec<u8>> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: Vec<u8>) {
        self.items.borrow_mut().insert(key.to_string(), value);
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

/// Wire format of the stored copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    MessagePack,
}

impl Codec {
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, StoreError> {
        Ok(match self {
            Codec::Json => serde_json::to_vec(value)?,
            Codec::MessagePack => rmp_serde::to_vec(value)?,
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, StoreError> {
        Ok(match self {
            Codec::Json => serde_json::from_slice(bytes)?,
            Codec::MessagePack => rmp_serde::from_slice(bytes)?,
        })
    }
}

/// Write the store to `storage` under `key` now and after every change.
///
/// The returned effect is owned by the current scope; disposing it stops
/// persisting.
pub fn persist(store: &Store, storage: Rc<dyn Storage>, key: impl Into<String>, codec: Codec) -> Effect {
    let view = store.view();
    let key = key.into();
    Effect::try_new(move || -> Result<(), StoreError> {
        let value = view.value().unwrap_or(Value::Null);
        let bytes = codec.encode(&value)?;
        tracing::trace!(key = %key, bytes = bytes.len(), "persisting store");
        storage.set_item(&key, bytes);
        Ok(())
    })
}

/// Reconcile the copy stored under `key` into the store.
///
/// Returns `false` if nothing was stored.
pub fn restore(writer: &StoreWriter, storage: &dyn Storage, key: &str, codec: Codec) -> Result<bool, StoreError> {
    let Some(bytes) = storage.get_item(key) else {
        return Ok(false);
    };
    let value = codec.decode(&bytes)?;
    writer.reconcile(&[], value)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::create_root;
    use crate::store::create_store;
    use crate::store_path;
    use serde_json::json;

    #[test]
    fn codecs_round_trip() {
        let value = json!({ "todos": [{ "title": "a", "done": true }], "filter": null });
        for codec in [Codec::Json, Codec::MessagePack] {
            let bytes = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(Codec::Json.decode(b"{"), Err(StoreError::Json(_))));
    }

    #[test]
    fn persist_tracks_every_change() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, writer) = create_store(json!({ "todos": [] }));
        let effect = create_root(|_| persist(&store, storage.clone(), "todos", Codec::Json));
        assert_eq!(
            Codec::Json.decode(&storage.get_item("todos").unwrap()).unwrap(),
            json!({ "todos": [] })
        );

        writer.set(&store_path!["todos", 0], json!({ "title": "a" })).unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(
            Codec::Json.decode(&storage.get_item("todos").unwrap()).unwrap(),
            json!({ "todos": [{ "title": "a" }] })
        );

        effect.dispose();
        writer.set(&store_path!["todos", 0, "title"], "b").unwrap();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn restore_reconciles_stored_copy() {
        let storage = MemoryStorage::new();
        let (store, writer) = create_store(json!({ "count": 0 }));
        assert!(!restore(&writer, &storage, "state", Codec::MessagePack).unwrap());

        storage.set_item("state", Codec::MessagePack.encode(&json!({ "count": 4 })).unwrap());
        assert!(restore(&writer, &storage, "state", Codec::MessagePack).unwrap());
        assert_eq!(store.at("count").as_i64(), Some(4));

        storage.remove_item("state");
        assert!(storage.is_empty());
    }
}
