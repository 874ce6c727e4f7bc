//! Reactive Store
//!
//! A store holds one structured value (a `serde_json::Value`) and tracks
//! reads per key: a computation that read `todos/0/title` re-runs when that
//! title changes and not when `todos/1` does.
//!
//! Reads go through [`Store`] and [`StoreView`]; writes go through
//! [`StoreWriter`] with a path of [`PathPart`]s that may fan out over array
//! elements by index list, [`Range`] or predicate. Each write call is one
//! batch.
//!
//! ```rust
//! use serde_json::json;
//! use weft_core::store::{create_store, store_path, PathPart};
//!
//! let (store, writer) = create_store(json!({ "todos": [{ "done": false }, { "done": false }] }));
//! writer
//!     .set(&store_path!["todos", PathPart::filter(|_, i| i == 1), "done"], true)
//!     .unwrap();
//! assert_eq!(store.at("todos").at(1).at("done").as_bool(), Some(true));
//! ```

mod path;
mod persist;
mod update;
mod view;
mod writer;

pub use path::{Key, Path, PathPart, Range};
pub use persist::{persist, restore, Codec, MemoryStorage, Storage};
pub use update::Update;
pub use view::{create_store, create_store_from, Store, StoreView};
pub use writer::StoreWriter;

pub use crate::store_path;
