//! Store Paths
//!
//! Reads address a single location with a list of [`Key`]s. Writes address
//! one or many locations with a list of [`PathPart`]s, where a part may
//! select several array elements at once.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// One step into a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A location in the store.
pub type Path = Vec<Key>;

/// Render a path as `/todos/0/title`.
pub(crate) fn display_path(path: &[Key]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.iter().map(|key| format!("/{key}")).collect()
}

/// Inclusive index range with a step, as in `{ from, to, by }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub from: usize,
    pub to: usize,
    pub by: usize,
}

impl Range {
    /// `from..=to` with a step of one.
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to, by: 1 }
    }

    /// Every element.
    pub fn all() -> Self {
        Self::new(0, usize::MAX)
    }

    pub fn by(mut self, step: usize) -> Self {
        self.by = step;
        self
    }

    /// The indices selected in an array of length `len`.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        if len == 0 || self.from > self.to {
            return Vec::new();
        }
        let last = self.to.min(len - 1);
        (self.from..=last).step_by(self.by.max(1)).collect()
    }
}

type Predicate = Rc<dyn Fn(&Value, usize) -> bool>;

/// One step of a write path.
#[derive(Clone)]
pub enum PathPart {
    /// A single field or index.
    Key(Key),
    /// Explicit array indices.
    Indices(Vec<usize>),
    /// An index range.
    Range(Range),
    /// Array elements for which the predicate holds.
    Filter(Predicate),
}

impl PathPart {
    pub fn filter(predicate: impl Fn(&Value, usize) -> bool + 'static) -> Self {
        PathPart::Filter(Rc::new(predicate))
    }

    pub fn indices(indices: impl IntoIterator<Item = usize>) -> Self {
        PathPart::Indices(indices.into_iter().collect())
    }
}

impl fmt::Debug for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPart::Key(key) => f.debug_tuple("Key").field(key).finish(),
            PathPart::Indices(indices) => f.debug_tuple("Indices").field(indices).finish(),
            PathPart::Range(range) => f.debug_tuple("Range").field(range).finish(),
            PathPart::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

impl From<Key> for PathPart {
    fn from(key: Key) -> Self {
        PathPart::Key(key)
    }
}

impl From<&str> for PathPart {
    fn from(name: &str) -> Self {
        PathPart::Key(name.into())
    }
}

impl From<String> for PathPart {
    fn from(name: String) -> Self {
        PathPart::Key(name.into())
    }
}

impl From<usize> for PathPart {
    fn from(index: usize) -> Self {
        PathPart::Key(index.into())
    }
}

impl From<Range> for PathPart {
    fn from(range: Range) -> Self {
        PathPart::Range(range)
    }
}

/// Build a `Vec<PathPart>` from mixed keys, indices, ranges and filters.
///
/// ```rust
/// use weft_core::store::{store_path, PathPart, Range};
///
/// let path = store_path!["todos", Range::new(0, 4).by(2), "done"];
/// assert_eq!(path.len(), 3);
/// ```
#[macro_export]
macro_rules! store_path {
    ($($part:expr),* $(,)?) => {
        vec![$($crate::store::PathPart::from($part)),*]
    };
}

pub(crate) fn child<'a>(value: &'a Value, key: &Key) -> Option<&'a Value> {
    match (value, key) {
        (Value::Object(map), Key::Field(name)) => map.get(name),
        (Value::Array(items), Key::Index(index)) => items.get(*index),
        _ => None,
    }
}

pub(crate) fn value_at<'a>(root: &'a Value, path: &[Key]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| child(value, key))
}
