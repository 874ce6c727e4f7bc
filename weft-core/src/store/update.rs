//! Store Updates
//!
//! An [`Update`] says what to do at each location a write path selects.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;

type Producer = Rc<dyn Fn(&Value) -> Update>;

#[derive(Clone)]
pub enum Update {
    /// Replace the value. Replacing the root reconciles instead, so readers
    /// of unchanged keys are not woken.
    Set(Value),
    /// Shallow-merge fields into an object. A non-object target is replaced.
    Merge(Map<String, Value>),
    /// Remove the key (shifting later array elements down).
    Remove,
    /// Diff the new value into the old one, notifying only changed leaves.
    Reconcile(Value),
    /// Compute the update from the current value.
    With(Producer),
}

impl Update {
    pub fn set(value: impl Into<Value>) -> Self {
        Update::Set(value.into())
    }

    /// Build a `Set` from any serializable value.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        Ok(Update::Set(serde_json::to_value(value)?))
    }

    /// Build a `Merge`; `value` must be an object.
    pub fn merge(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(fields) => Ok(Update::Merge(fields)),
            _ => Err(StoreError::MergeRequiresObject),
        }
    }

    pub fn with(producer: impl Fn(&Value) -> Update + 'static) -> Self {
        Update::With(Rc::new(producer))
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Set(value) => f.debug_tuple("Set").field(value).finish(),
            Update::Merge(fields) => f.debug_tuple("Merge").field(fields).finish(),
            Update::Remove => f.write_str("Remove"),
            Update::Reconcile(value) => f.debug_tuple("Reconcile").field(value).finish(),
            Update::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Set(value)
    }
}
