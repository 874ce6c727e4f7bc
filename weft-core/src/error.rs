//! Error Types
//!
//! Two families of errors surface from the runtime:
//!
//! - [`ReactiveError`] covers the signal graph: tracking mistakes, failures
//!   inside computations, and runaway propagation.
//! - [`StoreError`] covers the reactive store: bad paths, bad updates, and
//!   snapshot encoding.
//!
//! Computations are user closures, so a panic inside one is captured at the
//! run boundary and converted into [`ReactiveError::Panicked`] before it is
//! routed to the nearest error handler.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Errors raised by the reactive graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A scoped registration was attempted with no scope active.
    #[error("{operation} called outside of a live reactive scope")]
    NoOwner {
        /// The operation that needed an owner.
        operation: &'static str,
    },

    /// The target scope was already disposed.
    #[error("reactive scope has already been disposed")]
    Disposed,

    /// A computation panicked while running.
    #[error("computation panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// A fallible computation returned an error.
    #[error("computation failed: {0}")]
    Computation(#[source] Box<dyn std::error::Error>),

    /// A memo has no value to read because its computation failed.
    #[error("memo has no value: its computation failed")]
    NoValue,

    /// More computations ran in one propagation pass than the configured bound.
    #[error("potential infinite loop: more than {limit} computations ran in one propagation pass")]
    RunawayPropagation {
        /// The bound that was exceeded.
        limit: usize,
    },
}

impl ReactiveError {
    /// Wrap an arbitrary error raised by a computation body.
    pub fn computation(err: impl std::error::Error + 'static) -> Self {
        Self::Computation(Box::new(err))
    }

    /// Whether this error aborted a batch because of runaway propagation.
    pub fn is_runaway(&self) -> bool {
        matches!(self, Self::RunawayPropagation { .. })
    }

    /// Re-raise the error as a panic.
    ///
    /// Used by the infallible entry points (`Signal::set`, `Effect::new`, ...)
    /// when no scope handled the error. A panic payload carrying the original
    /// message keeps the text intact if an outer computation captures it again.
    pub fn raise(self) -> ! {
        let message = match self {
            Self::Panicked { message } => message,
            other => other.to_string(),
        };
        panic::resume_unwind(Box::new(message))
    }
}

/// Errors raised by the reactive store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A path did not lead to a container that can hold the addressed key.
    #[error("no container at store path {path}")]
    InvalidPath {
        /// The offending path, rendered as `/a/0/b`.
        path: String,
    },

    /// An index selector was applied to something other than an array.
    #[error("store path {path} does not address an array")]
    NotAnArray {
        /// The offending path.
        path: String,
    },

    /// A merge update was given a non-object value.
    #[error("merge updates require an object value")]
    MergeRequiresObject,

    /// Propagating the update failed.
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    /// JSON conversion failed.
    #[error("json conversion failed: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("msgpack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("msgpack decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Run `f`, converting a panic into [`ReactiveError::Panicked`].
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| ReactiveError::Panicked {
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
