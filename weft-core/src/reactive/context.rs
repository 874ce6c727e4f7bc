//! Context Channel
//!
//! Values provided on a scope are visible to every node created beneath it,
//! unless a nearer scope provides the same context again. Lookups walk the
//! owner chain outward. Propagation is read-only: there is no way to write a
//! value back to the provider.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::owner::run_in_scope;
use super::runtime::with_runtime;
use super::tracking::ReactiveContext;

static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A typed context key.
///
/// Each `Context::new()` is a distinct key, even for the same `T`.
pub struct Context<T> {
    id: u64,
    default: Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Context<T> {
    pub fn new() -> Self {
        Self {
            id: CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            default: None,
            _marker: PhantomData,
        }
    }

    /// A key that yields `value` when nothing was provided.
    pub fn with_default(value: T) -> Self {
        Self {
            default: Some(value),
            ..Self::new()
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T: Clone + 'static> Default for Context<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Run `f` in a new scope where `context` resolves to `value`.
pub fn provide_context<T: Clone + 'static, R>(context: &Context<T>, value: T, f: impl FnOnce() -> R) -> R {
    run_in_scope(None, |scope| {
        let value: Rc<dyn Any> = Rc::new(value);
        with_runtime(|rt| rt.graph.borrow_mut().set_context(scope.id(), context.id, value));
        f()
    })
}

/// Look up the nearest value provided for `context`, falling back to its
/// default. Returns `None` when neither exists.
pub fn use_context<T: Clone + 'static>(context: &Context<T>) -> Option<T> {
    let found = ReactiveContext::current_owner()
        .and_then(|owner| with_runtime(|rt| rt.graph.borrow().lookup_context(owner, context.id)));
    match found {
        Some(value) => value.downcast_ref::<T>().cloned(),
        None => context.default.clone(),
    }
}
