//! Ownership Tree
//!
//! Every memo, effect and scope is owned by whatever was the current owner
//! when it was created. Disposing an owner disposes what it owns first, then
//! runs its cleanups in registration order, then drops its dependency edges.
//! A computation disposes everything it owns before each re-run, which is how
//! stale children never outlive the run that created them.
//!
//! Roots ([`create_root`]) are the exception: they remember the current owner
//! for context and error-handler lookup but are only disposed explicitly.

use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::runtime::with_runtime;
use super::tracking::ReactiveContext;

/// A handle to a node in the ownership tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    id: NodeId,
}

impl Scope {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the scope and everything it owns. Idempotent.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_node(self.id));
    }

    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.contains(self.id))
    }

    /// Run `f` with this scope as the owner. Reads stay attributed to the
    /// current observer.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _frame = ReactiveContext::enter(ReactiveContext::current_observer(), Some(self.id));
        f()
    }

    /// Attach a cleanup to this scope.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> Result<(), ReactiveError> {
        with_runtime(|rt| rt.register_cleanup_on(self.id, Box::new(cleanup)))
    }

    /// Number of nodes currently owned by this scope.
    pub fn child_count(&self) -> usize {
        with_runtime(|rt| {
            rt.graph
                .borrow()
                .get(self.id)
                .map_or(0, |node| node.owned_ids().len())
        })
    }
}

/// Run `f` in a new root scope that is not disposed with the current owner.
///
/// Reads inside `f` are untracked. The root is handed to `f` so the caller
/// can dispose it later.
pub fn create_root<T>(f: impl FnOnce(Scope) -> T) -> T {
    let parent = ReactiveContext::current_owner();
    let id = with_runtime(|rt| rt.create_scope(parent, true));
    let _frame = ReactiveContext::enter(None, Some(id));
    f(Scope { id })
}

/// Run `f` in a new child scope of `parent`, or of the current owner when
/// `parent` is `None`.
pub fn run_in_scope<T>(parent: Option<Scope>, f: impl FnOnce(Scope) -> T) -> T {
    let parent = parent
        .map(|scope| scope.id)
        .or_else(ReactiveContext::current_owner);
    let id = with_runtime(|rt| rt.create_scope(parent, false));
    let scope = Scope { id };
    scope.run(|| f(scope))
}

/// The scope new nodes are currently attached to.
pub fn current_scope() -> Option<Scope> {
    ReactiveContext::current_owner().map(|id| Scope { id })
}

/// Register a cleanup on the current owner.
///
/// Outside of any scope the cleanup is dropped and a warning is logged.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) {
    if let Err(err) = with_runtime(|rt| rt.register_cleanup(Box::new(cleanup))) {
        tracing::warn!(error = %err, "cleanup was not registered and will never run");
    }
}

/// Run `f` in a child scope whose errors go to `handler`.
///
/// Any computation created under that scope that panics or fails reports
/// to `handler` instead of to the code that triggered it.
pub fn catch_error<T>(f: impl FnOnce() -> T, handler: impl Fn(ReactiveError) + 'static) -> T {
    run_in_scope(None, |scope| {
        with_runtime(|rt| rt.set_error_handler(scope.id, Rc::new(handler)));
        f()
    })
}

/// Run `f` without recording reads.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _frame = ReactiveContext::untracked();
    f()
}
