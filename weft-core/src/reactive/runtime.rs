//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and the scheduler, and implements
//! the two halves of propagation:
//!
//! 1. **Push.** When a write commits, the runtime marks direct observers
//!    `Dirty`, everything further downstream `MaybeDirty`, and queues the
//!    effects that were reached (see `scheduler.rs`).
//!
//! 2. **Pull.** Before a computation runs or a memo is read, the runtime
//!    brings it up to date with [`RuntimeState::update_if_necessary`]: a
//!    `MaybeDirty` node refreshes its sources in read order and only re-runs
//!    if one of them actually produced a new value.
//!
//! # Threading
//!
//! There is one runtime per thread. Handles (`Signal`, `Memo`, ...) are
//! `!Send`, so a graph can never be observed from two threads at once. No
//! `RefCell` borrow of runtime state is ever held while user code runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::error::{catch_panic, ReactiveError};
use crate::graph::{Cleanup, Computation, DirtyState, ErrorHandler, Graph, Node, NodeId, NodeKind};

use super::scheduler::Scheduler;
use super::tracking::ReactiveContext;

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::new();
}

pub(crate) fn with_runtime<R>(f: impl FnOnce(&RuntimeState) -> R) -> R {
    RUNTIME.with(f)
}

/// Like [`with_runtime`], but returns `None` during thread teardown.
pub(crate) fn try_with_runtime<R>(f: impl FnOnce(&RuntimeState) -> R) -> Option<R> {
    RUNTIME.try_with(f).ok()
}

pub(crate) struct RuntimeState {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) scheduler: Scheduler,
    config: RefCell<RuntimeConfig>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            scheduler: Scheduler::new(),
            config: RefCell::new(RuntimeConfig::from_env()),
        }
    }

    pub(crate) fn max_propagation(&self) -> usize {
        self.config.borrow().max_propagation
    }

    /// Insert a computation owned by the current owner.
    pub(crate) fn create_computation(&self, kind: NodeKind, computation: Rc<dyn Computation>) -> NodeId {
        let owner = ReactiveContext::current_owner();
        if owner.is_none() && self.config.borrow().warn_unowned {
            tracing::warn!(?kind, "computation created outside of any scope will never be disposed");
        }
        let mut node = Node::new(kind, owner);
        node.computation = Some(computation);

        let mut graph = self.graph.borrow_mut();
        let id = graph.insert(node);
        if let Some(owner) = owner {
            graph.adopt(owner, id);
        }
        id
    }

    /// Insert a plain scope under `parent`. Detached scopes remember their
    /// parent for lookups but are not disposed with it.
    pub(crate) fn create_scope(&self, parent: Option<NodeId>, detached: bool) -> NodeId {
        let mut graph = self.graph.borrow_mut();
        let id = graph.insert(Node::new(NodeKind::Scope, parent));
        if let (Some(parent), false) = (parent, detached) {
            graph.adopt(parent, id);
        }
        id
    }

    pub(crate) fn create_source(&self) -> NodeId {
        self.graph.borrow_mut().insert(Node::source())
    }

    /// Remove a source whose handle was dropped.
    pub(crate) fn release_source(&self, id: NodeId) {
        let removed = match self.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove(id),
            Err(_) => {
                tracing::trace!(node = id.raw(), "graph busy; source node leaked");
                None
            }
        };
        drop(removed);
    }

    /// Attribute a read of `source` to the running computation, if any.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(observer) = ReactiveContext::current_observer() {
            self.graph.borrow_mut().link(source, observer);
        }
    }

    pub(crate) fn state_of(&self, id: NodeId) -> Option<DirtyState> {
        self.graph.borrow().get(id).map(Node::dirty_state)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.graph.borrow().contains(id)
    }

    /// Bring a memo up to date before it is read.
    ///
    /// Writes performed by the memo body are deferred until it has finished.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<(), ReactiveError> {
        let result = {
            let _batch = self.scheduler.hold();
            self.update_if_necessary(id)
        };
        result?;
        self.flush_if_idle()
    }

    pub(crate) fn update_if_necessary(&self, id: NodeId) -> Result<(), ReactiveError> {
        let (state, sources) = {
            let graph = self.graph.borrow();
            match graph.get(id) {
                Some(node) if node.kind().is_computation() && !node.disposed => {
                    let sources = match node.dirty_state() {
                        DirtyState::MaybeDirty => node.source_ids(),
                        _ => Vec::new(),
                    };
                    (node.dirty_state(), sources)
                }
                _ => return Ok(()),
            }
        };

        if state == DirtyState::Clean {
            return Ok(());
        }
        if state == DirtyState::MaybeDirty {
            for source in sources {
                self.update_if_necessary(source)?;
                if self.state_of(id) == Some(DirtyState::Dirty) {
                    break;
                }
            }
        }

        match self.state_of(id) {
            Some(DirtyState::Dirty) => self.update_computation(id),
            Some(_) => {
                if let Some(node) = self.graph.borrow_mut().get_mut(id) {
                    node.mark_clean();
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Update `id` after every stale computation that owns it, outermost
    /// first. A parent's re-run may dispose `id`, in which case it is skipped.
    pub(crate) fn run_top(&self, id: NodeId) -> Result<(), ReactiveError> {
        let chain = self.graph.borrow().dirty_ancestors(id);
        for node in chain.into_iter().rev() {
            self.update_if_necessary(node)?;
        }
        Ok(())
    }

    /// Re-evaluate a computation.
    ///
    /// Owned children and cleanups are disposed and source edges dropped
    /// first, so the edges after the run are exactly the reads of this run.
    pub(crate) fn update_computation(&self, id: NodeId) -> Result<(), ReactiveError> {
        self.clean_node(id);
        let computation = match self.graph.borrow().get(id) {
            Some(node) if !node.disposed => node.computation.clone(),
            _ => None,
        };
        let Some(computation) = computation else {
            return Ok(());
        };

        let outcome = {
            let _frame = ReactiveContext::enter(Some(id), Some(id));
            computation.run()
        };
        match outcome {
            Ok(true) => {
                self.notify_observers(id);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => self.handle_error(id, err),
        }
    }

    /// Mark everything downstream of `source` and queue reached effects.
    pub(crate) fn notify_observers(&self, source: NodeId) {
        let queued = self.graph.borrow_mut().mark_observers(source);
        self.scheduler.enqueue(queued);
    }

    /// Dispose owned children, run cleanups in registration order and drop
    /// source edges. The node itself stays in the graph.
    pub(crate) fn clean_node(&self, id: NodeId) {
        let (owned, cleanups) = {
            let mut graph = self.graph.borrow_mut();
            match graph.get_mut(id) {
                Some(node) => (std::mem::take(&mut node.owned), std::mem::take(&mut node.cleanups)),
                None => return,
            }
        };

        for child in owned {
            self.dispose_node(child);
        }
        for cleanup in cleanups {
            cleanup();
        }

        let mut graph = self.graph.borrow_mut();
        graph.unlink_sources(id);
        if let Some(node) = graph.get_mut(id) {
            node.mark_clean();
        }
    }

    /// Dispose a node and everything it owns. Idempotent, and safe to call
    /// again from inside one of the node's own cleanups.
    pub(crate) fn dispose_node(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            match graph.get_mut(id) {
                Some(node) if !node.disposed => node.disposed = true,
                _ => return,
            }
        }

        self.clean_node(id);
        let removed = self.graph.borrow_mut().remove(id);
        drop(removed);
        tracing::trace!(node = id.raw(), "disposed");
    }

    /// Run `f` on behalf of `id` outside the graph. A panic is routed like a
    /// failed run; `Ok(None)` means a handler took it.
    pub(crate) fn run_detached<R>(&self, id: NodeId, f: impl FnOnce() -> R) -> Result<Option<R>, ReactiveError> {
        match catch_panic(f) {
            Ok(value) => Ok(Some(value)),
            Err(err) => self.handle_error(id, err).map(|()| None),
        }
    }

    /// Route a failed run to the nearest handler on the owner chain.
    fn handle_error(&self, id: NodeId, err: ReactiveError) -> Result<(), ReactiveError> {
        let handler = self.graph.borrow().find_error_handler(id);
        match handler {
            Some(handler) => {
                tracing::debug!(node = id.raw(), error = %err, "computation error routed to scope handler");
                handler(err);
                Ok(())
            }
            None => Err(err),
        }
    }

    pub(crate) fn register_cleanup(&self, cleanup: Cleanup) -> Result<(), ReactiveError> {
        let Some(owner) = ReactiveContext::current_owner() else {
            return Err(ReactiveError::NoOwner {
                operation: "on_cleanup",
            });
        };
        self.register_cleanup_on(owner, cleanup)
    }

    pub(crate) fn register_cleanup_on(&self, owner: NodeId, cleanup: Cleanup) -> Result<(), ReactiveError> {
        let mut graph = self.graph.borrow_mut();
        match graph.get_mut(owner) {
            Some(node) if !node.disposed => {
                node.cleanups.push(cleanup);
                Ok(())
            }
            _ => Err(ReactiveError::Disposed),
        }
    }

    pub(crate) fn set_error_handler(&self, id: NodeId, handler: ErrorHandler) {
        self.graph.borrow_mut().set_error_handler(id, handler);
    }
}

/// Inspection and configuration of the current thread's runtime.
pub struct Runtime;

impl Runtime {
    /// Replace the runtime settings for this thread.
    pub fn configure(config: RuntimeConfig) {
        with_runtime(|rt| *rt.config.borrow_mut() = config);
    }

    /// The settings currently in effect on this thread.
    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config.borrow().clone())
    }

    /// Number of live nodes (sources, computations and scopes).
    pub fn node_count() -> usize {
        with_runtime(|rt| rt.graph.borrow().node_count())
    }

    /// Whether a computation is currently recording reads.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Whether writes are currently being deferred.
    pub fn is_batching() -> bool {
        with_runtime(|rt| rt.scheduler.is_batching())
    }
}
