//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! A node carries two independent sets of links:
//!
//! - Dependency edges (`sources` / `observers`). These are rebuilt on every
//!   run of a computation, so they always describe its last execution.
//! - Ownership links (`owner` / `owned`). These bound the node's lifetime:
//!   disposing a node disposes everything it owns first.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::error::ReactiveError;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which queue an effect is flushed from.
///
/// Render effects patch the view and run before user effects in every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Render,
    User,
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal or trigger). Sources have observers but no
    /// sources of their own.
    Source,

    /// A derived node (memo). It caches its value and is re-evaluated lazily.
    Derived,

    /// An effect node. Effects are leaves: they have sources but no observers.
    Effect(EffectKind),

    /// A plain ownership scope with no computation attached.
    Scope,
}

impl NodeKind {
    /// Whether nodes of this kind carry a computation that can be re-run.
    pub fn is_computation(self) -> bool {
        matches!(self, NodeKind::Derived | NodeKind::Effect(_))
    }
}

/// Dirty state of a node.
///
/// Ordered so that `Clean < MaybeDirty < Dirty`; marking only ever raises it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// One of the node's transitive sources changed. Whether its own direct
    /// sources produced different values is not known yet.
    MaybeDirty,

    /// A direct source changed; the node must re-run.
    Dirty,
}

/// One end of a dependency edge.
///
/// `slot` is the index of the matching edge in the partner's list, so either
/// side can unlink in O(1) with a swap-remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub(crate) node: NodeId,
    pub(crate) slot: usize,
}

pub(crate) type EdgeList = SmallVec<[Edge; 4]>;
pub(crate) type Cleanup = Box<dyn FnOnce()>;
pub(crate) type ErrorHandler = Rc<dyn Fn(ReactiveError)>;

/// Something the scheduler can re-run.
pub(crate) trait Computation {
    /// Run the computation once under the current tracking frame.
    ///
    /// Returns whether the produced value changed, which decides whether
    /// observers are marked dirty.
    fn run(&self) -> Result<bool, ReactiveError>;
}

/// A node in the dependency graph.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    pub(crate) sources: EdgeList,
    pub(crate) observers: EdgeList,

    /// Parent in the ownership tree. Roots keep their parent here for context
    /// and error-handler lookup without being listed in its `owned`.
    pub(crate) owner: Option<NodeId>,
    pub(crate) owned: Vec<NodeId>,
    pub(crate) cleanups: Vec<Cleanup>,

    pub(crate) contexts: Option<HashMap<u64, Rc<dyn Any>>>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) computation: Option<Rc<dyn Computation>>,

    /// Set once disposal begins; makes disposal idempotent.
    pub(crate) disposed: bool,
}

impl Node {
    /// Create a new node with the given kind and owner.
    pub fn new(kind: NodeKind, owner: Option<NodeId>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            dirty: match kind {
                NodeKind::Source | NodeKind::Scope => DirtyState::Clean,
                // Start dirty to ensure the first computation.
                NodeKind::Derived | NodeKind::Effect(_) => DirtyState::Dirty,
            },
            sources: SmallVec::new(),
            observers: SmallVec::new(),
            owner,
            owned: Vec::new(),
            cleanups: Vec::new(),
            contexts: None,
            error_handler: None,
            computation: None,
            disposed: false,
        }
    }

    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source, None)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Raise the dirty state to at least `state`, returning the previous one.
    pub fn raise_dirty(&mut self, state: DirtyState) -> DirtyState {
        let previous = self.dirty;
        if state > previous {
            self.dirty = state;
        }
        previous
    }

    /// IDs of the nodes this node read during its last run, in read order.
    pub fn source_ids(&self) -> Vec<NodeId> {
        self.sources.iter().map(|edge| edge.node).collect()
    }

    /// IDs of the nodes currently observing this node.
    pub fn observer_ids(&self) -> Vec<NodeId> {
        self.observers.iter().map(|edge| edge.node).collect()
    }

    pub fn owned_ids(&self) -> &[NodeId] {
        &self.owned
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("sources", &self.sources.len())
            .field("observers", &self.observers.len())
            .field("owner", &self.owner)
            .field("owned", &self.owned)
            .field("cleanups", &self.cleanups.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
