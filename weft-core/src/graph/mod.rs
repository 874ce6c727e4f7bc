//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive values, the computations that read them, and the scopes that own
//! those computations.
//!
//! # Overview
//!
//! - Nodes represent sources (signals), computations (memos, effects) or
//!   plain ownership scopes.
//! - Dependency edges run from a source to each observer that read it during
//!   its last run.
//! - Ownership links run from a scope or computation to the nodes created
//!   while it was the current owner.
//!
//! # Design Decisions
//!
//! 1. One centralized arena indexed by [`NodeId`] replaces bidirectional
//!    object references, so there are no reference cycles to leak.
//!
//! 2. Edges store their partner's slot index, which makes unlinking O(1).
//!
//! 3. Both directions are kept so a change can walk downstream (marking)
//!    and a stale computation can walk upstream (pulling).

mod arena;
mod node;

pub use arena::Graph;
pub use node::{DirtyState, EffectKind, Node, NodeId, NodeKind};

pub(crate) use node::{Cleanup, Computation, ErrorHandler};
