//! Node Arena
//!
//! All nodes live in one map indexed by [`NodeId`]. Instead of nodes holding
//! references to each other, edges are stored as `(node, slot)` pairs where
//! `slot` is the position of the matching edge in the partner's list. That
//! keeps both directions in sync and lets either side unlink in O(1):
//!
//! 1. `swap_remove` the edge at `slot`.
//! 2. If another edge was moved into `slot`, patch its partner's back-index.
//!
//! Nothing in here runs user code. Callers take closures and values out of the
//! arena (cleanups, removed nodes) and drop or invoke them after releasing
//! their borrow.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::node::{DirtyState, Edge, EffectKind, ErrorHandler, Node, NodeId, NodeKind};

/// The dependency and ownership graph.
pub struct Graph {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Remove a node, unlinking every edge that touches it and detaching it
    /// from its owner.
    ///
    /// The node is handed back so the caller can drop its closures outside any
    /// borrow of the graph.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.unlink_sources(id);
        self.unlink_observers(id);
        let node = self.nodes.remove(&id)?;
        if let Some(owner) = node.owner {
            if let Some(parent) = self.nodes.get_mut(&owner) {
                parent.owned.retain(|child| *child != id);
            }
        }
        Some(node)
    }

    /// Record that `observer` read `source`. Returns `false` if the edge
    /// already existed or either node is gone.
    pub fn link(&mut self, source: NodeId, observer: NodeId) -> bool {
        if source == observer {
            return false;
        }
        let observer_slot = match self.nodes.get(&observer) {
            Some(node) if !node.disposed && !node.sources.iter().any(|edge| edge.node == source) => {
                node.sources.len()
            }
            _ => return false,
        };
        let source_slot = match self.nodes.get_mut(&source) {
            Some(node) => {
                node.observers.push(Edge {
                    node: observer,
                    slot: observer_slot,
                });
                node.observers.len() - 1
            }
            None => return false,
        };
        if let Some(node) = self.nodes.get_mut(&observer) {
            node.sources.push(Edge {
                node: source,
                slot: source_slot,
            });
        }
        true
    }

    /// Drop every source edge of `observer`.
    pub fn unlink_sources(&mut self, observer: NodeId) {
        let sources = match self.nodes.get_mut(&observer) {
            Some(node) => std::mem::take(&mut node.sources),
            None => return,
        };
        for edge in sources {
            self.detach_observer_slot(edge.node, edge.slot);
        }
    }

    /// Drop every observer edge of `source`.
    pub fn unlink_observers(&mut self, source: NodeId) {
        let observers = match self.nodes.get_mut(&source) {
            Some(node) => std::mem::take(&mut node.observers),
            None => return,
        };
        for edge in observers {
            self.detach_source_slot(edge.node, edge.slot);
        }
    }

    fn detach_observer_slot(&mut self, source: NodeId, slot: usize) {
        let moved = match self.nodes.get_mut(&source) {
            Some(node) if slot < node.observers.len() => {
                node.observers.swap_remove(slot);
                node.observers.get(slot).copied()
            }
            _ => None,
        };
        if let Some(moved) = moved {
            if let Some(edge) = self
                .nodes
                .get_mut(&moved.node)
                .and_then(|partner| partner.sources.get_mut(moved.slot))
            {
                edge.slot = slot;
            }
        }
    }

    fn detach_source_slot(&mut self, observer: NodeId, slot: usize) {
        let moved = match self.nodes.get_mut(&observer) {
            Some(node) if slot < node.sources.len() => {
                node.sources.swap_remove(slot);
                node.sources.get(slot).copied()
            }
            _ => None,
        };
        if let Some(moved) = moved {
            if let Some(edge) = self
                .nodes
                .get_mut(&moved.node)
                .and_then(|partner| partner.observers.get_mut(moved.slot))
            {
                edge.slot = slot;
            }
        }
    }

    pub fn sources_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes.get(&id).map(Node::source_ids).unwrap_or_default()
    }

    pub fn observers_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes.get(&id).map(Node::observer_ids).unwrap_or_default()
    }

    /// List `child` among the nodes owned by `owner`.
    pub fn adopt(&mut self, owner: NodeId, child: NodeId) {
        match self.nodes.get_mut(&owner) {
            Some(parent) if !parent.disposed => parent.owned.push(child),
            _ => tracing::debug!(owner = owner.raw(), child = child.raw(), "owner gone; node left unowned"),
        }
    }

    /// Mark everything downstream of `source` after it changed.
    ///
    /// Direct observers become `Dirty`, transitive ones `MaybeDirty`. Each
    /// node is walked once per call, including nodes that were already
    /// marked: a stale memo whose observers were reset by an aborted flush
    /// must still pass the change on. Effects that left `Clean` are returned
    /// so the scheduler can queue them.
    pub(crate) fn mark_observers(&mut self, source: NodeId) -> Vec<(NodeId, EffectKind)> {
        let mut queued = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(NodeId, DirtyState)> = self
            .observers_of(source)
            .into_iter()
            .map(|id| (id, DirtyState::Dirty))
            .collect();

        while let Some((id, state)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.disposed {
                continue;
            }
            if node.raise_dirty(state) == DirtyState::Clean {
                if let NodeKind::Effect(kind) = node.kind() {
                    queued.push((id, kind));
                }
            }
            if !visited.insert(id) {
                continue;
            }
            stack.extend(
                node.observers
                    .iter()
                    .map(|edge| (edge.node, DirtyState::MaybeDirty)),
            );
        }
        queued
    }

    /// Reset every stale effect to `Clean`. Used when a flush is abandoned,
    /// so that the next change to their sources queues them again.
    pub(crate) fn reset_effects(&mut self) -> usize {
        let mut reset = 0;
        for node in self.nodes.values_mut() {
            if matches!(node.kind(), NodeKind::Effect(_)) && !node.is_clean() {
                node.mark_clean();
                reset += 1;
            }
        }
        reset
    }

    /// `id` followed by every stale computation on its owner chain, nearest
    /// first. Running the list back to front updates parents before children.
    pub(crate) fn dirty_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut cursor = self.nodes.get(&id).and_then(Node::owner);
        while let Some(owner) = cursor {
            let Some(node) = self.nodes.get(&owner) else {
                break;
            };
            if node.kind().is_computation() && !node.is_clean() && !node.disposed {
                chain.push(owner);
            }
            cursor = node.owner;
        }
        chain
    }

    /// Nearest error handler on the owner chain, starting at `id` itself.
    pub(crate) fn find_error_handler(&self, id: NodeId) -> Option<ErrorHandler> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.nodes.get(&current)?;
            if let Some(handler) = &node.error_handler {
                return Some(Rc::clone(handler));
            }
            cursor = node.owner;
        }
        None
    }

    /// Nearest value provided under `key` on the owner chain.
    pub(crate) fn lookup_context(&self, id: NodeId, key: u64) -> Option<Rc<dyn Any>> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.nodes.get(&current)?;
            if let Some(value) = node.contexts.as_ref().and_then(|map| map.get(&key)) {
                return Some(Rc::clone(value));
            }
            cursor = node.owner;
        }
        None
    }

    pub(crate) fn set_error_handler(&mut self, id: NodeId, handler: ErrorHandler) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.error_handler = Some(handler);
        }
    }

    pub(crate) fn set_context(&mut self, id: NodeId, key: u64, value: Rc<dyn Any>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.contexts.get_or_insert_with(HashMap::new).insert(key, value);
        }
    }

    /// Every edge's back-index must point at its partner.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, node) in &self.nodes {
            for (slot, edge) in node.sources.iter().enumerate() {
                let partner = &self.nodes[&edge.node].observers[edge.slot];
                assert_eq!((partner.node, partner.slot), (*id, slot));
            }
            for (slot, edge) in node.observers.iter().enumerate() {
                let partner = &self.nodes[&edge.node].sources[edge.slot];
                assert_eq!((partner.node, partner.slot), (*id, slot));
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computation(graph: &mut Graph, kind: NodeKind) -> NodeId {
        let mut node = Node::new(kind, None);
        node.mark_clean();
        graph.insert(node)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let id1 = graph.insert(Node::source());
        let id2 = computation(&mut graph, NodeKind::Derived);
        assert_eq!(graph.node_count(), 2);

        graph.remove(id1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get(id1).is_none());
        assert!(graph.get(id2).is_some());
    }

    #[test]
    fn link_is_deduplicated() {
        let mut graph = Graph::new();
        let source = graph.insert(Node::source());
        let memo = computation(&mut graph, NodeKind::Derived);

        assert!(graph.link(source, memo));
        assert!(!graph.link(source, memo));
        assert_eq!(graph.observers_of(source), vec![memo]);
        assert_eq!(graph.sources_of(memo), vec![source]);
    }

    #[test]
    fn unlinking_patches_moved_slots() {
        let mut graph = Graph::new();
        let a = graph.insert(Node::source());
        let b = graph.insert(Node::source());
        let c = graph.insert(Node::source());
        let first = computation(&mut graph, NodeKind::Derived);
        let second = computation(&mut graph, NodeKind::Derived);
        let third = computation(&mut graph, NodeKind::Derived);

        for observer in [first, second, third] {
            for source in [a, b, c] {
                graph.link(source, observer);
            }
        }
        graph.assert_consistent();

        graph.unlink_sources(first);
        graph.assert_consistent();
        assert_eq!(graph.observers_of(a).len(), 2);
        assert!(graph.sources_of(first).is_empty());

        graph.remove(b);
        graph.assert_consistent();
        let mut remaining = graph.sources_of(second);
        remaining.sort();
        assert_eq!(remaining, vec![a, c]);
        assert_eq!(graph.observers_of(c).len(), 2);
    }

    #[test]
    fn mark_observers_propagates() {
        let mut graph = Graph::new();

        // source -> memo1 -> memo2 -> effect
        let source = graph.insert(Node::source());
        let memo1 = computation(&mut graph, NodeKind::Derived);
        let memo2 = computation(&mut graph, NodeKind::Derived);
        let effect = computation(&mut graph, NodeKind::Effect(EffectKind::User));

        graph.link(source, memo1);
        graph.link(memo1, memo2);
        graph.link(memo2, effect);

        let queued = graph.mark_observers(source);
        assert_eq!(queued, vec![(effect, EffectKind::User)]);
        assert_eq!(graph.get(memo1).unwrap().dirty_state(), DirtyState::Dirty);
        assert_eq!(graph.get(memo2).unwrap().dirty_state(), DirtyState::MaybeDirty);
        assert_eq!(graph.get(effect).unwrap().dirty_state(), DirtyState::MaybeDirty);

        // Already marked: nothing is queued twice.
        assert!(graph.mark_observers(source).is_empty());
    }

    #[test]
    fn marking_reaches_reset_effects_through_stale_memos() {
        let mut graph = Graph::new();
        let source = graph.insert(Node::source());
        let memo = computation(&mut graph, NodeKind::Derived);
        let effect = computation(&mut graph, NodeKind::Effect(EffectKind::User));
        graph.link(source, memo);
        graph.link(memo, effect);

        graph.mark_observers(source);
        assert_eq!(graph.reset_effects(), 1);
        assert!(graph.get(effect).unwrap().is_clean());
        assert_eq!(graph.get(memo).unwrap().dirty_state(), DirtyState::Dirty);

        // The memo is still stale, yet the effect behind it is queued again.
        assert_eq!(graph.mark_observers(source), vec![(effect, EffectKind::User)]);
        assert_eq!(graph.get(effect).unwrap().dirty_state(), DirtyState::MaybeDirty);
    }

    #[test]
    fn diamond_queues_effect_once() {
        let mut graph = Graph::new();
        let source = graph.insert(Node::source());
        let left = computation(&mut graph, NodeKind::Derived);
        let right = computation(&mut graph, NodeKind::Derived);
        let effect = computation(&mut graph, NodeKind::Effect(EffectKind::Render));

        graph.link(source, left);
        graph.link(source, right);
        graph.link(left, effect);
        graph.link(right, effect);

        assert_eq!(graph.mark_observers(source), vec![(effect, EffectKind::Render)]);
    }

    #[test]
    fn removing_node_detaches_from_owner() {
        let mut graph = Graph::new();
        let parent = graph.insert(Node::new(NodeKind::Scope, None));
        let child = graph.insert(Node::new(NodeKind::Scope, Some(parent)));
        graph.adopt(parent, child);
        assert_eq!(graph.get(parent).unwrap().owned_ids(), &[child]);

        graph.remove(child);
        assert!(graph.get(parent).unwrap().owned_ids().is_empty());
    }

    #[test]
    fn lookups_walk_owner_chain() {
        let mut graph = Graph::new();
        let root = graph.insert(Node::new(NodeKind::Scope, None));
        let middle = graph.insert(Node::new(NodeKind::Scope, Some(root)));
        let leaf = graph.insert(Node::new(NodeKind::Scope, Some(middle)));

        graph.set_context(root, 1, Rc::new("outer"));
        graph.set_context(middle, 1, Rc::new("inner"));
        graph.set_context(root, 2, Rc::new(5u32));

        let shadowed = graph.lookup_context(leaf, 1).unwrap();
        assert_eq!(shadowed.downcast_ref::<&str>(), Some(&"inner"));
        let inherited = graph.lookup_context(leaf, 2).unwrap();
        assert_eq!(inherited.downcast_ref::<u32>(), Some(&5));
        assert!(graph.lookup_context(leaf, 3).is_none());

        assert!(graph.find_error_handler(leaf).is_none());
        graph.set_error_handler(root, Rc::new(|_| {}));
        assert!(graph.find_error_handler(leaf).is_some());
    }
}
