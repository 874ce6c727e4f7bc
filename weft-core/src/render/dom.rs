//! Host Node Model
//!
//! A small retained node tree standing in for the platform DOM. Nodes are
//! reference counted and compared by identity, which is what the
//! reconciler keys on. Parents own their children; a child points back at
//! its parent weakly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::events::{Event, EventDelegator, EventHandler};

static NODE_COUNTER: AtomicU64 = AtomicU64::new(0);

enum Content {
    Element(String),
    Text(String),
}

struct NodeData {
    id: u64,
    content: RefCell<Content>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<DomNode>>,
    handlers: RefCell<HashMap<String, EventHandler>>,
    mutations: RefCell<Option<Vec<Mutation>>>,
}

/// A change to a node's child list, as recorded by
/// [`DomNode::record_mutations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert { node: DomNode, before: Option<DomNode> },
    Remove { node: DomNode },
    Replace { old: DomNode, new: DomNode },
}

/// Handle to an element or text node.
#[derive(Clone)]
pub struct DomNode(Rc<NodeData>);

impl DomNode {
    fn build(content: Content) -> Self {
        Self(Rc::new(NodeData {
            id: NODE_COUNTER.fetch_add(1, Ordering::Relaxed),
            content: RefCell::new(content),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            handlers: RefCell::new(HashMap::new()),
            mutations: RefCell::new(None),
        }))
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self::build(Content::Element(tag.into()))
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::build(Content::Text(data.into()))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Tag name, or `None` for text nodes.
    pub fn tag(&self) -> Option<String> {
        match &*self.0.content.borrow() {
            Content::Element(tag) => Some(tag.clone()),
            Content::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(&*self.0.content.borrow(), Content::Text(_))
    }

    /// Text of a text node.
    pub fn data(&self) -> Option<String> {
        match &*self.0.content.borrow() {
            Content::Text(data) => Some(data.clone()),
            Content::Element(_) => None,
        }
    }

    /// Replace the text of a text node. Elements are left alone.
    pub fn set_data(&self, data: &str) {
        if let Content::Text(current) = &mut *self.0.content.borrow_mut() {
            if current.as_str() != data {
                data.clone_into(current);
            }
        }
    }

    pub fn parent(&self) -> Option<DomNode> {
        self.0.parent.borrow().upgrade().map(DomNode)
    }

    pub fn children(&self) -> Vec<DomNode> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<DomNode> {
        self.0.children.borrow().first().cloned()
    }

    pub fn next_sibling(&self) -> Option<DomNode> {
        let parent = self.parent()?;
        let children = parent.0.children.borrow();
        let index = children.iter().position(|child| child == self)?;
        children.get(index + 1).cloned()
    }

    fn index_of(&self, child: &DomNode) -> Option<usize> {
        self.0.children.borrow().iter().position(|node| node == child)
    }

    fn log(&self, mutation: Mutation) {
        if let Some(log) = self.0.mutations.borrow_mut().as_mut() {
            log.push(mutation);
        }
    }

    /// Take `child` out of whatever list it is in, without logging.
    fn detach(child: &DomNode) {
        if let Some(parent) = child.parent() {
            parent.0.children.borrow_mut().retain(|node| node != child);
        }
        *child.0.parent.borrow_mut() = Weak::new();
    }

    pub fn append_child(&self, child: &DomNode) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `before`, or at the end for `None`. A child
    /// already in the tree is moved. A `before` that is not a child of this
    /// node appends.
    pub fn insert_before(&self, child: &DomNode, before: Option<&DomNode>) {
        self.log(Mutation::Insert {
            node: child.clone(),
            before: before.cloned(),
        });
        if before == Some(child) {
            return;
        }
        Self::detach(child);
        let index = before.and_then(|node| self.index_of(node));
        {
            let mut children = self.0.children.borrow_mut();
            match index {
                Some(index) => children.insert(index, child.clone()),
                None => children.push(child.clone()),
            }
        }
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
    }

    /// Remove `child`. Returns `false` if it was not a child of this node.
    pub fn remove_child(&self, child: &DomNode) -> bool {
        let Some(index) = self.index_of(child) else {
            return false;
        };
        self.0.children.borrow_mut().remove(index);
        *child.0.parent.borrow_mut() = Weak::new();
        self.log(Mutation::Remove { node: child.clone() });
        true
    }

    /// Put `new` where `old` is. Returns `false` if `old` is not a child.
    pub fn replace_child(&self, new: &DomNode, old: &DomNode) -> bool {
        if new == old {
            return self.index_of(old).is_some();
        }
        if self.index_of(old).is_none() {
            return false;
        }
        Self::detach(new);
        // Detaching a sibling may shift `old`.
        let Some(index) = self.index_of(old) else {
            return false;
        };
        self.0.children.borrow_mut()[index] = new.clone();
        *old.0.parent.borrow_mut() = Weak::new();
        *new.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.log(Mutation::Replace {
            old: old.clone(),
            new: new.clone(),
        });
        true
    }

    /// Detach this node from its parent.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Remove every child.
    pub fn clear(&self) {
        for child in self.children() {
            self.remove_child(&child);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &*self.0.content.borrow() {
            Content::Text(data) => out.push_str(data),
            Content::Element(_) => {
                for child in self.0.children.borrow().iter() {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Serialize the subtree as markup, e.g. `<ul><li>a</li></ul>`.
    pub fn to_markup(&self) -> String {
        match &*self.0.content.borrow() {
            Content::Text(data) => data.clone(),
            Content::Element(tag) => {
                let inner: String = self.0.children.borrow().iter().map(DomNode::to_markup).collect();
                format!("<{tag}>{inner}</{tag}>")
            }
        }
    }

    /// Start recording changes to this node's child list.
    pub fn record_mutations(&self) {
        self.0.mutations.borrow_mut().get_or_insert_with(Vec::new);
    }

    /// Recorded changes since the last call. Recording continues.
    pub fn take_mutations(&self) -> Vec<Mutation> {
        self.0
            .mutations
            .borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Attach the handler delegated events of `kind` invoke on this node.
    pub fn set_handler(&self, kind: impl Into<String>, handler: impl Fn(&Event) + 'static) {
        self.0.handlers.borrow_mut().insert(kind.into(), Rc::new(handler));
    }

    pub fn remove_handler(&self, kind: &str) {
        self.0.handlers.borrow_mut().remove(kind);
    }

    pub fn handler(&self, kind: &str) -> Option<EventHandler> {
        self.0.handlers.borrow().get(kind).cloned()
    }
}

impl PartialEq for DomNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DomNode {}

impl Hash for DomNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.content.borrow() {
            Content::Element(tag) => write!(f, "<{tag}#{}>", self.0.id),
            Content::Text(data) => write!(f, "{data:?}#{}", self.0.id),
        }
    }
}

/// A document: a body to mount into and the delegated event registry.
#[derive(Debug)]
pub struct Document {
    body: DomNode,
    events: EventDelegator,
}

impl Document {
    pub fn new() -> Self {
        Self {
            body: DomNode::element("body"),
            events: EventDelegator::new(),
        }
    }

    pub fn body(&self) -> &DomNode {
        &self.body
    }

    pub fn events(&self) -> &EventDelegator {
        &self.events
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
