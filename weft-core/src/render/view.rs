//! Views
//!
//! A [`View`] is what a render function hands back: nothing, text, a node,
//! a sequence of views, or a closure that recomputes a view. [`insert`]
//! places a view into a parent. Static views are inserted once; a view with
//! a reactive part becomes a render effect that patches its previous output
//! whenever what it read changes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::create_render_effect;

use super::dom::DomNode;
use super::reconcile::reconcile_arrays;

/// Renderable content.
#[derive(Clone, Default)]
pub enum View {
    #[default]
    Empty,
    Text(String),
    Node(DomNode),
    Sequence(Vec<View>),
    Reactive(Rc<dyn Fn() -> View>),
}

impl View {
    pub fn reactive(render: impl Fn() -> View + 'static) -> Self {
        View::Reactive(Rc::new(render))
    }

    fn is_dynamic(&self) -> bool {
        match self {
            View::Reactive(_) => true,
            View::Sequence(views) => views.iter().any(View::is_dynamic),
            View::Empty | View::Text(_) | View::Node(_) => false,
        }
    }

    /// Flatten into nodes, reusing text nodes from `current` by position.
    /// Reactive parts are evaluated in the caller's tracking frame.
    fn normalize(&self, current: &[DomNode], out: &mut Vec<DomNode>) {
        match self {
            View::Empty => {}
            View::Text(text) => {
                let node = match current.get(out.len()) {
                    Some(node) if node.is_text() && !out.contains(node) => {
                        node.set_data(text);
                        node.clone()
                    }
                    _ => DomNode::text(text.as_str()),
                };
                out.push(node);
            }
            View::Node(node) => out.push(node.clone()),
            View::Sequence(views) => {
                for view in views {
                    view.normalize(current, out);
                }
            }
            View::Reactive(render) => render().normalize(current, out),
        }
    }

    fn to_nodes(&self, current: &[DomNode]) -> Vec<DomNode> {
        let mut out = Vec::new();
        self.normalize(current, &mut out);
        out
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Empty => f.write_str("Empty"),
            View::Text(text) => f.debug_tuple("Text").field(text).finish(),
            View::Node(node) => f.debug_tuple("Node").field(node).finish(),
            View::Sequence(views) => f.debug_tuple("Sequence").field(views).finish(),
            View::Reactive(_) => f.write_str("Reactive(..)"),
        }
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_string())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<DomNode> for View {
    fn from(node: DomNode) -> Self {
        View::Node(node)
    }
}

impl From<Vec<View>> for View {
    fn from(views: Vec<View>) -> Self {
        View::Sequence(views)
    }
}

/// Replace `current` with `next` among `parent`'s children, keeping them
/// before `marker`.
fn patch(parent: &DomNode, current: &[DomNode], next: &[DomNode], marker: Option<&DomNode>) {
    if next.is_empty() {
        for node in current {
            parent.remove_child(node);
        }
    } else {
        reconcile_arrays(parent, current, next, marker);
    }
}

/// Insert `view` into `parent` before `marker` (or at the end).
///
/// A view containing a reactive part is kept up to date by a render effect
/// owned by the current scope.
pub fn insert(parent: &DomNode, view: View, marker: Option<&DomNode>) {
    if !view.is_dynamic() {
        patch(parent, &[], &view.to_nodes(&[]), marker);
        return;
    }
    let parent = parent.clone();
    let marker = marker.cloned();
    let current: RefCell<Vec<DomNode>> = RefCell::new(Vec::new());
    create_render_effect(move || {
        let previous = current.take();
        let next = view.to_nodes(&previous);
        patch(&parent, &previous, &next, marker.as_ref());
        *current.borrow_mut() = next;
    });
}
