//! Delegated Events
//!
//! Instead of a listener per node, the document installs one listener per
//! event kind. Dispatch starts at the event's target and walks up through
//! the parents, invoking each node's handler for that kind until one stops
//! propagation. Handlers run inside a batch, so the writes a handler makes
//! are committed together when it returns.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde_json::Value;

use crate::error::ReactiveError;
use crate::reactive::try_batch;

use super::dom::DomNode;

pub type EventHandler = Rc<dyn Fn(&Event)>;

/// An event travelling up from its target.
pub struct Event {
    kind: String,
    target: DomNode,
    current_target: RefCell<Option<DomNode>>,
    stopped: Cell<bool>,
    detail: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: &DomNode) -> Self {
        Self {
            kind: kind.into(),
            target: target.clone(),
            current_target: RefCell::new(None),
            stopped: Cell::new(false),
            detail: Value::Null,
        }
    }

    /// Attach a payload, such as the new value of an input.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> &DomNode {
        &self.target
    }

    /// The node whose handler is running.
    pub fn current_target(&self) -> Option<DomNode> {
        self.current_target.borrow().clone()
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("stopped", &self.stopped.get())
            .finish_non_exhaustive()
    }
}

/// Registry of the event kinds a document listens for.
#[derive(Debug, Default)]
pub struct EventDelegator {
    installed: RefCell<IndexSet<String>>,
}

impl EventDelegator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one listener for each kind not already delegated. Returns how
    /// many were newly installed.
    pub fn delegate(&self, kinds: &[&str]) -> usize {
        let mut installed = self.installed.borrow_mut();
        let added = kinds.iter().filter(|kind| installed.insert((**kind).to_string())).count();
        if added > 0 {
            tracing::debug!(added, total = installed.len(), "delegated event listeners installed");
        }
        added
    }

    pub fn is_delegated(&self, kind: &str) -> bool {
        self.installed.borrow().contains(kind)
    }

    /// Delegated kinds, in installation order.
    pub fn kinds(&self) -> Vec<String> {
        self.installed.borrow().iter().cloned().collect()
    }

    /// Deliver `event`, returning how many handlers ran. Events of a kind
    /// that was never delegated reach no handler.
    pub fn dispatch(&self, event: &Event) -> Result<usize, ReactiveError> {
        if !self.is_delegated(event.kind()) {
            tracing::trace!(kind = event.kind(), "event kind not delegated");
            return Ok(0);
        }
        let mut handled = 0;
        let mut node = Some(event.target().clone());
        while let Some(current) = node {
            if let Some(handler) = current.handler(event.kind()) {
                *event.current_target.borrow_mut() = Some(current.clone());
                try_batch(|| handler(event))?;
                handled += 1;
                if event.is_propagation_stopped() {
                    break;
                }
            }
            node = current.parent();
        }
        *event.current_target.borrow_mut() = None;
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, Effect, Signal};

    fn tree() -> (DomNode, DomNode, DomNode) {
        let root = DomNode::element("div");
        let list = DomNode::element("ul");
        let item = DomNode::element("li");
        root.append_child(&list);
        list.append_child(&item);
        (root, list, item)
    }

    #[test]
    fn delegate_installs_once_per_kind() {
        let events = EventDelegator::new();
        assert_eq!(events.delegate(&["click", "input"]), 2);
        assert_eq!(events.delegate(&["click", "keydown"]), 1);
        assert_eq!(events.kinds(), vec!["click", "input", "keydown"]);
    }

    #[test]
    fn dispatch_bubbles_to_ancestors() {
        let (root, list, item) = tree();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for node in [&root, &item] {
            let seen = Rc::clone(&seen);
            node.set_handler("click", move |event: &Event| {
                seen.borrow_mut().push(event.current_target().and_then(|node| node.tag()));
            });
        }
        let events = EventDelegator::new();
        events.delegate(&["click"]);

        let handled = events.dispatch(&Event::new("click", &item)).unwrap();
        assert_eq!(handled, 2);
        assert_eq!(
            *seen.borrow(),
            vec![Some("li".to_string()), Some("div".to_string())]
        );
        assert!(list.handler("click").is_none());
    }

    #[test]
    fn stop_propagation_ends_the_walk() {
        let (root, _, item) = tree();
        let outer = Rc::new(Cell::new(0));
        let hits = Rc::clone(&outer);
        root.set_handler("click", move |_: &Event| hits.set(hits.get() + 1));
        item.set_handler("click", |event: &Event| event.stop_propagation());

        let events = EventDelegator::new();
        events.delegate(&["click"]);
        assert_eq!(events.dispatch(&Event::new("click", &item)).unwrap(), 1);
        assert_eq!(outer.get(), 0);
    }

    #[test]
    fn undelegated_kinds_are_ignored() {
        let (_, _, item) = tree();
        item.set_handler("click", |_: &Event| panic!("should not run"));
        let events = EventDelegator::new();
        assert_eq!(events.dispatch(&Event::new("click", &item)).unwrap(), 0);
    }

    #[test]
    fn handler_writes_are_batched() {
        let (_, _, item) = tree();
        let a = Signal::new(0);
        let b = Signal::new(0);
        let effect = create_root(|_| {
            let (a, b) = (a.clone(), b.clone());
            Effect::new(move || {
                a.get();
                b.get();
            })
        });
        let (wa, wb) = (a.clone(), b.clone());
        item.set_handler("input", move |event: &Event| {
            let value = event.detail().as_i64().unwrap_or(0);
            wa.set(value);
            wb.set(value);
        });

        let events = EventDelegator::new();
        events.delegate(&["input"]);
        events
            .dispatch(&Event::new("input", &item).with_detail(serde_json::json!(5)))
            .unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(a.get_untracked(), 5);
    }
}
