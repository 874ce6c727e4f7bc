//! Tracking Frames
//!
//! The tracking frame records which computation is currently running (the
//! *observer*, which reads are attributed to) and which node currently owns
//! newly created nodes (the *owner*). The two usually coincide, but not
//! always: `untrack` keeps the owner and clears the observer, and
//! `Scope::run` swaps the owner while keeping the observer.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a frame pushes it; dropping the
//! returned guard pops it, so the stack stays balanced even if the
//! computation panics.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the tracking stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContextEntry {
    observer: Option<NodeId>,
    owner: Option<NodeId>,
}

/// Guard that pops the frame when dropped.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ReactiveContext {
    entry: ContextEntry,
}

impl ReactiveContext {
    /// Enter a frame with an explicit observer and owner.
    pub fn enter(observer: Option<NodeId>, owner: Option<NodeId>) -> Self {
        let entry = ContextEntry { observer, owner };
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { entry }
    }

    /// Enter a frame that keeps the current owner but records no reads.
    pub fn untracked() -> Self {
        Self::enter(None, Self::current_owner())
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_observer().is_some()
    }

    /// The computation reads are attributed to, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// The node that owns anything created right now, if any.
    pub fn current_owner() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry, self.entry,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.entry, entry
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(id), Some(id));

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_observer(), Some(id));
            assert_eq!(ReactiveContext::current_owner(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_owner().is_none());
    }

    #[test]
    fn untracked_keeps_owner() {
        let id = NodeId::new();
        let _ctx = ReactiveContext::enter(Some(id), Some(id));
        {
            let _untracked = ReactiveContext::untracked();
            assert!(!ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_owner(), Some(id));
        }
        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(Some(id1), Some(id1));
            assert_eq!(ReactiveContext::current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(Some(id2), Some(id2));
                assert_eq!(ReactiveContext::current_observer(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_observer(), Some(id1));
        }

        assert!(ReactiveContext::current_observer().is_none());
    }
}
