//! Suspension Tracking
//!
//! A suspense boundary counts outstanding work below it. Code that starts
//! asynchronous work looks up the nearest boundary through the context
//! channel and holds a [`SuspenseGuard`] until the work settles; views read
//! [`SuspenseState::is_pending`] to show a fallback meanwhile.

use std::fmt;

use super::context::{provide_context, use_context, Context};
use super::signal::Signal;

thread_local! {
    static SUSPENSE: Context<SuspenseState> = Context::new();
}

fn suspense_key() -> Context<SuspenseState> {
    SUSPENSE.with(Context::clone)
}

/// Pending-work counter of one suspense boundary.
#[derive(Clone)]
pub struct SuspenseState {
    pending: Signal<usize>,
}

impl SuspenseState {
    pub fn new() -> Self {
        Self {
            pending: Signal::new(0),
        }
    }

    /// Whether any work is outstanding. Tracked.
    pub fn is_pending(&self) -> bool {
        self.pending.get() > 0
    }

    /// Number of outstanding pieces of work. Tracked.
    pub fn pending_count(&self) -> usize {
        self.pending.get()
    }

    /// Register one piece of outstanding work.
    pub fn begin(&self) -> SuspenseGuard {
        self.pending.update(|count| count + 1);
        SuspenseGuard {
            state: self.clone(),
        }
    }
}

impl Default for SuspenseState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SuspenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspenseState")
            .field("pending", &self.pending.get_untracked())
            .finish()
    }
}

/// Marks one piece of work as outstanding until dropped.
#[must_use = "the work is considered settled as soon as the guard is dropped"]
pub struct SuspenseGuard {
    state: SuspenseState,
}

impl Drop for SuspenseGuard {
    fn drop(&mut self) {
        let next = self.state.pending.get_untracked().saturating_sub(1);
        if let Err(err) = self.state.pending.try_set(next) {
            tracing::error!(error = %err, "settling suspended work failed");
        }
    }
}

/// Run `f` under a new suspense boundary.
pub fn suspend<R>(f: impl FnOnce(&SuspenseState) -> R) -> R {
    let state = SuspenseState::new();
    provide_context(&suspense_key(), state.clone(), || f(&state))
}

/// The nearest enclosing suspense boundary.
pub fn use_suspense() -> Option<SuspenseState> {
    use_context(&suspense_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, Effect};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn guards_drive_pending_state() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let guard = create_root(|_| {
            suspend(|state| {
                let (state, seen) = (state.clone(), Rc::clone(&seen));
                Effect::new(move || seen.borrow_mut().push(state.is_pending()));

                let boundary = use_suspense().expect("inside a boundary");
                boundary.begin()
            })
        });
        assert_eq!(*seen.borrow(), vec![false, true]);

        drop(guard);
        assert_eq!(*seen.borrow(), vec![false, true, false]);
    }

    #[test]
    fn nested_work_counts() {
        create_root(|_| {
            suspend(|state| {
                let first = state.begin();
                let second = state.begin();
                assert_eq!(state.pending_count(), 2);
                drop(first);
                assert!(state.is_pending());
                drop(second);
                assert!(!state.is_pending());
            });
        });
    }

    #[test]
    fn no_boundary_outside_suspend() {
        create_root(|_| assert!(use_suspense().is_none()));
    }
}
