//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change. It is both a computation (it observes what it reads)
//! and a source (other computations observe it).
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When a direct source changes the memo is marked `Dirty`; when something
//!    further upstream changes it is marked `MaybeDirty`. Nothing runs yet.
//!
//! 3. On next access, a `MaybeDirty` memo first refreshes its own sources.
//!    It only recomputes if one of them produced a new value.
//!
//! 4. After recomputing, the new value is compared with the cached one. If
//!    they are equal the memo's observers are left alone, which prunes the
//!    rest of the downstream graph.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read recompute
//! - Memos that are never read stay dirty (no wasted work)

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{catch_panic, ReactiveError};
use crate::graph::{Computation, DirtyState, NodeId, NodeKind};

use super::owner::untrack;
use super::runtime::with_runtime;

type Compute<T> = Box<dyn Fn(Option<&T>) -> T>;

struct MemoInner<T> {
    compute: Compute<T>,
    value: RefCell<Option<T>>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
}

impl<T: 'static> Computation for MemoInner<T> {
    fn run(&self) -> Result<bool, ReactiveError> {
        let next = catch_panic(|| {
            let previous = self.value.borrow();
            (self.compute)(previous.as_ref())
        })?;
        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(next);
        }
        Ok(changed)
    }
}

/// A memoized computation.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{create_root, Memo, Signal};
///
/// create_root(|_| {
///     let count = Signal::new(2);
///     let c = count.clone();
///     let squared = Memo::new(move || c.get() * c.get());
///     assert_eq!(squared.get(), 4);
///     count.set(3);
///     assert_eq!(squared.get(), 9);
/// });
/// ```
pub struct Memo<T: 'static> {
    id: NodeId,
    inner: Rc<MemoInner<T>>,
}

impl<T: 'static> Memo<T> {
    /// Create a memo that only propagates when its value changes.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(move |_| compute(), |a, b| a == b)
    }

    /// Create a memo whose computation also receives its previous value.
    pub fn with_previous(compute: impl Fn(Option<&T>) -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(compute, |a, b| a == b)
    }

    /// Create a memo with a custom comparator. Passing `|_, _| false` makes
    /// every recomputation propagate.
    pub fn with_equals(
        compute: impl Fn(Option<&T>) -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let inner = Rc::new(MemoInner {
            compute: Box::new(compute),
            value: RefCell::new(None),
            equals: Box::new(equals),
        });
        let computation: Rc<dyn Computation> = inner.clone();
        let id = with_runtime(|rt| rt.create_computation(NodeKind::Derived, computation));
        Self { id, inner }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Panics with the error if the memo could not produce a value and no
    /// scope handled the failure; see [`Memo::try_get`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => err.raise(),
        }
    }

    /// Like [`Memo::get`], returning failures instead of panicking.
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Like [`Memo::with`], returning failures instead of panicking.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        self.refresh()?;
        with_runtime(|rt| rt.track(self.id));
        let value = self.inner.value.borrow();
        value.as_ref().map(f).ok_or(ReactiveError::NoValue)
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        untrack(|| self.get())
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        with_runtime(|rt| rt.refresh(self.id))?;
        // A memo disposed before it ever ran (or whose only run failed and was
        // handled) answers reads with a fresh untracked value. A failure here
        // goes to the same handler a failed run would.
        if self.inner.value.borrow().is_none() {
            let computed = with_runtime(|rt| rt.run_detached(self.id, || untrack(|| (self.inner.compute)(None))))?;
            if let Some(value) = computed {
                *self.inner.value.borrow_mut() = Some(value);
            }
        }
        Ok(())
    }

    /// Current dirty state. A disposed memo reports `Clean`.
    pub fn state(&self) -> DirtyState {
        with_runtime(|rt| rt.state_of(self.id)).unwrap_or(DirtyState::Clean)
    }

    /// Whether a value has been computed yet.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of computations observing this memo.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.graph.borrow().observers_of(self.id).len())
    }

    /// Stop tracking. The memo keeps its last value.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_node(self.id));
    }

    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.contains(self.id))
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Create a memo. See [`Memo::new`].
pub fn create_memo<T: PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Memo<T> {
    Memo::new(compute)
}
