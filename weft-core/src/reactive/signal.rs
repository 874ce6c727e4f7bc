//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and is a
//! source node in the dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computation is tracking, the signal links
//!    that computation as an observer.
//!
//! 2. A write stashes the new value as the signal's pending value. Later
//!    writes in the same batch overwrite it, so only the last one is ever
//!    committed.
//!
//! 3. When the batch closes the pending value is compared with the committed
//!    one and, if different, committed and propagated to observers.
//!
//! # Memory Layout
//!
//! Each signal handle is one `Rc` to:
//! - Its graph node ID
//! - The committed value and the pending value
//! - An optional comparator (`None` means every write is a change)

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::runtime::{try_with_runtime, with_runtime};
use super::scheduler::PendingWrite;

type Comparator<T> = Box<dyn Fn(&T, &T) -> bool>;

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    pending: RefCell<Option<T>>,
    equals: Option<Comparator<T>>,
}

impl<T> SignalInner<T> {
    fn is_equal(&self, current: &T, next: &T) -> bool {
        self.equals.as_ref().is_some_and(|equals| equals(current, next))
    }
}

impl<T: 'static> PendingWrite for SignalInner<T> {
    fn commit(&self) -> Option<NodeId> {
        let next = self.pending.borrow_mut().take()?;
        if self.is_equal(&self.value.borrow(), &next) {
            return None;
        }
        *self.value.borrow_mut() = next;
        Some(self.id)
    }

    fn discard(&self) {
        let dropped = self.pending.borrow_mut().take();
        drop(dropped);
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        let id = self.id;
        try_with_runtime(|rt| rt.release_source(id));
    }
}

/// A reactive signal holding a value of type `T`.
///
/// Cloning a signal clones the handle; both clones refer to the same cell.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal that skips writes equal to the current value.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::build(value, Some(Box::new(|a: &T, b: &T| a == b)))
    }

    /// Create a signal with a custom comparator. Writes for which
    /// `equals(current, next)` holds are no-ops.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::build(value, Some(Box::new(equals)))
    }

    /// Create a signal where every write notifies observers.
    pub fn always(value: T) -> Self {
        Self::build(value, None)
    }

    fn build(value: T, equals: Option<Comparator<T>>) -> Self {
        let id = with_runtime(|rt| rt.create_source());
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                pending: RefCell::new(None),
                equals,
            }),
        }
    }

    /// Get the signal's graph node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    fn track(&self) {
        with_runtime(|rt| rt.track(self.inner.id));
    }

    /// Get the current value.
    ///
    /// If called within a tracking computation, this also registers the
    /// computation as an observer.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking the read.
    ///
    /// `f` must not write to this same signal outside of a batch.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        self.with_untracked(f)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(&value)
    }

    /// Set a new value, propagating the change.
    ///
    /// # Panics
    ///
    /// Re-raises an error from a computation this write triggered if no scope
    /// handled it. See [`Signal::try_set`].
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            err.raise();
        }
    }

    /// Set a new value, returning any unhandled propagation error.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        {
            let mut pending = self.inner.pending.borrow_mut();
            if pending.is_none() && self.inner.is_equal(&self.inner.value.borrow(), &value) {
                return Ok(());
            }
            let already_queued = pending.is_some();
            *pending = Some(value);
            if already_queued {
                return Ok(());
            }
        }
        let write: Rc<dyn PendingWrite> = self.inner.clone();
        with_runtime(|rt| rt.write(write))
    }

    /// Update the value using a function of the latest value, including a
    /// value still pending in the current batch.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let pending = self.inner.pending.borrow();
            match pending.as_ref() {
                Some(value) => f(value),
                None => f(&self.inner.value.borrow()),
            }
        };
        self.set(next);
    }

    /// Number of computations currently observing this signal.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.graph.borrow().observers_of(self.inner.id).len())
    }

    /// A handle that can only read.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal { signal: self.clone() }
    }

    /// Split into read and write halves.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (self.read_only(), WriteSignal { signal: self })
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Read half of a signal.
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.signal.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.signal.get_untracked()
    }

    pub fn id(&self) -> NodeId {
        self.signal.id()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.signal.fmt(f)
    }
}

/// Write half of a signal.
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> WriteSignal<T> {
    pub fn set(&self, value: T) {
        self.signal.set(value)
    }

    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        self.signal.try_set(value)
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.signal.update(f)
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

/// Create a signal and return its read and write halves.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

struct TriggerInner {
    id: NodeId,
    pending: Cell<bool>,
}

impl PendingWrite for TriggerInner {
    fn commit(&self) -> Option<NodeId> {
        self.pending.replace(false).then_some(self.id)
    }

    fn discard(&self) {
        self.pending.set(false);
    }
}

impl Drop for TriggerInner {
    fn drop(&mut self) {
        let id = self.id;
        try_with_runtime(|rt| rt.release_source(id));
    }
}

/// A source without a value: readers subscribe with [`Trigger::track`] and
/// are re-run after [`Trigger::notify`].
#[derive(Clone)]
pub struct Trigger {
    inner: Rc<TriggerInner>,
}

impl Trigger {
    pub fn new() -> Self {
        let id = with_runtime(|rt| rt.create_source());
        Self {
            inner: Rc::new(TriggerInner {
                id,
                pending: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn track(&self) {
        with_runtime(|rt| rt.track(self.inner.id));
    }

    pub fn notify(&self) {
        if let Err(err) = self.try_notify() {
            err.raise();
        }
    }

    /// Mark observers dirty. Several notifications in one batch count once.
    pub fn try_notify(&self) -> Result<(), ReactiveError> {
        if self.inner.pending.replace(true) {
            return Ok(());
        }
        let write: Rc<dyn PendingWrite> = self.inner.clone();
        with_runtime(|rt| rt.write(write))
    }

    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.graph.borrow().observers_of(self.inner.id).len())
    }
}

impl Trigger {
    /// Whether any computation currently depends on this trigger.
    pub fn is_observed(&self) -> bool {
        with_runtime(|rt| {
            rt.graph
                .borrow()
                .get(self.inner.id)
                .is_some_and(|node| !node.observer_ids().is_empty())
        })
    }
}

/// When to sweep a map of lazily created triggers for ones nobody observes.
///
/// A sweep is due once as many triggers were created since the last sweep as
/// that sweep left alive, so the map stays within a constant factor of its
/// live size while sweeps cost amortized constant time per creation.
#[derive(Debug)]
pub(crate) struct SweepSchedule {
    created: Cell<usize>,
    threshold: Cell<usize>,
}

impl SweepSchedule {
    const MIN_THRESHOLD: usize = 32;

    pub(crate) fn new() -> Self {
        Self {
            created: Cell::new(0),
            threshold: Cell::new(Self::MIN_THRESHOLD),
        }
    }

    /// Count one creation. Returns whether a sweep is due.
    pub(crate) fn record_creation(&self) -> bool {
        let created = self.created.get() + 1;
        self.created.set(created);
        created >= self.threshold.get()
    }

    /// Note a finished sweep that left `live` triggers.
    pub(crate) fn swept(&self, live: usize) {
        self.created.set(0);
        self.threshold.set(live.max(Self::MIN_THRESHOLD));
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("id", &self.inner.id).finish()
    }
}
