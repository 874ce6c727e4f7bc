//! Batching Scheduler
//!
//! Every write is deferred: the new value is stashed as the source's single
//! pending value and the source is queued for commit. If no batch is open the
//! queue is flushed straight away, so a lone write behaves like an implicit
//! one-write batch.
//!
//! # Flush
//!
//! A flush repeats until nothing is left to do:
//!
//! 1. Commit every pending write. A write whose value compares equal to the
//!    committed one is dropped; otherwise the source's observers are marked
//!    and the effects reached are queued.
//! 2. Run queued render effects, then queued user effects. Writes made by
//!    those effects are stashed for the next round of the same flush.
//!
//! Each effect is brought up to date through its owner chain first, so a
//! parent re-run that disposes a child effect makes the child's queue entry
//! a no-op.
//!
//! The number of runs in a single flush is bounded by
//! [`RuntimeConfig::max_propagation`](crate::config::RuntimeConfig). Going
//! past it aborts the batch: stale effects are reset and pending writes are
//! discarded, so no half-applied state is visible to later reads. Memos left
//! stale recompute when read, and the next committed write reaches every
//! effect behind them again.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::{EffectKind, NodeId};

use super::runtime::{with_runtime, RuntimeState};

/// A write waiting for the current batch to close.
pub(crate) trait PendingWrite {
    /// Apply the stashed value. Returns the source to propagate from if the
    /// committed value changed.
    fn commit(&self) -> Option<NodeId>;

    /// Throw the stashed value away.
    fn discard(&self);
}

pub(crate) struct Scheduler {
    depth: Cell<usize>,
    running: Cell<bool>,
    runs: Cell<usize>,
    pending: RefCell<Vec<Rc<dyn PendingWrite>>>,
    render_queue: RefCell<VecDeque<NodeId>>,
    user_queue: RefCell<VecDeque<NodeId>>,
}

/// Keeps a batch open until dropped.
pub(crate) struct BatchGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.scheduler.depth.get().saturating_sub(1);
        self.scheduler.depth.set(depth);
        if depth == 0 && !self.scheduler.running.get() && std::thread::panicking() {
            self.scheduler.discard_pending();
        }
    }
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            depth: Cell::new(0),
            running: Cell::new(false),
            runs: Cell::new(0),
            pending: RefCell::new(Vec::new()),
            render_queue: RefCell::new(VecDeque::new()),
            user_queue: RefCell::new(VecDeque::new()),
        }
    }

    /// Open a (possibly nested) batch.
    pub(crate) fn hold(&self) -> BatchGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        BatchGuard { scheduler: self }
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.depth.get() > 0 || self.running.get()
    }

    fn is_idle(&self) -> bool {
        !self.is_batching()
    }

    pub(crate) fn defer(&self, write: Rc<dyn PendingWrite>) {
        self.pending.borrow_mut().push(write);
    }

    pub(crate) fn enqueue(&self, queued: Vec<(NodeId, EffectKind)>) {
        for (id, kind) in queued {
            match kind {
                EffectKind::Render => self.render_queue.borrow_mut().push_back(id),
                EffectKind::User => self.user_queue.borrow_mut().push_back(id),
            }
        }
    }

    fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    fn has_queued(&self) -> bool {
        !self.render_queue.borrow().is_empty() || !self.user_queue.borrow().is_empty()
    }

    fn next_effect(&self) -> Option<NodeId> {
        let render = self.render_queue.borrow_mut().pop_front();
        render.or_else(|| self.user_queue.borrow_mut().pop_front())
    }

    fn take_pending(&self) -> Vec<Rc<dyn PendingWrite>> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    fn discard_pending(&self) {
        let writes = self.take_pending();
        for write in &writes {
            write.discard();
        }
    }

    /// Count one more run in the current flush.
    fn count_run(&self) -> usize {
        let runs = self.runs.get() + 1;
        self.runs.set(runs);
        runs
    }

    /// Drop everything queued or pending.
    fn clear(&self) {
        self.discard_pending();
        self.render_queue.borrow_mut().clear();
        self.user_queue.borrow_mut().clear();
    }
}

/// Marks a flush as running; aborts it if a panic unwinds through.
struct FlushGuard<'a> {
    runtime: &'a RuntimeState,
}

impl<'a> FlushGuard<'a> {
    fn start(runtime: &'a RuntimeState) -> Self {
        runtime.scheduler.running.set(true);
        runtime.scheduler.runs.set(0);
        Self { runtime }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.runtime.abort();
        }
        self.runtime.scheduler.running.set(false);
    }
}

impl RuntimeState {
    /// Run `f` with writes deferred, then flush if this was the outermost batch.
    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        let value = {
            let _batch = self.scheduler.hold();
            f()
        };
        self.flush_if_idle()?;
        Ok(value)
    }

    /// Stash a write and flush unless a batch is open.
    pub(crate) fn write(&self, write: Rc<dyn PendingWrite>) -> Result<(), ReactiveError> {
        self.scheduler.defer(write);
        self.flush_if_idle()
    }

    /// Queue a newly created effect for its first run.
    pub(crate) fn schedule_effect(&self, id: NodeId, kind: EffectKind) -> Result<(), ReactiveError> {
        self.scheduler.enqueue(vec![(id, kind)]);
        self.flush_if_idle()
    }

    pub(crate) fn flush_if_idle(&self) -> Result<(), ReactiveError> {
        if self.scheduler.is_idle() && (self.scheduler.has_pending() || self.scheduler.has_queued()) {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn flush(&self) -> Result<(), ReactiveError> {
        let guard = FlushGuard::start(self);
        let result = self.propagate();
        if result.is_err() {
            self.abort();
        }
        drop(guard);
        result
    }

    fn propagate(&self) -> Result<(), ReactiveError> {
        let limit = self.max_propagation();
        let mut rounds = 0usize;
        loop {
            let writes = self.scheduler.take_pending();
            for write in &writes {
                if let Some(source) = write.commit() {
                    self.notify_observers(source);
                }
            }
            drop(writes);

            if !self.scheduler.has_queued() {
                tracing::trace!(rounds, runs = self.scheduler.runs.get(), "flush complete");
                return Ok(());
            }
            rounds += 1;

            while let Some(id) = self.scheduler.next_effect() {
                if self.scheduler.count_run() > limit {
                    tracing::error!(limit, "propagation exceeded its safety bound; aborting batch");
                    return Err(ReactiveError::RunawayPropagation { limit });
                }
                self.run_top(id)?;
            }
        }
    }

    /// Discard pending writes and queued runs, and reset every stale effect
    /// to clean. Memos keep their state and recompute on their next read.
    fn abort(&self) {
        self.scheduler.clear();
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            let reset = graph.reset_effects();
            tracing::debug!(reset, "flush aborted; stale effects reset");
        }
    }
}

/// Run `f` as one batch: writes inside it are committed together when it
/// returns, and every affected effect runs once.
///
/// Nested batches join the outermost one. An unhandled error raised while
/// flushing is re-raised as a panic; use [`try_batch`] to receive it instead.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    match try_batch(f) {
        Ok(value) => value,
        Err(err) => err.raise(),
    }
}

/// Like [`batch`], returning propagation errors instead of panicking.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    with_runtime(|rt| rt.batch(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::{create_root, Effect, Memo, Runtime, Signal};

    #[test]
    fn batch_defers_until_outermost_close() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        create_root(|_| {
            let s = signal.clone();
            let seen = Rc::clone(&seen);
            Effect::new(move || seen.borrow_mut().push(s.get()));
        });

        batch(|| {
            signal.set(1);
            batch(|| signal.set(2));
            assert!(Runtime::is_batching());
            // Reads see the committed value until the batch closes.
            assert_eq!(signal.get_untracked(), 0);
            signal.set(3);
        });
        assert_eq!(*seen.borrow(), vec![0, 3]);
        assert!(!Runtime::is_batching());
    }

    #[test]
    fn render_effects_run_before_user_effects() {
        let signal = Signal::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        create_root(|_| {
            let (s, log) = (signal.clone(), Rc::clone(&order));
            Effect::new(move || log.borrow_mut().push(format!("user {}", s.get())));
            let (s, log) = (signal.clone(), Rc::clone(&order));
            Effect::render(move || log.borrow_mut().push(format!("render {}", s.get())));
        });
        order.borrow_mut().clear();

        signal.set(1);
        assert_eq!(*order.borrow(), vec!["render 1", "user 1"]);
    }

    #[test]
    fn writes_inside_effects_run_in_the_same_flush() {
        let source = Signal::new(1);
        let doubled = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        create_root(|_| {
            let (s, d) = (source.clone(), doubled.clone());
            Effect::new(move || d.set(s.get() * 2));
            let (d, seen) = (doubled.clone(), Rc::clone(&seen));
            Effect::new(move || seen.borrow_mut().push(d.get()));
        });

        source.set(5);
        assert_eq!(*seen.borrow(), vec![2, 10]);
    }

    #[test]
    fn runaway_propagation_aborts_the_batch() {
        Runtime::configure(RuntimeConfig::default().with_max_propagation(100));
        let signal = Signal::new(0u64);
        let err = create_root(|_| {
            try_batch(|| {
                let s = signal.clone();
                Effect::new(move || {
                    let value = s.get();
                    s.set(value + 1);
                });
            })
            .unwrap_err()
        });
        assert!(err.is_runaway());
        assert!(!Runtime::is_batching());

        // The runtime is usable afterwards.
        let other = Signal::new(1);
        other.set(2);
        assert_eq!(other.get_untracked(), 2);
    }

    #[test]
    fn effects_behind_a_stale_memo_recover_after_an_error() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        create_root(|_| {
            let s = signal.clone();
            Effect::render(move || {
                if s.get() == 1 {
                    panic!("boom");
                }
            });
            let s = signal.clone();
            let doubled = Memo::new(move || s.get() * 2);
            let seen = Rc::clone(&seen);
            Effect::new(move || seen.borrow_mut().push(doubled.get()));
        });

        let err = signal.try_set(1).unwrap_err();
        assert_eq!(err.to_string(), "computation panicked: boom");
        assert_eq!(*seen.borrow(), vec![0]);

        signal.set(2);
        signal.set(3);
        assert_eq!(*seen.borrow(), vec![0, 4, 6]);
        with_runtime(|rt| rt.graph.borrow().assert_consistent());
    }
}
