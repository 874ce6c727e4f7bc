//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is queued and runs as soon as no batch is
//!    open, establishing its initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued to re-run in the
//!    same flush.
//!
//! 3. Before re-running, the effect disposes what it created last time,
//!    runs its cleanups, clears its old dependencies, and tracks new ones
//!    during execution.
//!
//! # Render vs. user effects
//!
//! Render effects patch the view and are flushed first in every pass, so
//! user effects always observe an up-to-date view.
//!
//! # Cleanup
//!
//! Cleanups are registered with [`on_cleanup`](super::on_cleanup) from
//! inside the effect body and run before the next run and on disposal.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{catch_panic, ReactiveError};
use crate::graph::{Computation, EffectKind, NodeId, NodeKind};

use super::runtime::with_runtime;

type EffectFn = Box<dyn Fn() -> Result<(), ReactiveError>>;

struct EffectInner {
    run: EffectFn,
    runs: Rc<Cell<usize>>,
}

impl Computation for EffectInner {
    fn run(&self) -> Result<bool, ReactiveError> {
        self.runs.set(self.runs.get() + 1);
        catch_panic(|| (self.run)()).and_then(|result| result)?;
        Ok(false)
    }
}

/// A handle to a running effect.
///
/// Dropping the handle does not stop the effect; it lives until its owning
/// scope is disposed or [`Effect::dispose`] is called.
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    kind: EffectKind,
    runs: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a user effect.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self::spawn(
            EffectKind::User,
            Box::new(move || {
                run();
                Ok(())
            }),
        )
    }

    /// Create a render effect, flushed before user effects.
    pub fn render(run: impl Fn() + 'static) -> Self {
        Self::spawn(
            EffectKind::Render,
            Box::new(move || {
                run();
                Ok(())
            }),
        )
    }

    /// Create a user effect whose body can fail. Errors are routed like
    /// panics: to the nearest `catch_error` handler, or back to the writer.
    pub fn try_new<E>(run: impl Fn() -> Result<(), E> + 'static) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::spawn(
            EffectKind::User,
            Box::new(move || run().map_err(ReactiveError::computation)),
        )
    }

    fn spawn(kind: EffectKind, run: EffectFn) -> Self {
        let runs = Rc::new(Cell::new(0));
        let inner: Rc<dyn Computation> = Rc::new(EffectInner {
            run,
            runs: Rc::clone(&runs),
        });
        let id = with_runtime(|rt| rt.create_computation(NodeKind::Effect(kind), inner));
        if let Err(err) = with_runtime(|rt| rt.schedule_effect(id, kind)) {
            err.raise();
        }
        Self { id, kind, runs }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Stop the effect, running its cleanups.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_node(self.id));
    }

    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.contains(self.id))
    }

    /// How many times the body has run.
    pub fn run_count(&self) -> usize {
        self.runs.get()
    }

    /// Number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        with_runtime(|rt| rt.graph.borrow().sources_of(self.id).len())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("runs", &self.runs.get())
            .finish()
    }
}

/// Create a user effect. See [`Effect::new`].
pub fn create_effect(run: impl Fn() + 'static) -> Effect {
    Effect::new(run)
}

/// Create a render effect. See [`Effect::render`].
pub fn create_render_effect(run: impl Fn() + 'static) -> Effect {
    Effect::render(run)
}
