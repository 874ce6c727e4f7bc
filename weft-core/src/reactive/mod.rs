//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and
//! effects, plus the ownership tree that bounds their lifetimes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking computation (a memo or effect), the computation becomes
//! an observer of the signal. When the signal's value changes, observers are
//! marked dirty.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies changed, and stops propagation
//! when the new value equals the old one.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with the outside
//! world, such as the rendered node tree.
//!
//! ## Scopes
//!
//! Everything created while a scope or computation is running is owned by
//! it. Disposing an owner disposes what it owns and runs its cleanups.
//!
//! ## Batches
//!
//! Writes inside [`batch`] are committed together when it closes; each
//! affected effect runs once and never observes an intermediate value.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking frame to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking frame and, if so, link the dependency in the graph.

mod context;
mod effect;
mod memo;
mod owner;
mod runtime;
mod scheduler;
mod selector;
mod signal;
mod suspense;
mod tracking;

pub use context::{provide_context, use_context, Context};
pub use effect::{create_effect, create_render_effect, Effect};
pub use memo::{create_memo, Memo};
pub use owner::{catch_error, create_root, current_scope, on_cleanup, run_in_scope, untrack, Scope};
pub use runtime::Runtime;
pub use scheduler::{batch, try_batch};
pub use selector::{create_selector, Selector};
pub use signal::{create_signal, ReadSignal, Signal, Trigger, WriteSignal};
pub use suspense::{suspend, use_suspense, SuspenseGuard, SuspenseState};
pub use tracking::ReactiveContext;

pub use crate::graph::{DirtyState, EffectKind};

pub(crate) use signal::SweepSchedule;
