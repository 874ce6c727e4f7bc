//! Weft Core
//!
//! This crate provides the core runtime for the Weft fine-grained reactive
//! view layer. It implements:
//!
//! - Reactive primitives (signals, memos, effects) over a dependency graph
//!   with Clean / MaybeDirty / Dirty states
//! - An ownership tree that bounds the lifetime of computations and cleanups
//! - A batching scheduler with glitch-free propagation
//! - A reactive store with per-key tracking over structured data
//! - Context lookup through the ownership tree
//! - A keyed list reconciler, mounting and delegated events
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node arena holding dependency edges and ownership links
//! - `reactive`: Runtime, scheduler and the reactive primitives
//! - `store`: Reactive store, its write paths and persistence bridge
//! - `render`: Host node tree, views, list reconciliation and events
//! - `config` / `error`: Runtime settings and error types
//!
//! The runtime is single-threaded: every thread gets its own graph.
//!
//! # Example
//!
//! ```rust
//! use weft_core::reactive::{batch, create_root, Effect, Memo, Signal};
//!
//! create_root(|_| {
//!     let count = Signal::new(0);
//!     let c = count.clone();
//!     let doubled = Memo::new(move || c.get() * 2);
//!
//!     let effect = Effect::new(move || {
//!         let _ = doubled.get();
//!     });
//!
//!     batch(|| {
//!         count.set(1);
//!         count.set(5);
//!     });
//!     // The effect saw only the final value.
//!     assert_eq!(effect.run_count(), 2);
//! });
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, StoreError};
