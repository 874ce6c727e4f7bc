//! Rendering
//!
//! The host side of the runtime: a retained node tree ([`DomNode`]), views
//! and their insertion, keyed list mapping, the array reconciler, mounting
//! and delegated event dispatch.
//!
//! ```rust
//! use weft_core::reactive::Signal;
//! use weft_core::render::{keyed_list, mount, DomNode, View};
//!
//! let body = DomNode::element("body");
//! let todos = Signal::new(vec!["write", "test"]);
//! let items = todos.clone();
//! let app = mount(&body, move || {
//!     keyed_list(
//!         move || items.get(),
//!         |todo| *todo,
//!         |todo, _| {
//!             let li = DomNode::element("li");
//!             li.append_child(&DomNode::text(*todo));
//!             li
//!         },
//!     )
//! })
//! .unwrap();
//! assert_eq!(body.to_markup(), "<body><li>write</li><li>test</li></body>");
//!
//! todos.set(vec!["test"]);
//! assert_eq!(body.text_content(), "test");
//! app.unmount();
//! ```

mod dom;
mod events;
mod list;
mod mount;
mod reconcile;
mod view;

pub use dom::{Document, DomNode, Mutation};
pub use events::{Event, EventDelegator, EventHandler};
pub use list::{keyed_list, map_keyed};
pub use mount::{mount, Mounted};
pub use reconcile::reconcile_arrays;
pub use view::{insert, View};
