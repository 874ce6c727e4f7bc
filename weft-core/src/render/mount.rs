//! Mounting
//!
//! [`mount`] renders a view into a container under a fresh root scope. An
//! error escaping the first render (a panic in the render function or an
//! unhandled failure in one of the effects it created) disposes the root,
//! clears the container and is returned to the caller.

use crate::error::{catch_panic, ReactiveError};
use crate::reactive::{create_root, try_batch, Scope};

use super::dom::DomNode;
use super::view::{insert, View};

/// A rendered view attached to a container.
#[derive(Debug)]
#[must_use = "dropping a Mounted keeps the view alive; call unmount to tear it down"]
pub struct Mounted {
    scope: Scope,
    container: DomNode,
}

impl Mounted {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn container(&self) -> &DomNode {
        &self.container
    }

    /// Dispose everything the view created and empty the container.
    pub fn unmount(self) {
        tracing::debug!(scope = ?self.scope.id(), "unmounting view");
        self.scope.dispose();
        self.container.clear();
    }
}

/// Render `render()` into `container`.
pub fn mount(container: &DomNode, render: impl FnOnce() -> View) -> Result<Mounted, ReactiveError> {
    let (scope, result) = create_root(|scope| {
        let result = catch_panic(|| try_batch(|| insert(container, render(), None))).and_then(|inner| inner);
        (scope, result)
    });
    match result {
        Ok(()) => Ok(Mounted {
            scope,
            container: container.clone(),
        }),
        Err(err) => {
            tracing::error!(error = %err, "mount failed");
            scope.dispose();
            container.clear();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{on_cleanup, Effect, Signal};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn unmount_disposes_and_clears() {
        let body = DomNode::element("body");
        let cleaned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&cleaned);
        let count = Signal::new(1);
        let c = count.clone();
        let mounted = mount(&body, move || {
            on_cleanup(move || flag.set(true));
            View::reactive(move || c.get().to_string().into())
        })
        .unwrap();
        assert_eq!(body.text_content(), "1");
        assert!(!mounted.scope().is_disposed());

        let scope = mounted.scope();
        mounted.unmount();
        assert!(cleaned.get());
        assert!(scope.is_disposed());
        assert_eq!(body.child_count(), 0);

        count.set(2);
        assert_eq!(body.child_count(), 0);
    }

    #[test]
    fn render_panic_is_returned() {
        let body = DomNode::element("body");
        let err = mount(&body, || -> View { panic!("broken view") }).unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked { ref message } if message == "broken view"));
        assert_eq!(body.child_count(), 0);
    }

    #[test]
    fn failing_effect_fails_the_mount() {
        let body = DomNode::element("body");
        let err = mount(&body, || {
            Effect::new(|| panic!("effect failed"));
            View::from("never shown")
        })
        .unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked { .. }));
        assert_eq!(body.child_count(), 0);
    }
}
