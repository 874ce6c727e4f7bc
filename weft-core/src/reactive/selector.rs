//! Selectors
//!
//! A selector answers "is this key the selected one?" for many readers while
//! only waking the two readers whose answer changed. A list of a thousand
//! rows that each highlight when selected re-runs two rows per selection
//! change instead of a thousand.
//!
//! Per-key triggers are created on first read and swept once nobody reads
//! them, so a selector over a changing key space does not keep every key it
//! has ever seen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use super::effect::Effect;
use super::owner::untrack;
use super::signal::{SweepSchedule, Trigger};
use super::tracking::ReactiveContext;

struct SelectorInner<K> {
    current: RefCell<K>,
    readers: RefCell<HashMap<K, Trigger>>,
    sweeps: SweepSchedule,
}

impl<K: Eq + Hash> SelectorInner<K> {
    fn sweep(&self) {
        let mut readers = self.readers.borrow_mut();
        readers.retain(|_, trigger| trigger.is_observed());
        self.sweeps.swept(readers.len());
    }
}

/// Keyed view of a single selected value.
pub struct Selector<K: 'static> {
    inner: Rc<SelectorInner<K>>,
}

impl<K: Clone + Eq + Hash + 'static> Selector<K> {
    /// Whether `key` is currently selected. Inside a computation, the read
    /// subscribes only to changes affecting `key`.
    pub fn is_selected(&self, key: &K) -> bool {
        if ReactiveContext::is_active() {
            let (trigger, created) = {
                let mut readers = self.inner.readers.borrow_mut();
                match readers.get(key) {
                    Some(trigger) => (trigger.clone(), false),
                    None => {
                        let trigger = Trigger::new();
                        readers.insert(key.clone(), trigger.clone());
                        (trigger, true)
                    }
                }
            };
            trigger.track();
            if created && self.inner.sweeps.record_creation() {
                self.inner.sweep();
            }
        }
        *self.inner.current.borrow() == *key
    }

    /// The selected key, untracked.
    pub fn selected(&self) -> K {
        self.inner.current.borrow().clone()
    }

    /// Number of keys with a live per-key trigger.
    pub fn reader_count(&self) -> usize {
        self.inner.readers.borrow().len()
    }
}

impl<K: 'static> Clone for Selector<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Track `source` and notify per-key readers when its value moves.
pub fn create_selector<K>(source: impl Fn() -> K + 'static) -> Selector<K>
where
    K: Clone + Eq + Hash + 'static,
{
    let inner = Rc::new(SelectorInner {
        current: RefCell::new(untrack(&source)),
        readers: RefCell::new(HashMap::new()),
        sweeps: SweepSchedule::new(),
    });
    let weak = Rc::downgrade(&inner);
    Effect::render(move || {
        let next = source();
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let previous = inner.current.replace(next.clone());
        if previous == next {
            return;
        }
        let affected: Vec<Trigger> = {
            let readers = inner.readers.borrow();
            [&previous, &next]
                .into_iter()
                .filter_map(|key| readers.get(key).cloned())
                .collect()
        };
        for trigger in affected {
            trigger.notify();
        }
    });
    Selector { inner }
}
