//! Keyed Lists
//!
//! [`map_keyed`] maps a reactive list of items to a list of rendered
//! values, keeping one entry per key alive across updates. Each entry lives
//! in its own root scope with an index signal, so moving an item only
//! updates its index and removing an item disposes exactly that entry's
//! scope. Entries are kept in the same order as the values last returned.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::rc::Rc;

use crate::reactive::{create_root, on_cleanup, untrack, Memo, ReadSignal, Scope, Signal};

use super::dom::DomNode;
use super::view::View;

struct Entry<K, U> {
    key: K,
    value: U,
    index: Signal<usize>,
    scope: Scope,
}

struct KeyedState<K, U> {
    entries: Vec<Entry<K, U>>,
}

impl<K: Eq + Hash, U: Clone> KeyedState<K, U> {
    fn dispose_all(&mut self) {
        for entry in self.entries.drain(..) {
            entry.scope.dispose();
        }
    }

    /// Line entries up with `items`, reusing entries by key and creating the
    /// rest with `create`.
    fn update<T>(&mut self, items: &[T], key: &dyn Fn(&T) -> K, create: &dyn Fn(&T, usize) -> Entry<K, U>) {
        let keys: Vec<K> = items.iter().map(key).collect();
        let mut old: Vec<Option<Entry<K, U>>> = self.entries.drain(..).map(Some).collect();

        let mut start = 0;
        while start < old.len().min(keys.len()) && old[start].as_ref().is_some_and(|entry| entry.key == keys[start]) {
            start += 1;
        }
        let (mut old_end, mut new_end) = (old.len(), keys.len());
        while old_end > start
            && new_end > start
            && old[old_end - 1].as_ref().is_some_and(|entry| entry.key == keys[new_end - 1])
        {
            old_end -= 1;
            new_end -= 1;
        }

        let mut by_key: HashMap<&K, VecDeque<usize>> = HashMap::new();
        for index in start..old_end {
            if let Some(entry) = &old[index] {
                by_key.entry(&entry.key).or_default().push_back(index);
            }
        }
        let reused: Vec<Option<usize>> = (start..new_end)
            .map(|i| by_key.get_mut(&keys[i]).and_then(VecDeque::pop_front))
            .collect();
        drop(by_key);

        let mut entries = Vec::with_capacity(keys.len());
        entries.extend(old[..start].iter_mut().filter_map(Option::take));
        for (offset, slot) in reused.into_iter().enumerate() {
            let i = start + offset;
            let entry = match slot.and_then(|slot| old[slot].take()) {
                Some(entry) => {
                    entry.index.set(i);
                    entry
                }
                None => create(&items[i], i),
            };
            entries.push(entry);
        }
        for (offset, slot) in old[old_end..].iter_mut().enumerate() {
            if let Some(entry) = slot.take() {
                entry.index.set(new_end + offset);
                entries.push(entry);
            }
        }

        for stale in old.into_iter().flatten() {
            stale.scope.dispose();
        }
        self.entries = entries;
    }

    fn values(&self) -> Vec<U> {
        self.entries.iter().map(|entry| entry.value.clone()).collect()
    }
}

/// Map `items` to rendered values, one entry per key.
///
/// `map` runs once per new key, untracked, in a fresh root scope; whatever
/// it creates lives until the key disappears or the owning scope is
/// disposed. The second argument tracks the entry's current index.
pub fn map_keyed<T, K, U>(
    items: impl Fn() -> Vec<T> + 'static,
    key: impl Fn(&T) -> K + 'static,
    map: impl Fn(&T, ReadSignal<usize>) -> U + 'static,
) -> Memo<Vec<U>>
where
    T: 'static,
    K: Eq + Hash + 'static,
    U: Clone + 'static,
{
    let state = Rc::new(RefCell::new(KeyedState { entries: Vec::new() }));
    let disposer = Rc::clone(&state);
    on_cleanup(move || disposer.borrow_mut().dispose_all());

    let key = Rc::new(key);
    let entry_key = Rc::clone(&key);
    let create = move |item: &T, index: usize| {
        create_root(|scope| {
            let index_signal = Signal::new(index);
            let value = map(item, index_signal.read_only());
            Entry {
                key: entry_key(item),
                value,
                index: index_signal,
                scope,
            }
        })
    };
    Memo::with_equals(
        move |_| {
            let next = items();
            untrack(|| {
                let mut state = state.borrow_mut();
                state.update(&next, &*key, &create);
                state.values()
            })
        },
        |_, _| false,
    )
}

/// Render a keyed list of nodes.
pub fn keyed_list<T, K>(
    items: impl Fn() -> Vec<T> + 'static,
    key: impl Fn(&T) -> K + 'static,
    render: impl Fn(&T, ReadSignal<usize>) -> DomNode + 'static,
) -> View
where
    T: 'static,
    K: Eq + Hash + 'static,
{
    let nodes = map_keyed(items, key, render);
    View::reactive(move || View::Sequence(nodes.get().into_iter().map(View::Node).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, Effect};
    use std::cell::Cell;

    #[derive(Clone, PartialEq)]
    struct Todo {
        id: u32,
        title: &'static str,
    }

    fn todo(id: u32, title: &'static str) -> Todo {
        Todo { id, title }
    }

    #[test]
    fn entries_survive_reorders_and_follow_their_index() {
        let items = Signal::new(vec![todo(1, "a"), todo(2, "b"), todo(3, "c")]);
        let created = Rc::new(Cell::new(0));
        let disposed = Rc::new(RefCell::new(Vec::new()));

        let (scope, mapped, indices) = create_root(|scope| {
            let source = items.clone();
            let (created, disposed) = (Rc::clone(&created), Rc::clone(&disposed));
            let indices = Rc::new(RefCell::new(HashMap::new()));
            let seen = Rc::clone(&indices);
            let mapped = map_keyed(
                move || source.get(),
                |todo: &Todo| todo.id,
                move |todo, index| {
                    created.set(created.get() + 1);
                    let (id, disposed, seen) = (todo.id, Rc::clone(&disposed), Rc::clone(&seen));
                    on_cleanup(move || disposed.borrow_mut().push(id));
                    Effect::new(move || {
                        seen.borrow_mut().insert(id, index.get());
                    });
                    todo.title
                },
            );
            (scope, mapped, indices)
        });
        assert_eq!(mapped.get(), vec!["a", "b", "c"]);
        assert_eq!(created.get(), 3);

        items.set(vec![todo(3, "c"), todo(1, "a"), todo(4, "d")]);
        assert_eq!(mapped.get(), vec!["c", "a", "d"]);
        assert_eq!(created.get(), 4);
        assert_eq!(*disposed.borrow(), vec![2]);
        assert_eq!(indices.borrow().get(&3), Some(&0));
        assert_eq!(indices.borrow().get(&1), Some(&1));
        assert_eq!(indices.borrow().get(&4), Some(&2));

        scope.dispose();
        let mut all = disposed.borrow().clone();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn keeps_first_entry_for_duplicate_keys() {
        let items = Signal::new(vec![1, 1, 2]);
        let source = items.clone();
        let mapped = create_root(|_| map_keyed(move || source.get(), |n: &i32| *n, |n, index| (*n, index.get_untracked())));
        assert_eq!(mapped.get(), vec![(1, 0), (1, 1), (2, 2)]);
        items.set(vec![2, 1]);
        assert_eq!(mapped.get(), vec![(2, 2), (1, 0)]);
    }

    #[test]
    fn keyed_list_reuses_nodes() {
        let parent = DomNode::element("ul");
        let items = Signal::new(vec!["a", "b", "c"]);
        let source = items.clone();
        create_root(|_| {
            crate::render::insert(
                &parent,
                keyed_list(move || source.get(), |s| *s, |s, _| DomNode::text(*s)),
                None,
            )
        });
        let before = parent.children();
        parent.record_mutations();

        items.set(vec!["c", "b", "a"]);
        assert_eq!(parent.text_content(), "cba");
        let after = parent.children();
        assert_eq!(after[0], before[2]);
        assert_eq!(after[2], before[0]);
        assert!(parent
            .take_mutations()
            .iter()
            .all(|m| !matches!(m, crate::render::Mutation::Remove { .. })));
    }
}
