//! List Reconciler
//!
//! Patches a parent's children from one node sequence to another, keyed by
//! node identity. Both ends are trimmed first, then the remaining window is
//! handled by the cheapest case that applies:
//!
//! - only new nodes left: insert them before the node after the window
//! - only old nodes left: remove them
//! - the window's ends crossed over: two moves
//! - otherwise: map new nodes to their index and walk the old ones, moving
//!   runs that are already in order as a block and removing nodes that are
//!   gone
//!
//! Small local edits cost close to the minimum number of moves. Arbitrary
//! permutations still end in the right order, with more moves.

use std::collections::HashMap;

use super::dom::DomNode;

/// Make the window of `parent`'s children currently holding `previous` hold
/// `next` instead.
///
/// `marker` is the node the window ends before (`None` for the end of the
/// parent). It places new nodes when `previous` is empty; otherwise the
/// sibling after the last old node is used.
pub fn reconcile_arrays(parent: &DomNode, previous: &[DomNode], next: &[DomNode], marker: Option<&DomNode>) {
    let mut a = previous.to_vec();
    let b = next;
    let b_len = b.len();
    let (mut a_start, mut a_end) = (0, a.len());
    let (mut b_start, mut b_end) = (0, b_len);
    let after = match a.last() {
        Some(last) => last.next_sibling(),
        None => marker.cloned(),
    };
    let mut map: Option<HashMap<DomNode, usize>> = None;

    while a_start < a_end || b_start < b_end {
        if a_start < a_end && b_start < b_end && a[a_start] == b[b_start] {
            a_start += 1;
            b_start += 1;
            continue;
        }
        while a_end > a_start && b_end > b_start && a[a_end - 1] == b[b_end - 1] {
            a_end -= 1;
            b_end -= 1;
        }

        if a_end == a_start {
            let anchor = if b_end < b_len {
                if b_start > 0 {
                    b[b_start - 1].next_sibling()
                } else {
                    Some(b[b_end].clone())
                }
            } else {
                after.clone()
            };
            while b_start < b_end {
                parent.insert_before(&b[b_start], anchor.as_ref());
                b_start += 1;
            }
        } else if b_end == b_start {
            while a_start < a_end {
                let relocating = map.as_ref().is_some_and(|map| map.contains_key(&a[a_start]));
                if !relocating {
                    a[a_start].remove();
                }
                a_start += 1;
            }
        } else if a[a_start] == b[b_end - 1] && b[b_start] == a[a_end - 1] {
            a_end -= 1;
            b_end -= 1;
            let anchor = a[a_end].next_sibling();
            parent.insert_before(&b[b_start], a[a_start].next_sibling().as_ref());
            b_start += 1;
            a_start += 1;
            parent.insert_before(&b[b_end], anchor.as_ref());
            a[a_end] = b[b_end].clone();
        } else {
            let map = map.get_or_insert_with(|| (b_start..b_end).map(|i| (b[i].clone(), i)).collect());
            match map.get(&a[a_start]).copied() {
                Some(index) if b_start < index && index < b_end => {
                    let mut sequence = 1;
                    let mut i = a_start + 1;
                    while i < a_end && i < b_end {
                        if map.get(&a[i]) != Some(&(index + sequence)) {
                            break;
                        }
                        sequence += 1;
                        i += 1;
                    }
                    if sequence > index - b_start {
                        let anchor = a[a_start].clone();
                        while b_start < index {
                            parent.insert_before(&b[b_start], Some(&anchor));
                            b_start += 1;
                        }
                    } else {
                        parent.replace_child(&b[b_start], &a[a_start]);
                        b_start += 1;
                        a_start += 1;
                    }
                }
                Some(_) => a_start += 1,
                None => {
                    a[a_start].remove();
                    a_start += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Mutation;

    fn setup(labels: &str) -> (DomNode, Vec<DomNode>) {
        let parent = DomNode::element("ul");
        let nodes: Vec<DomNode> = labels.chars().map(|c| DomNode::text(c.to_string())).collect();
        for node in &nodes {
            parent.append_child(node);
        }
        parent.record_mutations();
        (parent, nodes)
    }

    fn pick(nodes: &[DomNode], order: &str) -> Vec<DomNode> {
        order
            .chars()
            .map(|c| {
                nodes
                    .iter()
                    .find(|node| node.data().as_deref() == Some(c.to_string().as_str()))
                    .cloned()
                    .unwrap_or_else(|| DomNode::text(c.to_string()))
            })
            .collect()
    }

    fn touched(mutations: &[Mutation]) -> Vec<String> {
        mutations
            .iter()
            .map(|mutation| match mutation {
                Mutation::Insert { node, .. } | Mutation::Remove { node } => node.data().unwrap_or_default(),
                Mutation::Replace { new, .. } => new.data().unwrap_or_default(),
            })
            .collect()
    }

    #[test]
    fn swap_moves_only_the_swapped_pair() {
        let (parent, nodes) = setup("abcd");
        reconcile_arrays(&parent, &nodes, &pick(&nodes, "acbd"), None);
        assert_eq!(parent.text_content(), "acbd");
        let mutations = parent.take_mutations();
        assert!(mutations.iter().all(|m| !matches!(m, Mutation::Remove { .. })));
        let mut moved = touched(&mutations);
        moved.sort();
        moved.dedup();
        assert_eq!(moved, vec!["b", "c"]);
    }

    #[test]
    fn append_is_a_single_insert() {
        let (parent, nodes) = setup("abc");
        reconcile_arrays(&parent, &nodes, &pick(&nodes, "abce"), None);
        assert_eq!(parent.text_content(), "abce");
        let mutations = parent.take_mutations();
        assert_eq!(mutations.len(), 1);
        assert!(matches!(&mutations[0], Mutation::Insert { node, before: None } if node.data().as_deref() == Some("e")));
    }

    #[test]
    fn clearing_removes_everything() {
        let (parent, nodes) = setup("abc");
        reconcile_arrays(&parent, &nodes, &[], None);
        assert_eq!(parent.child_count(), 0);
        let mutations = parent.take_mutations();
        assert_eq!(mutations.len(), 3);
        assert!(mutations.iter().all(|m| matches!(m, Mutation::Remove { .. })));
    }

    #[test]
    fn prepend_inserts_before_first() {
        let (parent, nodes) = setup("bc");
        reconcile_arrays(&parent, &nodes, &pick(&nodes, "abc"), None);
        assert_eq!(parent.text_content(), "abc");
        assert_eq!(parent.take_mutations().len(), 1);
    }

    #[test]
    fn middle_removal_keeps_neighbours() {
        let (parent, nodes) = setup("abcde");
        reconcile_arrays(&parent, &nodes, &pick(&nodes, "abde"), None);
        assert_eq!(parent.text_content(), "abde");
        assert_eq!(touched(&parent.take_mutations()), vec!["c"]);
    }

    #[test]
    fn reversal_and_mixed_edits_end_in_order() {
        let (parent, nodes) = setup("abcdef");
        reconcile_arrays(&parent, &nodes, &pick(&nodes, "fedcba"), None);
        assert_eq!(parent.text_content(), "fedcba");

        let current = parent.children();
        let next = pick(&current, "xcfzab");
        reconcile_arrays(&parent, &current, &next, None);
        assert_eq!(parent.text_content(), "xcfzab");
    }

    #[test]
    fn window_in_the_middle_of_siblings() {
        let parent = DomNode::element("div");
        let head = DomNode::text("[");
        let tail = DomNode::text("]");
        parent.append_child(&head);
        let items: Vec<DomNode> = ["a", "b"].iter().map(|s| DomNode::text(*s)).collect();
        for item in &items {
            parent.append_child(item);
        }
        parent.append_child(&tail);

        let next = vec![items[1].clone(), DomNode::text("c"), items[0].clone()];
        reconcile_arrays(&parent, &items, &next, None);
        assert_eq!(parent.text_content(), "[bca]");
    }

    #[test]
    fn empty_window_fills_before_marker() {
        let parent = DomNode::element("div");
        let head = DomNode::text("[");
        let tail = DomNode::text("]");
        parent.append_child(&head);
        parent.append_child(&tail);

        let next: Vec<DomNode> = ["a", "b"].iter().map(|s| DomNode::text(*s)).collect();
        reconcile_arrays(&parent, &[], &next, Some(&tail));
        assert_eq!(parent.text_content(), "[ab]");

        let trailing = DomNode::text("c");
        reconcile_arrays(&parent, &[], std::slice::from_ref(&trailing), None);
        assert_eq!(parent.text_content(), "[ab]c");
    }
}
