//! Benchmarks for list reconciliation and keyed list updates
//!
//! Run with: cargo bench -p weft-core --bench reconcile

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use weft_core::reactive::{create_root, Signal};
use weft_core::render::{insert, keyed_list, reconcile_arrays, DomNode};

/// A parent holding `len` text nodes, plus the nodes in order.
fn populated(len: usize) -> (DomNode, Vec<DomNode>) {
    let parent = DomNode::element("ul");
    let nodes: Vec<DomNode> = (0..len).map(|i| DomNode::text(i.to_string())).collect();
    for node in &nodes {
        parent.append_child(node);
    }
    (parent, nodes)
}

fn bench_swap_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/swap_rows");

    for len in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (parent, mut nodes) = populated(len);
            b.iter(|| {
                let mut next = nodes.clone();
                next.swap(1, len - 2);
                reconcile_arrays(&parent, &nodes, black_box(&next), None);
                nodes = next;
            });
        });
    }

    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/reverse");

    for len in [100usize, 1_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (parent, mut nodes) = populated(len);
            b.iter(|| {
                let next: Vec<DomNode> = nodes.iter().rev().cloned().collect();
                reconcile_arrays(&parent, &nodes, black_box(&next), None);
                nodes = next;
            });
        });
    }

    group.finish();
}

fn bench_append_and_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/append_clear");

    for len in [100usize, 1_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let parent = DomNode::element("ul");
            let nodes: Vec<DomNode> = (0..len).map(|i| DomNode::text(i.to_string())).collect();
            let empty: &[DomNode] = &[];
            b.iter(|| {
                for node in &nodes {
                    parent.append_child(node);
                }
                reconcile_arrays(&parent, &nodes, black_box(empty), None);
            });
        });
    }

    group.finish();
}

fn bench_keyed_list_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_list/rotate");

    for len in [100usize, 1_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let parent = DomNode::element("ul");
            let items = Signal::new((0..len).collect::<Vec<usize>>());
            let source = items.clone();
            create_root(|_| {
                insert(
                    &parent,
                    keyed_list(move || source.get(), |i| *i, |i, _| DomNode::text(i.to_string())),
                    None,
                )
            });
            b.iter(|| {
                items.update(|current| {
                    let mut next = current.clone();
                    next.rotate_left(1);
                    next
                });
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_swap_rows,
    bench_reverse,
    bench_append_and_clear,
    bench_keyed_list_update
);
criterion_main!(benches);
