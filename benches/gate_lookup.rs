use std::hint::black_box;
use std::rc::Rc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use simtree::{GateType, ModuleRef, ModuleTree, ModuleType, ModuleTypeBuilder};

const PORTS: usize = 256;

fn make_tree() -> (ModuleTree, ModuleRef, ModuleRef) {
    let net: Rc<dyn ModuleType> = ModuleTypeBuilder::new("Net").build();
    let router: Rc<dyn ModuleType> = ModuleTypeBuilder::new("Router")
        .simple()
        .gate("ctl", GateType::Input, false)
        .gate("port", GateType::Inout, true)
        .gate_vector_size("port", PORTS)
        .build();

    let mut tree = ModuleTree::default();
    let root = tree.create_module(&net, "net", None, None).unwrap();
    tree.add_submodule_vector(root, "router", 64).unwrap();
    let mut last = root;
    for i in 0..64 {
        last = tree.create_module(&router, "router", Some(root), Some(i)).unwrap();
    }
    (tree, root, last)
}

fn bench_gate_by_name(c: &mut Criterion) {
    c.bench_function("gate/lookup_by_name", |b| {
        let (tree, _, router) = make_tree();
        b.iter(|| {
            let gate = tree.gate(router, "port$o", Some(black_box(PORTS / 2))).unwrap();
            black_box(gate);
        });
    });
}

fn bench_gate_by_id(c: &mut Criterion) {
    c.bench_function("gate/resolve_by_id", |b| {
        let (tree, _, router) = make_tree();
        let ids: Vec<_> = (0..PORTS)
            .map(|i| tree.gate(router, "port$i", Some(i)).unwrap().id)
            .collect();
        b.iter(|| {
            for id in &ids {
                black_box(tree.gate_by_id(router, *id).unwrap());
            }
        });
    });
}

fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths");
    group.throughput(Throughput::Elements(1));

    group.bench_function("find_module", |b| {
        let (tree, _, _) = make_tree();
        b.iter(|| black_box(tree.find_module(black_box("net.router[63]"))));
    });

    group.bench_function("full_path_uncached", |b| {
        b.iter_custom(|iters| {
            let (mut tree, root, router) = make_tree();
            let start = Instant::now();
            for i in 0..iters {
                // Renaming the root drops every cached path.
                let name = if i % 2 == 0 { "a" } else { "b" };
                tree.set_name(root, name).unwrap();
                black_box(tree.full_path(router));
            }
            start.elapsed()
        });
    });
    group.finish();
}

fn bench_first_unconnected(c: &mut Criterion) {
    c.bench_function("gate/first_unconnected_scan", |b| {
        let (mut tree, _, router) = make_tree();
        // Loop every element but the last back through the module.
        for i in 0..PORTS - 1 {
            let from = tree.gate(router, "port$i", Some(i)).unwrap();
            let to = tree.gate(router, "port$o", Some(i)).unwrap();
            tree.connect(from, to, None).unwrap();
        }
        b.iter(|| {
            let gate = tree
                .get_or_create_first_unconnected_gate(router, "port$o", None, true, false)
                .unwrap();
            black_box(gate);
        });
    });
}

criterion_group!(
    gate_lookup,
    bench_gate_by_name,
    bench_gate_by_id,
    bench_path_resolution,
    bench_first_unconnected
);
criterion_main!(gate_lookup);
