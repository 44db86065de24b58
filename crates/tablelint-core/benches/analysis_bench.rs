use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tablelint_core::Analyzer;
use tablelint_ir::arena::Arena;
use tablelint_ir::diagnostics::CollectingWarningSink;
use tablelint_ir::item::{Item, LineScope};
use tablelint_test_helpers::IrBuilder;

/// A straight-line chunk: one table, `fields` sets, half of them read.
fn straight_line_chunk<'a>(b: &IrBuilder<'a>, fields: usize) -> LineScope<'a> {
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    for i in 0..fields {
        let key = format!("f{i}");
        items.push(b.set(&[b.field(b.name("t"), &key)], &[b.num(i as f64)]));
    }
    for i in 0..fields / 2 {
        let key = format!("f{i}");
        items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("t"), &key)])));
    }
    b.line_scope(items)
}

/// Repeated if/else constructs, each setting one key on both arms.
fn branchy_chunk<'a>(b: &IrBuilder<'a>, constructs: usize) -> LineScope<'a> {
    let mut items: Vec<Item<'a>> = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    for i in 0..constructs {
        let key = format!("k{i}");
        let cond = b.global("cond");
        let then_body = vec![b.set(&[b.field(b.name("t"), &key)], &[b.num(1.0)])];
        let else_body = vec![b.set(&[b.field(b.name("t"), &key)], &[b.num(2.0)])];
        let construct = b.if_stmt(items.len(), vec![(cond, then_body)], Some(else_body));
        items.extend(construct);
    }
    items.push(b.eval(b.call(
        b.global("pairs"),
        &[b.name("t")],
    )));
    b.line_scope(items)
}

fn bench_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("straight_line");
    for fields in [16usize, 128, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(fields), &fields, |bench, &n| {
            let arena = Arena::new();
            let b = IrBuilder::new(&arena);
            let line = straight_line_chunk(&b, n);
            let analyzer = Analyzer::new(b.interner());
            bench.iter(|| {
                let sink = CollectingWarningSink::new();
                analyzer.analyze_line(black_box(&line), &sink);
                black_box(sink.take());
            })
        });
    }
    group.finish();
}

fn bench_branchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("branch_merge");
    for constructs in [8usize, 32, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(constructs),
            &constructs,
            |bench, &n| {
                let arena = Arena::new();
                let b = IrBuilder::new(&arena);
                let line = branchy_chunk(&b, n);
                let analyzer = Analyzer::new(b.interner());
                bench.iter(|| {
                    let sink = CollectingWarningSink::new();
                    analyzer.analyze_line(black_box(&line), &sink);
                    black_box(sink.take());
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_straight_line, bench_branchy);
criterion_main!(benches);
