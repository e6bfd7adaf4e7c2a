//! Benchmarks for the transform evaluator and compositor kernel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use riparia_algorithms::evidence::CombineOp;
use riparia_algorithms::transform::{TransformFunction, TransformKind};

fn test_tile(size: usize) -> Array2<f64> {
    Array2::from_shape_fn((size, size), |(r, c)| ((r * 7 + c * 13) % 32) as f64)
}

fn ramp(kind: TransformKind) -> TransformFunction {
    TransformFunction::new(
        kind,
        &[(0.0, 0.0), (8.0, 0.4), (16.0, 0.7), (24.0, 0.9), (32.0, 1.0)],
    )
    .unwrap()
}

fn bench_evaluate_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform/evaluate_array");
    for kind in [TransformKind::Linear, TransformKind::Nearest, TransformKind::Cubic] {
        let function = ramp(kind);
        let tile = test_tile(512);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", kind)),
            &kind,
            |b, _| b.iter(|| function.evaluate_array(black_box(&tile))),
        );
    }
    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("evidence/combine");
    for size in [256, 512, 1024] {
        let operand = test_tile(size).mapv(|v| v / 32.0);
        group.bench_with_input(BenchmarkId::new("product", size), &size, |b, _| {
            b.iter(|| {
                let mut acc = test_tile(size).mapv(|v| v / 32.0);
                CombineOp::Product.combine(black_box(&mut acc), black_box(&operand));
                acc
            })
        });
        group.bench_with_input(BenchmarkId::new("max", size), &size, |b, _| {
            b.iter(|| {
                let mut acc = test_tile(size).mapv(|v| v / 32.0);
                CombineOp::Max.combine(black_box(&mut acc), black_box(&operand));
                acc
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate_array, bench_combine);
criterion_main!(benches);
