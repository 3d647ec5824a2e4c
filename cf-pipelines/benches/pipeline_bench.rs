//! Benchmarks for dependency resolution.

#![allow(clippy::expect_used)]

use cf_pipelines::core::outputs;
use cf_pipelines::functions::FunctionDeclaration;
use cf_pipelines::pipeline::Pipeline;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn chain(length: usize) -> Pipeline {
    let mut pipeline = Pipeline::new("chain");
    for i in 0..length {
        let mut declaration = FunctionDeclaration::new().produces([format!("artifact_{i}.txt")]);
        if i > 0 {
            declaration = declaration.needs([format!("artifact_{}", i - 1)]);
        }
        let key = format!("artifact_{i}.txt");
        pipeline
            .register("chain", &format!("f_{i}"), declaration, move |_| {
                Ok(outputs([(key.clone(), "x")]))
            })
            .expect("registration");
    }
    pipeline
}

fn resolution_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    for length in [10_usize, 100, 500] {
        let pipeline = chain(length);
        group.bench_with_input(BenchmarkId::new("solve_dependencies", length), &pipeline, |b, p| {
            b.iter(|| black_box(p.solve_dependencies().expect("solve")));
        });
        group.bench_with_input(BenchmarkId::new("make_dag", length), &pipeline, |b, p| {
            b.iter(|| black_box(p.make_dag().expect("dag")));
        });
    }
    group.finish();
}

criterion_group!(benches, resolution_benchmark);
criterion_main!(benches);
