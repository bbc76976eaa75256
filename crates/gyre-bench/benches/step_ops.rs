//! Criterion benchmarks for whole model steps.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gyre_bench::{closures_profile, reference_profile, stress_profile, Profile};

fn warm(profile: Profile) -> (gyre_engine::Model, gyre_core::SteadyForcing) {
    let (mut model, forcing) = profile.into_model().unwrap();
    // The first step is forward Euler; time the Adams-Bashforth path.
    model.advance_one_step(&forcing).unwrap();
    (model, forcing)
}

fn bench_step_reference(c: &mut Criterion) {
    let (mut model, forcing) = warm(reference_profile().unwrap());
    c.bench_function("step_reference", |b| {
        b.iter(|| {
            let report = model.advance_one_step(&forcing).unwrap();
            black_box(&report);
        });
    });
}

fn bench_step_closures(c: &mut Criterion) {
    let (mut model, forcing) = warm(closures_profile().unwrap());
    c.bench_function("step_closures", |b| {
        b.iter(|| {
            let report = model.advance_one_step(&forcing).unwrap();
            black_box(&report);
        });
    });
}

fn bench_step_stress(c: &mut Criterion) {
    let (mut model, forcing) = warm(stress_profile().unwrap());
    let mut group = c.benchmark_group("stress");
    group.sample_size(10);
    group.bench_function("step_stress", |b| {
        b.iter(|| {
            let report = model.advance_one_step(&forcing).unwrap();
            black_box(&report);
        });
    });
    group.finish();
}

fn bench_100_steps_reference(c: &mut Criterion) {
    let mut group = c.benchmark_group("spin_up");
    group.sample_size(10);
    group.bench_function("100_steps_reference", |b| {
        b.iter(|| {
            let (mut model, forcing) = reference_profile().unwrap().into_model().unwrap();
            let metrics = model.run(&forcing, 100).unwrap();
            black_box(&metrics);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_step_reference,
    bench_step_closures,
    bench_step_stress,
    bench_100_steps_reference
);
criterion_main!(benches);
