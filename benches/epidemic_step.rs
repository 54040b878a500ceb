use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;

use compartmental::epidemic::Epidemic;
use compartmental::model::Model;
use criterion::{criterion_group, criterion_main, Criterion};

static SEED: u64 = 123;

fn load(path: &str) -> Arc<Model> {
    Arc::new(Model::load(Path::new(path)).expect("failed to load the benchmark model"))
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut epidemic = Epidemic::new(0, load("tests/data/sir.json"));

    c.bench_function("sir step", |bencher| {
        epidemic.reset(SEED);
        bencher.iter(|| {
            if epidemic.step().stop.is_some() {
                epidemic.reset(SEED);
            }
        });
    });

    c.bench_function("sir trajectory", |bencher| {
        bencher.iter(|| black_box(epidemic.simulate(black_box(SEED))));
    });

    let mut epidemic = Epidemic::new(0, load("tests/data/sir_calibration.json"));
    c.bench_function("sir calibration trajectory", |bencher| {
        bencher.iter(|| black_box(epidemic.simulate(black_box(SEED))));
    });
}

criterion_group!(epidemic_benches, criterion_benchmark);
criterion_main!(epidemic_benches);
