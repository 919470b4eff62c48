use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ndarray::Array2;
use oneshot::embedding::Embedding;
use oneshot::ml::{FitOptions, PairDataset, SimilarityModel, TrainingLoop};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 512;
const ROWS: usize = 200;

fn datasets() -> (PairDataset, PairDataset) {
    let mut rng = StdRng::seed_from_u64(3);
    let anchor = Embedding::normalized((0..DIM).map(|_| rng.random_range(0.0..1.0)).collect());
    let positive = Array2::from_shape_fn((ROWS, DIM), |(_, col)| {
        anchor.as_slice()[col] + rng.random_range(-0.02..0.02)
    });
    let negative = Array2::from_shape_fn((ROWS, DIM), |_| rng.random_range(0.0..0.1));
    PairDataset::train_valid(&anchor, positive.view(), negative.view(), 42).expect("split")
}

fn bench_train_epoch(c: &mut Criterion) {
    let (train, valid) = datasets();
    for embed in [64usize, 256] {
        c.bench_with_input(BenchmarkId::new("train_epoch", embed), &embed, |b, &embed| {
            b.iter(|| {
                let model = SimilarityModel::new(DIM, embed, 42);
                let optimizer = model.optimizer(1e-3, 0.0);
                let options = FitOptions {
                    epochs: 1,
                    ..FitOptions::default()
                };
                let mut fit = TrainingLoop::new(model, optimizer, options);
                black_box(fit.run(black_box(&train), black_box(&valid)).expect("run"));
            });
        });
    }
}

criterion_group!(benches, bench_train_epoch);
criterion_main!(benches);
