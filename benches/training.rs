use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use survey_models::evaluation::Metric;
use survey_models::model::{Hyperparameter, ModelSpec, TrainedModel};
use survey_models::preprocessing::Recipe;
use survey_models::tuning::{tune_grid, GridSpec};
use survey_models::{compose, Dataset, RunConfig};

fn create_classification_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            let logit = row[0] - row[1] + 0.5 * row[2] - 2.5;
            if rng.gen::<f64>() < 1.0 / (1.0 + (-logit).exp()) { 1.0 } else { 0.0 }
        })
        .collect();
    (x, y)
}

fn create_survey(n_rows: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let hours: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(0.0..10.0)).collect();
    let grade: Vec<&str> = (0..n_rows).map(|_| ["9", "10", "11", "12"][rng.gen_range(0..4)]).collect();
    let carried: Vec<&str> = hours
        .iter()
        .map(|h| if rng.gen::<f64>() < h / 12.0 { "Yes" } else { "No" })
        .collect();
    df!("hours_online" => hours, "grade" => grade, "weapon_carrying" => carried).unwrap()
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10);

    let specs = [
        ("logistic", ModelSpec::logistic_reg()),
        ("lasso", ModelSpec::lasso_reg(0.01).unwrap()),
        ("tree", ModelSpec::decision_tree(0.01, 10usize, 10usize).unwrap()),
        ("forest", ModelSpec::rand_forest(Some(Hyperparameter::from(3usize)), 5usize, 50).unwrap()),
    ];

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_classification_data(*n_rows, 10);
        for (name, spec) in &specs {
            group.bench_with_input(BenchmarkId::new(*name, n_rows), &(&x, &y), |b, (x, y)| {
                b.iter(|| TrainedModel::train(spec, black_box(x), black_box(y), 1).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_tuning(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuning");
    group.sample_size(10);

    let config = RunConfig::new("weapon_carrying");
    let ds = Dataset::split(create_survey(600), &config).unwrap();
    let train = ds.train().unwrap();
    let spec = ModelSpec::decision_tree(
        Hyperparameter::tune(),
        Hyperparameter::tune(),
        Hyperparameter::tune(),
    )
    .unwrap();
    let wf = compose(&Recipe::standard("weapon_carrying", 0.7), &spec);

    group.bench_function("tree_grid_3x3x3", |b| {
        b.iter(|| {
            tune_grid(&wf, &train, ds.folds(), &GridSpec::Regular { levels: 3 }, Metric::RocAuc, 1)
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_training, bench_tuning);
criterion_main!(benches);
