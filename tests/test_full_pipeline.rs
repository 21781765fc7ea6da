//! Integration test: preprocess → specify → compose → tune → finalize → fit → evaluate

use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use survey_models::cache::ArtifactCache;
use survey_models::evaluation::Metric;
use survey_models::model::{Hyperparameter, ModelSpec, ParamRange};
use survey_models::preprocessing::Recipe;
use survey_models::tuning::{tune_grid, GridSpec};
use survey_models::{
    compose, run_family, Dataset, EventLevel, FittedWorkflow, ModelFamily, RunConfig,
};

fn survey(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut hours = Vec::with_capacity(n);
    let mut fights = Vec::with_capacity(n);
    let mut sex = Vec::with_capacity(n);
    let mut carried = Vec::with_capacity(n);
    for _ in 0..n {
        let h: f64 = rng.gen_range(0.0..10.0);
        let f: f64 = rng.gen_range(0.0..4.0_f64).floor();
        let s = if rng.gen_bool(0.5) { "Female" } else { "Male" };
        let logit = -2.0 + 0.3 * h + 0.6 * f + if s == "Male" { 0.5 } else { 0.0 };
        let p = 1.0 / (1.0 + (-logit).exp());
        hours.push(h);
        fights.push(if rng.gen_bool(0.05) { None } else { Some(f) });
        sex.push(if rng.gen_bool(0.03) { None } else { Some(s) });
        carried.push(if rng.gen_bool(p) { "Yes" } else { "No" });
    }
    df!(
        "hours_online" => hours,
        "physical_fights" => fights,
        "sex" => sex,
        "weapon_carrying" => carried,
    )
    .unwrap()
}

fn config() -> RunConfig {
    RunConfig::new("weapon_carrying")
        .with_seed(2024)
        .with_event_level(EventLevel::Named("Yes".into()))
        .with_permutation_repeats(1)
}

#[test]
fn test_lasso_workflow_end_to_end() {
    let config = config();
    let ds = Dataset::split(survey(300, 1), &config).unwrap();
    let train = ds.train().unwrap();

    let recipe = Recipe::standard("weapon_carrying", config.corr_threshold)
        .with_event_level(config.event_level.clone());
    let spec = ModelSpec::lasso_reg(Hyperparameter::tune_in(ParamRange::log10(-4.0, -1.0))).unwrap();
    let wf = compose(&recipe, &spec);

    let tuning = tune_grid(&wf, &train, ds.folds(), &GridSpec::Regular { levels: 8 }, Metric::RocAuc, config.seed)
        .unwrap();
    let best = tuning.select_best(Metric::RocAuc).unwrap();
    let fitted = wf.finalize(&best.params).unwrap().fit(&train, config.seed).unwrap();

    let eval = fitted.evaluate(&train).unwrap();
    assert_eq!(eval.confusion.total(), train.height());
    assert_eq!(eval.confusion.event_level, "Yes");
    assert!(eval.auc > 0.6, "auc = {}", eval.auc);

    let points = &eval.roc.points;
    assert_eq!(points[0].false_positive_rate, 0.0);
    assert_eq!(points[0].true_positive_rate, 0.0);
    let last = points.last().unwrap();
    assert_eq!(last.false_positive_rate, 1.0);
    assert_eq!(last.true_positive_rate, 1.0);
    for pair in points.windows(2) {
        assert!(pair[1].false_positive_rate >= pair[0].false_positive_rate);
        assert!(pair[1].true_positive_rate >= pair[0].true_positive_rate);
    }

    let test = ds.test().unwrap();
    let preds = fitted.predict(&test).unwrap();
    assert_eq!(preds.len(), test.height());
    assert!(preds.prob_event.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(preds.class.iter().all(|c| c == "Yes" || c == "No"));
}

#[test]
fn test_fitted_workflow_save_load_predicts_the_same() {
    let config = config();
    let ds = Dataset::split(survey(160, 2), &config).unwrap();
    let train = ds.train().unwrap();
    let recipe = Recipe::standard("weapon_carrying", 0.7).with_event_level(config.event_level.clone());
    let spec = ModelSpec::decision_tree(0.01, 5usize, 4usize).unwrap();
    let fitted = compose(&recipe, &spec).fit(&train, 9).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.json");
    fitted.save(&path).unwrap();
    let loaded = FittedWorkflow::load(&path).unwrap();

    let a = fitted.predict(&ds.test().unwrap()).unwrap();
    let b = loaded.predict(&ds.test().unwrap()).unwrap();
    assert_eq!(a.class, b.class);
    for (x, y) in a.prob_event.iter().zip(b.prob_event.iter()) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn test_dataset_round_trip() {
    let config = config();
    let ds = Dataset::split(survey(120, 4), &config).unwrap();
    let dir = tempfile::tempdir().unwrap();
    ds.save(dir.path()).unwrap();

    let loaded = Dataset::load(dir.path()).unwrap();
    assert_eq!(loaded.manifest(), ds.manifest());
    assert_eq!(loaded.identity().unwrap(), ds.identity().unwrap());
    assert_eq!(loaded.folds().len(), 5);
}

#[test]
fn test_run_family_logistic_and_tree() {
    let config = config();
    let ds = Dataset::split(survey(200, 5), &config).unwrap();

    let logistic = run_family(ModelFamily::Logistic, &ds, &config, None).unwrap();
    assert_eq!(logistic.n_candidates, 0);
    assert!(logistic.best_params.is_none());
    assert!(logistic.test_auc().is_some());
    assert_eq!(logistic.train_evaluation.confusion.total(), ds.manifest().train_rows.len());

    let tree = run_family(ModelFamily::DecisionTree, &ds, &config, None).unwrap();
    assert_eq!(tree.n_candidates, 64);
    assert!(tree.best_params.is_some());
    assert!(tree.top_candidates.len() <= 5);
    assert!(!tree.importance.is_empty());
    assert_eq!(tree.roc_plot.auc, tree.train_auc());
}

#[test]
fn test_run_family_reuses_cached_artifacts() {
    let config = config();
    let ds = Dataset::split(survey(150, 6), &config).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let first = {
        let cache = ArtifactCache::on_disk(dir.path()).unwrap();
        let report = run_family(ModelFamily::Lasso, &ds, &config, Some(&cache)).unwrap();
        assert_eq!(cache.stats().hits, 0);
        // tuning, fitted model and ROC plot
        assert_eq!(cache.len(), 3);
        report
    };

    let cache = ArtifactCache::on_disk(dir.path()).unwrap();
    let second = run_family(ModelFamily::Lasso, &ds, &config, Some(&cache)).unwrap();
    assert_eq!(cache.stats().hits, 3);
    assert_eq!(cache.stats().misses, 0);
    assert_eq!(first.best_params, second.best_params);
    assert_eq!(first.train_auc(), second.train_auc());
    assert_eq!(first.roc_plot, second.roc_plot);
}
