//! Integration test: preprocessing recipes

use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use survey_models::preprocessing::{Recipe, Selector};
use survey_models::utils::frame;

fn survey_df() -> DataFrame {
    df!(
        "hours_online" => &[Some(1.0), Some(3.0), None, Some(8.0), Some(5.0), Some(2.0), None, Some(7.0)],
        "grade" => &[Some("9"), Some("10"), Some("11"), None, Some("10"), Some("10"), Some("9"), Some("12")],
        "region" => &["north", "north", "north", "north", "north", "north", "north", "north"],
        "weapon_carrying" => &["No", "No", "Yes", "Yes", "No", "No", "No", "Yes"],
    )
    .unwrap()
}

#[test]
fn test_bake_is_deterministic() {
    let df = survey_df();
    let fitted = Recipe::standard("weapon_carrying", 0.7).fit(&df).unwrap();

    let first = fitted.bake(&df).unwrap();
    let second = fitted.bake(&df).unwrap();
    assert!(first.equals_missing(&second));
    assert_eq!(first.height(), df.height());
}

#[test]
fn test_mean_imputation_uses_training_mean() {
    let df = survey_df();
    let fitted = Recipe::new("weapon_carrying")
        .impute_mean(Selector::AllNumericPredictors)
        .fit(&df)
        .unwrap();

    let baked = fitted.bake(&df).unwrap();
    let hours = frame::numeric_values(&baked, "hours_online").unwrap();
    let mean = (1.0 + 3.0 + 8.0 + 5.0 + 2.0 + 7.0) / 6.0;
    assert!(hours.iter().all(|v| v.is_some()));
    assert!((hours[2].unwrap() - mean).abs() < 1e-12);
    assert!((hours[6].unwrap() - mean).abs() < 1e-12);
    assert_eq!(hours[0], Some(1.0));
}

#[test]
fn test_standard_recipe_predictors() {
    let df = survey_df();
    let fitted = Recipe::standard("weapon_carrying", 0.7).fit(&df).unwrap();

    let predictors = fitted.predictors();
    // constant region is filtered, grade keeps one indicator per non-reference level
    assert!(!predictors.iter().any(|p| p.starts_with("region")));
    assert!(predictors.contains(&"hours_online".to_string()));
    assert_eq!(predictors.iter().filter(|p| p.starts_with("grade_")).count(), 3);
    assert!(!predictors.contains(&"weapon_carrying".to_string()));

    let matrix = fitted.bake_matrix(&df).unwrap();
    assert_eq!(matrix.x.ncols(), predictors.len());
    // first sorted level is the event
    assert_eq!(fitted.event_level(), "No");
    assert_eq!(matrix.y.iter().filter(|v| **v == 1.0).count(), 5);
}

#[test]
fn test_correlation_filter_drops_one_of_a_correlated_pair() {
    let n = 200;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut columns: Vec<Column> = Vec::new();

    let base: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let twin: Vec<f64> = base.iter().map(|v| v + 0.05 * rng.gen::<f64>()).collect();
    columns.push(Column::new("x0".into(), base));
    columns.push(Column::new("x1".into(), twin));
    for j in 2..10 {
        let values: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        columns.push(Column::new(format!("x{}", j).into(), values));
    }
    let outcome: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "Yes" } else { "No" }).collect();
    columns.push(Column::new("weapon_carrying".into(), outcome));
    let df = DataFrame::new(columns).unwrap();

    let fitted = Recipe::standard("weapon_carrying", 0.7).fit(&df).unwrap();
    assert_eq!(fitted.predictors().len(), 9);
    let kept_pair = ["x0", "x1"]
        .iter()
        .filter(|name| fitted.predictors().iter().any(|p| p == *name))
        .count();
    assert_eq!(kept_pair, 1);
}

#[test]
fn test_bake_rejects_missing_input_column() {
    let df = survey_df();
    let fitted = Recipe::standard("weapon_carrying", 0.7).fit(&df).unwrap();
    let narrowed = df.drop("hours_online").unwrap();
    assert!(fitted.bake(&narrowed).is_err());
}

#[test]
fn test_unseen_level_maps_to_zero_indicators() {
    let df = survey_df();
    let fitted = Recipe::standard("weapon_carrying", 0.7).fit(&df).unwrap();

    let new = df!(
        "hours_online" => &[4.0],
        "grade" => &["13"],
        "region" => &["south"],
        "weapon_carrying" => &["No"],
    )
    .unwrap();
    let x = fitted.bake_features(&new).unwrap();
    assert_eq!(x.nrows(), 1);
    let grade_cols: Vec<usize> = fitted
        .predictors()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.starts_with("grade_"))
        .map(|(i, _)| i)
        .collect();
    assert!(grade_cols.iter().all(|&j| x[[0, j]] == 0.0));
}
