//! Survey models CLI
//!
//! Command-line interface for splitting a survey table, running the model
//! families, comparing them and predicting with a saved model.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cache::ArtifactCache;
use crate::config::RunConfig;
use crate::dataset::Dataset;
use crate::evaluation::Evaluation;
use crate::families::{run_family, run_family_with_model, FamilyReport, ModelFamily};
use crate::utils::{frame, DataLoader};
use crate::workflow::FittedWorkflow;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "survey-models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fit and compare classifiers on survey data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a table into train/test partitions and cross-validation folds
    Split {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Output dataset directory
        #[arg(short, long)]
        output: PathBuf,

        /// Outcome column
        #[arg(short, long, default_value = "weapon_carrying")]
        target: String,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,

        /// Share of rows in the training partition
        #[arg(long)]
        train_fraction: Option<f64>,

        /// Number of cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Sample without stratifying by outcome
        #[arg(long)]
        no_stratify: bool,
    },

    /// Run one model family on a split dataset
    Run {
        /// Dataset directory written by `split`
        #[arg(short, long)]
        dataset: PathBuf,

        /// Model family (logistic, lasso, tree, forest)
        #[arg(short, long)]
        family: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Save the fitted workflow
        #[arg(long)]
        save_model: Option<PathBuf>,
    },

    /// Run every model family and compare them
    Compare {
        #[arg(short, long)]
        dataset: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write all reports as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Predict with a saved workflow
    Predict {
        /// Saved workflow file
        #[arg(short, long)]
        model: PathBuf,

        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file (CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show table information
    Info {
        /// Data file or dataset directory
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    Ok(match path {
        Some(p) => RunConfig::load(p)?,
        None => RunConfig::default(),
    })
}

fn open_cache(config: &RunConfig) -> anyhow::Result<Option<ArtifactCache>> {
    match (&config.artifact_dir, config.use_cache) {
        (Some(dir), true) => Ok(Some(ArtifactCache::on_disk(dir)?)),
        _ => Ok(None),
    }
}

/// Takes the target from the manifest, and its seed unless a config file set one
fn adopt_manifest(config: &mut RunConfig, dataset: &Dataset, from_file: bool) {
    config.target_column = dataset.target().to_string();
    if !from_file {
        config.seed = dataset.manifest().seed;
    }
}

fn load_dataset(dir: &Path, config: &mut RunConfig, from_file: bool) -> anyhow::Result<Dataset> {
    step_run("Loading dataset");
    let start = Instant::now();
    let dataset = Dataset::load(dir)?;
    adopt_manifest(config, &dataset, from_file);
    let m = dataset.manifest();
    step_done(&format!(
        "{} rows, {} train / {} test, {} folds in {:?}",
        m.n_rows,
        m.train_rows.len(),
        m.test_rows.len(),
        m.folds.len(),
        start.elapsed()
    ));
    Ok(dataset)
}

fn print_evaluation(label: &str, eval: &Evaluation) {
    println!();
    println!("  {}", label.white());
    for line in eval.confusion.to_string().lines() {
        println!("    {}", line);
    }
    println!();
    println!("  {:<14} {}", muted("ROC AUC"), format!("{:.4}", eval.auc).white().bold());
    println!("  {:<14} {}", muted("Accuracy"), fmt_opt(eval.accuracy));
    println!("  {:<14} {}", muted("Sensitivity"), fmt_opt(eval.sensitivity));
    println!("  {:<14} {}", muted("Specificity"), fmt_opt(eval.specificity));
}

fn print_report(report: &FamilyReport) {
    section(report.family.title());
    println!("  {:<14} {}", muted("Model"), report.model);

    if report.n_candidates > 0 {
        println!(
            "  {:<14} {} ({} failed)",
            muted("Candidates"),
            report.n_candidates,
            report.n_failed
        );
        println!();
        println!("  {:<10} {:>8} {:>8} {:>4}  {}", muted("Id"), muted("Mean"), muted("SE"), muted("n"), muted("Parameters"));
        for c in &report.top_candidates {
            let params: Vec<String> = c.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!(
                "  {:<10} {:>8} {:>8} {:>4}  {}",
                c.id,
                fmt_opt(c.mean),
                fmt_opt(c.std_err),
                c.n,
                params.join(", ")
            );
        }
    }

    print_evaluation("Training data", &report.train_evaluation);
    if let Some(test) = &report.test_evaluation {
        print_evaluation("Test data", test);
    }

    if !report.importance.is_empty() {
        println!();
        println!("  {}", "Variable importance".white());
        for score in report.importance.iter().take(10) {
            println!("    {:<28} {:>10.4}", score.feature, score.score);
        }
    }
    println!();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_split(
    data: &Path,
    output: &Path,
    target: &str,
    config: Option<&Path>,
    seed: Option<u64>,
    train_fraction: Option<f64>,
    folds: Option<usize>,
    no_stratify: bool,
) -> anyhow::Result<()> {
    section("Split");

    let mut config = load_config(config)?;
    config.target_column = target.to_string();
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(fraction) = train_fraction {
        config.train_fraction = fraction;
    }
    if let Some(folds) = folds {
        config.cv_folds = folds;
    }
    if no_stratify {
        config.stratify = false;
    }
    config.validate()?;

    step_run("Loading data");
    let start = Instant::now();
    let df = DataLoader::new().load(data)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    let source = data
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let dataset = Dataset::split(df, &config)?.with_source(source);
    dataset.save(output)?;

    let m = dataset.manifest();
    step_ok(&format!(
        "{} train / {} test, {} folds, seed {} → {}",
        m.train_rows.len(),
        m.test_rows.len(),
        m.folds.len(),
        m.seed,
        output.display()
    ));
    println!();
    Ok(())
}

pub fn cmd_run(
    dataset_dir: &Path,
    family: &str,
    config: Option<&Path>,
    report_path: Option<&Path>,
    save_model: Option<&Path>,
) -> anyhow::Result<()> {
    let family: ModelFamily = family.parse()?;
    let from_file = config.is_some();
    let mut config = load_config(config)?;
    section(&format!("Run · {}", family.title()));

    let dataset = load_dataset(dataset_dir, &mut config, from_file)?;
    let cache = open_cache(&config)?;

    step_run(&format!("Fitting {}", family.name().cyan()));
    let start = Instant::now();
    let (report, fitted) = run_family_with_model(family, &dataset, &config, cache.as_ref())?;
    step_done(&format!("{:?}", start.elapsed()));

    print_report(&report);

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        step_ok(&format!("report → {}", path.display()));
    }
    if let Some(path) = save_model {
        fitted.save(path)?;
        step_ok(&format!("model → {}", path.display()));
    }
    if let Some(cache) = &cache {
        let stats = cache.stats();
        println!("  {}", dim(&format!("cache: {} hits, {} misses", stats.hits, stats.misses)));
    }
    println!();
    Ok(())
}

pub fn cmd_compare(
    dataset_dir: &Path,
    config: Option<&Path>,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let from_file = config.is_some();
    let mut config = load_config(config)?;
    section("Compare");

    let dataset = load_dataset(dataset_dir, &mut config, from_file)?;
    let cache = open_cache(&config)?;

    let mut reports = Vec::new();
    for family in ModelFamily::all() {
        step_run(&format!("Fitting {}", family.name().cyan()));
        let start = Instant::now();
        let report = run_family(family, &dataset, &config, cache.as_ref())?;
        step_done(&format!("{:?}", start.elapsed()));
        reports.push(report);
    }

    section("Summary");
    println!(
        "  {:<28} {:>10} {:>10} {:>10}",
        muted("Model"),
        muted("Train AUC"),
        muted("Test AUC"),
        muted("Accuracy")
    );
    for report in &reports {
        println!(
            "  {:<28} {:>10} {:>10} {:>10}",
            report.family.title(),
            format!("{:.4}", report.train_auc()),
            fmt_opt(report.test_auc()),
            fmt_opt(report.train_evaluation.accuracy)
        );
    }
    println!();

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&reports)?)?;
        step_ok(&format!("reports → {}", path.display()));
        println!();
    }
    Ok(())
}

pub fn cmd_predict(model: &Path, data: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let fitted = FittedWorkflow::load(model)?;
    step_done(&fitted.workflow().spec().to_string());

    let df = DataLoader::new().load(data)?;
    let predictions = fitted.predict(&df)?;
    let events = predictions
        .class
        .iter()
        .filter(|c| **c == predictions.event_level)
        .count();
    step_ok(&format!(
        "{} rows, {} predicted '{}'",
        predictions.len(),
        events,
        predictions.event_level
    ));

    if let Some(path) = output {
        let frame = predictions.to_frame()?;
        DataLoader::new().write_csv(&frame, path)?;
        step_ok(&format!("predictions → {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_info(data: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = if data.is_dir() {
        let dataset = Dataset::load(data)?;
        let m = dataset.manifest();
        println!("  {:<12} {}", muted("Target"), m.target);
        println!("  {:<12} {}", muted("Seed"), m.seed);
        println!("  {:<12} {} / {}", muted("Train/Test"), m.train_rows.len(), m.test_rows.len());
        println!("  {:<12} {}", muted("Folds"), m.folds.len());
        dataset.full().clone()
    } else {
        DataLoader::new().load(data)?
    };

    println!("  {:<12} {}", muted("File"), data.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!();

    println!("  {:<24} {:<10} {:>6}", muted("Column"), muted("Kind"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(44)));
    for (col, (_, nulls)) in df.get_columns().iter().zip(frame::missing_counts(&df)) {
        println!(
            "  {:<24} {:<10} {:>6}",
            col.name().as_str(),
            muted(&format!("{:?}", frame::kind_of(col))),
            nulls
        );
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn saved_dataset(seed: u64) -> (tempfile::TempDir, Dataset) {
        let df = df!(
            "hours_online" => (0..40).map(|i| i as f64 / 4.0).collect::<Vec<_>>(),
            "weapon_carrying" => (0..40).map(|i| if i % 3 == 0 { "Yes" } else { "No" }).collect::<Vec<_>>(),
        )
        .unwrap();
        let config = RunConfig::new("weapon_carrying").with_seed(seed);
        let dataset = Dataset::split(df, &config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        dataset.save(dir.path()).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_seed_follows_manifest_without_config_file() {
        let (dir, _) = saved_dataset(77);
        let mut config = load_config(None).unwrap();
        let dataset = load_dataset(dir.path(), &mut config, false).unwrap();
        assert_eq!(dataset.manifest().seed, 77);
        assert_eq!(config.seed, 77);
        assert_eq!(config.target_column, "weapon_carrying");
    }

    #[test]
    fn test_config_file_seed_wins() {
        let (dir, _) = saved_dataset(77);
        let config_path = dir.path().join("run.json");
        RunConfig::new("ignored").with_seed(5).save(&config_path).unwrap();

        let mut config = load_config(Some(&config_path)).unwrap();
        load_dataset(dir.path(), &mut config, true).unwrap();
        assert_eq!(config.seed, 5);
        assert_eq!(config.target_column, "weapon_carrying");
    }
}
