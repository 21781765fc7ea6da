//! Survey models - Main Entry Point

use clap::Parser;
use survey_models::cli::{cmd_compare, cmd_info, cmd_predict, cmd_run, cmd_split, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_models=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split { data, output, target, config, seed, train_fraction, folds, no_stratify } => {
            cmd_split(&data, &output, &target, config.as_deref(), seed, train_fraction, folds, no_stratify)?;
        }
        Commands::Run { dataset, family, config, report, save_model } => {
            cmd_run(&dataset, &family, config.as_deref(), report.as_deref(), save_model.as_deref())?;
        }
        Commands::Compare { dataset, config, report } => {
            cmd_compare(&dataset, config.as_deref(), report.as_deref())?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
