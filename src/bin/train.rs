use anyhow::{bail, Context};
use clap::Parser;
use pressure_bot::ledger::{read_entries, DEFAULT_LEDGER_FILE};
use pressure_bot::predictor::training::{param_grid, rows_from_entries, train};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Train the outcome classifier from the trade ledger")]
struct Args {
    /// Ledger file to learn from
    #[arg(long, default_value = DEFAULT_LEDGER_FILE)]
    ledger: PathBuf,

    /// Directory the model artifacts are written to
    #[arg(long, default_value = ".")]
    model_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("pressure_bot=info,train=info")
        .init();

    let args = Args::parse();
    tracing::info!("Starting model training from {}", args.ledger.display());

    let entries = read_entries(&args.ledger)
        .with_context(|| format!("reading ledger {}", args.ledger.display()))?;
    let rows = rows_from_entries(&entries);
    if rows.is_empty() {
        bail!("no settled WIN/LOSS/EMPATE cycles found in {}", args.ledger.display());
    }
    tracing::info!("Loaded {} settled cycles ({} ledger lines)", rows.len(), entries.len());

    let (artifacts, report) = train(&rows, &param_grid()).context("training classifier")?;

    println!("\n═══════════════════════════════════════════════════════");
    println!("                  TRAINING REPORT");
    println!("═══════════════════════════════════════════════════════\n");
    println!("Samples:             {}", report.samples);
    println!(
        "CV accuracy:         {:.2} (+/- {:.2})",
        report.cv_mean(),
        report.cv_std() * 2.0
    );
    println!(
        "Best parameters:     n_estimators={} max_depth={} min_samples_split={}",
        report.best_params.n_estimators,
        report
            .best_params
            .max_depth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "None".to_string()),
        report.best_params.min_samples_split
    );
    println!("Best CV accuracy:    {:.2}", report.best_cv_score);
    println!("Test accuracy:       {:.2}\n", report.test_accuracy);

    println!("{:<10} {:>9} {:>9} {:>9} {:>9}", "class", "precision", "recall", "f1", "support");
    for m in &report.class_metrics {
        println!(
            "{:<10} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            m.class, m.precision, m.recall, m.f1, m.support
        );
    }

    artifacts
        .save(&args.model_dir)
        .with_context(|| format!("saving artifacts to {}", args.model_dir.display()))?;
    tracing::info!("Model saved to {}", args.model_dir.display());

    Ok(())
}
