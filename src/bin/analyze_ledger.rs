use anyhow::Context;
use clap::Parser;
use pressure_bot::ledger::{read_entries, LedgerEntry, DEFAULT_LEDGER_FILE};
use pressure_bot::models::Outcome;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Summarise a trade ledger")]
struct Args {
    #[arg(default_value = DEFAULT_LEDGER_FILE)]
    ledger: PathBuf,
}

#[derive(Debug, Default)]
struct Bucket {
    wins: usize,
    losses: usize,
    ties: usize,
}

impl Bucket {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Tie => self.ties += 1,
            _ => {}
        }
    }

    fn settled(&self) -> usize {
        self.wins + self.losses + self.ties
    }

    fn win_rate(&self) -> f64 {
        if self.settled() == 0 {
            0.0
        } else {
            self.wins as f64 / self.settled() as f64 * 100.0
        }
    }

    fn line(&self, name: &str) -> String {
        format!(
            "{:<20} {:>4} trades  {:>4}W / {:>4}L / {:>4}T  ({:.1}%)",
            name,
            self.settled(),
            self.wins,
            self.losses,
            self.ties,
            self.win_rate()
        )
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("pressure_bot=warn")
        .init();

    let args = Args::parse();
    let entries = read_entries(&args.ledger)
        .with_context(|| format!("reading ledger {}", args.ledger.display()))?;

    if entries.is_empty() {
        eprintln!("No ledger entries in {}", args.ledger.display());
        return Ok(());
    }

    let mut all = Bucket::default();
    let mut calls = Bucket::default();
    let mut puts = Bucket::default();
    let mut gated = Bucket::default();
    let mut ungated = Bucket::default();
    let mut errors = 0;
    let mut timeouts = 0;
    let mut skipped = 0;
    let mut total_profit = Decimal::ZERO;

    for entry in &entries {
        total_profit += entry.profit;
        match entry.outcome {
            Outcome::Error => errors += 1,
            Outcome::Timeout => timeouts += 1,
            Outcome::NoTrade => skipped += 1,
            _ => {}
        }
        if !entry.outcome.is_settled() {
            continue;
        }

        all.add(entry.outcome);
        match entry.direction.as_deref() {
            Some("call") => calls.add(entry.outcome),
            Some("put") => puts.add(entry.outcome),
            _ => {}
        }
        if is_gated(entry) {
            gated.add(entry.outcome);
        } else {
            ungated.add(entry.outcome);
        }
    }

    println!("\n═══════════════════════════════════════════════════════");
    println!("                  LEDGER SUMMARY");
    println!("═══════════════════════════════════════════════════════\n");
    println!("File:                {}", args.ledger.display());
    println!(
        "Period:              {} to {}",
        entries.first().map(|e| e.timestamp.as_str()).unwrap_or("-"),
        entries.last().map(|e| e.timestamp.as_str()).unwrap_or("-")
    );
    println!("Cycles:              {}", entries.len());
    println!("Skipped:             {}", skipped);
    println!("Errors:              {}", errors);
    println!("Timeouts:            {}", timeouts);
    println!("Total profit:        {}", total_profit.round_dp(2));

    println!("\n═══════════════════════════════════════════════════════");
    println!("                  WIN RATE BREAKDOWN");
    println!("═══════════════════════════════════════════════════════\n");
    println!("{}", all.line("All trades"));
    println!("{}", calls.line("CALL"));
    println!("{}", puts.line("PUT"));
    println!("{}", gated.line("AI approved"));
    println!("{}", ungated.line("Ungated"));

    Ok(())
}

/// Trades taken with a known prediction went through the approval gate
fn is_gated(entry: &LedgerEntry) -> bool {
    entry.prediction.is_some()
}
