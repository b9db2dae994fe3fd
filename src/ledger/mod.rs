//! Append-only trade ledger.
//!
//! One line per completed cycle. The line grammar matches the historical
//! `historico_operaciones.txt` files so old logs stay usable for training:
//!
//! ```text
//! 2024-05-02 14:31:59.412345 | Activo: EURUSD-OTC | Dirección: call | Resultado: WIN | Lucro/Pérdida: 0.85 | Análisis: [Tick 1: Dígito=3 (blue); Tick 2: Dígito=3 (blue); Tick 3: Dígito=3 (red); Tick 4: Dígito=3 (blue)] | Decisión: CALL (UP) | Predicción IA: WIN (0.72)
//! ```
//!
//! The `Predicción IA` suffix is present whenever the model produced a known
//! label with a probability, including a probability of exactly 0.00. A
//! certain LOSS is still a prediction and the training data should keep it.

pub mod parse;

pub use parse::{parse_line, read_entries, LedgerEntry, LedgerTick};

use crate::models::TradeRecord;
use crate::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_LEDGER_FILE: &str = "historico_operaciones.txt";

/// Timestamp layout used in ledger lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a record as a single ledger line (without the trailing newline)
pub fn format_record(record: &TradeRecord) -> String {
    let analysis = record
        .signal
        .observations
        .iter()
        .enumerate()
        .map(|(i, obs)| format!("Tick {}: Dígito={} ({})", i + 1, obs.digit, obs.color))
        .collect::<Vec<_>>()
        .join("; ");

    let direction = record
        .decision
        .direction()
        .map(|d| d.as_str())
        .unwrap_or("None");

    let prediction = match record.verdict.win_probability {
        Some(p) if !record.verdict.is_unknown() => {
            format!(" | Predicción IA: {} ({:.2})", record.verdict.label.as_str(), p)
        }
        _ => String::new(),
    };

    format!(
        "{} | Activo: {} | Dirección: {} | Resultado: {} | Lucro/Pérdida: {} | Análisis: [{}] | Decisión: {}{}",
        record.timestamp.format(TIMESTAMP_FORMAT),
        record.asset,
        direction,
        record.outcome.ledger_label(),
        record.profit.round_dp(2),
        analysis,
        record.decision.label(),
        prediction
    )
}

/// File-backed ledger
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file if needed
    pub async fn append(&self, record: &TradeRecord) -> Result<()> {
        let mut line = format_record(record);
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            path = %self.path.display(),
            outcome = %record.outcome,
            "Appended ledger record"
        );

        Ok(())
    }

    /// Read back every parseable entry
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        read_entries(&self.path)
    }
}
