use crate::models::{Outcome, TickColor, NO_TRADE_LABEL};
use crate::Result;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

/// One tick of the `Análisis` section
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTick {
    pub digit: u8,
    pub color: String,
}

impl LedgerTick {
    pub fn tick_color(&self) -> Option<TickColor> {
        TickColor::from_label(&self.color)
    }
}

/// A parsed ledger line
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub asset: Option<String>,
    pub direction: Option<String>,
    pub outcome: Outcome,
    pub profit: Decimal,
    pub ticks: Vec<LedgerTick>,
    pub decision: String,
    pub prediction: Option<(String, f64)>,
}

/// Parse one ledger line.
///
/// Only the `Análisis` and `Resultado` fields are mandatory; everything else
/// falls back to a neutral value so older, shorter lines are still read.
pub fn parse_line(line: &str) -> Option<LedgerEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut segments = line.split(" | ");
    let timestamp = segments.next()?.trim().to_string();

    let mut asset = None;
    let mut direction = None;
    let mut outcome = None;
    let mut profit = Decimal::ZERO;
    let mut ticks = None;
    let mut decision = None;
    let mut prediction = None;

    for segment in segments {
        let Some((key, value)) = segment.split_once(": ") else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Activo" => asset = Some(value.to_string()),
            "Dirección" => direction = Some(value.to_string()),
            "Resultado" => outcome = Outcome::from_ledger_label(value),
            "Lucro/Pérdida" => profit = Decimal::from_str(value).unwrap_or(Decimal::ZERO),
            "Análisis" => ticks = parse_analysis(value),
            "Decisión" => decision = Some(value.to_string()),
            "Predicción IA" => prediction = parse_prediction(value),
            _ => {}
        }
    }

    Some(LedgerEntry {
        timestamp,
        asset,
        direction,
        outcome: outcome?,
        profit,
        ticks: ticks?,
        decision: decision.unwrap_or_else(|| NO_TRADE_LABEL.to_string()),
        prediction,
    })
}

/// `[Tick 1: Dígito=3 (blue); Tick 2: ...]`
fn parse_analysis(value: &str) -> Option<Vec<LedgerTick>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    inner.split("; ").map(parse_tick).collect()
}

fn parse_tick(tick: &str) -> Option<LedgerTick> {
    let (_, rest) = tick
        .split_once("Dígito=")
        .or_else(|| tick.split_once("Digit="))?;

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let digit = digits.parse::<u8>().ok()?;

    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    let color = rest[open + 1..close].trim().to_string();

    Some(LedgerTick { digit, color })
}

/// `WIN (0.72)`
fn parse_prediction(value: &str) -> Option<(String, f64)> {
    let (label, rest) = value.split_once(" (")?;
    let probability = rest.strip_suffix(')')?.parse::<f64>().ok()?;
    Some((label.trim().to_string(), probability))
}

/// Read every parseable entry of a ledger file; malformed lines are skipped
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed ledger lines in {}", skipped, path.display());
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIN_LINE: &str = "2024-05-02 14:31:59.412345 | Activo: EURUSD-OTC | Dirección: call | \
        Resultado: WIN | Lucro/Pérdida: 0.85 | Análisis: [Tick 1: Dígito=3 (blue); \
        Tick 2: Dígito=7 (blue); Tick 3: Dígito=3 (red); Tick 4: Dígito=0 (blue)] | \
        Decisión: CALL (UP) | Predicción IA: WIN (0.72)";

    #[test]
    fn test_parse_full_line() {
        let entry = parse_line(WIN_LINE).unwrap();

        assert_eq!(entry.timestamp, "2024-05-02 14:31:59.412345");
        assert_eq!(entry.asset.as_deref(), Some("EURUSD-OTC"));
        assert_eq!(entry.direction.as_deref(), Some("call"));
        assert_eq!(entry.outcome, Outcome::Win);
        assert_eq!(entry.profit, Decimal::new(85, 2));
        assert_eq!(entry.ticks.len(), 4);
        assert_eq!(entry.ticks[1], LedgerTick { digit: 7, color: "blue".to_string() });
        assert_eq!(entry.ticks[2].tick_color(), Some(TickColor::Down));
        // The prediction suffix is not part of the decision
        assert_eq!(entry.decision, "CALL (UP)");
        assert_eq!(entry.prediction, Some(("WIN".to_string(), 0.72)));
    }

    #[test]
    fn test_parse_legacy_tie_and_float_profit() {
        let line = "2024-05-02 14:33:59.000001 | Activo: USDZAR-OTC | Dirección: put | \
            Resultado: EMPATE | Lucro/Pérdida: 0.0 | Análisis: [Tick 1: Dígito=1 (red)] | \
            Decisión: PUT (DOWN)";
        let entry = parse_line(line).unwrap();

        assert_eq!(entry.outcome, Outcome::Tie);
        assert_eq!(entry.profit, Decimal::ZERO);
        assert!(entry.prediction.is_none());
    }

    #[test]
    fn test_parse_english_digit_label() {
        let line = "t | Resultado: LOSS | Análisis: [Tick 1: Digit=4 (red); Tick 2: Digit=10 (blue)]";
        let entry = parse_line(line).unwrap();

        assert_eq!(entry.ticks[1].digit, 10);
        assert_eq!(entry.decision, NO_TRADE_LABEL);
    }

    #[test]
    fn test_parse_empty_analysis() {
        let line = "t | Resultado: NONE | Lucro/Pérdida: 0 | Análisis: [] | Decisión: No se realiza operación";
        let entry = parse_line(line).unwrap();
        assert!(entry.ticks.is_empty());
        assert_eq!(entry.outcome, Outcome::NoTrade);
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(parse_line("").is_none());
        assert!(parse_line("garbage without fields").is_none());
        // Missing analysis
        assert!(parse_line("t | Resultado: WIN | Decisión: CALL (UP)").is_none());
        // Unknown result
        assert!(parse_line("t | Resultado: MAYBE | Análisis: []").is_none());
        // Broken tick
        assert!(parse_line("t | Resultado: WIN | Análisis: [Tick 1: Dígito=x (blue)]").is_none());
    }
}
