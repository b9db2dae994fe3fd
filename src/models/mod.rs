use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label written to the ledger when the cycle ends without a trade
pub const NO_TRADE_LABEL: &str = "No se realiza operación";

/// Tick color relative to the previous tick (UP renders as blue, DOWN as red)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TickColor {
    Up,
    Down,
}

impl TickColor {
    pub fn label(&self) -> &'static str {
        match self {
            TickColor::Up => "blue",
            TickColor::Down => "red",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "blue" => Some(TickColor::Up),
            "red" => Some(TickColor::Down),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TickColor::Up => TickColor::Down,
            TickColor::Down => TickColor::Up,
        }
    }
}

impl fmt::Display for TickColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single price observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub price: Decimal,
    pub color: TickColor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    pub fn of(digit: u8) -> Self {
        if digit % 2 != 0 {
            Parity::Odd
        } else {
            Parity::Even
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Parity::Odd => "odd",
            Parity::Even => "even",
        }
    }
}

/// Penultimate fractional digit of a tick together with the tick's color
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DigitObservation {
    pub digit: u8,
    pub color: TickColor,
}

/// The strongest observation in the analyzed window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DominantDigit {
    pub index: usize,
    pub digit: u8,
    /// Digit after zero correction (0 may become 10)
    pub display_digit: u8,
    pub color: TickColor,
    pub parity: Parity,
}

impl DominantDigit {
    pub fn is_odd(&self) -> bool {
        self.parity == Parity::Odd
    }
}

/// Result of one pressure analysis, kept for the ledger and the predictor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PressureSignal {
    pub observations: Vec<DigitObservation>,
    pub dominant: Option<DominantDigit>,
    pub interrupted: bool,
    pub interruption_log: Vec<String>,
}

impl PressureSignal {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Binary-option direction sent to the broker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Put => "put",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading decision derived from a pressure signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    Call,
    Put,
    NoTrade,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Call => "CALL (UP)",
            Decision::Put => "PUT (DOWN)",
            Decision::NoTrade => NO_TRADE_LABEL,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Decision::Call => Some(Direction::Call),
            Decision::Put => Some(Direction::Put),
            Decision::NoTrade => None,
        }
    }

    pub fn is_trade(&self) -> bool {
        !matches!(self, Decision::NoTrade)
    }
}

/// Terminal state of a cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Tie,
    Error,
    NoTrade,
    /// Settlement did not arrive before the configured timeout
    Timeout,
}

impl Outcome {
    /// Classify a settled profit
    pub fn from_profit(profit: Decimal) -> Self {
        if profit > Decimal::ZERO {
            Outcome::Win
        } else if profit < Decimal::ZERO {
            Outcome::Loss
        } else {
            Outcome::Tie
        }
    }

    /// Label used in the ledger; ties keep the historical `EMPATE` spelling
    pub fn ledger_label(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Tie => "EMPATE",
            Outcome::Error => "ERROR",
            Outcome::NoTrade => "NONE",
            Outcome::Timeout => "TIMEOUT",
        }
    }

    pub fn from_ledger_label(label: &str) -> Option<Self> {
        match label {
            "WIN" => Some(Outcome::Win),
            "LOSS" => Some(Outcome::Loss),
            "EMPATE" | "TIE" => Some(Outcome::Tie),
            "ERROR" => Some(Outcome::Error),
            "NONE" => Some(Outcome::NoTrade),
            "TIMEOUT" | "PENDING" => Some(Outcome::Timeout),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss | Outcome::Tie)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ledger_label())
    }
}

/// Class predicted by the outcome classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictLabel {
    Win,
    Loss,
    Tie,
    Unknown,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Win => "WIN",
            VerdictLabel::Loss => "LOSS",
            VerdictLabel::Tie => "EMPATE",
            VerdictLabel::Unknown => "UNKNOWN",
        }
    }

    pub fn from_class(class: &str) -> Self {
        match class {
            "WIN" => VerdictLabel::Win,
            "LOSS" => VerdictLabel::Loss,
            "EMPATE" | "TIE" => VerdictLabel::Tie,
            _ => VerdictLabel::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictionVerdict {
    pub label: VerdictLabel,
    pub win_probability: Option<f64>,
}

impl PredictionVerdict {
    pub fn unknown() -> Self {
        Self {
            label: VerdictLabel::Unknown,
            win_probability: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == VerdictLabel::Unknown
    }
}

impl Default for PredictionVerdict {
    fn default() -> Self {
        Self::unknown()
    }
}

/// One ledger entry, written once per completed cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Local>,
    pub asset: String,
    pub decision: Decision,
    pub outcome: Outcome,
    pub profit: Decimal,
    pub signal: PressureSignal,
    pub verdict: PredictionVerdict,
    pub order_id: Option<String>,
}

/// Process-lifetime accumulators
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionTally {
    pub total_profit: Decimal,
    pub win_count: u32,
    pub loss_count: u32,
    pub tie_count: u32,
}

impl SessionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a settled trade into the tally. Unsettled outcomes are ignored.
    pub fn record(&mut self, outcome: Outcome, profit: Decimal) {
        match outcome {
            Outcome::Win => self.win_count += 1,
            Outcome::Loss => self.loss_count += 1,
            Outcome::Tie => self.tie_count += 1,
            _ => return,
        }
        self.total_profit += profit.round_dp(2);
    }

    pub fn trades(&self) -> u32 {
        self.win_count + self.loss_count + self.tie_count
    }

    /// Win rate in percent over settled trades
    pub fn win_rate(&self) -> f64 {
        let trades = self.trades();
        if trades == 0 {
            return 0.0;
        }
        self.win_count as f64 / trades as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_profit() {
        assert_eq!(Outcome::from_profit(Decimal::new(85, 2)), Outcome::Win);
        assert_eq!(Outcome::from_profit(Decimal::new(-100, 2)), Outcome::Loss);
        assert_eq!(Outcome::from_profit(Decimal::ZERO), Outcome::Tie);
    }

    #[test]
    fn test_tie_label_round_trips_legacy_spelling() {
        assert_eq!(Outcome::Tie.ledger_label(), "EMPATE");
        assert_eq!(Outcome::from_ledger_label("EMPATE"), Some(Outcome::Tie));
        assert_eq!(Outcome::from_ledger_label("TIE"), Some(Outcome::Tie));
        assert_eq!(Outcome::from_ledger_label("bogus"), None);
    }

    #[test]
    fn test_tally_win_then_loss() {
        let mut tally = SessionTally::new();
        tally.record(Outcome::Win, Decimal::new(500, 2));
        tally.record(Outcome::Loss, Decimal::new(-300, 2));

        assert_eq!(tally.total_profit, Decimal::new(200, 2));
        assert_eq!(tally.win_count, 1);
        assert_eq!(tally.loss_count, 1);
        assert_eq!(tally.tie_count, 0);
        assert_eq!(tally.win_rate(), 50.0);
    }

    #[test]
    fn test_tally_ignores_unsettled_outcomes() {
        let mut tally = SessionTally::new();
        tally.record(Outcome::NoTrade, Decimal::ZERO);
        tally.record(Outcome::Error, Decimal::ZERO);
        tally.record(Outcome::Timeout, Decimal::ZERO);

        assert_eq!(tally, SessionTally::default());
        assert_eq!(tally.win_rate(), 0.0);
    }

    #[test]
    fn test_decision_labels() {
        assert_eq!(Decision::Call.label(), "CALL (UP)");
        assert_eq!(Decision::Put.direction(), Some(Direction::Put));
        assert_eq!(Decision::NoTrade.direction(), None);
        assert!(!Decision::NoTrade.is_trade());
    }
}
