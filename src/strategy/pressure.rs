use super::digits::{corrected_digit, penultimate_digit};
use super::Strategy;
use crate::models::{
    Decision, DigitObservation, DominantDigit, PressureSignal, Tick, TickColor,
};
use serde::{Deserialize, Serialize};

/// Configuration for pressure analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Ticks that must be collected before any analysis happens
    pub max_ticks: usize,
    /// Trailing ticks actually analyzed
    pub analyze_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_ticks: 10,
            analyze_window: 4,
        }
    }
}

/// Digit/parity pressure strategy.
///
/// Finds the largest penultimate digit in the trailing window and follows its
/// color, unless a later tick of the opposing color shows the opposite
/// parity. Pure: the same ticks always produce the same result.
#[derive(Debug, Clone, Default)]
pub struct PressureAnalyzer {
    config: AnalysisConfig,
}

impl PressureAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn observe(ticks: &[Tick]) -> Vec<DigitObservation> {
        ticks
            .iter()
            .map(|tick| DigitObservation {
                digit: penultimate_digit(&tick.price),
                color: tick.color,
            })
            .collect()
    }

    fn find_dominant(observations: &[DigitObservation]) -> Option<DominantDigit> {
        let max_digit = observations.iter().map(|o| o.digit).max()?;
        let index = observations.iter().position(|o| o.digit == max_digit)?;
        let (display_digit, parity) = corrected_digit(observations, index);

        Some(DominantDigit {
            index,
            digit: max_digit,
            display_digit,
            color: observations[index].color,
            parity,
        })
    }

    /// Later ticks of the opposing color with the opposite parity
    fn scan_interruptions(
        observations: &[DigitObservation],
        dominant: &DominantDigit,
    ) -> Vec<String> {
        let antagonist = dominant.color.opposite();
        let mut log = Vec::new();

        for i in (dominant.index + 1)..observations.len() {
            let (digit, parity) = corrected_digit(observations, i);
            let color = observations[i].color;

            if color == antagonist && parity != dominant.parity {
                log.push(format!(
                    "Tick {}: {} {} ({}) interrupts {} {}",
                    i + 1,
                    parity.label(),
                    color,
                    digit,
                    dominant.parity.label(),
                    dominant.color
                ));
            }
        }

        log
    }
}

impl Strategy for PressureAnalyzer {
    fn analyze(&self, ticks: &[Tick]) -> (Decision, PressureSignal) {
        if ticks.len() < self.config.max_ticks {
            tracing::info!(
                "Not enough ticks for analysis ({}/{})",
                ticks.len(),
                self.config.max_ticks
            );
            return (Decision::NoTrade, PressureSignal::empty());
        }

        let start = ticks.len().saturating_sub(self.config.analyze_window);
        let recent = &ticks[start..];
        if recent.len() < self.config.analyze_window || recent.is_empty() {
            tracing::info!(
                "Not enough recent ticks for analysis ({}/{})",
                recent.len(),
                self.config.analyze_window
            );
            return (Decision::NoTrade, PressureSignal::empty());
        }

        let observations = Self::observe(recent);
        for (i, obs) in observations.iter().enumerate() {
            tracing::debug!("Tick {}: penultimate digit={} ({})", i + 1, obs.digit, obs.color);
        }

        let Some(dominant) = Self::find_dominant(&observations) else {
            return (Decision::NoTrade, PressureSignal::empty());
        };

        tracing::info!(
            "Largest penultimate digit: {} ({}, {})",
            dominant.display_digit,
            dominant.parity.label(),
            dominant.color
        );

        let interruption_log = Self::scan_interruptions(&observations, &dominant);
        let interrupted = !interruption_log.is_empty();

        let decision = if interrupted {
            for detail in &interruption_log {
                tracing::info!("  interruption - {}", detail);
            }
            Decision::NoTrade
        } else if dominant.color == TickColor::Up {
            Decision::Call
        } else {
            Decision::Put
        };

        tracing::info!("Decision: {}", decision.label());

        let signal = PressureSignal {
            observations,
            dominant: Some(dominant),
            interrupted,
            interruption_log,
        };

        (decision, signal)
    }

    fn name(&self) -> &str {
        "Tick Pressure"
    }

    fn min_ticks_required(&self) -> usize {
        self.config.max_ticks
    }
}
