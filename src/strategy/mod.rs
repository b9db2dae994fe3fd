// Signal strategy module
pub mod digits;
pub mod pressure;

pub use pressure::{AnalysisConfig, PressureAnalyzer};

use crate::models::{Decision, PressureSignal, Tick};

/// Base trait for tick-window strategies
pub trait Strategy: Send + Sync {
    /// Derive a decision from the collected tick window.
    ///
    /// Insufficient data is not an error: implementations return
    /// `Decision::NoTrade` with an empty signal.
    fn analyze(&self, ticks: &[Tick]) -> (Decision, PressureSignal);

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum ticks required before the strategy emits a signal
    fn min_ticks_required(&self) -> usize;
}
