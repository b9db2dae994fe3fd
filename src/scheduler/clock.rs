use chrono::{DateTime, Local, Utc};
use tokio::time::Instant;

/// Wall-clock source for cycle alignment
pub trait Clock: Send + Sync {
    /// Seconds elapsed in the current candle of `candle_duration` seconds
    ///
    /// Candles are aligned on the Unix epoch, so a 60s candle offset is the
    /// second of the minute.
    fn candle_offset(&self, candle_duration: u64) -> u64;

    /// Timestamp written to the ledger
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn candle_offset(&self, candle_duration: u64) -> u64 {
        let secs = Utc::now().timestamp().max(0) as u64;
        secs % candle_duration.max(1)
    }
}

/// Seconds derived from the tokio clock, so paused-time runs stay aligned
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    offset_secs: u64,
}

impl MonotonicClock {
    /// Start `offset_secs` seconds past an epoch-aligned boundary
    pub fn starting_at(offset_secs: u64) -> Self {
        Self {
            origin: Instant::now(),
            offset_secs,
        }
    }
}

impl Clock for MonotonicClock {
    fn candle_offset(&self, candle_duration: u64) -> u64 {
        (self.offset_secs + self.origin.elapsed().as_secs()) % candle_duration.max(1)
    }
}
