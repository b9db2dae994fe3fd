use crate::models::{Tick, TickColor};
use rust_decimal::Decimal;

/// Rolling window of the most recent ticks for one trading cycle
///
/// Colors are derived on append by comparing against the previous tick.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    ticks: Vec<Tick>,
    max_ticks: usize,
}

impl TickBuffer {
    /// Create a new tick buffer
    ///
    /// # Arguments
    /// * `max_ticks` - Maximum number of ticks to keep
    pub fn new(max_ticks: usize) -> Self {
        Self {
            ticks: Vec::with_capacity(max_ticks + 1),
            max_ticks,
        }
    }

    /// Append a price and return the stored tick
    ///
    /// The first tick is UP; afterwards UP means `price >= previous`.
    /// If the buffer is full, removes the oldest tick.
    pub fn append(&mut self, price: Decimal) -> Tick {
        let color = match self.ticks.last() {
            Some(last) if price < last.price => TickColor::Down,
            _ => TickColor::Up,
        };

        let tick = Tick { price, color };
        self.ticks.push(tick.clone());

        // Remove oldest if exceeds max
        if self.ticks.len() > self.max_ticks {
            let excess = self.ticks.len() - self.max_ticks;
            self.ticks.drain(..excess);
        }

        tick
    }

    /// All ticks, oldest first
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// The `n` most recent ticks, oldest first
    pub fn recent(&self, n: usize) -> &[Tick] {
        let start = self.ticks.len().saturating_sub(n);
        &self.ticks[start..]
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ticks.len() >= self.max_ticks
    }

    pub fn capacity(&self) -> usize {
        self.max_ticks
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
    }
}
