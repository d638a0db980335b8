use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A trait for incremental indicators.
///
/// Values are fed one at a time in chronological order (usually close prices).
pub trait StreamingIndicator: std::fmt::Debug + Send + Sync {
    type Output;

    /// Update the indicator with the latest scalar value (e.g., close price).
    /// Returns `Some(value)` if the indicator is warm (enough data seen), otherwise `None`.
    fn update(&mut self, value: f64) -> Option<Self::Output>;

    /// Reset the internal state to clear history (e.g., for a new round).
    fn reset(&mut self);

    /// Feeds `values` from a clean state and collects every warm output.
    fn series(&mut self, values: &[f64]) -> Vec<Self::Output> {
        self.reset();
        values.iter().filter_map(|v| self.update(*v)).collect()
    }
}

// ================================================================================================
// SMA: Simple Moving Average
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSma {
    window_size: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl StreamingSma {
    pub fn new(window_size: u16) -> Self {
        let size = window_size.max(1) as usize;
        Self {
            window_size: size,
            buffer: VecDeque::with_capacity(size),
            sum: 0.0,
        }
    }
}

impl StreamingIndicator for StreamingSma {
    type Output = f64;

    fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        self.sum += value;

        if self.buffer.len() > self.window_size {
            if let Some(removed) = self.buffer.pop_front() {
                self.sum -= removed;
            }
        }

        if self.buffer.len() >= self.window_size {
            Some(self.sum / self.buffer.len() as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0.0;
    }
}

// ================================================================================================
// RSI: Relative Strength Index
// ================================================================================================

/// Wilder's RSI.
///
/// The first average gain/loss is the plain mean of the first `window_size`
/// price changes; afterwards both are smoothed with
/// `avg = (avg * (n - 1) + x) / n`. The first value is emitted once
/// `window_size` changes (i.e. `window_size + 1` prices) have been seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingRsi {
    window_size: usize,
    prev_price: Option<f64>,
    seen_changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl StreamingRsi {
    pub fn new(window_size: u16) -> Self {
        Self {
            window_size: window_size.max(1) as usize,
            prev_price: None,
            seen_changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn value(&self) -> f64 {
        // Prevent division by zero if avg_loss is 0 (monotonic up-trend)
        if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        }
    }
}

impl StreamingIndicator for StreamingRsi {
    type Output = f64;

    fn update(&mut self, value: f64) -> Option<f64> {
        let Some(prev) = self.prev_price.replace(value) else {
            return None;
        };

        let delta = value - prev;
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, delta.abs())
        };

        self.seen_changes += 1;
        let n = self.window_size as f64;

        if self.seen_changes <= self.window_size {
            // Seed phase: accumulate a plain mean
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            if self.seen_changes < self.window_size {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        Some(self.value())
    }

    fn reset(&mut self) {
        self.prev_price = None;
        self.seen_changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

// ================================================================================================
// Bollinger Bands
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// SMA middle line with bands `multiplier` population standard deviations away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingBollinger {
    sma: StreamingSma,
    multiplier: f64,
}

impl StreamingBollinger {
    pub fn new(window_size: u16, multiplier: f64) -> Self {
        Self {
            sma: StreamingSma::new(window_size),
            multiplier,
        }
    }
}

impl StreamingIndicator for StreamingBollinger {
    type Output = Bands;

    fn update(&mut self, value: f64) -> Option<Bands> {
        let middle = self.sma.update(value)?;
        let window = &self.sma.buffer;
        let variance =
            window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / window.len() as f64;
        let offset = self.multiplier * variance.sqrt();

        Some(Bands {
            upper: middle + offset,
            middle,
            lower: middle - offset,
        })
    }

    fn reset(&mut self) {
        self.sma.reset();
    }
}

// ================================================================================================
// Batch helpers
// ================================================================================================

pub fn sma(values: &[f64], window_size: u16) -> Vec<f64> {
    StreamingSma::new(window_size).series(values)
}

pub fn rsi(values: &[f64], window_size: u16) -> Vec<f64> {
    StreamingRsi::new(window_size).series(values)
}

pub fn bollinger_bands(values: &[f64], window_size: u16, multiplier: f64) -> Vec<Bands> {
    StreamingBollinger::new(window_size, multiplier).series(values)
}
