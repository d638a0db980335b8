use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{TimestampSeconds, serde_as};

use crate::{
    error::{ChartplayResult, DataError},
    impl_arith_primitive, impl_from_primitive,
};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Represents a price level in the quote currency.
///
/// Used for: Open, High, Low, Close, and the entry/exit prices of a round.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(pub f64);
impl_from_primitive!(Price, f64);
impl_arith_primitive!(Price, f64);

impl Price {
    /// Relative change from `self` to `exit`, e.g. `0.1` for a 10% rise.
    ///
    /// Returns `0.0` for a non-positive or non-finite reference price instead
    /// of `inf`/`NaN`.
    pub fn relative_change(self, exit: Price) -> f64 {
        if !self.is_valid() || !exit.0.is_finite() {
            return 0.0;
        }
        (exit - self) / self
    }

    /// Finite and strictly positive.
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

// ================================================================================================
// Candle
// ================================================================================================

/// One OHLC price observation over a fixed time bucket.
///
/// For a valid series, `time` is strictly increasing and
/// `low <= min(open, close) <= max(open, close) <= high`. The engine
/// relies on the ordering, but never checks the price envelope.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

impl Candle {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
        }
    }

    fn prices(&self) -> [(&'static str, Price); 4] {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
    }
}

/// Checks that a series can be played: times strictly increase and every
/// price is finite and positive.
///
/// # Errors
/// Returns [`DataError::NonMonotonicTime`] at the first bar not later than its
/// predecessor, or [`DataError::MalformedCandle`] at the first unusable price.
pub fn validate_series(candles: &[Candle]) -> ChartplayResult<()> {
    if let Some(i) = candles.windows(2).position(|w| w[1].time <= w[0].time) {
        return Err(DataError::NonMonotonicTime { index: i + 1 }.into());
    }

    for (index, candle) in candles.iter().enumerate() {
        if let Some((name, price)) = candle.prices().into_iter().find(|(_, p)| !p.is_valid()) {
            return Err(DataError::MalformedCandle {
                index,
                msg: format!("{name} must be finite and positive, got {}", price.0),
            }
            .into());
        }
    }
    Ok(())
}

/// Extracts the close prices of a candle sequence, in order.
pub fn closes<'a>(candles: impl IntoIterator<Item = &'a Candle>) -> Vec<f64> {
    candles.into_iter().map(|c| c.close.0).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::error::ChartplayError;

    #[test]
    fn test_relative_change() {
        assert!((Price(100.0).relative_change(Price(110.0)) - 0.1).abs() < 1e-12);
        assert!((Price(100.0).relative_change(Price(95.0)) + 0.05).abs() < 1e-12);
        assert_eq!(Price(100.0).relative_change(Price(100.0)), 0.0);
    }

    #[test]
    fn test_relative_change_guards_degenerate_prices() {
        assert_eq!(Price(0.0).relative_change(Price(10.0)), 0.0);
        assert_eq!(Price(f64::NAN).relative_change(Price(10.0)), 0.0);
        assert_eq!(Price(10.0).relative_change(Price(f64::INFINITY)), 0.0);
    }

    #[test]
    fn test_validate_series_rejects_bad_prices() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ok = Candle::new(t0, 1.0, 2.0, 0.5, 1.5);
        let nan = Candle::new(t0 + chrono::Duration::minutes(1), 1.0, 2.0, 0.5, f64::NAN);
        let zero = Candle::new(t0 + chrono::Duration::minutes(2), 0.0, 2.0, 0.5, 1.0);

        assert!(validate_series(&[ok]).is_ok());
        assert!(matches!(
            validate_series(&[ok, nan]),
            Err(ChartplayError::Data(DataError::MalformedCandle { index: 1, .. }))
        ));
        assert!(matches!(
            validate_series(&[ok, zero]),
            Err(ChartplayError::Data(DataError::MalformedCandle { index: 1, .. }))
        ));
        assert!(matches!(
            validate_series(&[ok, ok]),
            Err(ChartplayError::Data(DataError::NonMonotonicTime { index: 1 }))
        ));
    }

    #[test]
    fn test_candle_serializes_time_as_unix_seconds() {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let candle = Candle::new(time, 1.0, 2.0, 0.5, 1.5);

        let json = serde_json::to_value(candle).unwrap();
        assert_eq!(json["time"], 1_700_000_000_i64);
        assert_eq!(json["close"], 1.5);

        let back: Candle = serde_json::from_value(json).unwrap();
        assert_eq!(back, candle);
    }
}
