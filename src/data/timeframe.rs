use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Bucket size of one candle.
///
/// Parsed from and displayed as its wire identifier (`"1m"`, `"15m"`, `"1d"`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
pub enum Timeframe {
    #[default]
    #[strum(to_string = "1m")]
    #[serde(rename = "1m")]
    Minute1,

    #[strum(to_string = "15m")]
    #[serde(rename = "15m")]
    Minute15,

    #[strum(to_string = "1d")]
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Static window sizes used for every round played on this timeframe.
    pub fn profile(&self) -> TimeframeProfile {
        match self {
            Timeframe::Minute1 => TimeframeProfile::new(60, 5),
            Timeframe::Minute15 => TimeframeProfile::new(50, 4),
            Timeframe::Day1 => TimeframeProfile::new(40, 3),
        }
    }
}

/// How many bars are shown before a decision and how many are revealed afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeframeProfile {
    pub visible_count: usize,
    pub prediction_count: usize,
}

impl TimeframeProfile {
    pub const fn new(visible_count: usize, prediction_count: usize) -> Self {
        Self {
            visible_count,
            prediction_count,
        }
    }

    /// Bars consumed by one round, warm-up included. `None` on overflow.
    pub fn total_with_warmup(&self, warmup_size: usize) -> Option<usize> {
        warmup_size
            .checked_add(self.visible_count)?
            .checked_add(self.prediction_count)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_timeframe_identifiers_round_trip() {
        for tf in Timeframe::iter() {
            assert_eq!(Timeframe::from_str(tf.as_str()).unwrap(), tf);
            assert_eq!(tf.to_string(), tf.as_str());
        }
        assert!(Timeframe::from_str("4h").is_err());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(Timeframe::Minute1.profile(), TimeframeProfile::new(60, 5));
        assert_eq!(Timeframe::Minute15.profile(), TimeframeProfile::new(50, 4));
        assert_eq!(Timeframe::Day1.profile(), TimeframeProfile::new(40, 3));
        assert_eq!(Timeframe::Minute1.profile().total_with_warmup(50), Some(115));
        assert_eq!(Timeframe::Day1.profile().total_with_warmup(usize::MAX), None);
    }

    #[test]
    fn test_serde_uses_wire_identifier() {
        let json = serde_json::to_string(&Timeframe::Minute15).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(back, Timeframe::Day1);
    }
}
