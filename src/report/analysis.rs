use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{
    game::outcome::{BbPosition, IndicatorSnapshot, MaTrend, Position, RoundOutcome},
    report::statistics::percent,
};

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Market condition a round was entered under.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// RSI below 30.
    RsiOversold,
    /// RSI within 30..=70.
    RsiNeutral,
    /// RSI above 70.
    RsiOverbought,
    MaUp,
    MaDown,
    BbUpper,
    BbLower,
}

impl Bucket {
    pub fn matches(&self, snapshot: &IndicatorSnapshot) -> bool {
        match self {
            Bucket::RsiOversold => snapshot.rsi < RSI_OVERSOLD,
            Bucket::RsiNeutral => (RSI_OVERSOLD..=RSI_OVERBOUGHT).contains(&snapshot.rsi),
            Bucket::RsiOverbought => snapshot.rsi > RSI_OVERBOUGHT,
            Bucket::MaUp => snapshot.ma_trend == MaTrend::Up,
            Bucket::MaDown => snapshot.ma_trend == MaTrend::Down,
            Bucket::BbUpper => snapshot.bb_position == BbPosition::Upper,
            Bucket::BbLower => snapshot.bb_position == BbPosition::Lower,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSample {
    pub total: usize,
    pub win_rate: f64,
    pub long_rate: f64,
    pub short_rate: f64,
    pub hold_rate: f64,
}

/// Behaviour within one bucket. An empty bucket is `NoData`, never a 0% sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketReport {
    NoData,
    Observed(BucketSample),
}

impl BucketReport {
    pub fn sample(&self) -> Option<&BucketSample> {
        match self {
            BucketReport::NoData => None,
            BucketReport::Observed(s) => Some(s),
        }
    }
}

/// Partitions `history` by the indicator snapshot taken at entry.
///
/// Rounds without a snapshot fall into no bucket. Buckets overlap: one round
/// usually lands in an RSI, an MA and possibly a BB bucket.
pub fn analyze(history: &[RoundOutcome]) -> Vec<(Bucket, BucketReport)> {
    Bucket::iter()
        .map(|bucket| {
            let matching = history
                .iter()
                .filter(|o| o.indicators.as_ref().is_some_and(|s| bucket.matches(s)))
                .collect_vec();
            (bucket, report(&matching))
        })
        .collect()
}

fn report(rounds: &[&RoundOutcome]) -> BucketReport {
    let total = rounds.len();
    if total == 0 {
        return BucketReport::NoData;
    }

    let by_position = rounds.iter().counts_by(|o| o.position);
    let share = |p: Position| percent(by_position.get(&p).copied().unwrap_or(0), total);
    let wins = rounds.iter().filter(|o| o.won).count();

    BucketReport::Observed(BucketSample {
        total,
        win_rate: percent(wins, total),
        long_rate: share(Position::Long),
        short_rate: share(Position::Short),
        hold_rate: share(Position::Hold),
    })
}
