use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    data::domain::{Candle, Price, closes},
    game::config::LiquidationPolicy,
    math::indicator::{StreamingBollinger, StreamingIndicator, StreamingRsi, StreamingSma},
};

pub const RSI_WINDOW: u16 = 14;
pub const MA_WINDOW: u16 = 20;
pub const BB_WINDOW: u16 = 20;
pub const BB_MULTIPLIER: f64 = 2.0;

/// Fraction of the band width within which a close counts as touching a band.
const BB_TOUCH_THRESHOLD: f64 = 0.1;

/// RSI reported when the lookback is too short to produce a value.
const NEUTRAL_RSI: f64 = 50.0;

#[derive(
    Copy,
    Clone,
    Debug,
    EnumString,
    Display,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    PartialOrd,
    Ord,
    IntoStaticStr,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Long,
    Short,
    Hold,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Price change seen from the position's side: positive is in its favour.
    pub fn directional_change(&self, price_change: f64) -> f64 {
        match self {
            Position::Long => price_change,
            Position::Short => -price_change,
            Position::Hold => 0.0,
        }
    }

    /// `Long` wins on a strict rise, `Short` on a strict fall. No move is a loss.
    pub fn wins(&self, price_change: f64) -> bool {
        match self {
            Position::Long => price_change > 0.0,
            Position::Short => price_change < 0.0,
            Position::Hold => false,
        }
    }
}

// ================================================================================================
// Indicator Snapshot
// ================================================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MaTrend {
    Up,
    Down,
    Flat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BbPosition {
    Upper,
    Lower,
    Middle,
    None,
}

/// Market context at the moment a position was picked.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub ma_trend: MaTrend,
    pub bb_position: BbPosition,
}

impl IndicatorSnapshot {
    /// Computes the snapshot over `history` (warm-up followed by the visible window).
    pub fn capture(history: &[Candle]) -> Self {
        let prices = closes(history);

        let rsi = StreamingRsi::new(RSI_WINDOW)
            .series(&prices)
            .last()
            .copied()
            .unwrap_or(NEUTRAL_RSI);

        let ma = StreamingSma::new(MA_WINDOW).series(&prices);
        let ma_trend = match ma.as_slice() {
            [.., prev, current] if current > prev => MaTrend::Up,
            [.., prev, current] if current < prev => MaTrend::Down,
            _ => MaTrend::Flat,
        };

        let bb_position = match (
            StreamingBollinger::new(BB_WINDOW, BB_MULTIPLIER)
                .series(&prices)
                .last(),
            prices.last(),
        ) {
            (Some(bands), Some(&close)) => {
                let threshold = bands.width() * BB_TOUCH_THRESHOLD;
                if close > bands.upper || (close - bands.upper).abs() < threshold {
                    BbPosition::Upper
                } else if close < bands.lower || (close - bands.lower).abs() < threshold {
                    BbPosition::Lower
                } else if (close - bands.middle).abs() < threshold {
                    BbPosition::Middle
                } else {
                    BbPosition::None
                }
            }
            _ => BbPosition::None,
        };

        Self {
            rsi,
            ma_trend,
            bb_position,
        }
    }
}

// ================================================================================================
// Round Outcome
// ================================================================================================

/// The immutable record of one completed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// 1-based round number.
    pub round_index: usize,
    pub position: Position,
    pub won: bool,
    /// `pnl / bet_amount * 100`; `0` when nothing was staked.
    pub profit_percent: f64,
    pub entry_price: Price,
    pub exit_price: Price,
    pub bet_amount: f64,
    pub pnl: f64,
    pub liquidated: bool,
    pub indicators: Option<IndicatorSnapshot>,
}

/// Inputs of the settlement formula for one round.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Settlement {
    pub round_index: usize,
    pub position: Position,
    pub entry_price: Price,
    pub exit_price: Price,
    pub balance: f64,
    pub bet_fraction: f64,
    pub leverage: u32,
    pub liquidation: LiquidationPolicy,
    pub indicators: Option<IndicatorSnapshot>,
}

impl Settlement {
    /// Stake at risk this round.
    pub fn bet_amount(&self) -> f64 {
        match self.position {
            Position::Hold => 0.0,
            Position::Long | Position::Short => self.balance * self.bet_fraction,
        }
    }

    /// PnL before any liquidation cap, marked to `price`.
    pub fn raw_pnl_at(&self, price: Price) -> f64 {
        let change = self.entry_price.relative_change(price);
        self.bet_amount() * self.position.directional_change(change) * self.leverage as f64
    }

    /// Whether marking to `price` wipes out the whole stake.
    pub fn is_liquidated_at(&self, price: Price) -> bool {
        let bet = self.bet_amount();
        self.liquidation == LiquidationPolicy::EndGame
            && bet > 0.0
            && self.raw_pnl_at(price) <= -bet
    }

    pub fn into_outcome(self) -> RoundOutcome {
        let bet_amount = self.bet_amount();
        let price_change = self.entry_price.relative_change(self.exit_price);
        let liquidated = self.is_liquidated_at(self.exit_price);

        let pnl = if liquidated {
            -bet_amount
        } else {
            self.raw_pnl_at(self.exit_price)
        };

        let profit_percent = if bet_amount > 0.0 {
            pnl / bet_amount * 100.0
        } else {
            0.0
        };

        RoundOutcome {
            round_index: self.round_index,
            position: self.position,
            won: !liquidated && self.position.wins(price_change),
            profit_percent,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            bet_amount,
            pnl,
            liquidated,
            indicators: self.indicators,
        }
    }
}
