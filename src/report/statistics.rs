use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::outcome::{Position, RoundOutcome};

/// Gross gains over gross losses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFactor {
    Ratio(f64),

    /// Gains without a single losing round; the ratio is unbounded.
    NoLoss,
}

impl ProfitFactor {
    pub fn as_ratio(&self) -> Option<f64> {
        match self {
            ProfitFactor::Ratio(v) => Some(*v),
            ProfitFactor::NoLoss => None,
        }
    }

    pub fn is_no_loss(&self) -> bool {
        matches!(self, ProfitFactor::NoLoss)
    }
}

impl Default for ProfitFactor {
    fn default() -> Self {
        ProfitFactor::Ratio(0.0)
    }
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitFactor::Ratio(v) => write!(f, "{v:.2}"),
            ProfitFactor::NoLoss => f.write_str("no loss"),
        }
    }
}

/// Aggregate metrics over a round history.
///
/// All rates are percentages in `[0, 100]`; an empty denominator yields `0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_rounds: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,

    pub long_count: usize,
    pub short_count: usize,
    pub hold_count: usize,
    pub long_win_rate: f64,
    pub short_win_rate: f64,

    pub profit_factor: ProfitFactor,
    pub gross_profit_percent: f64,
    pub gross_loss_percent: f64,
    pub avg_profit_percent: f64,
    pub best_trade_percent: f64,

    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

/// `part / whole * 100`, or `0` for an empty `whole`.
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn compute_stats(history: &[RoundOutcome]) -> Statistics {
    let total_rounds = history.len();
    if total_rounds == 0 {
        return Statistics::default();
    }

    let wins = history.iter().filter(|o| o.won).count();

    let side = |p: Position| {
        let taken = history.iter().filter(|o| o.position == p);
        let count = taken.clone().count();
        let won = taken.filter(|o| o.won).count();
        (count, percent(won, count))
    };
    let (long_count, long_win_rate) = side(Position::Long);
    let (short_count, short_win_rate) = side(Position::Short);
    let hold_count = history
        .iter()
        .filter(|o| o.position == Position::Hold)
        .count();

    let gross_profit_percent: f64 = history
        .iter()
        .map(|o| o.profit_percent)
        .filter(|p| *p > 0.0)
        .sum();
    let gross_loss_percent: f64 = history
        .iter()
        .map(|o| o.profit_percent)
        .filter(|p| *p < 0.0)
        .sum::<f64>()
        .abs();

    let profit_factor = if gross_loss_percent > 0.0 {
        ProfitFactor::Ratio(gross_profit_percent / gross_loss_percent)
    } else if gross_profit_percent > 0.0 {
        ProfitFactor::NoLoss
    } else {
        ProfitFactor::Ratio(0.0)
    };

    let avg_profit_percent =
        history.iter().map(|o| o.profit_percent).sum::<f64>() / total_rounds as f64;
    let best_trade_percent = history
        .iter()
        .map(|o| o.profit_percent)
        .fold(f64::NEG_INFINITY, f64::max);

    let (max_consecutive_wins, max_consecutive_losses) = streaks(history);

    Statistics {
        total_rounds,
        wins,
        losses: total_rounds - wins,
        win_rate: percent(wins, total_rounds),
        long_count,
        short_count,
        hold_count,
        long_win_rate,
        short_win_rate,
        profit_factor,
        gross_profit_percent,
        gross_loss_percent,
        avg_profit_percent,
        best_trade_percent,
        max_consecutive_wins,
        max_consecutive_losses,
    }
}

/// Longest runs of won and of not-won rounds.
fn streaks(history: &[RoundOutcome]) -> (usize, usize) {
    let mut best = (0, 0);
    let mut run = (0, 0);
    for o in history {
        if o.won {
            run = (run.0 + 1, 0);
        } else {
            run = (0, run.1 + 1);
        }
        best = (best.0.max(run.0), best.1.max(run.1));
    }
    best
}

/// End-of-game summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReport {
    pub statistics: Statistics,
    pub initial_balance: f64,
    pub final_balance: f64,
    /// `(final - initial) / initial * 100`.
    pub return_percent: f64,
}

impl GameReport {
    pub fn new(statistics: Statistics, initial_balance: f64, final_balance: f64) -> Self {
        let return_percent = if initial_balance > 0.0 {
            (final_balance - initial_balance) / initial_balance * 100.0
        } else {
            0.0
        };
        Self {
            statistics,
            initial_balance,
            final_balance,
            return_percent,
        }
    }
}
