use std::{cmp::Reverse, future::Future};

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    data::timeframe::Timeframe,
    error::{ChartplayResult, EnvError},
    game::{
        config::RuleSet,
        outcome::{IndicatorSnapshot, Position, RoundOutcome},
    },
    report::statistics::GameReport,
};

pub const MAX_NICKNAME_CHARS: usize = 10;
pub const MAX_COMMENT_CHARS: usize = 20;
pub const DEFAULT_TOP_LIMIT: usize = 50;

/// Player-entered part of a leaderboard entry, trimmed and length-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    nickname: String,
    comment: String,
}

impl Submission {
    /// # Errors
    /// Returns [`EnvError::InvalidSubmission`] for an empty or over-long
    /// nickname (1..=10 chars) or an over-long comment (0..=20 chars).
    pub fn new(nickname: &str, comment: &str) -> ChartplayResult<Self> {
        let nickname = nickname.trim();
        let comment = comment.trim();

        let nick_len = nickname.chars().count();
        if nick_len == 0 || nick_len > MAX_NICKNAME_CHARS {
            return Err(EnvError::InvalidSubmission(format!(
                "nickname must be 1..={MAX_NICKNAME_CHARS} characters, got {nick_len}"
            ))
            .into());
        }
        let comment_len = comment.chars().count();
        if comment_len > MAX_COMMENT_CHARS {
            return Err(EnvError::InvalidSubmission(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters, got {comment_len}"
            ))
            .into());
        }

        Ok(Self {
            nickname: nickname.to_string(),
            comment: comment.to_string(),
        })
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

/// One round as published: prices are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRound {
    pub win: bool,
    pub position: Position,
    pub profit_percent: f64,
    pub indicators: Option<IndicatorSnapshot>,
}

impl From<&RoundOutcome> for PublishedRound {
    fn from(o: &RoundOutcome) -> Self {
        Self {
            win: o.won,
            position: o.position,
            profit_percent: o.profit_percent,
            indicators: o.indicators,
        }
    }
}

/// Derived statistics stored next to the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentStyle {
    pub win_rate: f64,
    pub long_win_rate: f64,
    pub short_win_rate: f64,
    pub best_trade: f64,
    pub avg_profit: f64,
    /// `None` for a history without losses.
    pub profit_factor: Option<f64>,
    pub timeframe: Timeframe,
    /// Fingerprint of the [`RuleSet`] the game was played under.
    #[serde(default)]
    pub rules: String,
    pub history: Vec<PublishedRound>,
}

/// A row of the `rankings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub nickname: String,
    pub message: String,
    /// Return of the whole game, in percent of the initial balance.
    pub profit_rate: f64,
    pub rounds: usize,
    pub investment_style: InvestmentStyle,
    /// Assigned by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LeaderboardRecord {
    pub fn new(
        submission: &Submission,
        report: &GameReport,
        history: &[RoundOutcome],
        rules: &RuleSet,
    ) -> ChartplayResult<Self> {
        let stats = &report.statistics;
        Ok(Self {
            nickname: submission.nickname.clone(),
            message: submission.comment.clone(),
            profit_rate: report.return_percent,
            rounds: stats.total_rounds,
            investment_style: InvestmentStyle {
                win_rate: stats.win_rate,
                long_win_rate: stats.long_win_rate,
                short_win_rate: stats.short_win_rate,
                best_trade: stats.best_trade_percent,
                avg_profit: stats.avg_profit_percent,
                profit_factor: stats.profit_factor.as_ratio(),
                timeframe: rules.timeframe,
                rules: rules.fingerprint()?,
                history: history.iter().map(PublishedRound::from).collect(),
            },
            created_at: None,
        })
    }
}

/// Remote store of finished games.
///
/// Uniqueness is not enforced here; the engine's ranking flag gates repeated
/// submissions of the same game.
pub trait LeaderboardStore: Send + Sync {
    fn insert(&self, record: LeaderboardRecord) -> impl Future<Output = ChartplayResult<()>> + Send;

    /// Up to `limit` records, best profit rate first.
    fn top(
        &self,
        limit: usize,
    ) -> impl Future<Output = ChartplayResult<Vec<LeaderboardRecord>>> + Send;
}

/// Maps a finished game into a record and inserts it.
#[tracing::instrument(skip_all, fields(nickname = %submission.nickname()))]
pub async fn submit<S: LeaderboardStore>(
    store: &S,
    submission: &Submission,
    report: &GameReport,
    history: &[RoundOutcome],
    rules: &RuleSet,
) -> ChartplayResult<()> {
    let record = LeaderboardRecord::new(submission, report, history, rules)?;
    let profit_rate = record.profit_rate;
    store.insert(record).await?;
    tracing::info!(profit_rate, "Leaderboard entry stored");
    Ok(())
}

// ================================================================================================
// In-memory store
// ================================================================================================

/// Process-local store, e.g. for tests and offline play.
#[derive(Debug, Default)]
pub struct InMemoryLeaderboard {
    records: RwLock<Vec<LeaderboardRecord>>,
}

impl InMemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl LeaderboardStore for InMemoryLeaderboard {
    async fn insert(&self, mut record: LeaderboardRecord) -> ChartplayResult<()> {
        record.created_at.get_or_insert_with(Utc::now);
        self.records.write().await.push(record);
        Ok(())
    }

    async fn top(&self, limit: usize) -> ChartplayResult<Vec<LeaderboardRecord>> {
        let mut rows = self.records.read().await.clone();
        // Stable: equal scores keep insertion order
        rows.sort_by_key(|r| Reverse(OrderedFloat(r.profit_rate)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::domain::Price,
        error::ChartplayError,
        game::{
            config::{GameConfig, GameSettings},
            outcome::{BbPosition, MaTrend},
        },
        report::statistics::compute_stats,
    };

    fn history() -> Vec<RoundOutcome> {
        vec![RoundOutcome {
            round_index: 1,
            position: Position::Long,
            won: true,
            profit_percent: 10.0,
            entry_price: Price(100.0),
            exit_price: Price(110.0),
            bet_amount: 100.0,
            pnl: 10.0,
            liquidated: false,
            indicators: Some(IndicatorSnapshot {
                rsi: 40.0,
                ma_trend: MaTrend::Up,
                bb_position: BbPosition::None,
            }),
        }]
    }

    fn record(nickname: &str, final_balance: f64) -> LeaderboardRecord {
        let h = history();
        let report = GameReport::new(compute_stats(&h), 1_000.0, final_balance);
        let rules = RuleSet::new(&GameSettings::default(), &GameConfig::default());
        let sub = Submission::new(nickname, "").unwrap();
        LeaderboardRecord::new(&sub, &report, &h, &rules).unwrap()
    }

    #[test]
    fn test_submission_validation() {
        assert!(Submission::new("   ", "").is_err());
        assert!(Submission::new("abcdefghijk", "").is_err());
        assert!(Submission::new("trader", &"x".repeat(21)).is_err());

        let s = Submission::new("  한글닉네임  ", " gg ").unwrap();
        assert_eq!(s.nickname(), "한글닉네임");
        assert_eq!(s.comment(), "gg");

        assert!(matches!(
            Submission::new("", ""),
            Err(ChartplayError::Env(EnvError::InvalidSubmission(_)))
        ));
    }

    #[test]
    fn test_record_projection_omits_prices() {
        let r = record("alice", 1_010.0);
        assert!((r.profit_rate - 1.0).abs() < 1e-9);
        assert_eq!(r.rounds, 1);

        let json = serde_json::to_value(&r).unwrap();
        let style = &json["investment_style"];
        assert_eq!(style["winRate"], 100.0);
        assert_eq!(style["profitFactor"], serde_json::Value::Null);
        assert_eq!(style["timeframe"], "1m");
        let round = &style["history"][0];
        assert_eq!(round["win"], true);
        assert_eq!(round["position"], "long");
        assert_eq!(round["indicators"]["maTrend"], "up");
        assert!(round.get("entryPrice").is_none());
        assert!(round.get("exitPrice").is_none());
        assert!(json.get("created_at").is_none());
    }

    #[tokio::test]
    async fn test_in_memory_top_orders_by_profit_rate() {
        // Arrange
        let store = InMemoryLeaderboard::new();
        for (name, balance) in [("low", 900.0), ("high", 1_500.0), ("mid", 1_100.0)] {
            store.insert(record(name, balance)).await.unwrap();
        }

        // Act
        let top = store.top(2).await.unwrap();

        // Assert
        let names: Vec<_> = top.iter().map(|r| r.nickname.as_str()).collect();
        assert_eq!(names, vec!["high", "mid"]);
        assert!(top.iter().all(|r| r.created_at.is_some()));
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_submit_adapter_inserts_record() {
        let store = InMemoryLeaderboard::new();
        let h = history();
        let report = GameReport::new(compute_stats(&h), 1_000.0, 1_200.0);
        let rules = RuleSet::new(&GameSettings::default(), &GameConfig::default());
        let sub = Submission::new("bob", "to the moon").unwrap();

        submit(&store, &sub, &report, &h, &rules).await.unwrap();

        let top = store.top(DEFAULT_TOP_LIMIT).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].message, "to the moon");
        assert_eq!(top[0].investment_style.rules, rules.fingerprint().unwrap());
    }
}
