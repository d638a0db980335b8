use std::collections::HashMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ChartplayResult, DataError},
    report::statistics::GameReport,
};

const WIN_RATE_KEY: &str = "w";
const PROFIT_KEY: &str = "p";
const ROUNDS_KEY: &str = "r";
const BEST_TRADE_KEY: &str = "bt";

/// Lossy, shareable summary of a finished game.
///
/// Travels as URL query parameters so a second viewer can display it without
/// the session: `?w=60&p=12.34&r=10&bt=25.00`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharedResult {
    /// Whole percent.
    pub win_rate: f64,
    pub profit_percent: f64,
    pub rounds: usize,
    pub best_trade: Option<f64>,
}

impl From<&GameReport> for SharedResult {
    fn from(report: &GameReport) -> Self {
        let stats = &report.statistics;
        Self {
            win_rate: stats.win_rate.round(),
            profit_percent: round2(report.return_percent),
            rounds: stats.total_rounds,
            best_trade: Some(round2(stats.best_trade_percent)),
        }
    }
}

impl SharedResult {
    /// Appends the summary to `base` as query parameters.
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair(WIN_RATE_KEY, &format!("{:.0}", self.win_rate));
            q.append_pair(PROFIT_KEY, &format!("{:.2}", self.profit_percent));
            q.append_pair(ROUNDS_KEY, &self.rounds.to_string());
            if let Some(bt) = self.best_trade {
                q.append_pair(BEST_TRADE_KEY, &format!("{bt:.2}"));
            }
        }
        url
    }

    /// Reads a summary back from `url`.
    ///
    /// Returns `Ok(None)` unless `w`, `p` and `r` are all present.
    ///
    /// # Errors
    /// Fails when a present parameter is not a number, or not a finite one.
    pub fn from_url(url: &Url) -> ChartplayResult<Option<Self>> {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let get = |key: &str| params.get(key).filter(|v| !v.is_empty());

        let (Some(w), Some(p), Some(r)) = (get(WIN_RATE_KEY), get(PROFIT_KEY), get(ROUNDS_KEY))
        else {
            return Ok(None);
        };

        let best_trade = get(BEST_TRADE_KEY)
            .map(|v| finite(BEST_TRADE_KEY, v))
            .transpose()?;

        Ok(Some(Self {
            win_rate: finite(WIN_RATE_KEY, w)?,
            profit_percent: finite(PROFIT_KEY, p)?,
            rounds: r.parse::<usize>().map_err(DataError::from)?,
            best_trade,
        }))
    }
}

fn finite(key: &str, raw: &str) -> ChartplayResult<f64> {
    let v = raw.parse::<f64>().map_err(DataError::from)?;
    if !v.is_finite() {
        return Err(DataError::NonFinite {
            field: key.to_string(),
        }
        .into());
    }
    Ok(v)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ChartplayError, report::statistics::Statistics};

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_encode_from_report() {
        let stats = Statistics {
            total_rounds: 10,
            win_rate: 66.666,
            best_trade_percent: 25.004,
            ..Statistics::default()
        };
        let report = GameReport::new(stats, 1_000.0, 1_123.456);

        let url = SharedResult::from(&report).to_url(&base());

        assert_eq!(url.query(), Some("w=67&p=12.35&r=10&bt=25.00"));
    }

    #[test]
    fn test_decode_encoded_url() {
        let shared = SharedResult {
            win_rate: 60.0,
            profit_percent: -4.5,
            rounds: 25,
            best_trade: Some(12.0),
        };
        let decoded = SharedResult::from_url(&shared.to_url(&base())).unwrap();
        assert_eq!(decoded, Some(shared));
    }

    #[test]
    fn test_decode_requires_core_params() {
        let url = Url::parse("https://example.com/?w=50&p=1.5").unwrap();
        assert_eq!(SharedResult::from_url(&url).unwrap(), None);

        let url = Url::parse("https://example.com/?w=50&p=1.5&r=10").unwrap();
        let decoded = SharedResult::from_url(&url).unwrap().unwrap();
        assert_eq!(decoded.rounds, 10);
        assert_eq!(decoded.best_trade, None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let url = Url::parse("https://example.com/?w=abc&p=1&r=2").unwrap();
        assert!(matches!(
            SharedResult::from_url(&url),
            Err(ChartplayError::Data(DataError::ParseFloat(_)))
        ));
    }

    #[test]
    fn test_decode_rejects_non_finite_numbers() {
        for query in ["w=NaN&p=1&r=2", "w=50&p=inf&r=2", "w=50&p=1&r=2&bt=-inf"] {
            let url = Url::parse(&format!("https://example.com/?{query}")).unwrap();
            assert!(
                matches!(
                    SharedResult::from_url(&url),
                    Err(ChartplayError::Data(DataError::NonFinite { .. }))
                ),
                "{query}"
            );
        }
    }
}
