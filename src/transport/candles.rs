use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    data::{
        domain::{Candle, validate_series},
        timeframe::Timeframe,
    },
    error::{ChartplayResult, DataError, IoError, TransportError},
};

pub const DEFAULT_CANDLE_LIMIT: usize = 300;

/// Unix times above this are taken to be milliseconds.
const MILLIS_THRESHOLD: f64 = 2_000_000_000.0;

/// Source of the full candle series a game is played on.
pub trait CandleProvider: Send + Sync {
    /// Candles for `timeframe`, strictly increasing in time.
    fn fetch(
        &self,
        timeframe: Timeframe,
    ) -> impl Future<Output = ChartplayResult<Arc<[Candle]>>> + Send;
}

// ================================================================================================
// Wire format
// ================================================================================================

/// One bar as served: an object, or an array `[time, open, high, low, close, ..]`.
/// Numbers may arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCandle {
    Object {
        time: Value,
        open: Value,
        high: Value,
        low: Value,
        close: Value,
    },
    Array(Vec<Value>),
}

impl RawCandle {
    fn fields(&self) -> Option<[&Value; 5]> {
        match self {
            RawCandle::Object {
                time,
                open,
                high,
                low,
                close,
            } => Some([time, open, high, low, close]),
            RawCandle::Array(v) => match v.as_slice() {
                [time, open, high, low, close, ..] => Some([time, open, high, low, close]),
                _ => None,
            },
        }
    }

    fn into_candle(self, index: usize) -> ChartplayResult<Candle> {
        let malformed = |msg: &str| DataError::MalformedCandle {
            index,
            msg: msg.to_string(),
        };

        let [time, open, high, low, close] = self
            .fields()
            .ok_or_else(|| malformed("expected 5 fields"))?;

        let time = parse_time(time).ok_or_else(|| malformed("unreadable time"))?;
        let price = |v: &Value, name: &str| {
            number(v)
                .filter(|p| p.is_finite())
                .ok_or_else(|| malformed(&format!("unreadable {name}")))
        };

        Ok(Candle::new(
            time,
            price(open, "open")?,
            price(high, "high")?,
            price(low, "low")?,
            price(close, "close")?,
        ))
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    if let Some(raw) = number(v) {
        if !raw.is_finite() {
            return None;
        }
        let secs = if raw > MILLIS_THRESHOLD {
            raw / 1_000.0
        } else {
            raw
        };
        return DateTime::from_timestamp(secs.floor() as i64, 0);
    }

    let s = v.as_str()?.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc())
        })
}

/// Parses a JSON candle array and checks it with [`validate_series`].
pub fn parse_candles(json: &str) -> ChartplayResult<Vec<Candle>> {
    let raw: Vec<RawCandle> = serde_json::from_str(json).map_err(IoError::from)?;

    let candles = raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.into_candle(i))
        .collect::<ChartplayResult<Vec<_>>>()?;

    validate_series(&candles)?;
    Ok(candles)
}

// ================================================================================================
// HTTP provider
// ================================================================================================

/// Fetches `GET {base}/api/candles?timeframe=<id>&limit=<n>`.
#[derive(Debug, Clone)]
pub struct HttpCandleProvider {
    client: Client,
    base_url: Url,
    limit: usize,
}

impl HttpCandleProvider {
    pub fn new(base_url: &str) -> ChartplayResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| IoError::Url(format!("{base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            client,
            base_url,
            limit: DEFAULT_CANDLE_LIMIT,
        })
    }

    pub fn with_limit(self, limit: usize) -> Self {
        Self { limit, ..self }
    }

    pub fn with_client(self, client: Client) -> Self {
        Self { client, ..self }
    }

    pub fn candles_url(&self, timeframe: Timeframe) -> ChartplayResult<Url> {
        let mut url = self
            .base_url
            .join("api/candles")
            .map_err(|e| IoError::Url(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("timeframe", timeframe.as_str())
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }
}

impl CandleProvider for HttpCandleProvider {
    #[tracing::instrument(skip(self), fields(limit = self.limit))]
    async fn fetch(&self, timeframe: Timeframe) -> ChartplayResult<Arc<[Candle]>> {
        let url = self.candles_url(timeframe)?;
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, %url, "Candle request rejected");
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(TransportError::from)?;
        let candles = parse_candles(&body)?;
        tracing::debug!(count = candles.len(), "Candles received");
        Ok(candles.into())
    }
}

// ================================================================================================
// Static provider
// ================================================================================================

/// Serves preloaded series, e.g. bundled data files or test fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticCandleProvider {
    fallback: Option<Arc<[Candle]>>,
    by_timeframe: HashMap<Timeframe, Arc<[Candle]>>,
}

impl StaticCandleProvider {
    /// Serves `candles` for every timeframe.
    pub fn new(candles: impl Into<Arc<[Candle]>>) -> Self {
        Self {
            fallback: Some(candles.into()),
            by_timeframe: HashMap::new(),
        }
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe, candles: impl Into<Arc<[Candle]>>) -> Self {
        self.by_timeframe.insert(timeframe, candles.into());
        self
    }
}

impl CandleProvider for StaticCandleProvider {
    async fn fetch(&self, timeframe: Timeframe) -> ChartplayResult<Arc<[Candle]>> {
        let series = self
            .by_timeframe
            .get(&timeframe)
            .or(self.fallback.as_ref())
            .ok_or(DataError::InsufficientData {
                required: 1,
                available: 0,
            })?;
        validate_series(series)?;
        Ok(Arc::clone(series))
    }
}
