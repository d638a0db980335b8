use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};

use crate::{
    error::{ChartplayResult, IoError, TransportError},
    report::leaderboard::{LeaderboardRecord, LeaderboardStore},
};

pub const RANKINGS_TABLE: &str = "rankings";

/// Leaderboard backed by a PostgREST endpoint (`{base}/rest/v1/rankings`).
#[derive(Debug, Clone)]
pub struct RestLeaderboard {
    client: Client,
    table_url: Url,
    api_key: String,
}

impl RestLeaderboard {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> ChartplayResult<Self> {
        let table_url = Url::parse(base_url)
            .and_then(|u| u.join(&format!("rest/v1/{RANKINGS_TABLE}")))
            .map_err(|e| IoError::Url(format!("{base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            client,
            table_url,
            api_key: api_key.into(),
        })
    }

    pub fn with_client(self, client: Client) -> Self {
        Self { client, ..self }
    }

    /// `select=*&order=profit_rate.desc&limit=<limit>`
    pub fn top_url(&self, limit: usize) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "profit_rate.desc")
            .append_pair("limit", &limit.to_string());
        url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }
}

fn ensure_success(response: Response, url: &Url) -> ChartplayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    tracing::warn!(%status, %url, "Leaderboard request rejected");
    Err(TransportError::Status {
        status: status.as_u16(),
        url: url.to_string(),
    }
    .into())
}

impl LeaderboardStore for RestLeaderboard {
    #[tracing::instrument(skip_all, fields(nickname = %record.nickname))]
    async fn insert(&self, record: LeaderboardRecord) -> ChartplayResult<()> {
        let response = self
            .authorized(self.client.post(self.table_url.clone()))
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await
            .map_err(TransportError::from)?;
        ensure_success(response, &self.table_url)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn top(&self, limit: usize) -> ChartplayResult<Vec<LeaderboardRecord>> {
        let url = self.top_url(limit);
        let response = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(TransportError::from)?;
        let body = ensure_success(response, &url)?
            .text()
            .await
            .map_err(TransportError::from)?;
        let records: Vec<LeaderboardRecord> = serde_json::from_str(&body).map_err(IoError::from)?;
        tracing::debug!(count = records.len(), "Leaderboard fetched");
        Ok(records)
    }
}
