use crate::config::Settings;
use crate::ingest::error::FetchError;
use crate::ingest::retry::{execute_with_retries, RetryPolicy};
use crate::ingest::types::{InterestOverTimeResponse, TrendingSearchesResponse};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TIMEFRAME: &str = "today 12-m";
const INTEREST_PATH: &str = "/v1/interest_over_time";
const TRENDING_PATH: &str = "/v1/trending_searches";

#[async_trait::async_trait]
pub trait TrendProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Weekly relative interest (0..=100), oldest first.
    async fn interest_over_time(&self, keyword: &str, geo: &str) -> Result<Vec<u32>>;

    async fn trending_searches(&self, geo: &str, limit: usize) -> Result<Vec<String>>;
}

/// Trend data from a JSON endpoint exposing `/v1/interest_over_time` and
/// `/v1/trending_searches`.
#[derive(Debug, Clone)]
pub struct HttpJsonTrendProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeframe: String,
    retry: RetryPolicy,
}

impl HttpJsonTrendProvider {
    /// `None` when `TRENDS_BASE_URL` is not configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        if settings.trends_base_url.is_none() {
            return Ok(None);
        }
        let base_url = settings.require_trends_base_url()?.to_string();

        let timeout_secs = std::env::var("TRENDS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let timeframe = std::env::var("TRENDS_TIMEFRAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build trends http client")?;

        Ok(Some(Self {
            http,
            base_url,
            api_key: settings.trends_api_key.clone(),
            timeframe,
            retry: RetryPolicy::from_env(),
        }))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|err| FetchError::Transport {
                detail: format!("invalid TRENDS_API_KEY header value: {err}"),
            })?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(params)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<T>(&text).map_err(|err| FetchError::Decode {
            detail: format!("{path} response: {err}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        execute_with_retries(&self.retry, path, || self.get_once::<T>(path, params)).await
    }
}

#[async_trait::async_trait]
impl TrendProvider for HttpJsonTrendProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn interest_over_time(&self, keyword: &str, geo: &str) -> Result<Vec<u32>> {
        let resp: InterestOverTimeResponse = self
            .get_json(
                INTEREST_PATH,
                &[
                    ("keyword", keyword.to_string()),
                    ("geo", geo.to_string()),
                    ("timeframe", self.timeframe.clone()),
                    ("property", "youtube".to_string()),
                ],
            )
            .await
            .with_context(|| format!("interest_over_time failed for {keyword:?}"))?;

        Ok(series_from(resp))
    }

    async fn trending_searches(&self, geo: &str, limit: usize) -> Result<Vec<String>> {
        let resp: TrendingSearchesResponse = self
            .get_json(
                TRENDING_PATH,
                &[("geo", geo.to_string()), ("limit", limit.to_string())],
            )
            .await
            .with_context(|| format!("trending_searches failed for geo {geo}"))?;

        Ok(resp
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(limit)
            .collect())
    }
}

/// Values ordered by date, oldest first.
fn series_from(resp: InterestOverTimeResponse) -> Vec<u32> {
    let mut points = resp.points;
    points.sort_by_key(|p| p.date);
    points.into_iter().map(|p| p.value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_is_sorted_by_date() {
        let resp: InterestOverTimeResponse = serde_json::from_value(json!({
            "keyword": "auriculares",
            "points": [
                {"date": "2025-01-19", "value": 30},
                {"date": "2025-01-05", "value": 10},
                {"date": "2025-01-12", "value": 20}
            ]
        }))
        .unwrap();
        assert_eq!(series_from(resp), vec![10, 20, 30]);
    }

    #[test]
    fn missing_points_is_empty_series() {
        let resp: InterestOverTimeResponse = serde_json::from_value(json!({})).unwrap();
        assert!(series_from(resp).is_empty());
    }

    #[test]
    fn absent_base_url_means_no_provider() {
        let settings = Settings {
            database_url: None,
            sentry_dsn: None,
            youtube_api_key: Some("k".into()),
            youtube_base_url: None,
            trends_base_url: None,
            trends_api_key: None,
        };
        assert!(HttpJsonTrendProvider::from_settings(&settings)
            .unwrap()
            .is_none());
    }
}
