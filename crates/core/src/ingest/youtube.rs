use crate::config::Settings;
use crate::domain::niche::{ChannelStats, VideoMetric};
use crate::ingest::error::FetchError;
use crate::ingest::retry::{execute_with_retries, RetryPolicy};
use crate::ingest::types::{
    ApiErrorEnvelope, ChannelItem, ChannelListResponse, SearchListResponse, VideoItem,
    VideoListResponse,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Nominal quota cost of one `search.list` call.
pub const SEARCH_UNITS: u32 = 100;
/// Nominal quota cost of one `videos.list` call.
pub const VIDEOS_UNITS: u32 = 1;
/// Nominal quota cost of one `channels.list` call.
pub const CHANNELS_UNITS: u32 = 1;

pub const MAX_RESULTS_LIMIT: u32 = 50;
/// `channels.list` accepts at most this many ids per call.
pub const CHANNELS_PER_CALL: usize = 50;

const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keyword: String,
    pub region_code: String,
    pub relevance_language: String,
    pub max_results: u32,
    pub published_after: Option<DateTime<Utc>>,
}

impl SearchQuery {
    pub fn new(
        keyword: impl Into<String>,
        region_code: impl Into<String>,
        relevance_language: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            region_code: region_code.into(),
            relevance_language: relevance_language.into(),
            max_results: max_results.clamp(1, MAX_RESULTS_LIMIT),
            published_after: None,
        }
    }

    pub fn published_after(mut self, after: Option<DateTime<Utc>>) -> Self {
        self.published_after = after;
        self
    }
}

/// Units charged for fetching statistics of `channel_count` channels.
pub fn channel_lookup_units(channel_count: usize) -> u32 {
    let calls = channel_count.div_ceil(CHANNELS_PER_CALL);
    u32::try_from(calls).unwrap_or(u32::MAX).saturating_mul(CHANNELS_UNITS)
}

#[async_trait::async_trait]
pub trait VideoSearchClient: Send + Sync {
    /// Up to `query.max_results` videos in relevance order, with statistics.
    async fn search_videos(&self, query: &SearchQuery) -> Result<Vec<VideoMetric>, FetchError>;

    async fn channel_stats(&self, channel_ids: &[String]) -> Result<Vec<ChannelStats>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl YouTubeClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_youtube_api_key()?.to_string();
        let base_url = settings
            .youtube_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("YOUTUBE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(api_key, base_url, Duration::from_secs(timeout_secs), RetryPolicy::from_env())
    }

    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build YouTube http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retry,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let res = self
            .http
            .get(self.url(endpoint))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), text));
        }

        serde_json::from_str::<T>(&text).map_err(|err| FetchError::Decode {
            detail: format!("{endpoint} response: {err}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        execute_with_retries(&self.retry, endpoint, || self.get_once::<T>(endpoint, params)).await
    }
}

// `id` lookups return every listed item; `maxResults` only applies to filters.
pub fn video_details_params(ids: &[String]) -> Vec<(&'static str, String)> {
    vec![("part", "snippet,statistics".to_string()), ("id", ids.join(","))]
}

pub fn channel_params(ids: &[String]) -> Vec<(&'static str, String)> {
    vec![("part", "statistics".to_string()), ("id", ids.join(","))]
}

#[async_trait::async_trait]
impl VideoSearchClient for YouTubeClient {
    async fn search_videos(&self, query: &SearchQuery) -> Result<Vec<VideoMetric>, FetchError> {
        let mut params: Vec<(&str, String)> = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("order", "relevance".to_string()),
            ("q", query.keyword.clone()),
            ("maxResults", query.max_results.to_string()),
            ("regionCode", query.region_code.clone()),
            ("relevanceLanguage", query.relevance_language.clone()),
        ];
        if let Some(after) = query.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let search: SearchListResponse = self.get_json("search", &params).await?;
        let ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        if ids.is_empty() {
            tracing::info!(keyword = %query.keyword, "search returned no videos");
            return Ok(Vec::new());
        }

        let details: VideoListResponse = self
            .get_json("videos", &video_details_params(&ids))
            .await?;

        let videos = merge_in_search_order(&ids, details.items);
        tracing::debug!(
            keyword = %query.keyword,
            search_hits = ids.len(),
            videos = videos.len(),
            "fetched video statistics"
        );
        Ok(videos)
    }

    async fn channel_stats(&self, channel_ids: &[String]) -> Result<Vec<ChannelStats>, FetchError> {
        let mut out = Vec::with_capacity(channel_ids.len());
        for chunk in channel_ids.chunks(CHANNELS_PER_CALL) {
            let resp: ChannelListResponse = self
                .get_json("channels", &channel_params(chunk))
                .await?;
            out.extend(resp.items.into_iter().map(ChannelItem::into_stats));
        }
        Ok(out)
    }
}

/// Maps a non-success response to a `FetchError`, singling out quota exhaustion.
pub fn classify_error(status: u16, body: String) -> FetchError {
    if status == 403 {
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(&body) {
            if let Some(detail) = envelope
                .error
                .errors
                .iter()
                .find(|e| QUOTA_REASONS.contains(&e.reason.as_str()))
            {
                let message = if envelope.error.message.is_empty() {
                    detail.message.clone()
                } else {
                    envelope.error.message.clone()
                };
                return FetchError::QuotaExceeded {
                    detail: format!("{}: {message}", detail.reason),
                };
            }
        }
    }
    FetchError::Http { status, body }
}

/// Joins `videos.list` items back onto search ids, keeping relevance order and
/// dropping ids without a view count.
pub fn merge_in_search_order(ids: &[String], items: Vec<VideoItem>) -> Vec<VideoMetric> {
    let mut by_id: HashMap<String, VideoItem> =
        items.into_iter().map(|item| (item.id.clone(), item)).collect();
    ids.iter()
        .filter_map(|id| by_id.remove(id))
        .filter_map(VideoItem::into_metric)
        .collect()
}
