//! Wire shapes of the YouTube Data API v3 and the trend endpoint.

use crate::domain::niche::{ChannelStats, VideoMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: SearchItemId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItemId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoItem {
    pub id: String,
    #[serde(default)]
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub statistics: VideoStatistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Counts arrive as decimal strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

impl VideoItem {
    /// `None` when the video reports no view count.
    pub fn into_metric(self) -> Option<VideoMetric> {
        let view_count = parse_count(self.statistics.view_count.as_deref())?;
        Some(VideoMetric {
            video_id: self.id,
            title: self.snippet.title,
            description: self.snippet.description,
            tags: self.snippet.tags,
            channel_id: self.snippet.channel_id,
            channel_title: self.snippet.channel_title,
            published_at: self.snippet.published_at,
            view_count,
            like_count: parse_count(self.statistics.like_count.as_deref()).unwrap_or(0),
            comment_count: parse_count(self.statistics.comment_count.as_deref()).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelItem {
    pub id: String,
    #[serde(default)]
    pub statistics: ChannelStatistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub subscriber_count: Option<String>,
    pub video_count: Option<String>,
    pub view_count: Option<String>,
    #[serde(default)]
    pub hidden_subscriber_count: bool,
}

impl ChannelItem {
    pub fn into_stats(self) -> ChannelStats {
        let s = self.statistics;
        let subscriber_count = if s.hidden_subscriber_count {
            None
        } else {
            parse_count(s.subscriber_count.as_deref())
        };
        ChannelStats {
            channel_id: self.id,
            subscriber_count,
            video_count: parse_count(s.video_count.as_deref()).unwrap_or(0),
            view_count: parse_count(s.view_count.as_deref()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestOverTimeResponse {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub points: Vec<InterestPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestPoint {
    pub date: chrono::NaiveDate,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingSearchesResponse {
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default)]
    pub queries: Vec<String>,
}

fn parse_count(s: Option<&str>) -> Option<u64> {
    s.and_then(|t| t.trim().parse::<u64>().ok())
}
