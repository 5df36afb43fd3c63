use crate::domain::niche::{
    ChannelSizes, Classification, Decision, NicheSnapshot, Saturation, TrendReading,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopVideo {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
    pub view_count: u64,
    pub automatable: bool,
}

/// Everything computed for one keyword in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheReport {
    pub keyword: String,
    pub region: String,
    pub language: String,
    pub analyzed_at: DateTime<Utc>,
    pub snapshot: NicheSnapshot,
    pub classification: Classification,
    pub saturation: Saturation,
    pub channel_sizes: Option<ChannelSizes>,
    pub trend: TrendReading,
    pub decision: Decision,
    pub top_videos: Vec<TopVideo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedKeyword {
    pub keyword: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    QuotaExhausted(String),
    BudgetExhausted(String),
    Interrupted,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::QuotaExhausted(detail) => write!(f, "quota exhausted: {detail}"),
            AbortReason::BudgetExhausted(detail) => write!(f, "daily budget exhausted: {detail}"),
            AbortReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Result of one batch. Every input keyword lands in exactly one of `reports` or `skipped`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub reports: Vec<NicheReport>,
    pub skipped: Vec<SkippedKeyword>,
    pub aborted: Option<AbortReason>,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.reports.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}
