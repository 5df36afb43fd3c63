use crate::analysis::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One fetched video's public metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetric {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel_id: String,
    /// `None` when the channel hides its subscriber count.
    pub subscriber_count: Option<u64>,
    pub video_count: u64,
    pub view_count: u64,
}

/// Aggregate view statistics for one keyword. Built only from the videos actually returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheSnapshot {
    pub video_count: usize,
    pub total_views: u64,
    pub avg_views: f64,
    pub median_views: f64,
    pub p75_views: f64,
    pub max_views: u64,
    pub min_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
}

impl NicheSnapshot {
    pub fn empty() -> Self {
        Self {
            video_count: 0,
            total_views: 0,
            avg_views: 0.0,
            median_views: 0.0,
            p75_views: 0.0,
            max_views: 0,
            min_views: 0,
            total_likes: 0,
            total_comments: 0,
        }
    }

    pub fn from_videos(videos: &[VideoMetric]) -> Self {
        if videos.is_empty() {
            return Self::empty();
        }

        let views: Vec<u64> = videos.iter().map(|v| v.view_count).collect();
        Self {
            video_count: videos.len(),
            total_views: views.iter().sum(),
            avg_views: stats::mean(&views),
            median_views: stats::median(&views),
            p75_views: stats::percentile(&views, 75.0),
            max_views: views.iter().copied().max().unwrap_or(0),
            min_views: views.iter().copied().min().unwrap_or(0),
            total_likes: videos.iter().map(|v| v.like_count).sum(),
            total_comments: videos.iter().map(|v| v.comment_count).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Recommended,
    Evaluate,
    Discard,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Recommended => "RECOMMENDED",
            Verdict::Evaluate => "EVALUATE",
            Verdict::Discard => "DISCARD",
        }
    }

    pub const ALL: [Verdict; 3] = [Verdict::Recommended, Verdict::Evaluate, Verdict::Discard];
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetizationLabel {
    AffiliateAndAds,
    AdsOnly,
    AffiliateOnly,
    HardToMonetize,
}

impl MonetizationLabel {
    pub fn from_matches(affiliate: bool, ads: bool) -> Self {
        match (affiliate, ads) {
            (true, true) => MonetizationLabel::AffiliateAndAds,
            (false, true) => MonetizationLabel::AdsOnly,
            (true, false) => MonetizationLabel::AffiliateOnly,
            (false, false) => MonetizationLabel::HardToMonetize,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MonetizationLabel::AffiliateAndAds => "Affiliate + Ads",
            MonetizationLabel::AdsOnly => "Ads only",
            MonetizationLabel::AffiliateOnly => "Affiliate only",
            MonetizationLabel::HardToMonetize => "Hard to monetize",
        }
    }

    pub fn potential(&self) -> MonetizationPotential {
        match self {
            MonetizationLabel::AffiliateAndAds => MonetizationPotential::VeryHigh,
            MonetizationLabel::AffiliateOnly => MonetizationPotential::High,
            MonetizationLabel::AdsOnly => MonetizationPotential::Medium,
            MonetizationLabel::HardToMonetize => MonetizationPotential::Low,
        }
    }
}

impl fmt::Display for MonetizationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetizationPotential {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl MonetizationPotential {
    pub fn multiplier(&self) -> f64 {
        match self {
            MonetizationPotential::VeryHigh => 1.2,
            MonetizationPotential::High => 1.0,
            MonetizationPotential::Medium => 0.8,
            MonetizationPotential::Low => 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutomationLabel {
    Yes,
    Partial,
    No,
}

impl AutomationLabel {
    pub fn from_count(matching: usize) -> Self {
        match matching {
            0 => AutomationLabel::No,
            1 => AutomationLabel::Partial,
            _ => AutomationLabel::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationLabel::Yes => "YES",
            AutomationLabel::Partial => "PARTIAL",
            AutomationLabel::No => "NO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAssessment {
    pub label: AutomationLabel,
    pub matching_videos: usize,
    pub sampled_videos: usize,
    pub ratio_pct: f64,
}

impl AutomationAssessment {
    pub fn is_suitable(&self) -> bool {
        self.label == AutomationLabel::Yes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleMonetization {
    pub affiliate_videos: usize,
    pub ad_videos: usize,
    /// Videos matching either vocabulary, counted once.
    pub monetizable_videos: usize,
    pub affiliate_pct: f64,
    pub ads_pct: f64,
    pub monetizable_pct: f64,
}

impl TitleMonetization {
    pub fn empty() -> Self {
        Self {
            affiliate_videos: 0,
            ad_videos: 0,
            monetizable_videos: 0,
            affiliate_pct: 0.0,
            ads_pct: 0.0,
            monetizable_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub monetization: MonetizationLabel,
    pub automation: AutomationAssessment,
    pub titles: TitleMonetization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationRisk {
    Low,
    Medium,
    High,
    Unknown,
}

impl SaturationRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaturationRisk::Low => "low",
            SaturationRisk::Medium => "medium",
            SaturationRisk::High => "high",
            SaturationRisk::Unknown => "unknown",
        }
    }

    pub fn competition_score(&self) -> f64 {
        match self {
            SaturationRisk::Low => 1.0,
            SaturationRisk::Medium => 0.7,
            SaturationRisk::High => 0.4,
            SaturationRisk::Unknown => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saturation {
    /// avg_views / max_views, 0 when there is no data.
    pub ratio: f64,
    pub risk: SaturationRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSizes {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    pub small_pct: f64,
    pub medium_pct: f64,
    pub large_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Rising,
    Falling,
    Flat,
    Unknown,
}

impl TrendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStatus::Rising => "rising",
            TrendStatus::Falling => "falling",
            TrendStatus::Flat => "flat",
            TrendStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    pub status: TrendStatus,
    pub change_pct: Option<f64>,
}

impl TrendReading {
    pub fn unknown() -> Self {
        Self {
            status: TrendStatus::Unknown,
            change_pct: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringStrategy {
    #[default]
    SoftThreshold,
    WeightedSum,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringStrategy::SoftThreshold => "soft-threshold",
            ScoringStrategy::WeightedSum => "weighted-sum",
        }
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "soft-threshold" | "soft" => Ok(ScoringStrategy::SoftThreshold),
            "weighted-sum" | "weighted" => Ok(ScoringStrategy::WeightedSum),
            other => Err(format!(
                "unknown scoring strategy {other:?} (expected soft-threshold or weighted-sum)"
            )),
        }
    }
}

/// Normalized inputs of the weighted-sum score, each in [0, 1] except the multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedComponents {
    pub views_score: f64,
    pub competition_score: f64,
    pub automation_bonus: f64,
    pub monetization_multiplier: f64,
    pub engagement_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
    pub strategy: ScoringStrategy,
    /// Soft-threshold partial credit before modifiers.
    pub base_score: f64,
    /// Always within [0, 100].
    pub opportunity_score: f64,
    pub components: Option<WeightedComponents>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, views: u64) -> VideoMetric {
        VideoMetric {
            video_id: id.to_string(),
            title: format!("video {id}"),
            description: String::new(),
            tags: vec![],
            channel_id: "UC1".to_string(),
            channel_title: "chan".to_string(),
            published_at: None,
            view_count: views,
            like_count: views / 100,
            comment_count: 1,
        }
    }

    #[test]
    fn empty_snapshot_has_no_data() {
        let s = NicheSnapshot::from_videos(&[]);
        assert!(s.is_empty());
        assert_eq!(s, NicheSnapshot::empty());
    }

    #[test]
    fn snapshot_aggregates_view_counts() {
        let videos = vec![video("a", 100), video("b", 400), video("c", 200), video("d", 300)];
        let s = NicheSnapshot::from_videos(&videos);
        assert_eq!(s.video_count, 4);
        assert_eq!(s.total_views, 1000);
        assert_eq!(s.avg_views, 250.0);
        assert_eq!(s.median_views, 250.0);
        assert_eq!(s.p75_views, 325.0);
        assert_eq!(s.max_views, 400);
        assert_eq!(s.min_views, 100);
        assert_eq!(s.total_likes, 10);
        assert_eq!(s.total_comments, 4);
    }

    #[test]
    fn monetization_decision_table() {
        assert_eq!(
            MonetizationLabel::from_matches(true, true).label(),
            "Affiliate + Ads"
        );
        assert_eq!(MonetizationLabel::from_matches(false, true).label(), "Ads only");
        assert_eq!(
            MonetizationLabel::from_matches(true, false).label(),
            "Affiliate only"
        );
        assert_eq!(
            MonetizationLabel::from_matches(false, false).label(),
            "Hard to monetize"
        );
    }

    #[test]
    fn automation_label_thresholds() {
        assert_eq!(AutomationLabel::from_count(0), AutomationLabel::No);
        assert_eq!(AutomationLabel::from_count(1), AutomationLabel::Partial);
        assert_eq!(AutomationLabel::from_count(2), AutomationLabel::Yes);
        assert_eq!(AutomationLabel::from_count(5), AutomationLabel::Yes);
    }

    #[test]
    fn strategy_parses_aliases() {
        assert_eq!(
            "weighted_sum".parse::<ScoringStrategy>().unwrap(),
            ScoringStrategy::WeightedSum
        );
        assert_eq!(
            "SOFT".parse::<ScoringStrategy>().unwrap(),
            ScoringStrategy::SoftThreshold
        );
        assert!("median".parse::<ScoringStrategy>().is_err());
    }

    #[test]
    fn verdict_serializes_upper_case() {
        let v = serde_json::to_value(Verdict::Recommended).unwrap();
        assert_eq!(v, serde_json::json!("RECOMMENDED"));
    }
}
