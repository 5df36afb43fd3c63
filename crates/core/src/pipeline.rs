use crate::analysis::classify::{classify, is_automatable, top_by_views};
use crate::analysis::competition::{channel_sizes, distinct_channels, saturation};
use crate::analysis::decision::{decide, Thresholds};
use crate::analysis::trend::classify_trend;
use crate::budget::{BudgetExceeded, UsageBudget, DEFAULT_DAILY_LIMIT};
use crate::domain::niche::{
    ChannelSizes, NicheSnapshot, ScoringStrategy, TrendReading, VideoMetric,
};
use crate::domain::report::{AbortReason, BatchOutcome, NicheReport, SkippedKeyword, TopVideo};
use crate::ingest::error::FetchError;
use crate::ingest::trends::TrendProvider;
use crate::ingest::youtube::{
    channel_lookup_units, SearchQuery, VideoSearchClient, SEARCH_UNITS, VIDEOS_UNITS,
};
use crate::time::quota_day::published_after;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_RESULTS: u32 = 20;
pub const MAX_PUBLISHED_WITHIN_DAYS: u32 = 36_500;
const DEFAULT_PAUSE_MIN: Duration = Duration::from_secs(1);
const DEFAULT_PAUSE_MAX: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionPreset {
    pub code: &'static str,
    pub language: &'static str,
    pub median_min: f64,
    pub p75_min: f64,
}

pub const REGION_PRESETS: &[RegionPreset] = &[
    RegionPreset {
        code: "ES",
        language: "es",
        median_min: 5_000.0,
        p75_min: 20_000.0,
    },
    RegionPreset {
        code: "US",
        language: "en",
        median_min: 10_000.0,
        p75_min: 30_000.0,
    },
];

pub fn region_preset(code: &str) -> Option<&'static RegionPreset> {
    REGION_PRESETS
        .iter()
        .find(|p| p.code.eq_ignore_ascii_case(code.trim()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// ISO 3166-1 alpha-2, upper case.
    pub region: String,
    pub language: String,
    pub thresholds: Thresholds,
    pub strategy: ScoringStrategy,
    pub max_results: u32,
    pub published_within_days: Option<u32>,
    pub daily_quota_units: u32,
    pub channel_sizes: bool,
}

impl AnalysisOptions {
    /// Defaults for `region`; unknown regions take the first preset's thresholds
    /// and English relevance.
    pub fn for_region(region: &str) -> Self {
        let code = region.trim().to_ascii_uppercase();
        let (language, median_min, p75_min) = match region_preset(&code) {
            Some(p) => (p.language, p.median_min, p.p75_min),
            None => ("en", REGION_PRESETS[0].median_min, REGION_PRESETS[0].p75_min),
        };

        Self {
            region: code,
            language: language.to_string(),
            thresholds: Thresholds {
                median_min,
                p75_min,
            },
            strategy: ScoringStrategy::default(),
            max_results: DEFAULT_MAX_RESULTS,
            published_within_days: None,
            daily_quota_units: DEFAULT_DAILY_LIMIT,
            channel_sizes: false,
        }
    }

    /// Region preset overlaid with environment overrides.
    pub fn from_env(region: Option<&str>) -> anyhow::Result<Self> {
        let region = region
            .map(str::to_string)
            .or_else(|| std::env::var("REGION").ok())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| REGION_PRESETS[0].code.to_string());
        let mut out = Self::for_region(&region);

        if let Ok(s) = std::env::var("LANGUAGE_CODE") {
            if !s.trim().is_empty() {
                out.language = s.trim().to_string();
            }
        }

        let median = env_parse::<f64>("MEDIAN_VIEWS_THRESHOLD");
        let p75 = env_parse::<f64>("P75_VIEWS_THRESHOLD");
        out = out.with_thresholds(median, p75)?;

        if let Some(n) = env_parse::<u32>("MAX_RESULTS") {
            out.max_results = n;
        }
        if let Some(n) = env_parse::<u32>("DAILY_QUOTA_UNITS") {
            out.daily_quota_units = n;
        }
        if let Some(n) = env_parse::<u32>("PUBLISHED_WITHIN_DAYS") {
            out = out.with_published_within_days(Some(n))?;
        }
        if let Ok(s) = std::env::var("SCORING_STRATEGY") {
            out.strategy = s.parse().map_err(anyhow::Error::msg)?;
        }

        Ok(out)
    }

    pub fn with_thresholds(mut self, median: Option<f64>, p75: Option<f64>) -> anyhow::Result<Self> {
        self.thresholds = Thresholds::new(
            median.unwrap_or(self.thresholds.median_min),
            p75.unwrap_or(self.thresholds.p75_min),
        )?;
        Ok(self)
    }

    /// Accepts 1..=36500 days; `None` leaves the search unfiltered.
    pub fn with_published_within_days(mut self, days: Option<u32>) -> anyhow::Result<Self> {
        if let Some(d) = days {
            anyhow::ensure!(
                (1..=MAX_PUBLISHED_WITHIN_DAYS).contains(&d),
                "published-within-days must be 1..={MAX_PUBLISHED_WITHIN_DAYS} (got {d})"
            );
        }
        self.published_within_days = days;
        Ok(self)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Why one keyword could not be analyzed.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordError {
    Fetch(FetchError),
    Budget(BudgetExceeded),
}

impl KeywordError {
    /// Errors after which no further keyword can succeed today.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            KeywordError::Fetch(err) if err.is_quota_exhausted() => {
                Some(AbortReason::QuotaExhausted(err.to_string()))
            }
            KeywordError::Budget(err) => Some(AbortReason::BudgetExhausted(err.to_string())),
            KeywordError::Fetch(_) => None,
        }
    }
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordError::Fetch(err) => write!(f, "fetch failed: {err}"),
            KeywordError::Budget(err) => write!(f, "budget refused: {err}"),
        }
    }
}

impl std::error::Error for KeywordError {}

impl From<FetchError> for KeywordError {
    fn from(err: FetchError) -> Self {
        KeywordError::Fetch(err)
    }
}

impl From<BudgetExceeded> for KeywordError {
    fn from(err: BudgetExceeded) -> Self {
        KeywordError::Budget(err)
    }
}

#[derive(Debug, Clone)]
pub struct BatchControl {
    /// Randomized pause between keywords, `None` for back-to-back calls.
    pub pause: Option<(Duration, Duration)>,
    pub stop: Arc<AtomicBool>,
}

impl BatchControl {
    pub fn polite(stop: Arc<AtomicBool>) -> Self {
        Self {
            pause: Some((DEFAULT_PAUSE_MIN, DEFAULT_PAUSE_MAX)),
            stop,
        }
    }

    pub fn immediate() -> Self {
        Self {
            pause: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn next_pause(&self) -> Option<Duration> {
        let (a, b) = self.pause?;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if lo == hi {
            return Some(lo);
        }
        Some(rand::thread_rng().gen_range(lo..=hi))
    }
}

pub struct Pipeline<'a> {
    pub videos: &'a dyn VideoSearchClient,
    pub trends: Option<&'a dyn TrendProvider>,
    pub options: &'a AnalysisOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        videos: &'a dyn VideoSearchClient,
        trends: Option<&'a dyn TrendProvider>,
        options: &'a AnalysisOptions,
    ) -> Self {
        Self {
            videos,
            trends,
            options,
        }
    }

    /// Fetch, aggregate, classify and decide one keyword. Quota is charged before
    /// the search is issued.
    pub async fn analyze_keyword(
        &self,
        budget: &mut UsageBudget,
        keyword: &str,
        now: DateTime<Utc>,
    ) -> Result<NicheReport, KeywordError> {
        let opts = self.options;

        if !budget.can_spend(SEARCH_UNITS + VIDEOS_UNITS) {
            return Err(KeywordError::Budget(BudgetExceeded {
                operation: "search".to_string(),
                requested: SEARCH_UNITS + VIDEOS_UNITS,
                used: budget.used_units,
                limit: budget.daily_limit,
            }));
        }
        budget.spend(SEARCH_UNITS, "search", keyword)?;
        budget.spend(VIDEOS_UNITS, "videos", keyword)?;

        let query = SearchQuery::new(keyword, &opts.region, &opts.language, opts.max_results)
            .published_after(published_after(now, opts.published_within_days));
        let videos = self.videos.search_videos(&query).await?;

        let snapshot = NicheSnapshot::from_videos(&videos);
        let classification = classify(keyword, &videos);
        let saturation = saturation(&snapshot);

        let channel_sizes = if opts.channel_sizes && !videos.is_empty() {
            self.lookup_channel_sizes(budget, keyword, &videos).await?
        } else {
            None
        };

        let trend = self.lookup_trend(budget, keyword).await;
        let decision = decide(
            &snapshot,
            &classification,
            &saturation,
            &opts.thresholds,
            opts.strategy,
        );

        let top_videos = top_by_views(&videos)
            .into_iter()
            .map(|v| TopVideo {
                video_id: v.video_id.clone(),
                title: v.title.clone(),
                channel_title: v.channel_title.clone(),
                view_count: v.view_count,
                automatable: is_automatable(&v.title),
            })
            .collect();

        tracing::info!(
            keyword,
            videos = snapshot.video_count,
            median = snapshot.median_views,
            p75 = snapshot.p75_views,
            verdict = %decision.verdict,
            score = decision.opportunity_score,
            trend = trend.status.as_str(),
            "keyword analyzed"
        );

        Ok(NicheReport {
            keyword: keyword.to_string(),
            region: opts.region.clone(),
            language: opts.language.clone(),
            analyzed_at: now,
            snapshot,
            classification,
            saturation,
            channel_sizes,
            trend,
            decision,
            top_videos,
        })
    }

    /// Optional enrichment: only quota exhaustion is fatal, other failures leave the
    /// distribution empty.
    async fn lookup_channel_sizes(
        &self,
        budget: &mut UsageBudget,
        keyword: &str,
        videos: &[VideoMetric],
    ) -> Result<Option<ChannelSizes>, KeywordError> {
        let channel_ids = distinct_channels(videos);
        let units = channel_lookup_units(channel_ids.len());
        if let Err(err) = budget.spend(units, "channels", keyword) {
            tracing::warn!(keyword, units, error = %err, "skipping channel sizes");
            return Ok(None);
        }

        match self.videos.channel_stats(&channel_ids).await {
            Ok(channels) => Ok(channel_sizes(videos, &channels)),
            Err(err) if err.is_quota_exhausted() => Err(err.into()),
            Err(err) => {
                tracing::warn!(keyword, error = %err, "channel statistics failed; continuing without sizes");
                Ok(None)
            }
        }
    }

    async fn lookup_trend(&self, budget: &mut UsageBudget, keyword: &str) -> TrendReading {
        let Some(provider) = self.trends else {
            return TrendReading::unknown();
        };

        budget.record_trend_query(keyword);
        match provider
            .interest_over_time(keyword, &self.options.region)
            .await
        {
            Ok(series) => classify_trend(&series),
            Err(err) => {
                tracing::warn!(
                    keyword,
                    provider = provider.provider_name(),
                    error = %err,
                    "trend lookup failed; trend unknown"
                );
                TrendReading::unknown()
            }
        }
    }

    /// Sequential batch. A failing keyword is skipped; quota or budget exhaustion and
    /// the stop flag end the batch, and the remaining keywords are reported as skipped.
    pub async fn run_batch(
        &self,
        budget: &mut UsageBudget,
        keywords: &[String],
        control: &BatchControl,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let total = keywords.len();

        for (idx, keyword) in keywords.iter().enumerate() {
            if idx != 0 {
                if let Some(pause) = control.next_pause() {
                    tokio::time::sleep(pause).await;
                }
            }

            if control.stopped() {
                tracing::warn!(processed = idx, total, "stop requested; ending batch");
                abort(&mut outcome, AbortReason::Interrupted, &keywords[idx..]);
                break;
            }

            match self.analyze_keyword(budget, keyword, Utc::now()).await {
                Ok(report) => outcome.reports.push(report),
                Err(err) => {
                    if let Some(reason) = err.abort_reason() {
                        tracing::error!(keyword = %keyword, error = %err, "aborting batch");
                        outcome.skipped.push(SkippedKeyword {
                            keyword: keyword.clone(),
                            error: err.to_string(),
                        });
                        abort(&mut outcome, reason, &keywords[idx + 1..]);
                        break;
                    }

                    tracing::warn!(
                        keyword = %keyword,
                        skipped = outcome.skipped.len() + 1,
                        error = %err,
                        "keyword failed; skipping"
                    );
                    outcome.skipped.push(SkippedKeyword {
                        keyword: keyword.clone(),
                        error: err.to_string(),
                    });
                }
            }

            tracing::info!(
                processed = idx + 1,
                total,
                reports = outcome.reports.len(),
                skipped = outcome.skipped.len(),
                remaining_units = budget.remaining(),
                "batch progress"
            );
        }

        outcome
    }
}

fn abort(outcome: &mut BatchOutcome, reason: AbortReason, rest: &[String]) {
    let note = format!("not processed: {reason}");
    outcome
        .skipped
        .extend(rest.iter().map(|keyword| SkippedKeyword {
            keyword: keyword.clone(),
            error: note.clone(),
        }));
    outcome.aborted = Some(reason);
}
