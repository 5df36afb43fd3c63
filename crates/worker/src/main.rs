use anyhow::Context;
use clap::Parser;
use niche_core::budget::UsageBudget;
use niche_core::domain::niche::{ScoringStrategy, Verdict};
use niche_core::domain::report::BatchOutcome;
use niche_core::export::{export_outcome, ExportOptions, ExportedFiles};
use niche_core::ingest::trends::{HttpJsonTrendProvider, TrendProvider};
use niche_core::ingest::youtube::{channel_lookup_units, YouTubeClient, SEARCH_UNITS, VIDEOS_UNITS};
use niche_core::pipeline::{AnalysisOptions, BatchControl, Pipeline};
use niche_core::time::quota_day::quota_day;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod keywords;

#[derive(Debug, Parser)]
#[command(name = "niche_worker", about = "Score YouTube niche keywords and export the results")]
struct Args {
    /// Keywords to analyze.
    keywords: Vec<String>,

    /// File with one keyword per line (`#` starts a comment).
    #[arg(long)]
    keywords_file: Option<PathBuf>,

    /// Add the region's trending searches as keywords.
    #[arg(long)]
    from_trends: bool,

    #[arg(long, default_value_t = 10)]
    max_keywords: usize,

    /// ISO country code (ES, US, ...). Defaults to REGION or ES.
    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    median_min: Option<f64>,

    #[arg(long)]
    p75_min: Option<f64>,

    /// soft-threshold or weighted-sum.
    #[arg(long)]
    strategy: Option<ScoringStrategy>,

    #[arg(long)]
    max_results: Option<u32>,

    #[arg(long)]
    published_within_days: Option<u32>,

    /// Also fetch channel statistics (costs extra quota).
    #[arg(long)]
    channel_sizes: bool,

    #[arg(long, default_value = "results")]
    out_dir: PathBuf,

    #[arg(long, default_value = "api_usage.json")]
    usage_file: PathBuf,

    #[arg(long)]
    json: bool,

    #[arg(long)]
    separate_files: bool,

    /// Skip the pause between keywords.
    #[arg(long)]
    no_pause: bool,

    /// Resolve keywords and estimate quota without calling the API.
    #[arg(long)]
    dry_run: bool,

    /// Do not write the run to the database even when DATABASE_URL is set.
    #[arg(long)]
    no_db: bool,
}

impl Args {
    fn analysis_options(&self) -> anyhow::Result<AnalysisOptions> {
        let mut options = AnalysisOptions::from_env(self.region.as_deref())?
            .with_thresholds(self.median_min, self.p75_min)?;

        if let Some(language) = &self.language {
            options.language = language.clone();
        }
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if let Some(n) = self.max_results {
            options.max_results = n;
        }
        if self.published_within_days.is_some() {
            options = options.with_published_within_days(self.published_within_days)?;
        }
        options.channel_sizes |= self.channel_sizes;
        Ok(options)
    }

    fn keyword_sources(&self) -> keywords::KeywordSources {
        keywords::KeywordSources {
            manual: self.keywords.clone(),
            file: self.keywords_file.clone(),
            from_trends: self.from_trends,
            max_keywords: self.max_keywords,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = niche_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "niche run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args, settings: &niche_core::config::Settings) -> anyhow::Result<()> {
    let youtube = YouTubeClient::from_settings(settings)?;
    let trends = HttpJsonTrendProvider::from_settings(settings)?;
    if trends.is_none() {
        tracing::info!("TRENDS_BASE_URL not set; trend status will be UNKNOWN");
    }

    let options = args.analysis_options()?;
    let trend_provider = trends.as_ref().map(|t| t as &dyn TrendProvider);

    let keywords = keywords::resolve(&args.keyword_sources(), trend_provider, &options.region).await?;

    let started_at = chrono::Utc::now();
    let today = quota_day(started_at)?;
    let mut budget = UsageBudget::load_or_new(&args.usage_file, today, options.daily_quota_units)?;
    if budget.reset_if_new_day(today) {
        tracing::info!(%today, "new quota day; usage counters reset");
    }

    let per_keyword = SEARCH_UNITS
        + VIDEOS_UNITS
        + if options.channel_sizes {
            channel_lookup_units(options.max_results as usize)
        } else {
            0
        };
    let estimated = per_keyword.saturating_mul(u32::try_from(keywords.len()).unwrap_or(u32::MAX));

    tracing::info!(
        region = %options.region,
        language = %options.language,
        strategy = %options.strategy,
        keywords = keywords.len(),
        units = estimated,
        remaining = budget.remaining(),
        "starting niche run"
    );
    if estimated > budget.remaining() {
        tracing::warn!(
            units = estimated,
            remaining = budget.remaining(),
            "estimated usage exceeds remaining quota; the batch may stop early"
        );
    }

    if args.dry_run {
        for keyword in &keywords {
            tracing::info!(keyword = %keyword, dry_run = true, "would analyze");
        }
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after the current keyword");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }
    let control = if args.no_pause {
        BatchControl {
            pause: None,
            stop,
        }
    } else {
        BatchControl::polite(stop)
    };

    let pipeline = Pipeline::new(&youtube, trend_provider, &options);
    let outcome = pipeline.run_batch(&mut budget, &keywords, &control).await;
    let finished_at = chrono::Utc::now();

    let export = ExportOptions {
        out_dir: args.out_dir.clone(),
        region: options.region.clone(),
        json: args.json,
        separate_files: args.separate_files,
    };
    let exported = write_outputs(&outcome, &budget, &args.usage_file, &export, finished_at);

    if !args.no_db {
        persist(settings, &outcome, &options, started_at, finished_at).await;
    }

    log_summary(&outcome, &budget);
    if let Some(files) = exported? {
        tracing::info!(dir = %files.dir.display(), "results written");
    }
    Ok(())
}

/// Exports the batch, then saves the usage ledger. A ledger write failure is
/// reported and never blocks the export.
fn write_outputs(
    outcome: &BatchOutcome,
    budget: &UsageBudget,
    usage_file: &Path,
    export: &ExportOptions,
    finished_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Option<ExportedFiles>> {
    let exported = export_outcome(outcome, export, finished_at);

    if let Err(err) = budget.save(usage_file) {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(
            path = %usage_file.display(),
            error = %format!("{err:#}"),
            "failed to save usage ledger"
        );
    }

    exported
}

/// Results are already on disk, so database failures are reported but do not fail the run.
async fn persist(
    settings: &niche_core::config::Settings,
    outcome: &BatchOutcome,
    options: &AnalysisOptions,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: chrono::DateTime<chrono::Utc>,
) {
    let Some(db_url) = settings.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; run not persisted");
        return;
    };
    if outcome.is_empty() {
        return;
    }

    let result = async {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;

        niche_core::storage::migrate(&pool).await?;

        niche_core::storage::runs::persist_run(
            &pool,
            outcome,
            &options.region,
            options.strategy,
            started_at,
            finished_at,
        )
        .await
    }
    .await;

    match result {
        Ok(run_id) => tracing::info!(%run_id, "persisted niche run"),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "failed to persist niche run");
        }
    }
}

fn log_summary(outcome: &BatchOutcome, budget: &UsageBudget) {
    let count = |v: Verdict| {
        outcome
            .reports
            .iter()
            .filter(|r| r.decision.verdict == v)
            .count()
    };
    let status = budget.status();

    tracing::info!(
        recommended = count(Verdict::Recommended),
        evaluate = count(Verdict::Evaluate),
        discard = count(Verdict::Discard),
        skipped = outcome.skipped.len(),
        used_units = status.used_units,
        remaining = status.remaining_units,
        used_pct = status.used_pct,
        "niche run finished"
    );
    if let Some(reason) = &outcome.aborted {
        tracing::warn!(reason = %reason, "batch ended early");
    }
}

fn init_sentry(settings: &niche_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use niche_core::domain::report::SkippedKeyword;

    #[test]
    fn export_survives_unwritable_usage_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let usage_file = blocker.join("api_usage.json");

        let outcome = BatchOutcome {
            skipped: vec![SkippedKeyword {
                keyword: "seguros".to_string(),
                error: "fetch failed: HTTP 500".to_string(),
            }],
            ..Default::default()
        };
        let budget = UsageBudget::new(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 10_000);
        let export = ExportOptions {
            out_dir: dir.path().join("results"),
            region: "ES".to_string(),
            json: false,
            separate_files: false,
        };
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();

        let files = write_outputs(&outcome, &budget, &usage_file, &export, at)
            .unwrap()
            .unwrap();

        let csv = std::fs::read_to_string(files.dir.join("results.csv")).unwrap();
        assert!(csv.contains("seguros,skipped,ES,"));
        assert!(files.dir.join("report.md").exists());
        assert!(!usage_file.exists());
    }

    #[test]
    fn ledger_is_saved_next_to_export() {
        let dir = tempfile::tempdir().unwrap();
        let usage_file = dir.path().join("api_usage.json");
        let mut budget = UsageBudget::new(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 10_000);
        budget.spend(100, "search", "bolsa").unwrap();
        let export = ExportOptions {
            out_dir: dir.path().join("results"),
            region: "US".to_string(),
            json: false,
            separate_files: false,
        };

        let files = write_outputs(&BatchOutcome::default(), &budget, &usage_file, &export, Utc::now())
            .unwrap();
        assert!(files.is_none());

        let saved = UsageBudget::load_or_new(
            &usage_file,
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            10_000,
        )
        .unwrap();
        assert_eq!(saved.used_units, 100);
    }
}
