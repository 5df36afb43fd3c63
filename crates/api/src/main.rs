use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use niche_core::analysis::classify::{
    classify_monetization, has_ad_intent, has_affiliate_intent, is_automatable,
};
use niche_core::budget::{UsageBudget, UsageStatus};
use niche_core::domain::niche::ScoringStrategy;
use niche_core::domain::report::BatchOutcome;
use niche_core::ingest::trends::{HttpJsonTrendProvider, TrendProvider};
use niche_core::ingest::youtube::YouTubeClient;
use niche_core::pipeline::{AnalysisOptions, BatchControl, Pipeline};
use niche_core::storage::runs::{fetch_latest_run, fetch_run, persist_run, StoredRun};
use niche_core::time::quota_day::quota_day;

const MAX_ANALYZE_KEYWORDS: usize = 5;

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
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match niche_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; stored runs are unavailable");
            None
        }
    };

    let youtube = match YouTubeClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "YouTube client unavailable; /analyze is disabled");
            None
        }
    };
    let trends = HttpJsonTrendProvider::from_settings(&settings)?.map(Arc::new);

    let options = AnalysisOptions::from_env(None)?;
    let usage_path = std::env::var("USAGE_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("api_usage.json"));
    let budget = UsageBudget::load_or_new(
        &usage_path,
        quota_day(Utc::now())?,
        options.daily_quota_units,
    )?;

    let state = AppState {
        pool,
        youtube,
        trends,
        budget: Arc::new(Mutex::new(budget)),
        usage_path: Arc::new(usage_path),
        analysis_lock: Arc::new(Mutex::new(())),
        options: Arc::new(options),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/classify", post(classify_keyword))
        .route("/analyze", post(analyze))
        .route("/usage", get(get_usage))
        .route("/runs/latest", get(get_latest_run))
        .route("/runs/:run_id", get(get_run_by_id))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    youtube: Option<Arc<YouTubeClient>>,
    trends: Option<Arc<HttpJsonTrendProvider>>,
    budget: Arc<Mutex<UsageBudget>>,
    usage_path: Arc<PathBuf>,
    /// Held for the duration of one /analyze call.
    analysis_lock: Arc<Mutex<()>>,
    options: Arc<AnalysisOptions>,
}

fn internal_error(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    keyword: String,
}

#[derive(Debug, PartialEq, Serialize)]
struct ClassifyResponse {
    keyword: String,
    monetization: &'static str,
    affiliate_intent: bool,
    ad_intent: bool,
    automatable: bool,
}

fn classify_text(keyword: &str) -> Option<ClassifyResponse> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }
    Some(ClassifyResponse {
        keyword: keyword.to_string(),
        monetization: classify_monetization(keyword).label(),
        affiliate_intent: has_affiliate_intent(keyword),
        ad_intent: has_ad_intent(keyword),
        automatable: is_automatable(keyword),
    })
}

async fn classify_keyword(
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, StatusCode> {
    classify_text(&req.keyword)
        .map(Json)
        .ok_or(StatusCode::BAD_REQUEST)
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    keywords: Vec<String>,
    region: Option<String>,
    strategy: Option<ScoringStrategy>,
    max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    run_id: Option<Uuid>,
    usage: UsageStatus,
    #[serde(flatten)]
    outcome: BatchOutcome,
}

/// Trimmed, de-duplicated keywords; `None` when empty or over the per-request cap.
fn normalize_keywords(raw: &[String]) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    let keywords: Vec<String> = raw
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect();

    if keywords.is_empty() || keywords.len() > MAX_ANALYZE_KEYWORDS {
        return None;
    }
    Some(keywords)
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, StatusCode> {
    let keywords = normalize_keywords(&req.keywords).ok_or(StatusCode::BAD_REQUEST)?;

    let Some(youtube) = state.youtube.clone() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let Ok(_running) = state.analysis_lock.try_lock() else {
        return Err(StatusCode::CONFLICT);
    };

    let mut options = match req.region.as_deref() {
        Some(region) => {
            AnalysisOptions::from_env(Some(region)).map_err(|_| StatusCode::BAD_REQUEST)?
        }
        None => state.options.as_ref().clone(),
    };
    if let Some(strategy) = req.strategy {
        options.strategy = strategy;
    }
    if let Some(n) = req.max_results {
        options.max_results = n;
    }

    let started_at = Utc::now();
    let today = quota_day(started_at).map_err(internal_error)?;
    let before = {
        let mut shared = state.budget.lock().await;
        shared.reset_if_new_day(today);
        shared.clone()
    };
    let mut budget = before.clone();

    let trends = state.trends.as_deref().map(|t| t as &dyn TrendProvider);
    let pipeline = Pipeline::new(youtube.as_ref(), trends, &options);
    let outcome = pipeline
        .run_batch(&mut budget, &keywords, &BatchControl::immediate())
        .await;
    let finished_at = Utc::now();

    let usage = {
        let mut shared = state.budget.lock().await;
        shared.absorb_run(&before, &budget);
        if let Err(e) = shared.save(&state.usage_path) {
            sentry_anyhow::capture_anyhow(&e);
            tracing::warn!(error = %e, "failed to save usage ledger");
        }
        shared.status()
    };

    let run_id = match &state.pool {
        Some(pool) => match persist_run(
            pool,
            &outcome,
            &options.region,
            options.strategy,
            started_at,
            finished_at,
        )
        .await
        {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "failed to persist analysis run");
                None
            }
        },
        None => None,
    };

    tracing::info!(
        keywords = keywords.len(),
        reports = outcome.reports.len(),
        skipped = outcome.skipped.len(),
        remaining = usage.remaining_units,
        "analysis finished"
    );

    Ok(Json(AnalyzeResponse {
        run_id,
        usage,
        outcome,
    }))
}

async fn get_usage(State(state): State<AppState>) -> Result<Json<UsageStatus>, StatusCode> {
    let today = quota_day(Utc::now()).map_err(internal_error)?;
    let mut budget = state.budget.lock().await;
    budget.reset_if_new_day(today);
    Ok(Json(budget.status()))
}

async fn get_latest_run(State(state): State<AppState>) -> Result<Json<StoredRun>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run = fetch_latest_run(pool)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(run))
}

async fn get_run_by_id(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StoredRun>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_id = Uuid::parse_str(&run_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let run = fetch_run(pool, run_id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(run))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

    #[test]
    fn keywords_are_trimmed_and_deduped() {
        let raw = vec![
            " seguros ".to_string(),
            "SEGUROS".to_string(),
            "".to_string(),
            "bolsa".to_string(),
        ];
        assert_eq!(
            normalize_keywords(&raw),
            Some(vec!["seguros".to_string(), "bolsa".to_string()])
        );
    }

    #[test]
    fn empty_or_oversized_requests_are_rejected() {
        assert_eq!(normalize_keywords(&[]), None);
        assert_eq!(normalize_keywords(&["  ".to_string()]), None);

        let many: Vec<String> = (0..6).map(|i| format!("kw{i}")).collect();
        assert_eq!(normalize_keywords(&many), None);
        assert_eq!(normalize_keywords(&many[..5]).map(|k| k.len()), Some(5));
    }

    #[test]
    fn classify_reports_label_and_automation() {
        assert_eq!(classify_text("   "), None);

        let res = classify_text("mejor seguro de coche").unwrap();
        assert_eq!(res.keyword, "mejor seguro de coche");
        assert_eq!(res.monetization, classify_monetization("mejor seguro de coche").label());
    }

    #[test]
    fn analyze_request_accepts_optional_fields() {
        let req: AnalyzeRequest = serde_json::from_value(serde_json::json!({
            "keywords": ["bolsa"],
            "strategy": "weighted-sum"
        }))
        .unwrap();
        assert_eq!(req.keywords, vec!["bolsa"]);
        assert_eq!(req.strategy, Some(ScoringStrategy::WeightedSum));
        assert!(req.region.is_none());
        assert!(req.max_results.is_none());
    }
}
