use crate::domain::niche::ScoringStrategy;
use crate::domain::report::{BatchOutcome, NicheReport, SkippedKeyword};
use crate::export::ranked;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub region: String,
    pub strategy: String,
    pub status: String,
    pub aborted_reason: Option<String>,
    pub keywords_total: i32,
    pub keywords_analyzed: i32,
    pub keywords_skipped: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub position: i32,
    pub keyword: String,
    pub status: String,
    pub verdict: Option<String>,
    pub base_score: Option<f64>,
    pub opportunity_score: Option<f64>,
    pub video_count: Option<i32>,
    pub median_views: Option<f64>,
    pub p75_views: Option<f64>,
    pub error: Option<String>,
    pub raw_result: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredRun {
    #[serde(flatten)]
    pub run: RunSummary,
    pub results: Vec<StoredResult>,
}

pub fn run_status(outcome: &BatchOutcome) -> &'static str {
    if outcome.aborted.is_some() {
        "aborted"
    } else if !outcome.skipped.is_empty() {
        "partial"
    } else {
        "success"
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Writes the run and one row per keyword (ranked reports, then skipped) in one
/// transaction.
pub async fn persist_run(
    pool: &PgPool,
    outcome: &BatchOutcome,
    region: &str,
    strategy: ScoringStrategy,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query(
        "INSERT INTO niche_runs (id, started_at, finished_at, region, strategy, status, aborted_reason, \
         keywords_total, keywords_analyzed, keywords_skipped) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(run_id)
    .bind(started_at)
    .bind(finished_at)
    .bind(region)
    .bind(strategy.as_str())
    .bind(run_status(outcome))
    .bind(outcome.aborted.as_ref().map(|r| r.to_string()))
    .bind(count(outcome.attempted()))
    .bind(count(outcome.reports.len()))
    .bind(count(outcome.skipped.len()))
    .execute(&mut *tx)
    .await
    .context("insert niche_runs failed")?;

    let mut position: i32 = 0;
    for report in ranked(&outcome.reports) {
        position += 1;
        insert_report(&mut tx, run_id, position, report).await?;
    }
    for skipped in &outcome.skipped {
        position += 1;
        insert_skipped(&mut tx, run_id, position, skipped).await?;
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(run_id)
}

async fn insert_report(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    run_id: Uuid,
    position: i32,
    report: &NicheReport,
) -> anyhow::Result<()> {
    let raw = serde_json::to_value(report).context("serialize report failed")?;

    sqlx::query(
        "INSERT INTO niche_results (run_id, position, keyword, status, verdict, base_score, \
         opportunity_score, video_count, median_views, p75_views, error, raw_result) \
         VALUES ($1, $2, $3, 'ok', $4, $5, $6, $7, $8, $9, NULL, $10)",
    )
    .bind(run_id)
    .bind(position)
    .bind(&report.keyword)
    .bind(report.decision.verdict.as_str())
    .bind(report.decision.base_score)
    .bind(report.decision.opportunity_score)
    .bind(count(report.snapshot.video_count))
    .bind(report.snapshot.median_views)
    .bind(report.snapshot.p75_views)
    .bind(raw)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert niche_results failed for {:?}", report.keyword))?;

    Ok(())
}

async fn insert_skipped(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    run_id: Uuid,
    position: i32,
    skipped: &SkippedKeyword,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO niche_results (run_id, position, keyword, status, error) \
         VALUES ($1, $2, $3, 'skipped', $4)",
    )
    .bind(run_id)
    .bind(position)
    .bind(&skipped.keyword)
    .bind(&skipped.error)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert skipped niche_results failed for {:?}", skipped.keyword))?;

    Ok(())
}

type RunRow = (
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    String,
    String,
    Option<String>,
    i32,
    i32,
    i32,
);

const RUN_COLUMNS: &str = "id, started_at, finished_at, region, strategy, status, aborted_reason, \
                           keywords_total, keywords_analyzed, keywords_skipped";

pub async fn fetch_latest_run(pool: &PgPool) -> anyhow::Result<Option<StoredRun>> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM niche_runs ORDER BY finished_at DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await
    .context("select latest niche_runs failed")?;

    load_results(pool, row).await
}

pub async fn fetch_run(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Option<StoredRun>> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM niche_runs WHERE id = $1"
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select niche_runs {run_id} failed"))?;

    load_results(pool, row).await
}

async fn load_results(pool: &PgPool, row: Option<RunRow>) -> anyhow::Result<Option<StoredRun>> {
    let Some((
        run_id,
        started_at,
        finished_at,
        region,
        strategy,
        status,
        aborted_reason,
        keywords_total,
        keywords_analyzed,
        keywords_skipped,
    )) = row
    else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<
        _,
        (
            i32,
            String,
            String,
            Option<String>,
            Option<f64>,
            Option<f64>,
            Option<i32>,
            Option<f64>,
            Option<f64>,
            Option<String>,
            Option<Value>,
        ),
    >(
        "SELECT position, keyword, status, verdict, base_score, opportunity_score, video_count, \
         median_views, p75_views, error, raw_result \
         FROM niche_results \
         WHERE run_id = $1 \
         ORDER BY position ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("select niche_results failed")?;

    let results = rows
        .into_iter()
        .map(
            |(
                position,
                keyword,
                status,
                verdict,
                base_score,
                opportunity_score,
                video_count,
                median_views,
                p75_views,
                error,
                raw_result,
            )| StoredResult {
                position,
                keyword,
                status,
                verdict,
                base_score,
                opportunity_score,
                video_count,
                median_views,
                p75_views,
                error,
                raw_result,
            },
        )
        .collect();

    Ok(Some(StoredRun {
        run: RunSummary {
            run_id,
            started_at,
            finished_at,
            region,
            strategy,
            status,
            aborted_reason,
            keywords_total,
            keywords_analyzed,
            keywords_skipped,
        },
        results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::niche::Verdict;
    use crate::domain::report::AbortReason;
    use crate::export::fixtures::report;

    #[test]
    fn status_reflects_outcome() {
        let mut o = BatchOutcome {
            reports: vec![report("a", Verdict::Evaluate, 1.0, 2.0, 3.0)],
            ..Default::default()
        };
        assert_eq!(run_status(&o), "success");

        o.skipped.push(SkippedKeyword {
            keyword: "b".to_string(),
            error: "fetch failed: HTTP 500".to_string(),
        });
        assert_eq!(run_status(&o), "partial");

        o.aborted = Some(AbortReason::Interrupted);
        assert_eq!(run_status(&o), "aborted");
    }

    #[test]
    fn counts_saturate() {
        assert_eq!(count(3), 3);
        assert_eq!(count(usize::MAX), i32::MAX);
    }
}
