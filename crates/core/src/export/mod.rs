pub mod csv;
pub mod markdown;

use crate::domain::niche::Verdict;
use crate::domain::report::{BatchOutcome, NicheReport};
use crate::time::quota_day::run_stamp;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub region: String,
    pub json: bool,
    pub separate_files: bool,
}

#[derive(Debug, Clone)]
pub struct ExportedFiles {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Export order: RECOMMENDED, EVALUATE, DISCARD; then p75 and median descending.
pub fn ranked(reports: &[NicheReport]) -> Vec<&NicheReport> {
    let mut out: Vec<&NicheReport> = reports.iter().collect();
    out.sort_by(|a, b| compare(a, b));
    out
}

fn compare(a: &NicheReport, b: &NicheReport) -> Ordering {
    a.decision
        .verdict
        .cmp(&b.decision.verdict)
        .then_with(|| b.snapshot.p75_views.total_cmp(&a.snapshot.p75_views))
        .then_with(|| b.snapshot.median_views.total_cmp(&a.snapshot.median_views))
}

fn verdict_file(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Recommended => "recommended.csv",
        Verdict::Evaluate => "evaluate.csv",
        Verdict::Discard => "discard.csv",
    }
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Writes the run folder. Returns `None` without touching the disk when no keyword
/// was attempted.
pub fn export_outcome(
    outcome: &BatchOutcome,
    opts: &ExportOptions,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<Option<ExportedFiles>> {
    if outcome.is_empty() {
        return Ok(None);
    }

    let dir = opts
        .out_dir
        .join(opts.region.to_lowercase())
        .join(run_stamp(generated_at));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let ordered = ranked(&outcome.reports);
    let mut files = Vec::new();

    let path = dir.join("results.csv");
    write_file(&path, &csv::render(&ordered, &outcome.skipped, &opts.region))?;
    files.push(path);

    let path = dir.join("report.md");
    write_file(
        &path,
        &markdown::render(outcome, &ordered, &opts.region, generated_at),
    )?;
    files.push(path);

    if opts.json {
        let path = dir.join("results.json");
        let json = serde_json::to_string_pretty(outcome).context("failed to serialize results")?;
        write_file(&path, &json)?;
        files.push(path);
    }

    if opts.separate_files {
        for verdict in Verdict::ALL {
            let group: Vec<&NicheReport> = ordered
                .iter()
                .copied()
                .filter(|r| r.decision.verdict == verdict)
                .collect();
            if group.is_empty() {
                continue;
            }
            let path = dir.join(verdict_file(verdict));
            write_file(&path, &csv::render(&group, &[], &opts.region))?;
            files.push(path);
        }
    }

    tracing::info!(dir = %dir.display(), files = files.len(), "exported results");
    Ok(Some(ExportedFiles { dir, files }))
}


#[cfg(test)]
mod tests {
    use super::fixtures::report;
    use super::*;
    use crate::domain::report::{AbortReason, SkippedKeyword};
    use chrono::TimeZone;

    fn outcome() -> BatchOutcome {
        BatchOutcome {
            reports: vec![
                report("discard-me", Verdict::Discard, 100.0, 200.0, 4.0),
                report("eval-low", Verdict::Evaluate, 4_000.0, 13_000.0, 60.0),
                report("rec-b", Verdict::Recommended, 6_000.0, 25_000.0, 90.0),
                report("eval-high", Verdict::Evaluate, 6_000.0, 15_000.0, 70.0),
                report("rec-a", Verdict::Recommended, 9_000.0, 40_000.0, 100.0),
            ],
            skipped: vec![SkippedKeyword {
                keyword: "roto".to_string(),
                error: "fetch failed: HTTP 500".to_string(),
            }],
            aborted: Some(AbortReason::Interrupted),
        }
    }

    #[test]
    fn ranking_orders_verdict_then_p75_then_median() {
        let o = outcome();
        let names: Vec<&str> = ranked(&o.reports).iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(
            names,
            vec!["rec-a", "rec-b", "eval-high", "eval-low", "discard-me"]
        );
    }

    #[test]
    fn writes_run_folder() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExportOptions {
            out_dir: dir.path().to_path_buf(),
            region: "ES".to_string(),
            json: true,
            separate_files: true,
        };
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 30, 0).unwrap();

        let exported = export_outcome(&outcome(), &opts, at).unwrap().unwrap();
        assert_eq!(exported.dir, dir.path().join("es").join("20260201_123000"));

        let csv = std::fs::read_to_string(exported.dir.join("results.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 1 + 5 + 1);
        assert!(lines[0].starts_with("keyword,status,region,analyzed_at"));
        assert!(lines[1].starts_with("rec-a,ok,ES,2026-02-01T10:00:00Z,5,100000,"));
        assert!(lines[1].contains(",RECOMMENDED,\"median 6,000 >= 5,000, and more\",soft-threshold,"));
        assert!(lines[5].starts_with("discard-me,ok,"));
        assert!(lines[6].starts_with("roto,skipped,ES,"));

        let md = std::fs::read_to_string(exported.dir.join("report.md")).unwrap();
        assert!(md.contains("| RECOMMENDED | 2 |"));
        assert!(md.contains("| SKIPPED | 1 |"));
        assert!(md.contains("## Skipped (1)"));
        assert!(md.contains("Batch ended early: interrupted"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(exported.dir.join("results.json")).unwrap())
                .unwrap();
        assert_eq!(json["reports"].as_array().unwrap().len(), 5);

        let rec = std::fs::read_to_string(exported.dir.join("recommended.csv")).unwrap();
        assert_eq!(rec.lines().count(), 3);
        assert!(exported.dir.join("discard.csv").exists());
        assert_eq!(exported.files.len(), 6);
    }

    #[test]
    fn nothing_written_for_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExportOptions {
            out_dir: dir.path().join("out"),
            region: "US".to_string(),
            json: false,
            separate_files: false,
        };
        let res = export_outcome(&BatchOutcome::default(), &opts, Utc::now()).unwrap();
        assert!(res.is_none());
        assert!(!dir.path().join("out").exists());
    }
}
