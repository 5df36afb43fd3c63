use crate::analysis::format_thousands;
use crate::domain::niche::Verdict;
use crate::domain::report::{BatchOutcome, NicheReport};
use chrono::{DateTime, Utc};
use std::fmt::Write;

const TOP_OPPORTUNITIES: usize = 5;
const BAR_CELLS: usize = 10;

pub fn score_bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(BAR_CELLS - filled));
    bar
}

fn heading(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Recommended => "Recommended",
        Verdict::Evaluate => "Worth evaluating",
        Verdict::Discard => "Discarded",
    }
}

fn views(v: f64) -> String {
    format_thousands(v.max(0.0).round() as u64)
}

/// `ranked` must already be in export order.
pub fn render(
    outcome: &BatchOutcome,
    ranked: &[&NicheReport],
    region: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let count = |v: Verdict| ranked.iter().filter(|r| r.decision.verdict == v).count();

    let _ = writeln!(out, "# Niche report ({region})\n");
    let _ = writeln!(
        out,
        "Generated {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "| | Keywords |\n|---|---|");
    for verdict in Verdict::ALL {
        let _ = writeln!(out, "| {} | {} |", verdict.as_str(), count(verdict));
    }
    let _ = writeln!(out, "| SKIPPED | {} |", outcome.skipped.len());
    let _ = writeln!(out, "| Total | {} |\n", outcome.attempted());

    if !ranked.is_empty() {
        let avg = ranked
            .iter()
            .map(|r| r.decision.opportunity_score)
            .sum::<f64>()
            / ranked.len() as f64;
        let _ = writeln!(out, "Average opportunity score: {avg:.1}\n");
    }

    if let Some(reason) = &outcome.aborted {
        let _ = writeln!(out, "> Batch ended early: {reason}\n");
    }

    let mut by_score: Vec<&NicheReport> = ranked.to_vec();
    by_score.sort_by(|a, b| {
        b.decision
            .opportunity_score
            .total_cmp(&a.decision.opportunity_score)
    });
    if !by_score.is_empty() {
        let _ = writeln!(out, "## Top opportunities\n");
        for (i, r) in by_score.iter().take(TOP_OPPORTUNITIES).enumerate() {
            let _ = writeln!(
                out,
                "{}. **{}** `{}` {:.1} ({})",
                i + 1,
                r.keyword,
                score_bar(r.decision.opportunity_score),
                r.decision.opportunity_score,
                r.decision.verdict
            );
        }
        let _ = writeln!(out);
    }

    for verdict in Verdict::ALL {
        let group: Vec<&&NicheReport> = ranked
            .iter()
            .filter(|r| r.decision.verdict == verdict)
            .collect();
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {} ({})\n", heading(verdict), group.len());
        for r in group {
            write_detail(&mut out, r);
        }
    }

    if !outcome.skipped.is_empty() {
        let _ = writeln!(out, "## Skipped ({})\n", outcome.skipped.len());
        for s in &outcome.skipped {
            let _ = writeln!(out, "- **{}**: {}", s.keyword, s.error);
        }
        let _ = writeln!(out);
    }

    out
}

fn write_detail(out: &mut String, r: &NicheReport) {
    let s = &r.snapshot;
    let c = &r.classification;
    let d = &r.decision;

    let _ = writeln!(out, "### {}\n", r.keyword);
    let _ = writeln!(
        out,
        "- Score: {:.1} `{}` ({}, base {:.1})",
        d.opportunity_score,
        score_bar(d.opportunity_score),
        d.strategy,
        d.base_score
    );
    let _ = writeln!(out, "- Reason: {}", d.reason);
    let _ = writeln!(
        out,
        "- Videos: {} | median {} | p75 {} | max {}",
        s.video_count,
        views(s.median_views),
        views(s.p75_views),
        format_thousands(s.max_views)
    );
    let _ = writeln!(
        out,
        "- Monetization: {} | monetizable titles {:.1}%",
        c.monetization, c.titles.monetizable_pct
    );
    let _ = writeln!(
        out,
        "- Automation: {} ({}/{} top videos)",
        c.automation.label.as_str(),
        c.automation.matching_videos,
        c.automation.sampled_videos
    );
    let _ = writeln!(
        out,
        "- Saturation: {} | Trend: {}",
        r.saturation.risk.as_str(),
        r.trend.status.as_str()
    );
    if let Some(sizes) = &r.channel_sizes {
        let _ = writeln!(
            out,
            "- Channels: small {:.1}% | medium {:.1}% | large {:.1}%",
            sizes.small_pct, sizes.medium_pct, sizes.large_pct
        );
    }
    if let Some(top) = r.top_videos.first() {
        let _ = writeln!(
            out,
            "- Top video: {} ({} views)",
            top.title,
            format_thousands(top.view_count)
        );
    }
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_has_ten_cells() {
        assert_eq!(score_bar(0.0), "░░░░░░░░░░");
        assert_eq!(score_bar(100.0), "██████████");
        assert_eq!(score_bar(64.0), "██████░░░░");
        assert_eq!(score_bar(250.0).chars().count(), 10);
        assert_eq!(score_bar(-3.0).chars().count(), 10);
    }
}
