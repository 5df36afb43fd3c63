use crate::domain::report::{NicheReport, SkippedKeyword};
use chrono::SecondsFormat;
use std::borrow::Cow;

pub const COLUMNS: [&str; 27] = [
    "keyword",
    "status",
    "region",
    "analyzed_at",
    "video_count",
    "total_views",
    "avg_views",
    "median_views",
    "p75_views",
    "max_views",
    "min_views",
    "verdict",
    "reason",
    "strategy",
    "base_score",
    "opportunity_score",
    "monetization",
    "automation",
    "automation_count",
    "automation_ratio",
    "monetizable_ratio",
    "saturation_risk",
    "trend",
    "small_channels_pct",
    "medium_channels_pct",
    "large_channels_pct",
    "error",
];

/// Quotes a field when it contains a delimiter, a quote or a line break.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn one_decimal(x: f64) -> String {
    format!("{x:.1}")
}

pub fn report_record(r: &NicheReport) -> Vec<String> {
    let s = &r.snapshot;
    let c = &r.classification;
    let d = &r.decision;
    let (small, medium, large) = match &r.channel_sizes {
        Some(sizes) => (
            one_decimal(sizes.small_pct),
            one_decimal(sizes.medium_pct),
            one_decimal(sizes.large_pct),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    vec![
        r.keyword.clone(),
        "ok".to_string(),
        r.region.clone(),
        r.analyzed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        s.video_count.to_string(),
        s.total_views.to_string(),
        one_decimal(s.avg_views),
        one_decimal(s.median_views),
        one_decimal(s.p75_views),
        s.max_views.to_string(),
        s.min_views.to_string(),
        d.verdict.as_str().to_string(),
        d.reason.clone(),
        d.strategy.as_str().to_string(),
        one_decimal(d.base_score),
        one_decimal(d.opportunity_score),
        c.monetization.label().to_string(),
        c.automation.label.as_str().to_string(),
        format!(
            "{}/{}",
            c.automation.matching_videos, c.automation.sampled_videos
        ),
        one_decimal(c.automation.ratio_pct),
        one_decimal(c.titles.monetizable_pct),
        r.saturation.risk.as_str().to_string(),
        r.trend.status.as_str().to_string(),
        small,
        medium,
        large,
        String::new(),
    ]
}

pub fn skipped_record(s: &SkippedKeyword, region: &str) -> Vec<String> {
    let mut row = vec![String::new(); COLUMNS.len()];
    row[0] = s.keyword.clone();
    row[1] = "skipped".to_string();
    row[2] = region.to_string();
    row[COLUMNS.len() - 1] = s.error.clone();
    row
}

fn push_line(out: &mut String, fields: &[String]) {
    let line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Header, then the given reports in order, then skipped keywords.
pub fn render(reports: &[&NicheReport], skipped: &[SkippedKeyword], region: &str) -> String {
    let mut out = String::new();
    out.push_str(&COLUMNS.join(","));
    out.push('\n');
    for r in reports {
        push_line(&mut out, &report_record(r));
    }
    for s in skipped {
        push_line(&mut out, &skipped_record(s, region));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn skipped_row_has_every_column() {
        let s = SkippedKeyword {
            keyword: "bolsa, hoy".to_string(),
            error: "fetch failed: HTTP 500".to_string(),
        };
        let row = skipped_record(&s, "ES");
        assert_eq!(row.len(), COLUMNS.len());

        let csv = render(&[], &[s], "ES");
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let line = lines.next().unwrap();
        assert!(line.starts_with("\"bolsa, hoy\",skipped,ES,"));
        assert!(line.ends_with(",fetch failed: HTTP 500"));
    }
}
