use crate::analysis::stats::round1;
use crate::domain::niche::{TrendReading, TrendStatus};

/// Weekly points treated as "recent" (about one quarter).
const RECENT_POINTS: usize = 13;
const CHANGE_THRESHOLD_PCT: f64 = 5.0;

pub fn classify_trend(series: &[u32]) -> TrendReading {
    if series.is_empty() {
        return TrendReading::unknown();
    }

    let baseline = mean(series);
    if baseline <= 0.0 {
        return TrendReading::unknown();
    }

    let recent_start = series.len().saturating_sub(RECENT_POINTS);
    let recent = mean(&series[recent_start..]);
    let change = (recent - baseline) / baseline * 100.0;

    let status = if change > CHANGE_THRESHOLD_PCT {
        TrendStatus::Rising
    } else if change < -CHANGE_THRESHOLD_PCT {
        TrendStatus::Falling
    } else {
        TrendStatus::Flat
    };

    TrendReading {
        status,
        change_pct: Some(round1(change)),
    }
}

fn mean(values: &[u32]) -> f64 {
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}
