use crate::analysis::stats::pct;
use crate::domain::niche::{
    ChannelSizes, ChannelStats, NicheSnapshot, Saturation, SaturationRisk, VideoMetric,
};
use std::collections::HashMap;

const SMALL_CHANNEL_MAX_SUBS: u64 = 50_000;
const MEDIUM_CHANNEL_MAX_SUBS: u64 = 500_000;

/// Saturation risk from avg_views / max_views.
pub fn saturation(snapshot: &NicheSnapshot) -> Saturation {
    if snapshot.is_empty() || snapshot.max_views == 0 {
        return Saturation {
            ratio: 0.0,
            risk: SaturationRisk::Unknown,
        };
    }

    let ratio = snapshot.avg_views / snapshot.max_views as f64;
    let risk = if ratio >= 0.8 {
        SaturationRisk::Low
    } else if ratio >= 0.4 {
        SaturationRisk::Medium
    } else {
        SaturationRisk::High
    };

    Saturation {
        ratio: (ratio * 1000.0).round() / 1000.0,
        risk,
    }
}

/// Buckets videos by their channel's subscriber count. Videos whose channel was not
/// returned, or hides its count, are left out. `None` when nothing could be bucketed.
pub fn channel_sizes(videos: &[VideoMetric], channels: &[ChannelStats]) -> Option<ChannelSizes> {
    let subs: HashMap<&str, u64> = channels
        .iter()
        .filter_map(|c| c.subscriber_count.map(|n| (c.channel_id.as_str(), n)))
        .collect();

    let (mut small, mut medium, mut large) = (0, 0, 0);
    for video in videos {
        match subs.get(video.channel_id.as_str()) {
            Some(&n) if n < SMALL_CHANNEL_MAX_SUBS => small += 1,
            Some(&n) if n < MEDIUM_CHANNEL_MAX_SUBS => medium += 1,
            Some(_) => large += 1,
            None => {}
        }
    }

    let total = small + medium + large;
    if total == 0 {
        return None;
    }

    Some(ChannelSizes {
        small,
        medium,
        large,
        small_pct: pct(small, total),
        medium_pct: pct(medium, total),
        large_pct: pct(large, total),
    })
}

/// Distinct channel ids in first-seen order.
pub fn distinct_channels(videos: &[VideoMetric]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    videos
        .iter()
        .filter(|v| !v.channel_id.is_empty() && seen.insert(v.channel_id.as_str()))
        .map(|v| v.channel_id.clone())
        .collect()
}
