use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

// Quota resets at midnight Pacific. Fixed offset (no DST); override with QUOTA_TZ_OFFSET_HOURS.
const DEFAULT_QUOTA_TZ_OFFSET_HOURS: i32 = -8;

pub fn quota_tz_offset_hours() -> i32 {
    std::env::var("QUOTA_TZ_OFFSET_HOURS")
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|h| (-23..=23).contains(h))
        .unwrap_or(DEFAULT_QUOTA_TZ_OFFSET_HOURS)
}

/// Calendar day of the quota window that contains `now_utc`.
pub fn quota_day_at(now_utc: DateTime<Utc>, offset_hours: i32) -> anyhow::Result<NaiveDate> {
    let tz = FixedOffset::east_opt(offset_hours * 3600)
        .with_context(|| format!("invalid quota timezone offset {offset_hours}h"))?;
    Ok(now_utc.with_timezone(&tz).date_naive())
}

pub fn quota_day(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    quota_day_at(now_utc, quota_tz_offset_hours())
}

/// Lower bound for `publishedAfter`, `None` when no window is configured or the
/// window reaches past the representable range.
pub fn published_after(now_utc: DateTime<Utc>, within_days: Option<u32>) -> Option<DateTime<Utc>> {
    let days = Duration::try_days(i64::from(within_days?))?;
    now_utc.checked_sub_signed(days)
}

/// Folder-safe run stamp, e.g. `20250301_143005`.
pub fn run_stamp(now_utc: DateTime<Utc>) -> String {
    now_utc.format("%Y%m%d_%H%M%S").to_string()
}
