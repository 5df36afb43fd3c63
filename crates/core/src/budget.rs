//! Daily API quota ledger, persisted as JSON between runs.
//!
//! The budget is an explicit value: callers load it, call `reset_if_new_day` once at
//! the start of a run, pass it by `&mut` to the pipeline and save it afterwards.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const DEFAULT_DAILY_LIMIT: u32 = 10_000;
const WARN_LEVELS_PCT: [f64; 2] = [60.0, 80.0];
const MAX_LOG_ENTRIES: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub at: DateTime<Utc>,
    pub operation: String,
    pub units: u32,
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub used_units: u32,
    pub trend_requests: u32,
    pub total_requests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageBudget {
    pub day: NaiveDate,
    pub daily_limit: u32,
    pub used_units: u32,
    #[serde(default)]
    pub trend_requests: u32,
    #[serde(default)]
    pub total_requests: u32,
    #[serde(default)]
    pub log: Vec<UsageEntry>,
    /// Totals of previous days keyed by `YYYY-MM-DD`.
    #[serde(default)]
    pub history: BTreeMap<String, DailyTotals>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub operation: String,
    pub requested: u32,
    pub used: u32,
    pub limit: u32,
}

impl fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} needs {} units but only {} of {} remain today",
            self.operation,
            self.requested,
            self.limit.saturating_sub(self.used),
            self.limit
        )
    }
}

impl std::error::Error for BudgetExceeded {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    Ok,
    Warning,
    Critical,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStatus {
    pub day: NaiveDate,
    pub daily_limit: u32,
    pub used_units: u32,
    pub remaining_units: u32,
    pub used_pct: f64,
    pub trend_requests: u32,
    pub total_requests: u32,
    pub level: UsageLevel,
}

impl UsageBudget {
    pub fn new(day: NaiveDate, daily_limit: u32) -> Self {
        Self {
            day,
            daily_limit,
            used_units: 0,
            trend_requests: 0,
            total_requests: 0,
            log: Vec::new(),
            history: BTreeMap::new(),
        }
    }

    /// Loads the ledger at `path`, or starts a fresh one for `today` when the file does
    /// not exist. The configured `daily_limit` replaces the stored one.
    pub fn load_or_new(path: &Path, today: NaiveDate, daily_limit: u32) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::new(today, daily_limit));
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read usage file {}", path.display()))?;
        let mut budget: UsageBudget = serde_json::from_str(&text)
            .with_context(|| format!("usage file {} is not valid", path.display()))?;
        budget.daily_limit = daily_limit;
        Ok(budget)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize usage")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace usage file {}", path.display()))?;
        Ok(())
    }

    /// Archives the current counters and starts `today` from zero. Returns whether a
    /// reset happened.
    pub fn reset_if_new_day(&mut self, today: NaiveDate) -> bool {
        if self.day == today {
            return false;
        }

        if self.total_requests > 0 || self.used_units > 0 || self.trend_requests > 0 {
            self.history.insert(
                self.day.to_string(),
                DailyTotals {
                    used_units: self.used_units,
                    trend_requests: self.trend_requests,
                    total_requests: self.total_requests,
                },
            );
        }

        tracing::info!(previous_day = %self.day, %today, used = self.used_units, "usage counters reset for new quota day");
        self.day = today;
        self.used_units = 0;
        self.trend_requests = 0;
        self.total_requests = 0;
        self.log.clear();
        true
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.used_units)
    }

    pub fn can_spend(&self, units: u32) -> bool {
        self.used_units
            .checked_add(units)
            .is_some_and(|after| after <= self.daily_limit)
    }

    /// Charges `units` to today's ledger. A refused spend leaves the ledger untouched.
    pub fn spend(
        &mut self,
        units: u32,
        operation: &str,
        keyword: &str,
    ) -> Result<Remaining, BudgetExceeded> {
        if !self.can_spend(units) {
            return Err(BudgetExceeded {
                operation: operation.to_string(),
                requested: units,
                used: self.used_units,
                limit: self.daily_limit,
            });
        }

        let before_pct = self.used_pct();
        self.used_units += units;
        self.total_requests += 1;
        self.push_log(operation, units, keyword);

        let after_pct = self.used_pct();
        for level in WARN_LEVELS_PCT {
            if before_pct < level && after_pct >= level {
                tracing::warn!(
                    units = self.used_units,
                    limit = self.daily_limit,
                    remaining = self.remaining(),
                    "quota usage crossed {level}% of the daily limit"
                );
            }
        }

        Ok(Remaining(self.remaining()))
    }

    /// Trend queries are free but counted.
    pub fn record_trend_query(&mut self, keyword: &str) {
        self.trend_requests += 1;
        self.total_requests += 1;
        self.push_log("trends", 0, keyword);
    }

    pub fn used_pct(&self) -> f64 {
        if self.daily_limit == 0 {
            return 100.0;
        }
        f64::from(self.used_units) / f64::from(self.daily_limit) * 100.0
    }

    pub fn status(&self) -> UsageStatus {
        let used_pct = self.used_pct();
        let level = if self.remaining() == 0 {
            UsageLevel::Exhausted
        } else if used_pct >= WARN_LEVELS_PCT[1] {
            UsageLevel::Critical
        } else if used_pct >= WARN_LEVELS_PCT[0] {
            UsageLevel::Warning
        } else {
            UsageLevel::Ok
        };

        UsageStatus {
            day: self.day,
            daily_limit: self.daily_limit,
            used_units: self.used_units,
            remaining_units: self.remaining(),
            used_pct: (used_pct * 10.0).round() / 10.0,
            trend_requests: self.trend_requests,
            total_requests: self.total_requests,
            level,
        }
    }

    /// Folds the spend a run made on its own copy (`before` to `after`) into this
    /// ledger, which may have been charged or rolled over meanwhile. Spend dated to an
    /// already archived day is added to that day's history.
    pub fn absorb_run(&mut self, before: &UsageBudget, after: &UsageBudget) {
        let delta = DailyTotals {
            used_units: after.used_units.saturating_sub(before.used_units),
            trend_requests: after.trend_requests.saturating_sub(before.trend_requests),
            total_requests: after.total_requests.saturating_sub(before.total_requests),
        };

        if after.day > self.day {
            self.reset_if_new_day(after.day);
        }

        if after.day < self.day {
            let totals = self.history.entry(after.day.to_string()).or_default();
            totals.used_units = totals.used_units.saturating_add(delta.used_units);
            totals.trend_requests = totals.trend_requests.saturating_add(delta.trend_requests);
            totals.total_requests = totals.total_requests.saturating_add(delta.total_requests);
            return;
        }

        self.used_units = self.used_units.saturating_add(delta.used_units);
        self.trend_requests = self.trend_requests.saturating_add(delta.trend_requests);
        self.total_requests = self.total_requests.saturating_add(delta.total_requests);

        // One log entry per request.
        let fresh = (delta.total_requests as usize).min(after.log.len());
        self.log.extend_from_slice(&after.log[after.log.len() - fresh..]);
        if self.log.len() > MAX_LOG_ENTRIES {
            let excess = self.log.len() - MAX_LOG_ENTRIES;
            self.log.drain(..excess);
        }
    }

    fn push_log(&mut self, operation: &str, units: u32, keyword: &str) {
        self.log.push(UsageEntry {
            at: Utc::now(),
            operation: operation.to_string(),
            units,
            keyword: keyword.to_string(),
        });
        if self.log.len() > MAX_LOG_ENTRIES {
            let excess = self.log.len() - MAX_LOG_ENTRIES;
            self.log.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn spend_refuses_without_mutation() {
        let mut b = UsageBudget::new(day(1), 250);
        assert_eq!(b.spend(100, "search", "a"), Ok(Remaining(150)));
        assert_eq!(b.spend(100, "search", "b"), Ok(Remaining(50)));

        let before = b.clone();
        let err = b.spend(100, "search", "c").unwrap_err();
        assert_eq!(err.requested, 100);
        assert_eq!(err.used, 200);
        assert_eq!(b, before);

        assert_eq!(b.spend(50, "videos", "c"), Ok(Remaining(0)));
        assert_eq!(b.status().level, UsageLevel::Exhausted);
    }

    #[test]
    fn reset_archives_previous_day() {
        let mut b = UsageBudget::new(day(1), 10_000);
        b.spend(101, "search", "k").unwrap();
        b.record_trend_query("k");

        assert!(!b.reset_if_new_day(day(1)));
        assert!(b.reset_if_new_day(day(2)));

        assert_eq!(b.day, day(2));
        assert_eq!(b.used_units, 0);
        assert_eq!(b.trend_requests, 0);
        assert!(b.log.is_empty());
        let archived = &b.history["2026-02-01"];
        assert_eq!(archived.used_units, 101);
        assert_eq!(archived.trend_requests, 1);
        assert_eq!(archived.total_requests, 2);
    }

    #[test]
    fn absorb_keeps_concurrent_spend() {
        let mut shared = UsageBudget::new(day(1), 10_000);
        shared.spend(100, "search", "base").unwrap();

        let before = shared.clone();
        let mut run = before.clone();
        run.spend(100, "search", "mine").unwrap();
        run.record_trend_query("mine");

        shared.spend(1, "videos", "other").unwrap();
        shared.absorb_run(&before, &run);

        assert_eq!(shared.used_units, 201);
        assert_eq!(shared.trend_requests, 1);
        assert_eq!(shared.total_requests, 4);
        let keywords: Vec<&str> = shared.log.iter().map(|e| e.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["base", "other", "mine", "mine"]);
    }

    #[test]
    fn absorb_after_rollover_archives_run_spend() {
        let mut shared = UsageBudget::new(day(1), 10_000);
        shared.spend(50, "search", "base").unwrap();

        let before = shared.clone();
        let mut run = before.clone();
        run.spend(100, "search", "mine").unwrap();

        assert!(shared.reset_if_new_day(day(2)));
        shared.absorb_run(&before, &run);

        assert_eq!(shared.day, day(2));
        assert_eq!(shared.used_units, 0);
        assert!(shared.log.is_empty());
        assert_eq!(shared.history["2026-02-01"].used_units, 150);
        assert_eq!(shared.history["2026-02-01"].total_requests, 2);
    }

    #[test]
    fn status_levels() {
        let mut b = UsageBudget::new(day(1), 100);
        assert_eq!(b.status().level, UsageLevel::Ok);
        b.spend(60, "search", "k").unwrap();
        assert_eq!(b.status().level, UsageLevel::Warning);
        b.spend(25, "search", "k").unwrap();
        assert_eq!(b.status().level, UsageLevel::Critical);
        assert_eq!(b.status().used_pct, 85.0);
    }

    #[test]
    fn overflowing_spend_is_refused() {
        let mut b = UsageBudget::new(day(1), u32::MAX);
        b.spend(u32::MAX - 1, "search", "k").unwrap();
        assert!(b.spend(u32::MAX, "search", "k").is_err());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("api_usage.json");

        let fresh = UsageBudget::load_or_new(&path, day(3), 500).unwrap();
        assert_eq!(fresh.used_units, 0);

        let mut b = fresh;
        b.spend(101, "search", "auriculares").unwrap();
        b.save(&path).unwrap();

        let loaded = UsageBudget::load_or_new(&path, day(4), 800).unwrap();
        assert_eq!(loaded.day, day(3));
        assert_eq!(loaded.used_units, 101);
        assert_eq!(loaded.daily_limit, 800);
        assert_eq!(loaded.log.len(), 1);
        assert_eq!(loaded.log[0].keyword, "auriculares");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_usage.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(UsageBudget::load_or_new(&path, day(1), 10).is_err());
    }
}
