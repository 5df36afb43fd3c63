//! Screening verdict plus opportunity score.
//!
//! The verdict always comes from the soft-threshold screen on median and p75 views.
//! The strategy only selects how the 0..=100 opportunity score is computed.

use crate::analysis::format_thousands;
use crate::analysis::stats::round1;
use crate::domain::niche::{
    Classification, Decision, MonetizationLabel, NicheSnapshot, Saturation, ScoringStrategy,
    Verdict, WeightedComponents,
};
use serde::{Deserialize, Serialize};

/// Fraction of each minimum that still earns an EVALUATE when both values reach it.
const PARTIAL_CREDIT: f64 = 0.6;

const VIEWS_NORMALIZER: f64 = 100_000.0;
const AUTOMATION_BONUS: f64 = 0.2;
const MULTIPLIER_BASELINE: f64 = 0.8;
const NEUTRAL_ENGAGEMENT: f64 = 0.5;

const W_VIEWS: f64 = 0.35;
const W_COMPETITION: f64 = 0.25;
const W_AUTOMATION: f64 = 0.20;
const W_MONETIZATION: f64 = 0.15;
const W_ENGAGEMENT: f64 = 0.05;

pub const NO_VIDEOS_REASON: &str = "no videos found";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub median_min: f64,
    pub p75_min: f64,
}

impl Thresholds {
    pub fn new(median_min: f64, p75_min: f64) -> anyhow::Result<Self> {
        anyhow::ensure!(
            median_min.is_finite() && median_min > 0.0,
            "median threshold must be > 0 (got {median_min})"
        );
        anyhow::ensure!(
            p75_min.is_finite() && p75_min > 0.0,
            "p75 threshold must be > 0 (got {p75_min})"
        );
        Ok(Self {
            median_min,
            p75_min,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Screening {
    pub verdict: Verdict,
    pub reason: String,
    pub base_score: f64,
}

fn ratio(value: f64, min: f64) -> f64 {
    let divisor = if min > 0.0 { min } else { 1.0 };
    (value / divisor).clamp(0.0, 1.0)
}

fn views(v: f64) -> String {
    format_thousands(v.max(0.0).round() as u64)
}

/// Pass / maybe / fail screen with partial-credit base score.
pub fn screen(median: f64, p75: f64, thresholds: &Thresholds) -> Screening {
    let Thresholds {
        median_min,
        p75_min,
    } = *thresholds;

    let base_score = round1((ratio(median, median_min) + ratio(p75, p75_min)) / 2.0 * 100.0);

    let median_ok = median >= median_min;
    let p75_ok = p75 >= p75_min;
    let near_both =
        median >= median_min * PARTIAL_CREDIT && p75 >= p75_min * PARTIAL_CREDIT;

    let (verdict, reason) = match (median_ok, p75_ok) {
        (true, true) => (
            Verdict::Recommended,
            format!(
                "median {} >= {} and p75 {} >= {}",
                views(median),
                views(median_min),
                views(p75),
                views(p75_min)
            ),
        ),
        (true, false) => (
            Verdict::Evaluate,
            format!(
                "median {} >= {} but p75 {} < {}",
                views(median),
                views(median_min),
                views(p75),
                views(p75_min)
            ),
        ),
        (false, true) => (
            Verdict::Evaluate,
            format!(
                "p75 {} >= {} but median {} < {}",
                views(p75),
                views(p75_min),
                views(median),
                views(median_min)
            ),
        ),
        (false, false) if near_both => (
            Verdict::Evaluate,
            format!(
                "median {} and p75 {} are within 60% of the minimums ({} / {})",
                views(median),
                views(p75),
                views(median_min),
                views(p75_min)
            ),
        ),
        (false, false) => (
            Verdict::Discard,
            format!(
                "below minimums: median {} < {}, p75 {} < {}",
                views(median),
                views(median_min),
                views(p75),
                views(p75_min)
            ),
        ),
    };

    Screening {
        verdict,
        reason,
        base_score,
    }
}

pub fn monetization_modifier(label: MonetizationLabel) -> f64 {
    match label {
        MonetizationLabel::AffiliateAndAds => 10.0,
        MonetizationLabel::AdsOnly => 5.0,
        MonetizationLabel::AffiliateOnly => 3.0,
        MonetizationLabel::HardToMonetize => -5.0,
    }
}

pub fn automation_modifier(suitable: bool) -> f64 {
    if suitable {
        5.0
    } else {
        -2.0
    }
}

pub fn monetizable_ratio_modifier(monetizable_pct: f64) -> f64 {
    if monetizable_pct < 10.0 {
        -10.0
    } else if monetizable_pct > 30.0 {
        10.0
    } else {
        0.0
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    round1(score.clamp(0.0, 100.0))
}

/// Base score plus additive modifiers, clamped to [0, 100].
pub fn refined_score(base_score: f64, classification: &Classification) -> f64 {
    clamp_score(
        base_score
            + monetization_modifier(classification.monetization)
            + automation_modifier(classification.automation.is_suitable())
            + monetizable_ratio_modifier(classification.titles.monetizable_pct),
    )
}

pub fn weighted_components(
    snapshot: &NicheSnapshot,
    classification: &Classification,
    saturation: &Saturation,
) -> WeightedComponents {
    let engagement_score = if snapshot.total_views > 0 {
        (snapshot.total_likes as f64 / snapshot.total_views as f64 * 1000.0).min(1.0)
    } else {
        NEUTRAL_ENGAGEMENT
    };

    WeightedComponents {
        views_score: (snapshot.avg_views / VIEWS_NORMALIZER).clamp(0.0, 1.0),
        competition_score: saturation.risk.competition_score(),
        automation_bonus: if classification.automation.is_suitable() {
            AUTOMATION_BONUS
        } else {
            0.0
        },
        monetization_multiplier: classification.monetization.potential().multiplier(),
        engagement_score,
    }
}

pub fn weighted_score(c: &WeightedComponents) -> f64 {
    let raw = W_VIEWS * c.views_score
        + W_COMPETITION * c.competition_score
        + W_AUTOMATION * c.automation_bonus
        + W_MONETIZATION * (c.monetization_multiplier - MULTIPLIER_BASELINE)
        + W_ENGAGEMENT * c.engagement_score;
    let unit = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
    clamp_score(unit * 100.0)
}

pub fn decide(
    snapshot: &NicheSnapshot,
    classification: &Classification,
    saturation: &Saturation,
    thresholds: &Thresholds,
    strategy: ScoringStrategy,
) -> Decision {
    if snapshot.is_empty() {
        return Decision {
            verdict: Verdict::Discard,
            reason: NO_VIDEOS_REASON.to_string(),
            strategy,
            base_score: 0.0,
            opportunity_score: 0.0,
            components: None,
        };
    }

    let screening = screen(snapshot.median_views, snapshot.p75_views, thresholds);

    let (opportunity_score, components) = match strategy {
        ScoringStrategy::SoftThreshold => (refined_score(screening.base_score, classification), None),
        ScoringStrategy::WeightedSum => {
            let c = weighted_components(snapshot, classification, saturation);
            (weighted_score(&c), Some(c))
        }
    };

    Decision {
        verdict: screening.verdict,
        reason: screening.reason,
        strategy,
        base_score: screening.base_score,
        opportunity_score,
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::niche::{
        AutomationAssessment, AutomationLabel, SaturationRisk, TitleMonetization,
    };

    fn thresholds() -> Thresholds {
        Thresholds::new(5000.0, 20000.0).unwrap()
    }

    fn classification(
        monetization: MonetizationLabel,
        automation: AutomationLabel,
        monetizable_pct: f64,
    ) -> Classification {
        Classification {
            monetization,
            automation: AutomationAssessment {
                label: automation,
                matching_videos: 0,
                sampled_videos: 5,
                ratio_pct: 0.0,
            },
            titles: TitleMonetization {
                monetizable_pct,
                ..TitleMonetization::empty()
            },
        }
    }

    fn snapshot(median: f64, p75: f64) -> NicheSnapshot {
        NicheSnapshot {
            video_count: 10,
            total_views: 100_000,
            avg_views: 10_000.0,
            median_views: median,
            p75_views: p75,
            max_views: 50_000,
            min_views: 10,
            total_likes: 1_000,
            total_comments: 100,
        }
    }

    fn saturation(risk: SaturationRisk) -> Saturation {
        Saturation { ratio: 0.5, risk }
    }

    #[test]
    fn recommended_iff_both_minimums_met() {
        let t = thresholds();
        assert_eq!(screen(5000.0, 20000.0, &t).verdict, Verdict::Recommended);
        assert_eq!(screen(9000.0, 90000.0, &t).verdict, Verdict::Recommended);
        assert_eq!(screen(4999.0, 90000.0, &t).verdict, Verdict::Evaluate);
        assert_eq!(screen(9000.0, 19999.0, &t).verdict, Verdict::Evaluate);
    }

    #[test]
    fn evaluate_when_both_reach_sixty_percent() {
        let t = thresholds();
        let s = screen(3000.0, 12000.0, &t);
        assert_eq!(s.verdict, Verdict::Evaluate);
        assert_eq!(s.base_score, 60.0);
    }

    #[test]
    fn discard_when_neither_met_and_not_both_near() {
        let t = thresholds();
        assert_eq!(screen(2999.0, 11999.0, &t).verdict, Verdict::Discard);
        assert_eq!(screen(0.0, 0.0, &t).verdict, Verdict::Discard);
        // Only one value reaches 60%: still a discard.
        assert_eq!(screen(4000.0, 1000.0, &t).verdict, Verdict::Discard);
    }

    #[test]
    fn verdict_grid_matches_rule() {
        let t = thresholds();
        for m in (0..=12).map(|i| i as f64 * 500.0) {
            for p in (0..=12).map(|i| i as f64 * 2000.0) {
                let v = screen(m, p, &t).verdict;
                let expected = if m >= 5000.0 && p >= 20000.0 {
                    Verdict::Recommended
                } else if m >= 5000.0 || p >= 20000.0 || (m >= 3000.0 && p >= 12000.0) {
                    Verdict::Evaluate
                } else {
                    Verdict::Discard
                };
                assert_eq!(v, expected, "median={m} p75={p}");
            }
        }
    }

    #[test]
    fn base_score_is_partial_credit() {
        let t = thresholds();
        assert_eq!(screen(2500.0, 20000.0, &t).base_score, 75.0);
        assert_eq!(screen(1_000_000.0, 1_000_000.0, &t).base_score, 100.0);
        assert_eq!(screen(1000.0, 3000.0, &t).base_score, 17.5);
    }

    #[test]
    fn zero_videos_is_explicit_discard() {
        let c = classification(MonetizationLabel::AffiliateAndAds, AutomationLabel::Yes, 90.0);
        for strategy in [ScoringStrategy::SoftThreshold, ScoringStrategy::WeightedSum] {
            let d = decide(
                &NicheSnapshot::empty(),
                &c,
                &saturation(SaturationRisk::Unknown),
                &thresholds(),
                strategy,
            );
            assert_eq!(d.verdict, Verdict::Discard);
            assert_eq!(d.opportunity_score, 0.0);
            assert_eq!(d.reason, NO_VIDEOS_REASON);
        }
    }

    #[test]
    fn modifiers_change_score_not_verdict() {
        let snap = snapshot(6000.0, 25000.0);
        let best = classification(MonetizationLabel::AffiliateAndAds, AutomationLabel::Yes, 50.0);
        let worst = classification(MonetizationLabel::HardToMonetize, AutomationLabel::No, 0.0);
        let sat = saturation(SaturationRisk::Medium);

        let a = decide(&snap, &best, &sat, &thresholds(), ScoringStrategy::SoftThreshold);
        let b = decide(&snap, &worst, &sat, &thresholds(), ScoringStrategy::SoftThreshold);
        assert_eq!(a.verdict, Verdict::Recommended);
        assert_eq!(b.verdict, Verdict::Recommended);
        assert_eq!(a.opportunity_score, 100.0);
        // 100 - 5 - 2 - 10
        assert_eq!(b.opportunity_score, 83.0);
    }

    #[test]
    fn refined_score_applies_each_modifier() {
        let c = classification(MonetizationLabel::AdsOnly, AutomationLabel::Partial, 20.0);
        // 50 + 5 - 2 + 0
        assert_eq!(refined_score(50.0, &c), 53.0);
        let c = classification(MonetizationLabel::AffiliateOnly, AutomationLabel::Yes, 31.0);
        // 50 + 3 + 5 + 10
        assert_eq!(refined_score(50.0, &c), 68.0);
        assert_eq!(monetizable_ratio_modifier(10.0), 0.0);
        assert_eq!(monetizable_ratio_modifier(30.0), 0.0);
        assert_eq!(monetizable_ratio_modifier(9.9), -10.0);
    }

    #[test]
    fn score_is_clamped_under_extreme_inputs() {
        let worst = classification(MonetizationLabel::HardToMonetize, AutomationLabel::No, 0.0);
        let best = classification(MonetizationLabel::AffiliateAndAds, AutomationLabel::Yes, 100.0);
        for base in [-1e12, -50.0, 0.0, 3.0, 99.9, 100.0, 1e12, f64::NAN] {
            for c in [&worst, &best] {
                let s = refined_score(base, c);
                assert!((0.0..=100.0).contains(&s), "base={base} score={s}");
            }
        }

        let wild = WeightedComponents {
            views_score: 50.0,
            competition_score: 9.0,
            automation_bonus: 9.0,
            monetization_multiplier: 99.0,
            engagement_score: 9.0,
        };
        assert_eq!(weighted_score(&wild), 100.0);
        let negative = WeightedComponents {
            views_score: -5.0,
            competition_score: -5.0,
            automation_bonus: 0.0,
            monetization_multiplier: -10.0,
            engagement_score: 0.0,
        };
        assert_eq!(weighted_score(&negative), 0.0);
    }

    #[test]
    fn weighted_sum_uses_normalized_components() {
        let snap = snapshot(6000.0, 25000.0);
        let c = classification(MonetizationLabel::AffiliateOnly, AutomationLabel::Yes, 50.0);
        let d = decide(
            &snap,
            &c,
            &saturation(SaturationRisk::Low),
            &thresholds(),
            ScoringStrategy::WeightedSum,
        );
        let comp = d.components.clone().unwrap();
        assert_eq!(comp.views_score, 0.1);
        assert_eq!(comp.competition_score, 1.0);
        assert_eq!(comp.automation_bonus, 0.2);
        assert_eq!(comp.monetization_multiplier, 1.0);
        assert_eq!(comp.engagement_score, 1.0);
        // 0.035 + 0.25 + 0.04 + 0.03 + 0.05 = 0.405
        assert_eq!(d.opportunity_score, 40.5);
        assert_eq!(d.verdict, Verdict::Recommended);
    }

    #[test]
    fn weighted_sum_neutral_engagement_without_views() {
        let snap = NicheSnapshot {
            total_views: 0,
            total_likes: 0,
            ..snapshot(0.0, 0.0)
        };
        let c = classification(MonetizationLabel::HardToMonetize, AutomationLabel::No, 0.0);
        let comp = weighted_components(&snap, &c, &saturation(SaturationRisk::High));
        assert_eq!(comp.engagement_score, 0.5);
    }

    #[test]
    fn thresholds_must_be_positive() {
        assert!(Thresholds::new(0.0, 1.0).is_err());
        assert!(Thresholds::new(1.0, -1.0).is_err());
        assert!(Thresholds::new(f64::NAN, 1.0).is_err());
    }
}
