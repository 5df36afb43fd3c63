//! Keyword and title classifiers. Pure functions: case-insensitive substring
//! containment against fixed vocabularies, no I/O.

use crate::analysis::stats::pct;
use crate::domain::niche::{
    AutomationAssessment, AutomationLabel, Classification, MonetizationLabel, TitleMonetization,
    VideoMetric,
};

/// Number of top videos (by views) sampled for the automation check.
pub const AUTOMATION_SAMPLE: usize = 5;

/// Comparison, review and purchase-intent vocabulary.
const AFFILIATE_TERMS: &[&str] = &[
    // es
    "review",
    "reseña",
    "comparativa",
    "comparación",
    "mejores",
    "mejor precio",
    "cual comprar",
    "comprar",
    "precio",
    "barato",
    "oferta",
    "descuento",
    "cupón",
    "promoción",
    "producto",
    "marca",
    "calidad",
    "recomendación",
    "análisis",
    "opinión",
    "unboxing",
    "ranking",
    "top 10",
    "gadgets",
    "accesorios",
    "herramientas",
    "equipamiento",
    "amazon",
    "link en la descripción",
    // en
    "buy",
    "deal",
    "price",
    "coupon",
    "discount",
    "cheap",
    "best",
    "comparison",
    "which to buy",
    "product",
    "brand",
    "quality",
    "recommendation",
    "analysis",
    "equipment",
    "accessories",
    "referral",
    "affiliate",
    "sponsored",
    "link in description",
    "vs",
];

/// High-CPM advertising vocabulary: finance, insurance, education, legal.
const AD_TERMS: &[&str] = &[
    // es
    "finanzas",
    "criptomonedas",
    "bitcoin",
    "invertir",
    "inversión",
    "banca",
    "banco",
    "seguros",
    "hipoteca",
    "préstamo",
    "prestamo",
    "ahorro",
    "jubilación",
    "bolsa",
    "forex",
    "trading",
    "dinero",
    "negocio",
    "emprendimiento",
    "marketing",
    "curso",
    "formación",
    "educación",
    "psicología",
    "coaching",
    "salud",
    "abogado",
    "desarrollo personal",
    // en
    "finance",
    "crypto",
    "invest",
    "banking",
    "insurance",
    "mortgage",
    "loan",
    "savings",
    "retirement",
    "stock market",
    "credit card",
    "real estate",
    "passive income",
    "money",
    "business",
    "entrepreneur",
    "course",
    "training",
    "education",
    "psychology",
    "health",
    "lawyer",
    "attorney",
];

/// Structural / how-to vocabulary that scripted or templated content can cover.
const AUTOMATION_TERMS: &[&str] = &[
    "review",
    "top",
    "mejores",
    "best",
    "comparativa",
    "comparison",
    "vs",
    "guía",
    "guide",
    "tutorial",
    "cómo",
    "how to",
    "paso a paso",
    "step by step",
    "qué es",
    "what is",
    "explicación",
    "explained",
    "tipos de",
    "types of",
    "características",
    "features",
    "ventajas",
    "pros y contras",
    "pros and cons",
    "beneficios",
    "benefits",
    "lista",
    "ranking",
    "recomendaciones",
    "consejos",
    "tips",
    "curso",
    "course",
    "método",
    "estrategia",
    "técnica",
];

/// Personal / on-camera vocabulary. Any match disqualifies a title.
const PERSONAL_TERMS: &[&str] = &[
    "vlog",
    "mi experiencia",
    "my experience",
    "reacción",
    "reaction",
    "gameplay",
    "en vivo",
    "en directo",
    "livestream",
    "mi historia",
    "my story",
    "testimonio",
    "día en mi vida",
    "day in my life",
    "rutina",
    "routine",
    "behind the scenes",
    "challenge",
    "q&a",
    "manualidades",
    "diy",
    "mi caso",
    "conmigo",
    "with me",
    "así lo hago",
    "haul",
    "unboxing",
];

fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| haystack.contains(t))
}

pub fn has_affiliate_intent(text: &str) -> bool {
    contains_any(&text.to_lowercase(), AFFILIATE_TERMS)
}

pub fn has_ad_intent(text: &str) -> bool {
    contains_any(&text.to_lowercase(), AD_TERMS)
}

pub fn classify_monetization(text: &str) -> MonetizationLabel {
    MonetizationLabel::from_matches(has_affiliate_intent(text), has_ad_intent(text))
}

/// A title is automatable when it carries structural vocabulary and no personal vocabulary.
pub fn is_automatable(text: &str) -> bool {
    let lower = text.to_lowercase();
    if contains_any(&lower, PERSONAL_TERMS) {
        return false;
    }
    contains_any(&lower, AUTOMATION_TERMS)
}

/// The `AUTOMATION_SAMPLE` most viewed videos; ties keep relevance order.
pub fn top_by_views(videos: &[VideoMetric]) -> Vec<&VideoMetric> {
    let mut ranked: Vec<&VideoMetric> = videos.iter().collect();
    ranked.sort_by(|a, b| b.view_count.cmp(&a.view_count));
    ranked.truncate(AUTOMATION_SAMPLE);
    ranked
}

pub fn assess_automation(videos: &[VideoMetric]) -> AutomationAssessment {
    let sample = top_by_views(videos);
    let matching = sample.iter().filter(|v| is_automatable(&v.title)).count();
    AutomationAssessment {
        label: AutomationLabel::from_count(matching),
        matching_videos: matching,
        sampled_videos: sample.len(),
        ratio_pct: pct(matching, sample.len()),
    }
}

pub fn analyze_titles(videos: &[VideoMetric]) -> TitleMonetization {
    if videos.is_empty() {
        return TitleMonetization::empty();
    }

    let mut affiliate = 0;
    let mut ads = 0;
    let mut monetizable = 0;
    for video in videos {
        let a = has_affiliate_intent(&video.title);
        let d = has_ad_intent(&video.title);
        affiliate += usize::from(a);
        ads += usize::from(d);
        monetizable += usize::from(a || d);
    }

    let n = videos.len();
    TitleMonetization {
        affiliate_videos: affiliate,
        ad_videos: ads,
        monetizable_videos: monetizable,
        affiliate_pct: pct(affiliate, n),
        ads_pct: pct(ads, n),
        monetizable_pct: pct(monetizable, n),
    }
}

/// Full classification of a keyword: the monetization label comes from the keyword
/// text, automation and title ratios from the fetched videos.
pub fn classify(keyword: &str, videos: &[VideoMetric]) -> Classification {
    Classification {
        monetization: classify_monetization(keyword),
        automation: assess_automation(videos),
        titles: analyze_titles(videos),
    }
}
