use anyhow::Context;
use niche_core::ingest::trends::TrendProvider;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_KEYWORDS_FILE: &str = "keywords_to_check.txt";

#[derive(Debug, Clone)]
pub struct KeywordSources {
    pub manual: Vec<String>,
    pub file: Option<PathBuf>,
    pub from_trends: bool,
    pub max_keywords: usize,
}

impl KeywordSources {
    fn uses_default_file(&self) -> bool {
        self.manual.is_empty() && self.file.is_none() && !self.from_trends
    }
}

/// One keyword per line; blank lines and `#` comments are ignored.
pub fn parse_keywords(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_keywords_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keywords file {}", path.display()))?;
    Ok(parse_keywords(&text))
}

/// Trims, drops empties, removes case-insensitive duplicates (first wins) and caps.
pub fn dedupe_and_cap(keywords: impl IntoIterator<Item = String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .take(max)
        .collect()
}

pub async fn resolve(
    sources: &KeywordSources,
    trends: Option<&dyn TrendProvider>,
    region: &str,
) -> anyhow::Result<Vec<String>> {
    let mut all = sources.manual.clone();

    if let Some(path) = &sources.file {
        all.extend(read_keywords_file(path)?);
    }

    if sources.from_trends {
        let provider = trends.context("--from-trends needs TRENDS_BASE_URL to be configured")?;
        let seeds = provider
            .trending_searches(region, sources.max_keywords)
            .await
            .context("failed to fetch trending searches")?;
        tracing::info!(region, seeds = seeds.len(), "trending searches loaded");
        all.extend(seeds);
    }

    if sources.uses_default_file() {
        let path = Path::new(DEFAULT_KEYWORDS_FILE);
        anyhow::ensure!(
            path.exists(),
            "no keywords given: pass them as arguments, use --keywords-file or --from-trends, \
             or create {DEFAULT_KEYWORDS_FILE}"
        );
        all.extend(read_keywords_file(path)?);
    }

    let keywords = dedupe_and_cap(all, sources.max_keywords);
    anyhow::ensure!(!keywords.is_empty(), "keyword sources produced no keywords");
    Ok(keywords)
}
