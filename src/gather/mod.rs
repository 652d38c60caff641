//! Multi-tier source gathering.
//!
//! The coordinator runs four acquisition tiers in priority order: internal
//! model knowledge, grounded search, document ingestion (a placeholder for
//! now), and web scraping seeded by the search tier. A tier that fails is
//! recorded and skipped; gathering as a whole never errors, it degrades.

mod scraper;

pub use scraper::{
    domain_reliability, extract_links, extract_text, extract_title, is_scrapeable_url, Crawler,
    HttpFetcher, PageFetcher, ScrapedPage,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::GatherConfig;
use crate::extract::{extract_with_retry, ExpectedShape};
use crate::intent::IntentResult;
use crate::model::ModelInvoker;
use crate::prompts;

/// Reliability assigned to internal-knowledge answers.
const INTERNAL_RELIABILITY: f64 = 0.75;
/// Reliability assigned to grounded-search snippets.
const SEARCH_RELIABILITY: f64 = 0.80;

/// Acquisition tier a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    InternalKnowledge,
    GroundedSearch,
    Document,
    ScrapedPage,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::InternalKnowledge => write!(f, "internal_knowledge"),
            SourceKind::GroundedSearch => write!(f, "grounded_search"),
            SourceKind::Document => write!(f, "document"),
            SourceKind::ScrapedPage => write!(f, "scraped_page"),
        }
    }
}

/// One piece of gathered material with its provenance and reliability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub kind: SourceKind,
    /// URL for web sources, a descriptive identifier otherwise.
    pub origin: String,
    pub content: String,
    /// Reliability in [0,1], assigned per tier or per domain.
    pub reliability: f64,
    /// Crawl depth for scraped pages; 0 for everything else.
    pub depth: u32,
}

/// One claim inside a detected conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingClaim {
    pub origin: String,
    pub claim: String,
}

/// A disagreement between sources. Detection only: `resolved` is persisted
/// for future use and is always false today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub topic: String,
    pub claims: Vec<ConflictingClaim>,
    #[serde(default)]
    pub resolved: bool,
}

/// Everything the gathering stage produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatheringResult {
    pub sources: Vec<SourceItem>,
    pub conflicts: Vec<ConflictRecord>,
    /// Tier-level failures, as (tier, message). Informational only.
    pub tier_errors: Vec<(String, String)>,
    /// True when query generation or conflict detection fell back.
    pub degraded: bool,
}

/// Runs the acquisition tiers and conflict detection for one session.
pub struct SourceCoordinator {
    model: Arc<dyn ModelInvoker>,
    fetcher: Arc<dyn PageFetcher>,
    config: GatherConfig,
    max_extract_attempts: u32,
}

impl SourceCoordinator {
    pub fn new(
        model: Arc<dyn ModelInvoker>,
        fetcher: Arc<dyn PageFetcher>,
        config: GatherConfig,
        max_extract_attempts: u32,
    ) -> Self {
        Self {
            model,
            fetcher,
            config,
            max_extract_attempts,
        }
    }

    /// Gather sources for the analyzed intent across all tiers.
    pub async fn gather(&self, intent: &IntentResult) -> GatheringResult {
        let mut result = GatheringResult::default();

        self.gather_internal(intent, &mut result).await;

        let seeds = self.gather_search(intent, &mut result).await;

        self.gather_documents(&mut result);

        self.gather_scraped(&seeds, &mut result).await;

        self.detect_conflicts(&mut result).await;

        info!(
            sources = result.sources.len(),
            conflicts = result.conflicts.len(),
            tier_errors = result.tier_errors.len(),
            degraded = result.degraded,
            "gathering complete"
        );
        result
    }

    /// Tier 1: answer research questions from the model's own knowledge.
    async fn gather_internal(&self, intent: &IntentResult, result: &mut GatheringResult) {
        for question in intent
            .research_questions
            .iter()
            .take(self.config.max_internal_questions)
        {
            let prompt = format!("{} {}", prompts::INTERNAL_KNOWLEDGE, question);
            match self.model.invoke(&prompt).await {
                Ok(answer) if !answer.trim().is_empty() => {
                    result.sources.push(SourceItem {
                        kind: SourceKind::InternalKnowledge,
                        origin: format!("internal:{}", question),
                        content: answer,
                        reliability: INTERNAL_RELIABILITY,
                        depth: 0,
                    });
                }
                Ok(_) => {
                    debug!(question = %question, "internal knowledge returned nothing");
                }
                Err(e) => {
                    warn!(question = %question, error = %e, "internal knowledge tier failed for question");
                    result
                        .tier_errors
                        .push(("internal_knowledge".to_string(), e.to_string()));
                }
            }
        }
    }

    /// Tier 2: grounded search. Returns the seed URLs for the scraping tier.
    async fn gather_search(
        &self,
        intent: &IntentResult,
        result: &mut GatheringResult,
    ) -> Vec<String> {
        let queries = self.generate_queries(intent, result).await;
        let mut seeds = Vec::new();

        for query in queries.iter().take(self.config.max_search_queries) {
            match self.model.search(query).await {
                Ok(hits) => {
                    for hit in hits {
                        if seeds.len() < self.config.max_seed_urls
                            && is_scrapeable_url(&hit.url)
                            && !seeds.contains(&hit.url)
                        {
                            seeds.push(hit.url.clone());
                        }
                        result.sources.push(SourceItem {
                            kind: SourceKind::GroundedSearch,
                            origin: hit.url,
                            content: hit.snippet,
                            reliability: SEARCH_RELIABILITY,
                            depth: 0,
                        });
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "grounded search failed for query");
                    result
                        .tier_errors
                        .push(("grounded_search".to_string(), e.to_string()));
                }
            }
        }

        seeds
    }

    /// Derive search queries from the intent, falling back to the research
    /// questions verbatim when extraction fails.
    async fn generate_queries(
        &self,
        intent: &IntentResult,
        result: &mut GatheringResult,
    ) -> Vec<String> {
        let intent_json =
            serde_json::to_string(intent).unwrap_or_else(|_| intent.initial_summary());
        let prompt = format!("{}\n{}", prompts::SEARCH_QUERIES, intent_json);
        let fallback = json!(intent.research_questions);

        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            ExpectedShape::Array,
            fallback,
            self.max_extract_attempts,
        )
        .await;

        if extracted.degraded {
            result.degraded = true;
        }

        extracted
            .value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tier 3: document ingestion. Not wired to any store yet; the tier
    /// exists so coverage accounting and ordering stay stable when it is.
    fn gather_documents(&self, _result: &mut GatheringResult) {
        debug!("document tier has no configured store, skipping");
    }

    /// Tier 4: breadth-first scraping from the search tier's seed URLs.
    async fn gather_scraped(&self, seeds: &[String], result: &mut GatheringResult) {
        if seeds.is_empty() {
            debug!("no seed urls, skipping scrape tier");
            return;
        }

        let crawler = Crawler::new(Arc::clone(&self.fetcher), self.config.clone());
        let outcome = crawler.crawl(seeds).await;

        for (url, message) in outcome.failures {
            result
                .tier_errors
                .push(("scraped_page".to_string(), format!("{}: {}", url, message)));
        }

        for page in outcome.pages {
            if page.content.is_empty() {
                continue;
            }
            let reliability = domain_reliability(&page.url);
            let content = if page.title.is_empty() {
                page.content
            } else {
                format!("{}\n{}", page.title, page.content)
            };
            result.sources.push(SourceItem {
                kind: SourceKind::ScrapedPage,
                origin: page.url,
                content,
                reliability,
                depth: page.depth,
            });
        }
    }

    /// Cross-source conflict detection. Falls back to "no conflicts" when
    /// extraction fails; a missed conflict degrades confidence, it does not
    /// block the pipeline.
    async fn detect_conflicts(&self, result: &mut GatheringResult) {
        if result.sources.len() < 2 {
            return;
        }

        let digest = source_digest(&result.sources);
        let prompt = format!("{}\n{}", prompts::CONFLICT_DETECTION, digest);

        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            ExpectedShape::Array,
            json!([]),
            self.max_extract_attempts,
        )
        .await;

        if extracted.degraded {
            result.degraded = true;
            return;
        }

        if let Ok(conflicts) = serde_json::from_value::<Vec<ConflictRecord>>(extracted.value) {
            result.conflicts = conflicts
                .into_iter()
                .filter(|c| c.claims.len() >= 2)
                .collect();
        }
    }
}

/// Compact per-source digest fed to conflict detection, bounded so large
/// crawls do not blow the prompt budget.
fn source_digest(sources: &[SourceItem]) -> String {
    const PER_SOURCE: usize = 500;
    sources
        .iter()
        .map(|s| {
            let mut content = s.content.as_str();
            if content.len() > PER_SOURCE {
                let mut end = PER_SOURCE;
                while !content.is_char_boundary(end) {
                    end -= 1;
                }
                content = &content[..end];
            }
            format!("[{}] {}: {}", s.kind, s.origin, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
