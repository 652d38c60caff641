use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::config::GatherConfig;
use crate::error::{FetchError, FetchResult};

/// Social platforms whose pages are login-walled or script-rendered;
/// fetching them yields noise, so they are skipped outright.
const BLOCKED_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "linkedin.com",
    "youtube.com",
];

/// Binary formats the text extractor cannot handle.
const BLOCKED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".rar",
    ".exe", ".dmg", ".iso", ".mp3", ".mp4", ".avi", ".mov", ".png", ".jpg", ".jpeg", ".gif",
    ".svg", ".webp", ".css", ".js",
];

/// Upper bound on extracted page text, in characters.
const MAX_TEXT_LEN: usize = 50_000;

/// Raw-page retrieval boundary; the crawler never talks to the network
/// directly, so tests can substitute a canned implementation.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<String>;
}

/// `reqwest`-backed fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(config: &GatherConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(concat!("research-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self {
            client,
            timeout_ms: config.fetch_timeout_ms,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout_ms,
                }
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(FetchError::Http)
    }
}

/// One successfully scraped page.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Link distance from the seed set; seeds are depth 0.
    pub depth: u32,
}

/// Crawl outcome: the pages that yielded text, plus per-URL failures.
/// Failures never abort a crawl.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub pages: Vec<ScrapedPage>,
    pub failures: Vec<(String, String)>,
}

/// Breadth-first crawler bounded by depth, per-page link count, and a
/// concurrency limit on in-flight fetches.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    config: GatherConfig,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: GatherConfig) -> Self {
        Self { fetcher, config }
    }

    /// Crawl outward from `seeds`. Each URL is fetched at most once; pages
    /// at the maximum depth are fetched but their links are not followed.
    pub async fn crawl(&self, seeds: &[String]) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();
        let mut visited: HashSet<String> = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));

        let mut frontier: Vec<String> = seeds
            .iter()
            .filter(|u| is_scrapeable_url(u))
            .filter(|u| visited.insert((*u).clone()))
            .cloned()
            .collect();

        for depth in 0..=self.config.max_scrape_depth {
            if frontier.is_empty() {
                break;
            }
            debug!(depth, urls = frontier.len(), "crawling frontier");

            let mut tasks: JoinSet<(String, FetchResult<String>)> = JoinSet::new();
            for url in frontier.drain(..) {
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let result = match tokio::time::timeout(timeout, fetcher.fetch(&url)).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout {
                            url: url.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    };
                    (url, result)
                });
            }

            let mut next_frontier = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let (url, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "fetch task panicked");
                        continue;
                    }
                };

                let html = match result {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(url = %url, error = %e, "page fetch failed, skipping");
                        outcome.failures.push((url, e.to_string()));
                        continue;
                    }
                };

                let links = if depth < self.config.max_scrape_depth {
                    extract_links(&url, &html, self.config.max_links_per_page)
                } else {
                    Vec::new()
                };
                for link in links {
                    if visited.insert(link.clone()) {
                        next_frontier.push(link);
                    }
                }

                outcome.pages.push(ScrapedPage {
                    title: extract_title(&html),
                    content: extract_text(&html),
                    url,
                    depth,
                });
            }

            frontier = next_frontier;
        }

        debug!(
            pages = outcome.pages.len(),
            failures = outcome.failures.len(),
            "crawl finished"
        );
        outcome
    }
}

/// Whether a URL is worth fetching: http(s), not a blocked platform, not a
/// binary format.
pub fn is_scrapeable_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if BLOCKED_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    {
        return false;
    }
    let path = url.path().to_ascii_lowercase();
    !BLOCKED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Heuristic reliability for a scraped domain.
pub fn domain_reliability(raw: &str) -> f64 {
    let Ok(url) = Url::parse(raw) else {
        return 0.6;
    };
    let Some(host) = url.host_str() else {
        return 0.6;
    };
    let host = host.to_ascii_lowercase();

    if host.ends_with(".edu") || host.ends_with(".gov") || host.ends_with("wikipedia.org") {
        return 0.9;
    }
    if host.ends_with(".org") {
        return 0.8;
    }
    0.6
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"'#]+)["']"#).unwrap())
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

fn script_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").unwrap()
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap())
}

/// Absolute, deduplicated, scrapeable links from a page, capped at
/// `max_links` in document order.
pub fn extract_links(base: &str, html: &str, max_links: usize) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for capture in href_regex().captures_iter(html) {
        if links.len() >= max_links {
            break;
        }
        let href = &capture[1];
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        let mut resolved = resolved;
        resolved.set_fragment(None);
        let absolute = resolved.to_string();
        if is_scrapeable_url(&absolute) && seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }
    links
}

/// Page title, or an empty string when the document has none.
pub fn extract_title(html: &str) -> String {
    title_regex()
        .captures(html)
        .map(|c| collapse_whitespace(&c[1]))
        .unwrap_or_default()
}

/// Visible text content: scripts/styles removed, tags stripped, whitespace
/// collapsed, length capped.
pub fn extract_text(html: &str) -> String {
    let without_scripts = script_style_regex().replace_all(html, " ");
    let without_tags = tag_regex().replace_all(&without_scripts, " ");
    let mut text = collapse_whitespace(&without_tags);
    if text.len() > MAX_TEXT_LEN {
        let mut end = MAX_TEXT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
