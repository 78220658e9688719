use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// General-reference pages used when nothing better can be produced.
///
/// Discovery falls back to this list when every provider tier fails, and the
/// early-fallback response reports it as `sources`.
pub const FALLBACK_URLS: [&str; 5] = [
    "https://en.wikipedia.org/wiki/Main_Page",
    "https://www.bbc.com/news",
    "https://www.cnn.com",
    "https://www.nytimes.com",
    "https://www.theguardian.com/international",
];

pub fn fallback_urls() -> Vec<String> {
    FALLBACK_URLS.iter().map(|s| s.to_string()).collect()
}

pub fn generic_summary(query: &str) -> String {
    format!("Here are some general resources related to '{query}'.")
}

/// The final answer for one query. Serialized as the HTTP response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub summary: String,
    pub sources: Vec<String>,
    pub profile_images: Vec<String>,
}

impl SearchResult {
    /// Result used when the pipeline cannot produce real content at all.
    pub fn early_fallback(query: &str) -> Self {
        Self {
            query: query.to_string(),
            summary: generic_summary(query),
            sources: fallback_urls(),
            profile_images: Vec::new(),
        }
    }

    /// Early fallback substituted by the supervisory timeout.
    pub fn timed_out(query: &str) -> Self {
        Self {
            summary: format!(
                "{} The search took longer than expected, so we're providing these general results.",
                generic_summary(query)
            ),
            ..Self::early_fallback(query)
        }
    }

    /// Early fallback for a pipeline run that died unexpectedly.
    pub fn aborted(query: &str) -> Self {
        Self {
            summary: format!(
                "Here are some general resources that might be related to '{query}'."
            ),
            ..Self::early_fallback(query)
        }
    }
}

/// Which path of the pipeline produced a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    SummaryUnavailable,
    NoCandidates,
    NoContent,
    TimedOut,
    Aborted,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SummaryUnavailable => "summary_unavailable",
            Self::NoCandidates => "no_candidates",
            Self::NoContent => "no_content",
            Self::TimedOut => "timed_out",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_fallback(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Result plus diagnostics for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub result: SearchResult,
    /// Distinct ranked text fragments across fetched pages (page order).
    pub highlights: Vec<String>,
    pub timings_ms: BTreeMap<String, u128>,
}

impl RunReport {
    pub fn fallback(query: &str, outcome: RunOutcome) -> Self {
        let result = match outcome {
            RunOutcome::TimedOut => SearchResult::timed_out(query),
            RunOutcome::Aborted => SearchResult::aborted(query),
            _ => SearchResult::early_fallback(query),
        };
        Self {
            outcome,
            result,
            highlights: Vec::new(),
            timings_ms: BTreeMap::new(),
        }
    }
}

/// An image found on a fetched page, with the metadata used for relevance scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    /// Lowercased, trimmed `alt` text.
    pub alt: String,
    /// Lowercased CSS class tokens joined by single spaces.
    pub class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    /// Heading/paragraph fragments, most relevant first (bounded).
    pub ranked_texts: Vec<String>,
    pub images: Vec<ImageCandidate>,
    pub cleaned_body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

impl SearchResponse {
    pub fn urls(&self) -> Vec<String> {
        self.results.iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// Query -> ordered candidate URLs.
#[async_trait::async_trait]
pub trait UrlDiscovery: Send + Sync {
    async fn discover(&self, query: &str, desired: usize) -> Result<Vec<String>>;
}

/// One live rendering session (for example, one headless browser).
///
/// Sessions are owned by a single fetch batch. `close` releases the underlying
/// resources; implementations must also release them on drop.
#[async_trait::async_trait]
pub trait RenderSession: Send + Sync {
    /// Render `url` and return its HTML, or `None` on any failure or timeout.
    async fn render(&self, url: &str, timeout: Duration) -> Option<String>;
    async fn close(self: Box<Self>);
}

#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>>;
}

/// Chunks + task description -> synthesized text. Empty output means failure.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, chunks: &[String], task: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_fallback_uses_fixed_sources_and_generic_summary() {
        let r = SearchResult::early_fallback("rust");
        assert_eq!(r.sources.len(), FALLBACK_URLS.len());
        assert_eq!(r.summary, "Here are some general resources related to 'rust'.");
        assert!(r.profile_images.is_empty());
    }

    #[test]
    fn timed_out_keeps_fallback_sources_but_says_so() {
        let r = SearchResult::timed_out("rust");
        assert_eq!(r.sources, fallback_urls());
        assert!(r.summary.contains("took longer than expected"));
    }

    #[test]
    fn aborted_runs_get_their_own_wording() {
        let r = RunReport::fallback("rust", RunOutcome::Aborted).result;
        assert_eq!(
            r.summary,
            "Here are some general resources that might be related to 'rust'."
        );
        assert_eq!(r.sources, fallback_urls());
        let r = RunReport::fallback("rust", RunOutcome::NoContent).result;
        assert_eq!(r.summary, generic_summary("rust"));
    }

    #[test]
    fn only_completed_runs_are_not_fallbacks() {
        assert!(!RunOutcome::Completed.is_fallback());
        for o in [
            RunOutcome::SummaryUnavailable,
            RunOutcome::NoCandidates,
            RunOutcome::NoContent,
            RunOutcome::TimedOut,
            RunOutcome::Aborted,
        ] {
            assert!(o.is_fallback(), "{o:?}");
        }
    }

    #[test]
    fn search_result_wire_shape_is_snake_case() {
        let r = SearchResult::early_fallback("q");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("profile_images").is_some());
        assert_eq!(v["query"].as_str(), Some("q"));
    }

    #[test]
    fn run_outcome_serializes_like_as_str() {
        for o in [
            RunOutcome::Completed,
            RunOutcome::SummaryUnavailable,
            RunOutcome::NoCandidates,
            RunOutcome::NoContent,
            RunOutcome::TimedOut,
            RunOutcome::Aborted,
        ] {
            let v = serde_json::to_value(o).unwrap();
            assert_eq!(v.as_str(), Some(o.as_str()));
        }
    }
}
