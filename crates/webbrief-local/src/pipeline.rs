//! The search aggregation pipeline.
//!
//! `Discovering -> Fetching -> Reducing -> Summarizing -> Ranking -> Done`, with an
//! absorbing `EarlyFallback` reachable from the first two stages. Collaborator failures
//! never escape: each one maps to a [`RunOutcome`] and a well-formed [`SearchResult`].

use crate::canonical::{canonicalize, normalized_key};
use crate::chunk::{leading_chunks, DEFAULT_MAX_CHUNK_CHARS};
use crate::extract::extract_page;
use crate::keywords::{filter_images, keywords, DEFAULT_TOP_KEYWORDS};
use crate::similarity::{sequence_ratio, ScoreFn};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use webbrief_core::{
    generic_summary, ExtractedPage, ImageCandidate, PageRenderer, RenderSession, RunOutcome,
    RunReport, SearchResult, Summarizer, UrlDiscovery,
};

/// Fragments need more than this many words to count as highlights.
const HIGHLIGHT_MIN_WORDS: usize = 5;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub desired_urls: usize,
    pub max_parallel_fetches: usize,
    pub fetch_timeout_ms: u64,
    pub chunk_max_chars: usize,
    pub chunks_per_page: usize,
    pub max_profile_images: usize,
    pub keyword_top_n: usize,
    pub score: ScoreFn,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            desired_urls: 7,
            max_parallel_fetches: 3,
            fetch_timeout_ms: 15_000,
            chunk_max_chars: DEFAULT_MAX_CHUNK_CHARS,
            chunks_per_page: 2,
            max_profile_images: 5,
            keyword_top_n: DEFAULT_TOP_KEYWORDS,
            score: sequence_ratio,
        }
    }
}

pub fn summary_task(query: &str) -> String {
    format!("Summarize the following web page content related to the query: {query}")
}

enum Stage {
    Discovering,
    Fetching(Vec<String>),
    Reducing(Vec<ExtractedPage>),
    Summarizing {
        pages: Vec<ExtractedPage>,
        chunks: Vec<String>,
    },
    Ranking {
        pages: Vec<ExtractedPage>,
        summary: String,
    },
    Done {
        outcome: RunOutcome,
        result: SearchResult,
        pages: Vec<ExtractedPage>,
    },
    EarlyFallback(RunOutcome),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Discovering => "discover",
            Self::Fetching(_) => "fetch",
            Self::Reducing(_) => "reduce",
            Self::Summarizing { .. } => "summarize",
            Self::Ranking { .. } => "rank",
            Self::Done { .. } => "done",
            Self::EarlyFallback(_) => "early_fallback",
        }
    }
}

pub struct Aggregator {
    discovery: Arc<dyn UrlDiscovery>,
    renderer: Arc<dyn PageRenderer>,
    summarizer: Arc<dyn Summarizer>,
    config: PipelineConfig,
}

impl Aggregator {
    pub fn new(
        discovery: Arc<dyn UrlDiscovery>,
        renderer: Arc<dyn PageRenderer>,
        summarizer: Arc<dyn Summarizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            discovery,
            renderer,
            summarizer,
            config,
        }
    }

    /// Run the whole pipeline for one query. Always yields a well-formed report.
    pub async fn run(&self, query: &str) -> RunReport {
        let t_total = Instant::now();
        let mut timings_ms = BTreeMap::new();
        let mut stage = Stage::Discovering;
        loop {
            let name = stage.name();
            let t0 = Instant::now();
            stage = match stage {
                Stage::Discovering => self.discover(query).await,
                Stage::Fetching(candidates) => self.fetch(query, candidates).await,
                Stage::Reducing(pages) => self.reduce(pages),
                Stage::Summarizing { pages, chunks } => {
                    self.summarize(query, pages, chunks).await
                }
                Stage::Ranking { pages, summary } => self.rank(query, pages, summary),
                Stage::Done {
                    outcome,
                    result,
                    pages,
                } => {
                    timings_ms.insert("total".to_string(), t_total.elapsed().as_millis());
                    tracing::info!(
                        outcome = outcome.as_str(),
                        sources = result.sources.len(),
                        images = result.profile_images.len(),
                        "pipeline finished"
                    );
                    return RunReport {
                        outcome,
                        result,
                        highlights: highlights(&pages),
                        timings_ms,
                    };
                }
                Stage::EarlyFallback(outcome) => {
                    tracing::info!(outcome = outcome.as_str(), "pipeline fell back early");
                    let mut report = RunReport::fallback(query, outcome);
                    timings_ms.insert("total".to_string(), t_total.elapsed().as_millis());
                    report.timings_ms = timings_ms;
                    return report;
                }
            };
            timings_ms.insert(name.to_string(), t0.elapsed().as_millis());
        }
    }

    async fn discover(&self, query: &str) -> Stage {
        let raw = match self.discovery.discover(query, self.config.desired_urls).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(error = %e, "discovery failed");
                return Stage::EarlyFallback(RunOutcome::NoCandidates);
            }
        };
        let candidates = canonicalize(&raw);
        tracing::info!(raw = raw.len(), candidates = candidates.len(), "discovered urls");
        if candidates.is_empty() {
            return Stage::EarlyFallback(RunOutcome::NoCandidates);
        }
        Stage::Fetching(candidates)
    }

    async fn fetch(&self, query: &str, candidates: Vec<String>) -> Stage {
        let session = match self.renderer.open_session().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not open a render session");
                return Stage::EarlyFallback(RunOutcome::NoContent);
            }
        };
        let pages = self.fetch_with(session.as_ref(), query, candidates).await;
        session.close().await;

        if !pages.iter().any(|p| !p.cleaned_body.is_empty()) {
            return Stage::EarlyFallback(RunOutcome::NoContent);
        }
        Stage::Reducing(pages)
    }

    /// Render and extract every candidate with bounded parallelism.
    ///
    /// Output keeps discovery order and holds at most one page per normalized URL.
    async fn fetch_with(
        &self,
        session: &dyn RenderSession,
        query: &str,
        candidates: Vec<String>,
    ) -> Vec<ExtractedPage> {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let score = self.config.score;
        let jobs = stream::iter(candidates.into_iter().enumerate());
        let mut fetched: Vec<(usize, ExtractedPage)> = jobs
            .map(|(idx, url)| async move {
                let Some(html) = session.render(&url, timeout).await else {
                    tracing::debug!(url = %url, "skipping: render returned nothing");
                    return None;
                };
                let q = query.to_string();
                // The parsed DOM is not `Send`; keep it on the blocking pool.
                let extracted = tokio::task::spawn_blocking(move || {
                    extract_page(&html, &url, &q, score)
                })
                .await;
                match extracted {
                    Ok(page) => Some((idx, page)),
                    Err(e) => {
                        tracing::warn!(error = %e, "extraction task failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.max_parallel_fetches.max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await;

        fetched.sort_by_key(|(idx, _)| *idx);
        let mut seen = HashSet::new();
        fetched
            .into_iter()
            .map(|(_, page)| page)
            .filter(|page| seen.insert(normalized_key(&page.url)))
            .collect()
    }

    fn reduce(&self, pages: Vec<ExtractedPage>) -> Stage {
        let chunks = leading_chunks(
            pages.iter().map(|p| p.cleaned_body.as_str()),
            self.config.chunk_max_chars,
            self.config.chunks_per_page,
        );
        tracing::debug!(pages = pages.len(), chunks = chunks.len(), "reduced pages to chunks");
        Stage::Summarizing { pages, chunks }
    }

    async fn summarize(
        &self,
        query: &str,
        pages: Vec<ExtractedPage>,
        chunks: Vec<String>,
    ) -> Stage {
        let summary = self
            .summarizer
            .summarize(&chunks, &summary_task(query))
            .await
            .trim()
            .to_string();
        if summary.is_empty() {
            tracing::warn!("summarizer produced nothing; returning generic summary");
            let result = SearchResult {
                query: query.to_string(),
                summary: generic_summary(query),
                sources: sources_of(&pages),
                profile_images: Vec::new(),
            };
            return Stage::Done {
                outcome: RunOutcome::SummaryUnavailable,
                result,
                pages,
            };
        }
        Stage::Ranking { pages, summary }
    }

    fn rank(&self, query: &str, pages: Vec<ExtractedPage>, summary: String) -> Stage {
        let kws = keywords(&summary, self.config.keyword_top_n);
        let images: Vec<ImageCandidate> =
            pages.iter().flat_map(|p| p.images.iter().cloned()).collect();
        let mut profile_images = filter_images(&images, &kws);
        profile_images.truncate(self.config.max_profile_images);
        let result = SearchResult {
            query: query.to_string(),
            summary,
            sources: sources_of(&pages),
            profile_images,
        };
        Stage::Done {
            outcome: RunOutcome::Completed,
            result,
            pages,
        }
    }
}

fn sources_of(pages: &[ExtractedPage]) -> Vec<String> {
    pages.iter().map(|p| p.url.clone()).collect()
}

/// Distinct ranked fragments with more than five words, in page order.
fn highlights(pages: &[ExtractedPage]) -> Vec<String> {
    let mut seen = HashSet::new();
    pages
        .iter()
        .flat_map(|p| p.ranked_texts.iter())
        .filter(|t| t.split_whitespace().count() > HIGHLIGHT_MIN_WORDS)
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Run `agg` under a wall-clock budget.
///
/// On expiry the pipeline task is aborted, which drops its in-flight renders and the
/// render session, and the timeout flavour of the early fallback is returned.
pub async fn run_with_deadline(
    agg: Arc<Aggregator>,
    query: &str,
    budget: Duration,
) -> RunReport {
    let q = query.to_string();
    let mut task = tokio::spawn(async move { agg.run(&q).await });
    match tokio::time::timeout(budget, &mut task).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "pipeline task failed");
            RunReport::fallback(query, RunOutcome::Aborted)
        }
        Err(_) => {
            task.abort();
            let budget_ms = budget.as_millis() as u64;
            tracing::warn!(budget_ms, "pipeline exceeded its budget");
            RunReport::fallback(query, RunOutcome::TimedOut)
        }
    }
}
