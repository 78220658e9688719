//! Tiered URL discovery: structured search API, then scraped result pages, then a
//! fixed reference list. Never fails.

use crate::config::SearchSettings;
use crate::search::{
    BingHtmlProvider, BraveSearchProvider, GoogleHtmlProvider, SearxngSearchProvider,
};
use std::sync::Arc;
use webbrief_core::{fallback_urls, Result, SearchProvider, SearchQuery, UrlDiscovery};

pub struct TieredDiscovery {
    tiers: Vec<Arc<dyn SearchProvider>>,
    timeout_ms: u64,
}

impl TieredDiscovery {
    /// Tiers are tried in order; the hardcoded list is always the implicit last tier.
    pub fn new(tiers: Vec<Arc<dyn SearchProvider>>, timeout_ms: u64) -> Self {
        Self { tiers, timeout_ms }
    }

    pub fn from_settings(client: reqwest::Client, s: &SearchSettings) -> Self {
        let mut tiers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        match primary_provider(client.clone(), s) {
            Ok(p) => tiers.push(p),
            Err(e) => {
                tracing::info!(error = %e, "no search API configured; skipping primary tier")
            }
        }
        tiers.push(Arc::new(GoogleHtmlProvider::new(
            client.clone(),
            s.google_endpoint.clone(),
        )));
        tiers.push(Arc::new(BingHtmlProvider::new(client, s.bing_endpoint.clone())));
        Self::new(tiers, s.timeout_ms)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }
}

/// Brave when a key is set, else SearXNG when an endpoint is set.
fn primary_provider(
    client: reqwest::Client,
    s: &SearchSettings,
) -> Result<Arc<dyn SearchProvider>> {
    match BraveSearchProvider::from_settings(client.clone(), s) {
        Ok(p) => Ok(Arc::new(p)),
        Err(_) => Ok(Arc::new(SearxngSearchProvider::from_settings(client, s)?)),
    }
}

#[async_trait::async_trait]
impl UrlDiscovery for TieredDiscovery {
    async fn discover(&self, query: &str, desired: usize) -> Result<Vec<String>> {
        let q = SearchQuery {
            query: query.to_string(),
            max_results: Some(desired),
            timeout_ms: Some(self.timeout_ms),
        };
        for tier in &self.tiers {
            match tier.search(&q).await {
                Ok(resp) if !resp.results.is_empty() => {
                    let mut urls = resp.urls();
                    urls.truncate(desired);
                    tracing::info!(
                        provider = tier.name(),
                        n = urls.len(),
                        "discovery tier succeeded"
                    );
                    return Ok(urls);
                }
                Ok(_) => {
                    tracing::warn!(provider = tier.name(), "discovery tier returned no results")
                }
                Err(e) => {
                    tracing::warn!(provider = tier.name(), error = %e, "discovery tier failed")
                }
            }
        }
        tracing::warn!("all discovery tiers failed; using hardcoded reference list");
        let mut urls = fallback_urls();
        urls.truncate(desired);
        Ok(urls)
    }
}
