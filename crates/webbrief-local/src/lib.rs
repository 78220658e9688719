use std::sync::Arc;
use std::time::Duration;
use webbrief_core::{Error, Result};

pub mod canonical;
pub mod chunk;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod keywords;
pub mod openai_compat;
pub mod pipeline;
pub mod render_playwright;
pub mod search;
pub mod similarity;

pub use config::Settings;
pub use discovery::TieredDiscovery;
pub use openai_compat::ChatSummarizer;
pub use pipeline::{run_with_deadline, Aggregator, PipelineConfig};
pub use render_playwright::PlaywrightRenderer;

/// Shared HTTP client for search providers and the summarization endpoint.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("webbrief/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        // Safety defaults: avoid "hang forever" on DNS/TLS/body stalls.
        // Per-request timeouts still override this.
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Wire the production collaborators from `settings`.
pub fn aggregator_from_settings(settings: &Settings) -> Result<Aggregator> {
    let client = http_client()?;
    let discovery = TieredDiscovery::from_settings(client.clone(), &settings.search);
    tracing::debug!(tiers = ?discovery.tier_names(), "discovery tiers");
    Ok(Aggregator::new(
        Arc::new(discovery),
        Arc::new(PlaywrightRenderer::new(settings.render.clone())),
        Arc::new(ChatSummarizer::from_settings(client, &settings.llm)),
        settings.pipeline.clone(),
    ))
}
