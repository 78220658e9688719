//! Environment-driven settings, read once at startup.
//!
//! Every variable is trimmed and an empty value counts as unset, so a blank
//! `WEBBRIEF_LLM_API_KEY=` in an env file behaves like no key at all.

use crate::pipeline::PipelineConfig;

pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.a4f.co/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "provider-4/gpt-4.1";
pub const DEFAULT_GOOGLE_ENDPOINT: &str = "https://www.google.com/search";
pub const DEFAULT_BING_ENDPOINT: &str = "https://www.bing.com/search";
pub const DEFAULT_REQUEST_BUDGET_MS: u64 = 60_000;
pub const DEFAULT_PORT: u16 = 5_000;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub(crate) fn env_truthy(key: &str) -> bool {
    matches!(
        env(key).unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: env("WEBBRIEF_LLM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            model: env("WEBBRIEF_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_key: env("WEBBRIEF_LLM_API_KEY").or_else(|| env("OPENROUTER_API_KEY")),
            timeout_ms: env_u64("WEBBRIEF_LLM_TIMEOUT_MS", 30_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub brave_api_key: Option<String>,
    pub brave_endpoint: Option<String>,
    pub searxng_endpoint: Option<String>,
    pub google_endpoint: String,
    pub bing_endpoint: String,
    pub timeout_ms: u64,
}

impl SearchSettings {
    pub fn from_env() -> Self {
        Self {
            brave_api_key: env("WEBBRIEF_BRAVE_API_KEY").or_else(|| env("BRAVE_SEARCH_API_KEY")),
            brave_endpoint: env("WEBBRIEF_BRAVE_ENDPOINT"),
            searxng_endpoint: env("WEBBRIEF_SEARXNG_ENDPOINT"),
            google_endpoint: env("WEBBRIEF_GOOGLE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GOOGLE_ENDPOINT.to_string()),
            bing_endpoint: env("WEBBRIEF_BING_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_BING_ENDPOINT.to_string()),
            // Provider requests can hang without an explicit timeout; keep a sane cap.
            timeout_ms: env_u64("WEBBRIEF_SEARCH_TIMEOUT_MS", 20_000).clamp(1_000, 60_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub disabled: bool,
    pub node_bin: String,
    pub node_path: Option<String>,
}

impl RenderSettings {
    pub fn from_env() -> Self {
        Self {
            disabled: env_truthy("WEBBRIEF_RENDER_DISABLE"),
            node_bin: env("WEBBRIEF_NODE_BIN").unwrap_or_else(|| "node".to_string()),
            node_path: env("WEBBRIEF_NODE_PATH"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub render: RenderSettings,
    pub pipeline: PipelineConfig,
    /// Supervisory wall-clock budget for one query.
    pub request_budget_ms: u64,
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            desired_urls: env_usize("WEBBRIEF_DESIRED_URLS", defaults.desired_urls),
            max_parallel_fetches: env_usize(
                "WEBBRIEF_MAX_PARALLEL_FETCHES",
                defaults.max_parallel_fetches,
            )
            .max(1),
            fetch_timeout_ms: env_u64("WEBBRIEF_FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms),
            ..defaults
        };
        Self {
            llm: LlmSettings::from_env(),
            search: SearchSettings::from_env(),
            render: RenderSettings::from_env(),
            pipeline,
            request_budget_ms: env_u64("WEBBRIEF_REQUEST_BUDGET_MS", DEFAULT_REQUEST_BUDGET_MS),
        }
    }
}

/// Listen address for the HTTP API: `WEBBRIEF_BIND`, else `0.0.0.0:$PORT` (default 5000).
pub fn bind_from_env() -> String {
    env("WEBBRIEF_BIND").unwrap_or_else(|| {
        let port = env("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
        format!("0.0.0.0:{port}")
    })
}

/// Load `KEY=VALUE` lines from `WEBBRIEF_ENV_FILE`, if set.
///
/// Variables already present in the process environment are never overridden.
/// Values are not logged. Returns how many variables were set.
pub fn load_env_file_from_env() -> usize {
    let Some(p) = env("WEBBRIEF_ENV_FILE") else {
        return 0;
    };
    let Ok(txt) = std::fs::read_to_string(&p) else {
        tracing::warn!(path = %p, "WEBBRIEF_ENV_FILE is set but unreadable");
        return 0;
    };
    let mut n = 0usize;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
            n += 1;
        }
    }
    n
}
