use crate::canonical::validate;
use crate::config::SearchSettings;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use webbrief_core::{Error, Result, SearchHit, SearchProvider, SearchQuery, SearchResponse};

const DEFAULT_BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Hosts whose links on a Bing results page are navigation, not results.
const BING_OWN_DOMAINS: [&str; 2] = ["bing.com", "microsoft.com"];

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    // Keep a conservative cap even if callers pass something huge.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

fn finish(provider: &str, hits: Vec<SearchHit>, t0: Instant) -> SearchResponse {
    let mut timings_ms = BTreeMap::new();
    timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
    SearchResponse {
        results: hits,
        provider: provider.to_string(),
        timings_ms,
    }
}

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl BraveSearchProvider {
    pub fn new(client: reqwest::Client, api_key: String, endpoint: Option<String>) -> Self {
        Self {
            client,
            api_key,
            // Docs: https://api.search.brave.com/res/v1/web/search
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_BRAVE_ENDPOINT.to_string()),
        }
    }

    pub fn from_settings(client: reqwest::Client, s: &SearchSettings) -> Result<Self> {
        let api_key = s.brave_api_key.clone().ok_or_else(|| {
            Error::NotConfigured(
                "missing WEBBRIEF_BRAVE_API_KEY (or BRAVE_SEARCH_API_KEY)".to_string(),
            )
        })?;
        Ok(Self::new(client, api_key, s.brave_endpoint.clone()))
    }
}

impl SearxngSearchProvider {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn from_settings(client: reqwest::Client, s: &SearchSettings) -> Result<Self> {
        let endpoint = s.searxng_endpoint.clone().ok_or_else(|| {
            Error::NotConfigured("missing WEBBRIEF_SEARXNG_ENDPOINT".to_string())
        })?;
        Ok(Self::new(client, endpoint))
    }

    fn endpoint_search_for(base_endpoint: &str) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            // Brave uses `count` for result count and caps it at 20.
            req = req.query(&[("count", n.min(20).to_string())]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("brave search HTTP {status}")));
        }

        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let hits = parsed
            .web
            .and_then(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.description,
                source: "brave".to_string(),
            })
            .collect();
        Ok(finish("brave", hits, t0))
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10).min(20);
        let timeout_ms = timeout_ms_from_query(q);

        let resp = self
            .client
            .get(Self::endpoint_search_for(&self.endpoint))
            .query(&[("q", q.query.as_str()), ("format", "json")])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let hits = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(SearchHit {
                    url: r.url?,
                    title: r.title,
                    snippet: r.content,
                    source: "searxng".to_string(),
                })
            })
            .take(max_results)
            .collect();
        Ok(finish("searxng", hits, t0))
    }
}

/// Scrapes Google's HTML results page for `/url?q=` redirect links.
#[derive(Debug, Clone)]
pub struct GoogleHtmlProvider {
    client: reqwest::Client,
    endpoint: String,
}

/// Scrapes Bing's HTML results page for outbound absolute links.
#[derive(Debug, Clone)]
pub struct BingHtmlProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleHtmlProvider {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

impl BingHtmlProvider {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

async fn fetch_results_page(
    req: reqwest::RequestBuilder,
    q: &SearchQuery,
    provider: &str,
) -> Result<String> {
    let resp = req
        .query(&[("q", q.query.as_str())])
        .header(reqwest::header::USER_AGENT, BROWSER_UA)
        .header(reqwest::header::ACCEPT, BROWSER_ACCEPT)
        .header(reqwest::header::ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
        .timeout(std::time::Duration::from_millis(timeout_ms_from_query(q)))
        .send()
        .await
        .map_err(|e| Error::Search(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Search(format!("{provider} results page HTTP {status}")));
    }
    resp.text().await.map_err(|e| Error::Search(e.to_string()))
}

fn anchor_hrefs(html: &str) -> Vec<String> {
    let doc = html_scraper::Html::parse_document(html);
    let Ok(sel) = html_scraper::Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .collect()
}

/// Redirect targets of `/url?q=...` anchors, percent-decoded and validated.
pub fn google_result_urls(html: &str) -> Vec<String> {
    anchor_hrefs(html)
        .into_iter()
        .filter_map(|href| {
            let rest = href.strip_prefix("/url?")?;
            url::form_urlencoded::parse(rest.as_bytes())
                .find(|(k, _)| k == "q")
                .map(|(_, v)| v.into_owned())
        })
        .filter(|u| validate(u))
        .collect()
}

fn is_bing_own(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    BING_OWN_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Absolute links on a Bing results page that leave Bing/Microsoft, validated.
pub fn bing_result_urls(html: &str) -> Vec<String> {
    anchor_hrefs(html)
        .into_iter()
        .filter(|href| href.to_ascii_lowercase().starts_with("http"))
        .filter(|href| {
            url::Url::parse(href)
                .ok()
                .and_then(|u| u.host_str().map(|h| !is_bing_own(h)))
                .unwrap_or(false)
        })
        .filter(|u| validate(u))
        .collect()
}

fn scraped_hits(urls: Vec<String>, source: &str, max_results: Option<usize>) -> Vec<SearchHit> {
    urls.into_iter()
        .take(max_results.unwrap_or(usize::MAX))
        .map(|url| SearchHit {
            url,
            title: None,
            snippet: None,
            source: source.to_string(),
        })
        .collect()
}

#[async_trait::async_trait]
impl SearchProvider for GoogleHtmlProvider {
    fn name(&self) -> &'static str {
        "google_html"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let req = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::REFERER, "https://www.google.com/")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1");
        let html = fetch_results_page(req, q, self.name()).await?;
        let hits = scraped_hits(google_result_urls(&html), self.name(), q.max_results);
        Ok(finish(self.name(), hits, t0))
    }
}

#[async_trait::async_trait]
impl SearchProvider for BingHtmlProvider {
    fn name(&self) -> &'static str {
        "bing_html"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let html = fetch_results_page(self.client.get(&self.endpoint), q, self.name()).await?;
        let hits = scraped_hits(bing_result_urls(&html), self.name(), q.max_results);
        Ok(finish(self.name(), hits, t0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query, http::header, http::HeaderMap, http::StatusCode, routing::get, Router,
    };
    use std::collections::HashMap;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn query(q: &str, n: usize) -> SearchQuery {
        SearchQuery {
            query: q.to_string(),
            max_results: Some(n),
            timeout_ms: Some(2_000),
        }
    }

    const GOOGLE_PAGE: &str = r#"
    <html><body>
      <a href="/search?q=rust&tbm=isch">Images</a>
      <a href="/url?q=https://www.rust-lang.org/learn&amp;sa=U&amp;ved=abc">Learn Rust</a>
      <a href="/url?q=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F%3Fx%3D1&amp;sa=U">The Book</a>
      <a href="/url?q=https://www.google.com/search%3Fq%3Dmore&amp;sa=U">More</a>
      <a href="/url?sa=U&amp;q=ftp://files.example.com/">FTP</a>
      <a href="https://accounts.google.com/">Sign in</a>
    </body></html>
    "#;

    const BING_PAGE: &str = r#"
    <html><body>
      <a href="https://www.bing.com/images">Images</a>
      <a href="https://go.microsoft.com/fwlink">Privacy</a>
      <a href="https://example.com/a">Result A</a>
      <a href="/search?q=next">Next</a>
      <a href="http://example.org/b?x=1">Result B</a>
      <a href="https://notbing.com.evil.test/c">Result C</a>
    </body></html>
    "#;

    #[test]
    fn parses_minimal_brave_shape() {
        let js = r#"
        {
          "web": {
            "results": [
              {"url":"https://example.com","title":"Example","description":"Hello"}
            ]
          }
        }
        "#;
        let parsed: BraveWebSearchResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.web.unwrap().results.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].url, "https://example.com");
        assert_eq!(rs[0].title.as_deref(), Some("Example"));
        assert_eq!(rs[0].description.as_deref(), Some("Hello"));
    }

    #[test]
    fn parses_minimal_searxng_shape() {
        let js = r#"
        {
          "results": [
            {"url":"https://example.com","title":"Example","content":"Hello"},
            {"title":"no url"}
          ]
        }
        "#;
        let parsed: SearxngSearchResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.results.unwrap().len(), 2);
    }

    #[test]
    fn searxng_endpoint_accepts_base_or_search_path() {
        assert_eq!(
            SearxngSearchProvider::endpoint_search_for("http://sx.local/"),
            "http://sx.local/search"
        );
        assert_eq!(
            SearxngSearchProvider::endpoint_search_for("http://sx.local/search"),
            "http://sx.local/search"
        );
    }

    #[test]
    fn google_page_yields_decoded_valid_redirect_targets() {
        assert_eq!(
            google_result_urls(GOOGLE_PAGE),
            vec![
                "https://www.rust-lang.org/learn".to_string(),
                "https://doc.rust-lang.org/book/?x=1".to_string(),
            ]
        );
    }

    #[test]
    fn bing_page_skips_own_domains_and_relative_links() {
        assert_eq!(
            bing_result_urls(BING_PAGE),
            vec![
                "https://example.com/a".to_string(),
                "http://example.org/b?x=1".to_string(),
                "https://notbing.com.evil.test/c".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn google_provider_sends_browser_headers_and_truncates() {
        async fn results(
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> (StatusCode, String) {
            let ua = headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let q = params.get("q").map(String::as_str);
            if !ua.starts_with("Mozilla/5.0") || q != Some("rust lang") {
                return (StatusCode::BAD_REQUEST, String::new());
            }
            (StatusCode::OK, GOOGLE_PAGE.to_string())
        }
        let app = Router::new().route("/search", get(results));
        let addr = serve(app).await;
        let p = GoogleHtmlProvider::new(reqwest::Client::new(), format!("http://{addr}/search"));
        let r = p.search(&query("rust lang", 1)).await.unwrap();
        assert_eq!(r.provider, "google_html");
        assert_eq!(r.urls(), vec!["https://www.rust-lang.org/learn".to_string()]);
    }

    #[tokio::test]
    async fn non_success_status_is_a_provider_error() {
        let app = Router::new().route(
            "/search",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let addr = serve(app).await;
        let p = BingHtmlProvider::new(reqwest::Client::new(), format!("http://{addr}/search"));
        let err = p.search(&query("rust", 7)).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[tokio::test]
    async fn searxng_provider_skips_results_without_url() {
        let app = Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("format").map(String::as_str), Some("json"));
                axum::Json(serde_json::json!({
                    "results": [
                        {"title": "no url"},
                        {"url": "https://example.com/x", "content": "snippet"}
                    ]
                }))
            }),
        );
        let addr = serve(app).await;
        let p = SearxngSearchProvider::new(reqwest::Client::new(), format!("http://{addr}/"));
        let r = p.search(&query("rust", 7)).await.unwrap();
        assert_eq!(r.urls(), vec!["https://example.com/x".to_string()]);
        assert_eq!(r.results[0].snippet.as_deref(), Some("snippet"));
    }

    #[test]
    fn brave_requires_a_key() {
        let s = SearchSettings {
            brave_api_key: None,
            brave_endpoint: None,
            searxng_endpoint: None,
            google_endpoint: String::new(),
            bing_endpoint: String::new(),
            timeout_ms: 1_000,
        };
        let err = BraveSearchProvider::from_settings(reqwest::Client::new(), &s).unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
        assert!(SearxngSearchProvider::from_settings(reqwest::Client::new(), &s).is_err());
    }
}
