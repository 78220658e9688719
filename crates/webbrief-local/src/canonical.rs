use std::collections::HashSet;

/// True for absolute http(s) URLs with a host that are not search-engine result pages.
pub fn validate(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    let lc = url.to_ascii_lowercase();
    if !lc.starts_with("http") || lc.contains("google.com/search") {
        return false;
    }
    let Ok(u) = url::Url::parse(url) else {
        return false;
    };
    if !matches!(u.scheme(), "http" | "https") {
        return false;
    }
    u.host_str().is_some_and(|h| !h.is_empty())
}

/// Dedupe key: lowercased host (plus explicit port) + path, trailing slashes stripped.
///
/// Unparseable input falls back to the lowercased raw string so it still dedupes.
pub fn normalized_key(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match url::Url::parse(trimmed) {
        Ok(u) => {
            // `Url` already lowercases hosts of special schemes; be explicit for the rest.
            let host = u.host_str().unwrap_or("").to_lowercase();
            let path = u.path().trim_end_matches('/');
            match u.port() {
                Some(port) => format!("{host}:{port}{path}"),
                None => format!("{host}{path}"),
            }
        }
        Err(_) => trimmed.to_lowercase(),
    }
}

/// Stable dedupe: the first URL seen for each normalized key wins, original casing kept.
pub fn dedupe<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for u in urls {
        let u = u.as_ref();
        if seen.insert(normalized_key(u)) {
            out.push(u.to_string());
        }
    }
    out
}

/// Validate then dedupe, preserving discovery order.
pub fn canonicalize<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let valid: Vec<&str> = urls
        .iter()
        .map(|u| u.as_ref())
        .filter(|u| validate(u))
        .collect();
    dedupe(&valid)
}
