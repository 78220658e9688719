use crate::similarity::{rank_by_relevance, ScoreFn};
use regex::Regex;
use std::sync::LazyLock;
use webbrief_core::{ExtractedPage, ImageCandidate};

/// Most ranked fragments kept per page.
pub const MAX_RANKED_TEXTS: usize = 5;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

static RE_CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(["']?(.*?)["']?\)"#).expect("valid regex"));

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Parse once and produce everything the pipeline needs from one page.
///
/// Runs synchronously: the parsed document is not `Send`, so async callers should
/// move this onto the blocking pool.
pub fn extract_page(html: &str, url: &str, query: &str, score: ScoreFn) -> ExtractedPage {
    let doc = html_scraper::Html::parse_document(html);
    let texts = text_fragments(&doc);
    ExtractedPage {
        url: url.to_string(),
        ranked_texts: rank_by_relevance(texts, query, score, MAX_RANKED_TEXTS),
        images: images_in(&doc, url),
        cleaned_body: body_text_of(&doc),
    }
}

/// Heading (h1-h3) and paragraph texts in document order, whitespace-normalized.
pub fn text_fragments_from_html(html: &str) -> Vec<String> {
    text_fragments(&html_scraper::Html::parse_document(html))
}

fn text_fragments(doc: &html_scraper::Html) -> Vec<String> {
    let Ok(sel) = html_scraper::Selector::parse("h1,h2,h3,p") else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(|el| norm_ws(&el.text().collect::<String>()))
        .filter(|t| has_any_text(t))
        .collect()
}

/// Candidate images: `<img>` sources plus inline CSS background images.
pub fn extract_images(html: &str, base_url: &str) -> Vec<ImageCandidate> {
    images_in(&html_scraper::Html::parse_document(html), base_url)
}

fn resolve(base: Option<&url::Url>, raw: &str) -> Option<url::Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    match base {
        Some(b) => b.join(raw).ok(),
        None => url::Url::parse(raw).ok(),
    }
}

fn has_image_extension(u: &url::Url) -> bool {
    let path = u.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn images_in(doc: &html_scraper::Html, base_url: &str) -> Vec<ImageCandidate> {
    let base = url::Url::parse(base_url).ok();
    let mut out = Vec::new();

    if let Ok(sel) = html_scraper::Selector::parse("img") {
        for el in doc.select(&sel) {
            let v = el.value();
            // Lazy-loading pages often leave `src` empty and put the real URL in `data-src`.
            let src = v
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| v.attr("data-src"))
                .unwrap_or("");
            let Some(abs) = resolve(base.as_ref(), src) else {
                continue;
            };
            if !has_image_extension(&abs) {
                continue;
            }
            out.push(ImageCandidate {
                url: abs.to_string(),
                alt: v.attr("alt").unwrap_or("").trim().to_lowercase(),
                class: norm_ws(v.attr("class").unwrap_or("")).to_lowercase(),
            });
        }
    }

    if let Ok(sel) = html_scraper::Selector::parse("div,span,section") {
        for el in doc.select(&sel) {
            let Some(style) = el.value().attr("style") else {
                continue;
            };
            if !style.contains("background-image") {
                continue;
            }
            let Some(raw) = RE_CSS_URL.captures(style).and_then(|c| c.get(1)) else {
                continue;
            };
            let Some(abs) = resolve(base.as_ref(), raw.as_str()) else {
                continue;
            };
            out.push(ImageCandidate {
                url: abs.to_string(),
                alt: String::new(),
                class: "background".to_string(),
            });
        }
    }

    out
}

/// Plain text of `<body>` without script/style content, whitespace collapsed.
pub fn body_text(html: &str) -> String {
    body_text_of(&html_scraper::Html::parse_document(html))
}

fn is_hidden_text_container(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

fn body_text_of(doc: &html_scraper::Html) -> String {
    let Ok(sel) = html_scraper::Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = doc.select(&sel).next() else {
        return String::new();
    };
    let mut parts: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| is_hidden_text_container(e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    norm_ws(&parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::sequence_ratio;

    const PAGE: &str = r#"
    <html>
      <head><title>T</title><style>body { color: red }</style></head>
      <body>
        <h1>Rust ownership</h1>
        <p>   </p>
        <p>Borrowing rules explained in
           detail.</p>
        <h4>ignored heading level</h4>
        <script>var x = "secret script";</script>
        <img src="/img/Crab.PNG" alt="  Ferris The Crab " class="Hero wide">
        <img src="" data-src="lazy/photo.jpg">
        <img src="data:image/png;base64,AAAA" alt="inline">
        <img src="/icons/sprite.svg" alt="vector">
        <div style="background-image: url('/bg/banner.jpg')">banner</div>
        <section style="color: blue">plain</section>
      </body>
    </html>
    "#;

    #[test]
    fn fragments_are_headings_and_paragraphs_without_blanks() {
        let t = text_fragments_from_html(PAGE);
        assert_eq!(
            t,
            vec![
                "Rust ownership".to_string(),
                "Borrowing rules explained in detail.".to_string()
            ]
        );
    }

    #[test]
    fn images_resolve_relative_urls_and_filter_extensions() {
        let imgs = extract_images(PAGE, "https://example.com/docs/page.html");
        let urls: Vec<&str> = imgs.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/img/Crab.PNG",
                "https://example.com/docs/lazy/photo.jpg",
                "https://example.com/bg/banner.jpg",
            ]
        );
        assert_eq!(imgs[0].alt, "ferris the crab");
        assert_eq!(imgs[0].class, "hero wide");
        assert_eq!(imgs[2].class, "background");
        assert_eq!(imgs[2].alt, "");
    }

    #[test]
    fn image_extension_check_ignores_query_strings() {
        let html = r#"<img src="https://cdn.example.com/a.webp?w=300"><img src="https://cdn.example.com/a.php?img=b.png">"#;
        let imgs = extract_images(html, "https://example.com/");
        assert_eq!(imgs.len(), 1);
        assert_eq!(imgs[0].url, "https://cdn.example.com/a.webp?w=300");
    }

    #[test]
    fn css_url_pattern_compiles_and_strips_quotes() {
        for (style, want) in [
            ("background-image: url('/a.jpg')", "/a.jpg"),
            ("background-image:url(\"b.png\")", "b.png"),
            ("background-image: url(/c)", "/c"),
        ] {
            let got = RE_CSS_URL.captures(style).and_then(|c| c.get(1));
            assert_eq!(got.map(|m| m.as_str()), Some(want), "{style}");
        }
    }

    #[test]
    fn body_text_drops_script_and_style_and_collapses_whitespace() {
        let b = body_text(PAGE);
        assert!(b.starts_with("Rust ownership Borrowing rules explained in detail."));
        assert!(!b.contains("secret script"));
        assert!(!b.contains("color: red"));
        assert!(b.ends_with("banner plain"));
        assert!(!b.contains("  "));
    }

    #[test]
    fn extract_page_ranks_fragments_against_query() {
        let html = r#"<body>
            <p>Completely unrelated words here</p>
            <h2>ownership</h2>
            <p>A note on rust ownership</p>
        </body>"#;
        let page = extract_page(html, "https://example.com/", "ownership", sequence_ratio);
        assert_eq!(page.url, "https://example.com/");
        assert_eq!(page.ranked_texts[0], "ownership");
        assert_eq!(page.ranked_texts.len(), 3);
        assert!(page.cleaned_body.contains("A note on rust ownership"));
    }

    #[test]
    fn extract_page_keeps_at_most_five_fragments() {
        let html: String = (0..9).map(|i| format!("<p>para {i}</p>")).collect();
        let page = extract_page(&html, "https://example.com/", "para", sequence_ratio);
        assert_eq!(page.ranked_texts.len(), MAX_RANKED_TEXTS);
    }
}
