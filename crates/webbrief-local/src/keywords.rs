use std::collections::{HashMap, HashSet};
use webbrief_core::ImageCandidate;

pub const DEFAULT_TOP_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;

/// Most frequent words of the summary, lowercased.
///
/// A word is a maximal run of word characters (alphanumeric or `_`) made only of ASCII
/// letters and at least four long. Ties keep first-occurrence order.
pub fn keywords(summary: &str, top_n: usize) -> Vec<String> {
    let lower = summary.to_lowercase();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for w in lower.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if w.len() < MIN_KEYWORD_LEN || !w.bytes().all(|b| b.is_ascii_lowercase()) {
            continue;
        }
        let n = counts.entry(w).or_insert(0);
        if *n == 0 {
            order.push(w);
        }
        *n += 1;
    }
    let mut ranked: Vec<(usize, &str)> = order.into_iter().map(|w| (counts[w], w)).collect();
    // Stable sort: equal counts stay in first-occurrence order.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(_, w)| w.to_string())
        .collect()
}

/// URLs of images whose metadata mentions at least one keyword.
///
/// Matching is substring-based over `alt + url + class`, lowercased. Output is
/// deduplicated by exact URL and keeps first-occurrence order.
pub fn filter_images(images: &[ImageCandidate], keywords: &[String]) -> Vec<String> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for img in images {
        let hay = format!("{} {} {}", img.alt, img.url, img.class).to_lowercase();
        if !keywords.iter().any(|k| hay.contains(k.as_str())) {
            continue;
        }
        if seen.insert(img.url.as_str()) {
            out.push(img.url.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(url: &str, alt: &str) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            alt: alt.to_string(),
            class: String::new(),
        }
    }

    #[test]
    fn keywords_rank_by_frequency_then_first_occurrence() {
        assert_eq!(
            keywords("cats cats dogs dogs dogs birds", 2),
            vec!["dogs".to_string(), "cats".to_string()]
        );
        assert_eq!(
            keywords("birds cats cats birds", 10),
            vec!["birds".to_string(), "cats".to_string()]
        );
    }

    #[test]
    fn keywords_skip_short_mixed_and_non_ascii_words() {
        let ks = keywords("The cat ate rust2024 and café WORDS words", 10);
        assert_eq!(ks, vec!["words".to_string()]);
    }

    #[test]
    fn keywords_split_on_punctuation() {
        let ks = keywords("Rust's ownership-model: ownership!", 10);
        assert_eq!(ks, vec!["ownership", "rust", "model"]);
    }

    #[test]
    fn filter_keeps_only_images_mentioning_a_keyword() {
        let images = vec![img("a.png", "cute cat"), img("b.png", "car")];
        let out = filter_images(&images, &["cat".to_string()]);
        assert_eq!(out, vec!["a.png".to_string()]);
    }

    #[test]
    fn filter_matches_url_and_class_and_dedupes() {
        let images = vec![
            img("https://x.com/rust-logo.png", ""),
            ImageCandidate {
                url: "https://x.com/hero.png".to_string(),
                alt: String::new(),
                class: "background".to_string(),
            },
            img("https://x.com/rust-logo.png", "logo"),
        ];
        let out = filter_images(&images, &["rust".to_string(), "background".to_string()]);
        assert_eq!(
            out,
            vec![
                "https://x.com/rust-logo.png".to_string(),
                "https://x.com/hero.png".to_string()
            ]
        );
    }

    #[test]
    fn filter_with_no_keywords_keeps_nothing() {
        let images = vec![img("a.png", "anything")];
        assert!(filter_images(&images, &[]).is_empty());
    }
}
