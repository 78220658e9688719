//! Text relevance scoring used to rank extracted fragments against the query.

/// Pluggable relevance function: `(fragment, query) -> score`, higher is more relevant.
pub type ScoreFn = fn(&str, &str) -> f64;

/// Case-insensitive Ratcliff/Obershelp ratio in `[0, 1]`.
///
/// `2 * M / T` where `M` counts characters in the recursively found longest common
/// blocks and `T` is the combined length. Two empty strings score `1.0`.
pub fn sequence_ratio(text: &str, query: &str) -> f64 {
    let a: Vec<char> = text.to_lowercase().chars().collect();
    let b: Vec<char> = query.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0usize;
    let mut stack = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = stack.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            stack.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            stack.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties resolve to the smallest start in `a`, then the smallest start in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi.saturating_sub(blo);
    let mut best = (alo, blo, 0usize);
    if width == 0 || ahi <= alo {
        return best;
    }
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for jj in 0..width {
            if a[i] == b[blo + jj] {
                let k = prev[jj] + 1;
                cur[jj + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, blo + jj + 1 - k, k);
                }
            } else {
                cur[jj + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

/// Sort `texts` by descending score against `query`, keeping document order on ties,
/// and keep the first `limit`.
pub fn rank_by_relevance(
    texts: Vec<String>,
    query: &str,
    score: ScoreFn,
    limit: usize,
) -> Vec<String> {
    let mut scored: Vec<(f64, String)> = texts
        .into_iter()
        .map(|t| (score(&t, query), t))
        .collect();
    scored.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ratio_matches_known_values() {
        // Values cross-checked against the classic sequence matcher.
        assert!(close(sequence_ratio("abcd", "bcde"), 0.75));
        assert!(close(sequence_ratio("", ""), 1.0));
        assert!(close(sequence_ratio("abc", ""), 0.0));
        assert!(close(sequence_ratio("Rust", "rust"), 1.0));
        // "qabxcd" vs "abycdf": blocks "ab" and "cd" -> 2*4/12.
        assert!(close(sequence_ratio("qabxcd", "abycdf"), 8.0 / 12.0));
    }

    #[test]
    fn ranking_prefers_closer_text_and_is_stable_on_ties() {
        let texts = vec![
            "zzzz".to_string(),
            "rust programming".to_string(),
            "yyyy".to_string(),
            "rust".to_string(),
        ];
        let out = rank_by_relevance(texts, "rust", sequence_ratio, 3);
        assert_eq!(out[0], "rust");
        assert_eq!(out[1], "rust programming");
        // Both zero-score fragments tie; document order decides.
        assert_eq!(out[2], "zzzz");
    }

    #[test]
    fn ranking_accepts_custom_scorers() {
        fn by_len(t: &str, _q: &str) -> f64 {
            t.len() as f64
        }
        let out = rank_by_relevance(
            vec!["a".into(), "abc".into(), "ab".into()],
            "q",
            by_len,
            2,
        );
        assert_eq!(out, vec!["abc".to_string(), "ab".to_string()]);
    }
}
