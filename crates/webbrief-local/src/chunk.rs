/// Default maximum chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 6_000;

/// Split `text` into contiguous, non-overlapping slices of at most `max_chars` characters.
///
/// Concatenating the output reproduces `text` exactly. Boundaries always fall on
/// `char` boundaries. A `max_chars` of 0 is treated as 1.
pub fn split(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// The first `per_page` chunks of each body, concatenated in page order.
pub fn leading_chunks<'a, I>(bodies: I, max_chars: usize, per_page: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    bodies
        .into_iter()
        .flat_map(|b| {
            split(b, max_chars)
                .into_iter()
                .take(per_page)
                .map(str::to_string)
        })
        .collect()
}
