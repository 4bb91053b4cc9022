// src/normalize.rs
//! Text normalization shared by sealing, hashing, and similarity.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Hard cap on stored review text (chars).
pub const MAX_REVIEW_CHARS: usize = 5000;

/// Clean review text for storage: decode entities, strip tags,
/// fold typographic quotes, collapse whitespace, cap length.
pub fn normalize_review_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (NBSP included)
    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    // 5) Length cap
    if out.chars().count() > MAX_REVIEW_CHARS {
        out = out.chars().take(MAX_REVIEW_CHARS).collect();
    }

    out
}

/// Lowercase, drop punctuation, collapse whitespace. Basis for hashing and word sets.
pub fn fold_for_comparison(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
