//! Header normalization: accent folding, snake_case, collision suffixes.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_ALNUM_RUN: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Strips diacritics, lowercases, collapses non-alphanumeric runs to `_`
/// and trims boundary underscores.
///
/// Idempotent: normalizing an already-normalized name returns it unchanged.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    let collapsed = NON_ALNUM_RUN.replace_all(&folded, "_");
    collapsed.trim_matches('_').to_string()
}

/// Normalizes every header and makes the result unique.
///
/// Empty names become `column_<position>`. Repeats get `_2`, `_3`, ... in
/// order of appearance, skipping suffixes that collide with real headers.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let normalized: Vec<String> = raw
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let name = normalize_header(h);
            if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name
            }
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(normalized.len());
    for name in normalized {
        if taken.insert(name.clone()) {
            out.push(name);
            continue;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", name, suffix);
            if taken.insert(candidate.clone()) {
                out.push(candidate);
                break;
            }
            suffix += 1;
        }
    }
    out
}
