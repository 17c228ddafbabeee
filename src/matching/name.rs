// src/matching/name.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::config::MAX_NAME_CHARS;

// Professional titles written with or without separators ("D.D.S.", "d d s", "dds").
// Punctuation is already gone by the time these run, so only whitespace can separate letters.
static TITLE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bd\s*d\s*s\b", "dds"),
        (r"\bm\s*d\b", "md"),
        (r"\bd\s*o\b", "do"),
        (r"\bp\s*a\b", "pa"),
        (r"\bd\s*v\s*m\b", "dvm"),
        (r"\bd\s*c\b", "dc"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            log::warn!("Invalid title pattern '{}': {}", pattern, e);
            None
        }
    })
    .collect()
});

// Legal-entity suffixes, only when they end the name
static LEGAL_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"\s+(inc|llc|corp|co|ltd|lp|llp|pllc|pc|pa|company|incorporated|corporation|limited)$",
    )
    .map_err(|e| log::warn!("Invalid legal suffix pattern: {}", e))
    .ok()
});

/// Cleans a raw name so it is safe to send to the embedding service and to use as a cache key.
///
/// Trims, caps the length at `MAX_NAME_CHARS` characters, turns every non-printable
/// character into a space, then collapses whitespace runs.
pub fn sanitize(name: &str) -> String {
    let capped: String = name
        .trim()
        .chars()
        .take(MAX_NAME_CHARS)
        .map(|c| if is_printable(c) { c } else { ' ' })
        .collect();

    capped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Printable means not in a control, format, surrogate, private-use or unassigned
// category, and not a separator other than the plain ASCII space.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

/// `sanitize` for values that may be missing (empty cells in the input files).
pub fn sanitize_opt(name: Option<&str>) -> String {
    name.map(sanitize).unwrap_or_default()
}

/// Normalized form used for lexical comparison.
///
/// Lowercases, drops quotes and other punctuation, canonicalizes professional titles,
/// and strips trailing legal-entity suffixes until none is left.
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();

    let without_punctuation: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut normalized = collapse_whitespace(&without_punctuation);

    for (re, replacement) in TITLE_PATTERNS.iter() {
        normalized = re.replace_all(&normalized, *replacement).into_owned();
    }

    if let Some(suffix_re) = LEGAL_SUFFIX.as_ref() {
        // "acme co inc" loses both suffixes
        while let Some(found) = suffix_re.find(&normalized) {
            normalized.truncate(found.start());
        }
    }

    collapse_whitespace(&normalized)
}

/// Sanitizes every name, dropping empties and duplicates while keeping first-appearance order.
pub fn unique_sanitized<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for raw in names {
        let clean = sanitize(raw.as_ref());
        if clean.is_empty() {
            continue;
        }
        if seen.insert(clean.clone()) {
            unique.push(clean);
        }
    }
    unique
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
