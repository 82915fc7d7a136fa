//! Comparison keys for segments.
//!
//! The pipeline order is fixed: tags, case, punctuation/whitespace, digits, plurals.
//! A later step can rebuild an earlier step's input (digit collapse turning an over-long
//! tag id into a valid token), so the pipeline is repeated until its output is stable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sentinels::TAG_TOKEN_RE;

static PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{P}+").expect("punct regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Nd}+").expect("digits regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").expect("word regex"));

/// Placeholder every digit run collapses to.
pub const NUMBER_PLACEHOLDER: &str = "0";

const PLURAL_MIN_CHARS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub ignore_tags: bool,
    pub ignore_case: bool,
    pub ignore_punctuation: bool,
    pub ignore_whitespace: bool,
    pub ignore_numbers: bool,
    pub ignore_plurals: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            ignore_tags: true,
            ignore_case: false,
            ignore_punctuation: false,
            ignore_whitespace: true,
            ignore_numbers: false,
            ignore_plurals: false,
        }
    }
}

impl NormalizeOptions {
    pub fn exact() -> Self {
        Self {
            ignore_tags: false,
            ignore_case: false,
            ignore_punctuation: false,
            ignore_whitespace: false,
            ignore_numbers: false,
            ignore_plurals: false,
        }
    }
}

/// `lang` is the language of `text`; only plural stripping looks at it.
pub fn normalize(text: &str, options: &NormalizeOptions, lang: &str) -> String {
    let mut out = normalize_pass(text, options, lang);
    // After the first pass the text is lowercase if requested, so every further
    // change shortens it and the loop terminates.
    loop {
        let next = normalize_pass(&out, options, lang);
        if next == out {
            return out;
        }
        out = next;
    }
}

fn normalize_pass(text: &str, options: &NormalizeOptions, lang: &str) -> String {
    let mut out = text.to_string();

    if options.ignore_tags {
        // Removing a token can splice a new one together; repeat until none remain.
        while TAG_TOKEN_RE.is_match(&out) {
            out = TAG_TOKEN_RE.replace_all(&out, "").into_owned();
        }
    }

    if options.ignore_case {
        out = out.to_lowercase();
    }

    if options.ignore_punctuation {
        out = PUNCT_RE.replace_all(&out, "").into_owned();
    }
    if options.ignore_whitespace {
        out = SPACE_RE.replace_all(&out, " ").trim().to_string();
    }

    if options.ignore_numbers {
        out = DIGITS_RE
            .replace_all(&out, NUMBER_PLACEHOLDER)
            .into_owned();
    }

    if options.ignore_plurals && is_english(lang) {
        out = WORD_RE
            .replace_all(&out, |caps: &regex::Captures<'_>| strip_plural(&caps[0]))
            .into_owned();
    }

    out
}

fn is_english(lang: &str) -> bool {
    let lang = lang.trim().to_ascii_lowercase();
    lang == "en" || lang.starts_with("en-") || lang.starts_with("en_")
}

/// "boxes" -> "box", "cats" -> "cat"; leaves "class", "status", "this" alone.
fn strip_plural(word: &str) -> String {
    if word.chars().count() < PLURAL_MIN_CHARS {
        return word.to_string();
    }
    let lower = word.to_lowercase();
    if !lower.ends_with('s') || lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }
    let es_suffix = ["sses", "ches", "shes", "xes", "zes"]
        .iter()
        .any(|suf| lower.ends_with(suf));
    let cut = if es_suffix { 2 } else { 1 };
    match word.len().checked_sub(cut) {
        Some(at) if word.is_char_boundary(at) => word[..at].to_string(),
        _ => word.to_string(),
    }
}
