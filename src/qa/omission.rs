use once_cell::sync::Lazy;
use regex::Regex;

use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::OmissionSettings;
use crate::textutil::{has_letters, word_spans};

static TERMINATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]+(?:\s|$)").expect("terminator regex"));

pub(super) fn check(view: &UnitView<'_>, s: &OmissionSettings, out: &mut Findings<'_>) {
    let src = view.src_words.text.trim();
    let tgt = view.tgt_words.text.trim();
    if src.is_empty() {
        return;
    }
    if tgt.is_empty() {
        if s.empty_target {
            out.push(codes::EMPTY_TARGET, Severity::Error, "Target is empty", &[], &[]);
        }
        return;
    }

    if s.same_as_source && src == tgt {
        let math_only = !has_letters(src);
        if !(s.ignore_math_only && math_only) {
            out.push(
                codes::SAME_AS_SOURCE,
                Severity::Warning,
                "Target is identical to source",
                &[(0, view.unit.source.text.len())],
                &[(0, view.unit.target.text.len())],
            );
        }
        // An identical target trivially contains every source fragment.
        return;
    }

    if s.partial_translation && s.partial_min_words > 0 {
        if let Some((src_range, tgt_range)) = untranslated_fragment(view, s.partial_min_words) {
            out.push(
                codes::PARTIAL_TRANSLATION,
                Severity::Warning,
                format!(
                    "Source fragment left untranslated: {:?}",
                    &view.unit.source.text[src_range.0..src_range.1]
                ),
                &[src_range],
                &[tgt_range],
            );
        }
    }

    if s.sentence_count {
        let a = TERMINATOR_RE.find_iter(src).count();
        let b = TERMINATOR_RE.find_iter(tgt).count();
        if a != b {
            out.push(
                codes::SENTENCE_COUNT,
                Severity::Info,
                format!("Sentence count differs: source {a}, target {b}"),
                &[],
                &[],
            );
        }
    }
}

/// First run of `min_words` consecutive source words that occurs verbatim (word-aligned) in the
/// target. Returned ranges are byte ranges in the tagged texts.
fn untranslated_fragment(
    view: &UnitView<'_>,
    min_words: usize,
) -> Option<((usize, usize), (usize, usize))> {
    let src = &view.src_words.text;
    let tgt = &view.tgt_words.text;
    let src_words = word_spans(src);
    let tgt_words = word_spans(tgt);
    if src_words.len() < min_words || tgt_words.len() < min_words {
        return None;
    }
    let src_tokens: Vec<String> = src_words.iter().map(|(s, e)| src[*s..*e].to_lowercase()).collect();
    let tgt_tokens: Vec<String> = tgt_words.iter().map(|(s, e)| tgt[*s..*e].to_lowercase()).collect();

    for i in 0..=src_tokens.len() - min_words {
        let window = &src_tokens[i..i + min_words];
        // Windows made only of numbers or single letters are not evidence of anything.
        if window.iter().all(|w| !w.chars().any(char::is_alphabetic) || w.chars().count() < 2) {
            continue;
        }
        for j in 0..=tgt_tokens.len() - min_words {
            if &tgt_tokens[j..j + min_words] == window {
                let s = view.src_words.origin(src_words[i].0, src_words[i + min_words - 1].1);
                let t = view.tgt_words.origin(tgt_words[j].0, tgt_words[j + min_words - 1].1);
                return Some((s, t));
            }
        }
    }
    None
}
