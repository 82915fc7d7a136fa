use once_cell::sync::Lazy;
use regex::Regex;

use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::{PunctuationSettings, SpacingMode, SpacingRule};
use crate::textutil::MappedText;

static PUNCT_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;:.!?](?:[ \t]*[,;:.!?])+").expect("punctuation run regex"));
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("multi space regex"));
static EMOTICON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:;=]-?[()\[\]]").expect("emoticon regex"));

const NBSPS: [char; 2] = ['\u{00A0}', '\u{202F}'];
const BRACKETS: [(char, char); 5] = [('(', ')'), ('[', ']'), ('{', '}'), ('“', '”'), ('«', '»')];

fn is_nbsp(c: char) -> bool {
    NBSPS.contains(&c)
}

fn is_plain_space(c: char) -> bool {
    c.is_whitespace() && !is_nbsp(c)
}

pub(super) fn check(view: &UnitView<'_>, s: &PunctuationSettings, out: &mut Findings<'_>) {
    let tgt = &view.tgt_joined;
    let src = &view.src_joined;

    for rule in &s.spacing {
        check_spacing(tgt, rule, codes::PUNCT_SPACING, out);
    }
    for rule in &s.special_signs {
        check_spacing(tgt, rule, codes::SIGN_SPACING, out);
    }
    if s.double_punctuation {
        check_double(src, tgt, out);
    }
    if s.bracket_balance && unbalanced_at(&src.text).is_none() {
        if let Some(at) = unbalanced_at(&tgt.text) {
            let len = tgt.text[at..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push(
                codes::UNBALANCED_BRACKETS,
                Severity::Warning,
                "Unbalanced brackets or quotes in target",
                &[],
                &[tgt.origin(at, at + len)],
            );
        }
    }
    if s.whitespace_parity {
        check_edges(view, out);
    }
    if s.double_spaces && !MULTI_SPACE_RE.is_match(&src.text) {
        let ranges: Vec<_> = MULTI_SPACE_RE
            .find_iter(&tgt.text)
            .map(|m| tgt.origin(m.start(), m.end()))
            .collect();
        if !ranges.is_empty() {
            out.push(codes::DOUBLE_SPACE, Severity::Info, "Double space in target", &[], &ranges);
        }
    }
}

/// A symbol between two digits ("3.14", "10:30", "1,000") or starting "://" is not punctuation.
fn in_token(text: &str, at: usize, c: char) -> bool {
    let prev = text[..at].chars().next_back();
    let next = text[at + c.len_utf8()..].chars().next();
    let digit = |o: Option<char>| o.map(|c| c.is_ascii_digit()).unwrap_or(false);
    if digit(prev) && digit(next) {
        return true;
    }
    c == ':' && next == Some('/')
}

fn spacing_ok(mode: SpacingMode, neighbour: Option<char>) -> bool {
    match (mode, neighbour) {
        (SpacingMode::Ignore, _) | (_, None) => true,
        (SpacingMode::Space, Some(n)) => is_plain_space(n),
        (SpacingMode::NoSpace, Some(n)) => !n.is_whitespace(),
        (SpacingMode::Nbsp, Some(n)) => is_nbsp(n),
    }
}

fn describe(mode: SpacingMode) -> &'static str {
    match mode {
        SpacingMode::Ignore => "any spacing",
        SpacingMode::Space => "a space",
        SpacingMode::NoSpace => "no space",
        SpacingMode::Nbsp => "a non-breaking space",
    }
}

fn check_spacing(tgt: &MappedText, rule: &SpacingRule, code: &str, out: &mut Findings<'_>) {
    let text = &tgt.text;
    for (at, c) in text.char_indices() {
        if !rule.symbols.contains(c) || in_token(text, at, c) {
            continue;
        }
        let end = at + c.len_utf8();
        let prev = text[..at].chars().next_back();
        let next = text[end..].chars().next();

        // Runs like "?!" or "..." are judged at their outer edges only.
        let prev_is_symbol = prev.map(|p| rule.symbols.contains(p)).unwrap_or(false);
        let next_is_symbol = next.map(|n| rule.symbols.contains(n)).unwrap_or(false);

        if !prev_is_symbol && !spacing_ok(rule.before, prev) {
            let from = prev.map(|p| at - p.len_utf8()).unwrap_or(at);
            out.push(
                code,
                Severity::Warning,
                format!("Expected {} before {c:?}", describe(rule.before)),
                &[],
                &[tgt.origin(from, end)],
            );
        }
        // Closing marks right after the symbol are part of it for spacing purposes.
        let next = next.filter(|n| !matches!(n, ')' | ']' | '}' | '"' | '”' | '»' | '’' | '\''));
        if !next_is_symbol && !spacing_ok(rule.after, next) {
            let to = next.map(|n| end + n.len_utf8()).unwrap_or(end);
            out.push(
                code,
                Severity::Warning,
                format!("Expected {} after {c:?}", describe(rule.after)),
                &[],
                &[tgt.origin(at, to)],
            );
        }
    }
}

fn check_double(src: &MappedText, tgt: &MappedText, out: &mut Findings<'_>) {
    for m in PUNCT_RUN_RE.find_iter(&tgt.text) {
        let compact: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        if compact.contains("...") || compact.chars().all(|c| c == '?' || c == '!') {
            continue;
        }
        if in_token(&tgt.text, m.start(), '.') && compact.starts_with('.') {
            continue;
        }
        if src.text.contains(&compact) {
            continue;
        }
        out.push(
            codes::DOUBLE_PUNCTUATION,
            Severity::Warning,
            format!("Double punctuation: {compact}"),
            &[],
            &[tgt.origin(m.start(), m.end())],
        );
    }
}

/// Byte offset of the first bracket that breaks nesting, if any.
fn unbalanced_at(text: &str) -> Option<usize> {
    let cleaned = EMOTICON_RE.replace_all(text, |c: &regex::Captures<'_>| " ".repeat(c[0].len()));
    let mut stack: Vec<(usize, char)> = Vec::new();
    for (at, c) in cleaned.char_indices() {
        if let Some((_, close)) = BRACKETS.iter().find(|(o, _)| *o == c) {
            stack.push((at, *close));
        } else if BRACKETS.iter().any(|(_, cl)| *cl == c) {
            match stack.pop() {
                Some((_, expected)) if expected == c => {}
                _ => return Some(at),
            }
        }
    }
    stack.first().map(|(at, _)| *at)
}

fn check_edges(view: &UnitView<'_>, out: &mut Findings<'_>) {
    let src = &view.src_joined.text;
    let tgt = &view.tgt_joined.text;
    if tgt.trim().is_empty() {
        return;
    }
    let lead = |t: &str| t.len() - t.trim_start().len();
    let trail = |t: &str| t.len() - t.trim_end().len();
    if (lead(src) > 0) != (lead(tgt) > 0) {
        let n = lead(tgt);
        let ranges = if n > 0 { vec![view.tgt_joined.origin(0, n)] } else { vec![] };
        out.push(
            codes::LEADING_WHITESPACE,
            Severity::Warning,
            "Leading whitespace differs from source",
            &[],
            &ranges,
        );
    }
    if (trail(src) > 0) != (trail(tgt) > 0) {
        let n = trail(tgt);
        let ranges = if n > 0 {
            vec![view.tgt_joined.origin(tgt.len() - n, tgt.len())]
        } else {
            vec![]
        };
        out.push(
            codes::TRAILING_WHITESPACE,
            Severity::Warning,
            "Trailing whitespace differs from source",
            &[],
            &ranges,
        );
    }
}
