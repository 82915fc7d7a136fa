use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::ir::Highlight;
use crate::sentinels::TAG_TOKEN_RE;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}").expect("letter regex"));

pub fn strip_tags(text: &str) -> String {
    TAG_TOKEN_RE.replace_all(text, "").into_owned()
}

pub fn has_letters(text: &str) -> bool {
    LETTER_RE.is_match(&strip_tags(text))
}

#[inline]
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn char_offset(text: &str, byte: usize) -> usize {
    let byte = byte.min(text.len());
    text[..byte].chars().count()
}

pub fn byte_to_char_range(text: &str, start: usize, end: usize) -> Highlight {
    let start_c = char_offset(text, start);
    let end_c = start_c + text[start.min(text.len())..end.min(text.len())].chars().count();
    Highlight {
        start: start_c,
        end: end_c,
    }
}

/// Derived text that remembers, for every byte, which byte range of the original it came from.
#[derive(Clone, Debug)]
pub struct MappedText {
    pub text: String,
    spans: Vec<(usize, usize)>,
}

impl MappedText {
    pub fn identity(text: &str) -> Self {
        let mut spans = Vec::with_capacity(text.len());
        for (i, ch) in text.char_indices() {
            for _ in 0..ch.len_utf8() {
                spans.push((i, i + ch.len_utf8()));
            }
        }
        Self {
            text: text.to_string(),
            spans,
        }
    }

    /// Removes tag tokens. With `sep`, each token is replaced by that char (mapped onto the token).
    pub fn without_tags(text: &str, sep: Option<char>) -> Self {
        let mut out = String::with_capacity(text.len());
        let mut spans = Vec::with_capacity(text.len());
        let mut pos = 0usize;
        let push_plain = |from: usize, to: usize, out: &mut String, spans: &mut Vec<(usize, usize)>| {
            for (i, ch) in text[from..to].char_indices() {
                let at = from + i;
                out.push(ch);
                for _ in 0..ch.len_utf8() {
                    spans.push((at, at + ch.len_utf8()));
                }
            }
        };
        for m in TAG_TOKEN_RE.find_iter(text) {
            push_plain(pos, m.start(), &mut out, &mut spans);
            if let Some(c) = sep {
                out.push(c);
                for _ in 0..c.len_utf8() {
                    spans.push((m.start(), m.end()));
                }
            }
            pos = m.end();
        }
        push_plain(pos, text.len(), &mut out, &mut spans);
        Self { text: out, spans }
    }

    /// Drops combining marks after canonical decomposition ("é" -> "e").
    pub fn fold_diacritics(&self) -> Self {
        let mut out = String::with_capacity(self.text.len());
        let mut spans = Vec::with_capacity(self.spans.len());
        for (i, ch) in self.text.char_indices() {
            let origin = self.origin(i, i + ch.len_utf8());
            for d in std::iter::once(ch).nfd().filter(|c| !is_combining_mark(*c)) {
                out.push(d);
                for _ in 0..d.len_utf8() {
                    spans.push(origin);
                }
            }
        }
        Self { text: out, spans }
    }

    /// Byte range in the original text covered by `[start, end)` of this text.
    pub fn origin(&self, start: usize, end: usize) -> (usize, usize) {
        if self.spans.is_empty() {
            return (0, 0);
        }
        if start >= end {
            let at = self
                .spans
                .get(start)
                .map(|s| s.0)
                .unwrap_or_else(|| self.spans.last().map(|s| s.1).unwrap_or(0));
            return (at, at);
        }
        let s = self.spans[start.min(self.spans.len() - 1)].0;
        let e = self.spans[(end - 1).min(self.spans.len() - 1)].1;
        (s, e)
    }
}

pub fn fold_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub diacritic_sensitive: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
            diacritic_sensitive: true,
        }
    }
}

/// Literal-or-regex matcher with case, whole-word and diacritic options.
/// Match ranges are always byte ranges in the text passed in.
#[derive(Clone, Debug)]
pub struct TermMatcher {
    re: Regex,
    whole_word: bool,
    fold: bool,
}

impl TermMatcher {
    pub fn new(pattern: &str, opts: MatchOptions) -> Result<Self, regex::Error> {
        let fold = !opts.diacritic_sensitive;
        let pattern = if fold {
            fold_diacritics(pattern)
        } else {
            pattern.to_string()
        };
        let src = if opts.is_regex {
            pattern
        } else {
            regex::escape(&pattern)
        };
        let re = RegexBuilder::new(&src)
            .case_insensitive(!opts.case_sensitive)
            .size_limit(1 << 22)
            .build()?;
        Ok(Self {
            re,
            whole_word: opts.whole_word,
            fold,
        })
    }

    fn haystack(&self, text: &str) -> MappedText {
        let base = MappedText::identity(text);
        if self.fold {
            base.fold_diacritics()
        } else {
            base
        }
    }

    fn bounded(&self, hay: &str, start: usize, end: usize) -> bool {
        if !self.whole_word {
            return true;
        }
        let first = hay[start..end].chars().next();
        let last = hay[start..end].chars().next_back();
        if first.map(is_word_char).unwrap_or(false) {
            if let Some(prev) = hay[..start].chars().next_back() {
                if is_word_char(prev) {
                    return false;
                }
            }
        }
        if last.map(is_word_char).unwrap_or(false) {
            if let Some(next) = hay[end..].chars().next() {
                if is_word_char(next) {
                    return false;
                }
            }
        }
        true
    }

    pub fn find_all(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return vec![];
        }
        let hay = self.haystack(text);
        self.re
            .find_iter(&hay.text)
            .filter(|m| m.start() < m.end() && self.bounded(&hay.text, m.start(), m.end()))
            .map(|m| hay.origin(m.start(), m.end()))
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        !self.find_all(text).is_empty()
    }

    pub fn count(&self, text: &str) -> usize {
        self.find_all(text).len()
    }

    /// Replaces every (bounded, non-empty) match. With `expand`, `$1`/`${name}` refer to groups.
    pub fn replace_all(&self, text: &str, replacement: &str, expand: bool) -> String {
        if text.is_empty() {
            return String::new();
        }
        let hay = self.haystack(text);
        let mut out = String::with_capacity(text.len());
        let mut pos = 0usize;
        for caps in self.re.captures_iter(&hay.text) {
            let Some(m) = caps.get(0) else { continue };
            if m.start() == m.end() || !self.bounded(&hay.text, m.start(), m.end()) {
                continue;
            }
            let (s, e) = hay.origin(m.start(), m.end());
            if s < pos {
                continue;
            }
            out.push_str(&text[pos..s]);
            push_replacement(&caps, replacement, expand, &mut out);
            pos = e;
        }
        out.push_str(&text[pos..]);
        out
    }
}

fn push_replacement(caps: &Captures<'_>, replacement: &str, expand: bool, out: &mut String) {
    if expand {
        caps.expand(replacement, out);
    } else {
        out.push_str(replacement);
    }
}

/// Byte ranges of `[start, end)` words (letters/digits/underscore/apostrophe inside a word).
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        let inner_apostrophe = (ch == '\'' || ch == '\u{2019}')
            && start.is_some()
            && chars.peek().map(|(_, n)| n.is_alphanumeric()).unwrap_or(false);
        if is_word_char(ch) || inner_apostrophe {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            spans.push((s, i));
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}
