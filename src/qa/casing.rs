use super::terms::compile_list;
use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::CasingSettings;
use crate::textutil::{word_spans, MatchOptions, TermMatcher};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
}

fn script_of(c: char) -> Option<Script> {
    if !c.is_alphabetic() {
        return None;
    }
    match c as u32 {
        0x0041..=0x024F | 0x1E00..=0x1EFF => Some(Script::Latin),
        0x0370..=0x03FF | 0x1F00..=0x1FFF => Some(Script::Greek),
        0x0400..=0x052F => Some(Script::Cyrillic),
        _ => None,
    }
}

fn has_inner_capital(word: &str) -> bool {
    let mut prev_lower = false;
    for c in word.chars() {
        if c.is_uppercase() && prev_lower {
            return true;
        }
        prev_lower = c.is_lowercase();
    }
    false
}

fn first_cased(text: &str) -> Option<(usize, char)> {
    text.char_indices().find(|(_, c)| c.is_alphabetic())
}

pub(super) struct CompiledCasing {
    required: Vec<(String, TermMatcher)>,
}

impl CompiledCasing {
    pub fn new(s: &CasingSettings) -> Self {
        let opts = MatchOptions {
            is_regex: false,
            case_sensitive: false,
            whole_word: true,
            diacritic_sensitive: true,
        };
        Self {
            required: compile_list(&s.required_casing, opts, "required casing"),
        }
    }

    pub fn check(&self, view: &UnitView<'_>, s: &CasingSettings, out: &mut Findings<'_>) {
        let src = &view.src_words.text;
        let tgt = &view.tgt_words.text;

        if s.initial_capital {
            if let (Some((_, a)), Some((tb, b))) = (first_cased(src), first_cased(tgt)) {
                let (a_up, b_up) = (a.is_uppercase(), b.is_uppercase());
                let cased = (a.is_uppercase() || a.is_lowercase()) && (b.is_uppercase() || b.is_lowercase());
                if cased && a_up != b_up {
                    let range = view.tgt_words.origin(tb, tb + b.len_utf8());
                    let message = if a_up {
                        "Target should start with a capital letter"
                    } else {
                        "Target should not start with a capital letter"
                    };
                    out.push(codes::INITIAL_CAPITAL, Severity::Warning, message, &[], &[range]);
                }
            }
        }

        let src_words: Vec<&str> = word_spans(src).into_iter().map(|(a, b)| &src[a..b]).collect();
        for (a, b) in word_spans(tgt) {
            let word = &tgt[a..b];
            if s.inner_capital && has_inner_capital(word) && !src_words.contains(&word) {
                out.push(
                    codes::INNER_CAPITAL,
                    Severity::Warning,
                    format!("Unexpected capital inside word: {word}"),
                    &[],
                    &[view.tgt_words.origin(a, b)],
                );
            }
            if s.mixed_script {
                let mut first: Option<Script> = None;
                let mixed = word.chars().filter_map(script_of).any(|sc| match first {
                    None => {
                        first = Some(sc);
                        false
                    }
                    Some(f) => f != sc,
                });
                if mixed {
                    out.push(
                        codes::MIXED_SCRIPT,
                        Severity::Error,
                        format!("Word mixes alphabets: {word}"),
                        &[],
                        &[view.tgt_words.origin(a, b)],
                    );
                }
            }
        }

        for (term, m) in &self.required {
            for (a, b) in m.find_all(tgt) {
                if &tgt[a..b] != term.as_str() {
                    out.push(
                        codes::REQUIRED_CASING,
                        Severity::Warning,
                        format!("Expected casing {term:?}, found {:?}", &tgt[a..b]),
                        &[],
                        &[view.tgt_words.origin(a, b)],
                    );
                }
            }
        }
    }
}
