use tracing::warn;

use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::{ForbiddenSettings, QaSettings, UntranslatableSettings};
use crate::textutil::{MatchOptions, TermMatcher};

pub(super) struct CompiledTerms {
    forbidden: Vec<(String, TermMatcher)>,
    untranslatables: Vec<(String, TermMatcher)>,
}

pub(super) fn compile_list(terms: &[String], opts: MatchOptions, what: &str) -> Vec<(String, TermMatcher)> {
    terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter_map(|t| match TermMatcher::new(t, opts) {
            Ok(m) => Some((t.clone(), m)),
            Err(err) => {
                warn!(pattern = %t, error = %err, "skipping invalid {what} pattern");
                None
            }
        })
        .collect()
}

impl CompiledTerms {
    pub fn new(forbidden: &ForbiddenSettings, untranslatables: &UntranslatableSettings) -> Self {
        Self {
            forbidden: compile_list(&forbidden.terms, forbidden.matching, "forbidden term"),
            untranslatables: compile_list(
                &untranslatables.terms,
                untranslatables.matching,
                "untranslatable",
            ),
        }
    }

    pub fn check(&self, view: &UnitView<'_>, s: &QaSettings, out: &mut Findings<'_>) {
        let src = &view.unit.source.text;
        let tgt = &view.unit.target.text;

        if s.forbidden.enabled {
            for (term, m) in &self.forbidden {
                let hits = m.find_all(&view.tgt_words.text);
                if hits.is_empty() {
                    continue;
                }
                if s.forbidden.allow_if_in_source && m.is_match(&view.src_words.text) {
                    continue;
                }
                let ranges: Vec<_> = hits
                    .iter()
                    .map(|(a, b)| view.tgt_words.origin(*a, *b))
                    .collect();
                out.push(
                    codes::FORBIDDEN_TERM,
                    Severity::Error,
                    format!("Forbidden term in target: {term}"),
                    &[],
                    &ranges,
                );
            }
        }

        if s.untranslatables.enabled {
            for (term, m) in &self.untranslatables {
                let in_src = m.find_all(src);
                if in_src.is_empty() {
                    continue;
                }
                let in_tgt = m.find_all(tgt);
                if in_tgt.is_empty() {
                    out.push(
                        codes::UNTRANSLATABLE_MISSING,
                        Severity::Error,
                        format!("Untranslatable missing from target: {term}"),
                        &in_src,
                        &[],
                    );
                } else if s.untranslatables.check_count && in_src.len() != in_tgt.len() {
                    out.push(
                        codes::UNTRANSLATABLE_COUNT,
                        Severity::Warning,
                        format!(
                            "Untranslatable {term}: {} in source, {} in target",
                            in_src.len(),
                            in_tgt.len()
                        ),
                        &in_src,
                        &in_tgt,
                    );
                }
            }
        }
    }
}
