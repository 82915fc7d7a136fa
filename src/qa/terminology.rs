use tracing::warn;

use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::TerminologySettings;
use crate::terminology::GlossaryTerm;
use crate::textutil::{MappedText, MatchOptions, TermMatcher};

const FRAGMENT_BREAK: char = '\u{1}';

struct TermEntry {
    source: String,
    source_m: TermMatcher,
    /// Accepted translations; one glossary source may have several.
    targets: Vec<(String, TermMatcher)>,
}

pub(super) struct CompiledGlossary {
    entries: Vec<TermEntry>,
}

impl CompiledGlossary {
    pub fn new(terms: &[GlossaryTerm], s: &TerminologySettings) -> Self {
        let opts = MatchOptions {
            is_regex: false,
            case_sensitive: s.case_sensitive,
            whole_word: s.whole_word,
            diacritic_sensitive: true,
        };
        let mut entries: Vec<TermEntry> = Vec::new();
        for term in terms {
            let (source, target) = (term.source.trim(), term.target.trim());
            if source.is_empty() || target.is_empty() {
                continue;
            }
            let target_m = match TermMatcher::new(target, opts) {
                Ok(m) => m,
                Err(err) => {
                    warn!(term = %target, error = %err, "skipping glossary term");
                    continue;
                }
            };
            let same = |e: &TermEntry| {
                if s.case_sensitive {
                    e.source == source
                } else {
                    e.source.to_lowercase() == source.to_lowercase()
                }
            };
            if let Some(entry) = entries.iter_mut().find(|e| same(e)) {
                entry.targets.push((target.to_string(), target_m));
                continue;
            }
            match TermMatcher::new(source, opts) {
                Ok(source_m) => entries.push(TermEntry {
                    source: source.to_string(),
                    source_m,
                    targets: vec![(target.to_string(), target_m)],
                }),
                Err(err) => warn!(term = %source, error = %err, "skipping glossary term"),
            }
        }
        Self { entries }
    }

    pub fn check(&self, view: &UnitView<'_>, s: &TerminologySettings, out: &mut Findings<'_>) {
        if self.entries.is_empty() {
            return;
        }
        let sep = if s.respect_tag_boundaries {
            Some(FRAGMENT_BREAK)
        } else {
            None
        };
        let src = MappedText::without_tags(&view.unit.source.text, sep);
        let tgt = MappedText::without_tags(&view.unit.target.text, sep);

        for entry in &self.entries {
            let in_src = entry.source_m.find_all(&src.text);
            let in_tgt: Vec<(usize, usize)> = entry
                .targets
                .iter()
                .flat_map(|(_, m)| m.find_all(&tgt.text))
                .collect();
            let src_ranges: Vec<_> = in_src.iter().map(|(a, b)| src.origin(*a, *b)).collect();
            let tgt_ranges: Vec<_> = in_tgt.iter().map(|(a, b)| tgt.origin(*a, *b)).collect();
            let expected = entry
                .targets
                .iter()
                .map(|(t, _)| t.as_str())
                .collect::<Vec<_>>()
                .join(" / ");

            if !in_src.is_empty() && in_tgt.is_empty() {
                out.push(
                    codes::TERM_MISSING,
                    Severity::Warning,
                    format!("Term {:?} should be translated as {expected:?}", entry.source),
                    &src_ranges,
                    &[],
                );
            } else if s.check_count && !in_src.is_empty() && in_src.len() != in_tgt.len() {
                out.push(
                    codes::TERM_COUNT,
                    Severity::Warning,
                    format!(
                        "Term {:?}: {} in source, {} {expected:?} in target",
                        entry.source,
                        in_src.len(),
                        in_tgt.len()
                    ),
                    &src_ranges,
                    &tgt_ranges,
                );
            } else if s.reverse_check && in_src.is_empty() && !in_tgt.is_empty() {
                out.push(
                    codes::TERM_REVERSE,
                    Severity::Info,
                    format!("Target uses {expected:?} but source lacks {:?}", entry.source),
                    &[],
                    &tgt_ranges,
                );
            }
        }
    }
}
