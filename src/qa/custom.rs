use tracing::warn;

use super::{codes, Findings, UnitView};
use crate::settings::{CheckCondition, CustomCheck};
use crate::textutil::{MatchOptions, TermMatcher};

struct Compiled {
    check: CustomCheck,
    code: String,
    /// `None` for an empty pattern, which matches any text.
    source: Option<TermMatcher>,
    target: Option<TermMatcher>,
}

pub(super) struct CompiledChecks {
    checks: Vec<Compiled>,
}

fn compile_side(pattern: &str, opts: MatchOptions) -> Result<Option<TermMatcher>, regex::Error> {
    if pattern.is_empty() {
        return Ok(None);
    }
    TermMatcher::new(pattern, opts).map(Some)
}

impl CompiledChecks {
    pub fn new(checks: &[CustomCheck]) -> Self {
        let mut out = Vec::new();
        for (i, check) in checks.iter().enumerate() {
            if !check.enabled {
                continue;
            }
            if check.source_pattern.is_empty() && check.target_pattern.is_empty() {
                continue;
            }
            let opts = MatchOptions {
                is_regex: check.is_regex || check.condition == CheckCondition::BothMatchRegex,
                case_sensitive: check.case_sensitive,
                whole_word: check.whole_word,
                diacritic_sensitive: true,
            };
            let compiled = compile_side(&check.source_pattern, opts)
                .and_then(|s| compile_side(&check.target_pattern, opts).map(|t| (s, t)));
            match compiled {
                Ok((source, target)) => {
                    let id = if check.id.is_empty() {
                        (i + 1).to_string()
                    } else {
                        check.id.clone()
                    };
                    out.push(Compiled {
                        check: check.clone(),
                        code: format!("{}{id}", codes::CUSTOM_PREFIX),
                        source,
                        target,
                    });
                }
                Err(err) => {
                    warn!(check = %check.id, error = %err, "skipping custom check with invalid pattern");
                }
            }
        }
        Self { checks: out }
    }

    pub fn check(&self, view: &UnitView<'_>, out: &mut Findings<'_>) {
        let src = &view.unit.source.text;
        let tgt = &view.unit.target.text;
        for c in &self.checks {
            let src_hits = c.source.as_ref().map(|m| m.find_all(src));
            let tgt_hits = c.target.as_ref().map(|m| m.find_all(tgt));
            let src_found = src_hits.as_ref().map(|h| !h.is_empty()).unwrap_or(true);
            let tgt_found = tgt_hits.as_ref().map(|h| !h.is_empty()).unwrap_or(true);
            let fires = match c.check.condition {
                CheckCondition::BothFound | CheckCondition::BothMatchRegex => src_found && tgt_found,
                CheckCondition::SourceFoundTargetMissing => src_found && !tgt_found,
                CheckCondition::TargetFoundSourceMissing => tgt_found && !src_found,
            };
            if !fires {
                continue;
            }
            let title = if c.check.title.is_empty() {
                "Custom check".to_string()
            } else {
                c.check.title.clone()
            };
            out.push(
                &c.code,
                c.check.severity,
                title,
                &src_hits.unwrap_or_default(),
                &tgt_hits.unwrap_or_default(),
            );
        }
    }
}
