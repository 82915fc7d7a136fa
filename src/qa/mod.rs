//! Rule-based QA.
//!
//! Every rule family is an independent, side-effect-free function of the unit, the effective
//! settings and the glossary. [`QaEngine`] compiles the configurable patterns once so a corpus
//! run does not rebuild regexes per unit. A run replaces a unit's issue list wholesale; ignore
//! state is not carried over unless the caller asks for it with [`carry_ignored_state`].

mod casing;
mod custom;
mod numbers;
mod omission;
mod punctuation;
mod quotes;
mod tags;
mod terms;
mod terminology;

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::consistency::{ConsistencyKind, ConsistencyReport};
use crate::error::WorkbenchResult;
use crate::ir::{QaIssue, Severity, TranslationUnit};
use crate::locale::{effective_settings, LocaleRegistry};
use crate::settings::QaSettings;
use crate::terminology::GlossaryTerm;
use crate::textutil::{byte_to_char_range, MappedText};

pub mod codes {
    pub const EMPTY_TARGET: &str = "empty_target";
    pub const SAME_AS_SOURCE: &str = "same_as_source";
    pub const PARTIAL_TRANSLATION: &str = "partial_translation";
    pub const SENTENCE_COUNT: &str = "sentence_count_mismatch";

    pub const FORBIDDEN_TERM: &str = "forbidden_term";
    pub const UNTRANSLATABLE_MISSING: &str = "untranslatable_missing";
    pub const UNTRANSLATABLE_COUNT: &str = "untranslatable_count";

    pub const INITIAL_CAPITAL: &str = "initial_capital";
    pub const INNER_CAPITAL: &str = "inner_capital";
    pub const MIXED_SCRIPT: &str = "mixed_script";
    pub const REQUIRED_CASING: &str = "required_casing";

    pub const PUNCT_SPACING: &str = "punctuation_spacing";
    pub const SIGN_SPACING: &str = "special_sign_spacing";
    pub const DOUBLE_PUNCTUATION: &str = "double_punctuation";
    pub const UNBALANCED_BRACKETS: &str = "unbalanced_brackets";
    pub const LEADING_WHITESPACE: &str = "leading_whitespace";
    pub const TRAILING_WHITESPACE: &str = "trailing_whitespace";
    pub const DOUBLE_SPACE: &str = "double_space";

    pub const QUOTE_NOT_ALLOWED: &str = "quote_not_allowed";
    pub const APOSTROPHE_NOT_ALLOWED: &str = "apostrophe_not_allowed";

    pub const MEASUREMENT_UNIT: &str = "measurement_unit";
    pub const MEASUREMENT_SPACING: &str = "measurement_spacing";
    pub const NUMBER_MISSING: &str = "number_missing";
    pub const NUMBER_EXTRA: &str = "number_extra";
    pub const NUMBER_ORDER: &str = "number_order";
    pub const NUMBER_FORMAT: &str = "number_format";
    pub const RANGE_FORMAT: &str = "range_format";

    pub const TAG_UNDEFINED: &str = "tag_undefined";
    pub const TAG_MISSING: &str = "tag_missing";
    pub const TAG_EXTRA: &str = "tag_extra";
    pub const TAG_ORDER: &str = "tag_order";
    pub const TAG_SPACING: &str = "tag_spacing";
    pub const TAG_SPACING_PARITY: &str = "tag_spacing_parity";
    pub const MALFORMED_ENTITY: &str = "malformed_entity";

    pub const TERM_MISSING: &str = "term_missing";
    pub const TERM_COUNT: &str = "term_count";
    pub const TERM_REVERSE: &str = "term_reverse";

    pub const CUSTOM_PREFIX: &str = "custom:";

    pub const TARGET_INCONSISTENCY: &str = "target_inconsistency";
    pub const SOURCE_INCONSISTENCY: &str = "source_inconsistency";
    pub const REPETITION: &str = "repetition";
}

/// Precomputed views of one unit's text shared by the rule families.
pub(crate) struct UnitView<'a> {
    pub unit: &'a TranslationUnit,
    /// Tags replaced by a space; used for word-level matching.
    pub src_words: MappedText,
    pub tgt_words: MappedText,
    /// Tags removed; used where a tag must be transparent (punctuation, spacing).
    pub src_joined: MappedText,
    pub tgt_joined: MappedText,
}

impl<'a> UnitView<'a> {
    pub fn new(unit: &'a TranslationUnit) -> Self {
        Self {
            unit,
            src_words: MappedText::without_tags(&unit.source.text, Some(' ')),
            tgt_words: MappedText::without_tags(&unit.target.text, Some(' ')),
            src_joined: MappedText::without_tags(&unit.source.text, None),
            tgt_joined: MappedText::without_tags(&unit.target.text, None),
        }
    }
}

/// Collects issues for one unit. Ranges handed in are byte ranges of the original (tagged)
/// source/target text; they are stored as char highlights.
pub(crate) struct Findings<'a> {
    unit: &'a TranslationUnit,
    issues: Vec<QaIssue>,
    ordinals: HashMap<String, usize>,
}

impl<'a> Findings<'a> {
    pub fn new(unit: &'a TranslationUnit) -> Self {
        Self {
            unit,
            issues: Vec::new(),
            ordinals: HashMap::new(),
        }
    }

    pub fn push(
        &mut self,
        code: &str,
        severity: Severity,
        message: impl Into<String>,
        src: &[(usize, usize)],
        tgt: &[(usize, usize)],
    ) {
        self.push_grouped(code, severity, message, src, tgt, None);
    }

    pub fn push_grouped(
        &mut self,
        code: &str,
        severity: Severity,
        message: impl Into<String>,
        src: &[(usize, usize)],
        tgt: &[(usize, usize)],
        group_id: Option<String>,
    ) {
        let source_highlights: Vec<_> = src
            .iter()
            .map(|(s, e)| byte_to_char_range(&self.unit.source.text, *s, *e))
            .collect();
        let target_highlights: Vec<_> = tgt
            .iter()
            .map(|(s, e)| byte_to_char_range(&self.unit.target.text, *s, *e))
            .collect();
        let ordinal = {
            let n = self.ordinals.entry(code.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let anchor = target_highlights
            .first()
            .or(source_highlights.first())
            .map(|h| format!("{}:{}", h.start, h.end))
            .unwrap_or_default();
        self.issues.push(QaIssue {
            id: issue_id(&self.unit.id, code, &anchor, ordinal),
            code: code.to_string(),
            message: message.into(),
            severity,
            is_ignored: false,
            ignored_by: None,
            group_id,
            source_highlights,
            target_highlights,
        });
    }

    pub fn into_issues(self) -> Vec<QaIssue> {
        self.issues
    }
}

/// Stable id: the same defect at the same place gets the same id on every run.
pub fn issue_id(unit_id: &str, code: &str, anchor: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(unit_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(code.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(anchor.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(ordinal.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Rule families compiled for one effective settings value and one glossary.
pub struct QaEngine {
    settings: QaSettings,
    terms: terms::CompiledTerms,
    casing: casing::CompiledCasing,
    numbers: numbers::CompiledNumbers,
    glossary: terminology::CompiledGlossary,
    custom: custom::CompiledChecks,
}

impl QaEngine {
    pub fn new(settings: QaSettings, glossary: &[GlossaryTerm]) -> Self {
        let terms = terms::CompiledTerms::new(&settings.forbidden, &settings.untranslatables);
        let casing = casing::CompiledCasing::new(&settings.casing);
        let numbers = numbers::CompiledNumbers::new(&settings.measurements, &settings.numbers);
        let glossary = terminology::CompiledGlossary::new(glossary, &settings.terminology);
        let custom = custom::CompiledChecks::new(&settings.custom_checks);
        Self {
            settings,
            terms,
            casing,
            numbers,
            glossary,
            custom,
        }
    }

    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    pub fn check(&self, unit: &TranslationUnit) -> Vec<QaIssue> {
        let mut out = Findings::new(unit);
        if !self.settings.enabled {
            return out.into_issues();
        }
        let view = UnitView::new(unit);
        let s = &self.settings;

        // Undefined tag references are data defects and are always reported.
        tags::check_undefined(&view, &mut out);

        if s.omissions.enabled {
            omission::check(&view, &s.omissions, &mut out);
        }
        let has_target = !view.tgt_words.text.trim().is_empty();
        if has_target {
            if s.forbidden.enabled || s.untranslatables.enabled {
                self.terms.check(&view, s, &mut out);
            }
            if s.casing.enabled {
                self.casing.check(&view, &s.casing, &mut out);
            }
            if s.punctuation.enabled {
                punctuation::check(&view, &s.punctuation, &mut out);
            }
            if s.quotes.enabled {
                quotes::check(&view, &s.quotes, &mut out);
            }
            if s.measurements.enabled || s.numbers.enabled {
                self.numbers.check(&view, s, &mut out);
            }
            if s.tags.enabled {
                tags::check(&view, &s.tags, &mut out);
            }
            if s.terminology.enabled {
                self.glossary.check(&view, &s.terminology, &mut out);
            }
        }
        self.custom.check(&view, &mut out);
        out.into_issues()
    }
}

/// Runs every enabled rule on one unit. `settings` are already effective for the unit's
/// target language (see [`effective_settings`]).
pub fn run_checks(unit: &TranslationUnit, settings: &QaSettings, glossary: &[GlossaryTerm]) -> Vec<QaIssue> {
    QaEngine::new(settings.clone(), glossary).check(unit)
}

/// Issues attributing the consistency groups of `report` to `unit`.
pub fn consistency_issues(
    unit: &TranslationUnit,
    report: &ConsistencyReport,
    settings: &QaSettings,
) -> Vec<QaIssue> {
    let mut out = Findings::new(unit);
    let c = &settings.consistency;
    if c.target_inconsistency {
        if let Some(key) = report.group_of(unit, ConsistencyKind::InconsistentTarget) {
            out.push_grouped(
                codes::TARGET_INCONSISTENCY,
                Severity::Warning,
                "Same source is translated differently elsewhere",
                &[],
                &[],
                Some(key),
            );
        }
    }
    if c.source_inconsistency {
        if let Some(key) = report.group_of(unit, ConsistencyKind::InconsistentSource) {
            out.push_grouped(
                codes::SOURCE_INCONSISTENCY,
                Severity::Warning,
                "Same translation is used for different sources",
                &[],
                &[],
                Some(key),
            );
        }
    }
    if c.report_repetitions {
        if let Some(key) = report.group_of(unit, ConsistencyKind::Repetition) {
            out.push_grouped(
                codes::REPETITION,
                Severity::Info,
                "Source segment is repeated",
                &[],
                &[],
                Some(key),
            );
        }
    }
    out.into_issues()
}

/// Full audit of `units`: every unit gets a fresh issue list computed with the settings
/// effective for its target language. Consistency issues are appended when a report is given.
pub fn run_qa(
    units: &[TranslationUnit],
    settings: &QaSettings,
    registry: &dyn LocaleRegistry,
    glossary: &[GlossaryTerm],
    consistency: Option<&ConsistencyReport>,
) -> WorkbenchResult<Vec<TranslationUnit>> {
    let mut engines: HashMap<String, QaEngine> = HashMap::new();
    let mut out = Vec::with_capacity(units.len());
    let mut total = 0usize;
    for tu in units {
        let lang = tu.target_lang.to_ascii_lowercase();
        if !engines.contains_key(&lang) {
            let eff = effective_settings(settings, registry, &tu.target_lang)?;
            debug!(target_lang = %lang, "compiled qa engine");
            engines.insert(lang.clone(), QaEngine::new(eff, glossary));
        }
        let Some(engine) = engines.get(&lang) else {
            continue;
        };
        let mut issues = engine.check(tu);
        if let Some(report) = consistency {
            issues.extend(consistency_issues(tu, report, engine.settings()));
        }
        total += issues.len();
        let mut next = tu.clone();
        next.qa_issues = issues;
        out.push(next);
    }
    info!(units = units.len(), issues = total, "qa run finished");
    Ok(out)
}

/// Toggles ignore state; the issue itself always stays in the list.
pub fn set_issue_ignored(
    unit: &mut TranslationUnit,
    issue_id: &str,
    ignored: bool,
    by: Option<&str>,
) -> bool {
    match unit.qa_issues.iter_mut().find(|i| i.id == issue_id) {
        Some(issue) => {
            issue.is_ignored = ignored;
            issue.ignored_by = if ignored { by.map(|s| s.to_string()) } else { None };
            true
        }
        None => false,
    }
}

/// Copies ignore decisions from `previous` onto `fresh` issues with the same id.
pub fn carry_ignored_state(previous: &[QaIssue], fresh: &mut [QaIssue]) -> usize {
    let ignored: HashMap<&str, &QaIssue> = previous
        .iter()
        .filter(|i| i.is_ignored)
        .map(|i| (i.id.as_str(), i))
        .collect();
    let mut carried = 0usize;
    for issue in fresh.iter_mut() {
        if let Some(prev) = ignored.get(issue.id.as_str()) {
            issue.is_ignored = true;
            issue.ignored_by = prev.ignored_by.clone();
            carried += 1;
        }
    }
    carried
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AuditSummary {
    pub units_checked: usize,
    pub issues: usize,
    pub errors: usize,
    pub warnings: usize,
    pub ignored_carried: usize,
}

/// Which units an audit covers.
#[derive(Clone, Debug, Default)]
pub enum AuditScope {
    #[default]
    All,
    Units(Vec<String>),
}

/// The expensive rule engine runs only when explicitly requested.
pub trait ManualAudit {
    fn run_audit(
        &mut self,
        scope: &AuditScope,
        glossary: &[GlossaryTerm],
        keep_ignored: bool,
    ) -> WorkbenchResult<AuditSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::analyze_consistency;
    use crate::locale::{BuiltinLocales, NoLocales};

    fn tu(id: &str, src: &str, tgt: &str) -> TranslationUnit {
        TranslationUnit::new(id, 0, src, tgt, "en", "fr")
    }

    fn codes_of(issues: &[QaIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn clean_unit_has_no_issues() {
        let unit = tu("1", "Open the file.", "Ouvrez le fichier.");
        let issues = run_checks(&unit, &QaSettings::default(), &[]);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn disabled_settings_report_nothing() {
        let settings = QaSettings {
            enabled: false,
            ..QaSettings::default()
        };
        let issues = run_checks(&tu("1", "Open", ""), &settings, &[]);
        assert!(issues.is_empty());
    }

    #[test]
    fn run_checks_matches_run_qa_with_effective_settings() {
        let unit = tu("1", "Note: open \"it\".", "Note: ouvrez \"le\".");
        let eff = effective_settings(&QaSettings::default(), &BuiltinLocales, "fr").expect("merge");
        let direct = run_checks(&unit, &eff, &[]);
        let audited = run_qa(&[unit], &QaSettings::default(), &BuiltinLocales, &[], None).expect("qa");
        assert!(!direct.is_empty());
        assert_eq!(audited[0].qa_issues, direct);
    }

    #[test]
    fn issue_ids_are_stable() {
        let unit = tu("1", "Open", "");
        let a = run_checks(&unit, &QaSettings::default(), &[]);
        let b = run_checks(&unit, &QaSettings::default(), &[]);
        assert_eq!(a, b);
        assert_eq!(a[0].id.len(), 16);
    }

    #[test]
    fn run_qa_replaces_issue_lists() {
        let mut unit = tu("1", "Open", "Ouvrir");
        unit.qa_issues.push(QaIssue {
            id: "old".to_string(),
            code: "stale".to_string(),
            message: String::new(),
            severity: Severity::Info,
            is_ignored: true,
            ignored_by: None,
            group_id: None,
            source_highlights: vec![],
            target_highlights: vec![],
        });
        let out = run_qa(&[unit], &QaSettings::default(), &NoLocales, &[], None).expect("qa");
        assert!(out[0].qa_issues.is_empty());
    }

    #[test]
    fn consistency_issues_carry_group_ids() {
        let units = vec![tu("1", "Open", "Ouvrir"), tu("2", "Open", "Ouvert")];
        let settings = QaSettings::default();
        let report = analyze_consistency(&units, "en", "fr", &settings.consistency);
        let out = run_qa(&units, &settings, &BuiltinLocales, &[], Some(&report)).expect("qa");
        for u in &out {
            let issue = u
                .qa_issues
                .iter()
                .find(|i| i.code == codes::TARGET_INCONSISTENCY)
                .expect("flagged");
            assert_eq!(issue.group_id.as_deref(), Some("Open"));
        }
    }

    #[test]
    fn ignore_toggle_keeps_issue() {
        let mut unit = tu("1", "Open", "");
        unit.qa_issues = run_checks(&unit, &QaSettings::default(), &[]);
        let id = unit.qa_issues[0].id.clone();
        assert!(set_issue_ignored(&mut unit, &id, true, Some("reviewer")));
        assert_eq!(unit.qa_issues.len(), 1);
        assert!(unit.qa_issues[0].is_ignored);
        assert!(set_issue_ignored(&mut unit, &id, false, None));
        assert!(!unit.qa_issues[0].is_ignored);
        assert_eq!(codes_of(&unit.qa_issues), vec![codes::EMPTY_TARGET]);
    }

    #[test]
    fn carry_copies_by_id() {
        let unit = tu("1", "Open", "");
        let mut prev = run_checks(&unit, &QaSettings::default(), &[]);
        prev[0].is_ignored = true;
        prev[0].ignored_by = Some("me".to_string());
        let mut fresh = run_checks(&unit, &QaSettings::default(), &[]);
        assert_eq!(carry_ignored_state(&prev, &mut fresh), 1);
        assert!(fresh[0].is_ignored);
    }
}
