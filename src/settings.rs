//! QA settings aggregate.
//!
//! One enable flag plus parameters per rule family. Everything is `#[serde(default)]` so a
//! TOML file or a locale preset only needs to mention what it changes; [`QaSettings::merged`]
//! deep-merges such partial overlays onto a full settings value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::NormalizeOptions;
use crate::textutil::MatchOptions;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaSettings {
    pub enabled: bool,
    pub omissions: OmissionSettings,
    pub forbidden: ForbiddenSettings,
    pub untranslatables: UntranslatableSettings,
    pub casing: CasingSettings,
    pub punctuation: PunctuationSettings,
    pub quotes: QuoteSettings,
    pub measurements: MeasurementSettings,
    pub numbers: NumberSettings,
    pub tags: TagSettings,
    pub terminology: TerminologySettings,
    pub consistency: ConsistencySettings,
    pub custom_checks: Vec<CustomCheck>,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            omissions: OmissionSettings::default(),
            forbidden: ForbiddenSettings::default(),
            untranslatables: UntranslatableSettings::default(),
            casing: CasingSettings::default(),
            punctuation: PunctuationSettings::default(),
            quotes: QuoteSettings::default(),
            measurements: MeasurementSettings::default(),
            numbers: NumberSettings::default(),
            tags: TagSettings::default(),
            terminology: TerminologySettings::default(),
            consistency: ConsistencySettings::default(),
            custom_checks: Vec::new(),
        }
    }
}

impl QaSettings {
    /// Deep-merges a partial settings object: objects merge key by key, anything else replaces.
    pub fn merged(&self, overlay: &Value) -> Result<Self, serde_json::Error> {
        if overlay.is_null() {
            return Ok(self.clone());
        }
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, overlay);
        serde_json::from_value(base)
    }
}

pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(k) {
                    Some(slot) => merge_json(slot, v),
                    None => {
                        b.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (slot, v) => *slot = v.clone(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmissionSettings {
    pub enabled: bool,
    pub empty_target: bool,
    pub same_as_source: bool,
    /// Do not report "same as source" when the source has no letters (numbers, formulas).
    pub ignore_math_only: bool,
    pub partial_translation: bool,
    pub partial_min_words: usize,
    pub sentence_count: bool,
}

impl Default for OmissionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            empty_target: true,
            same_as_source: true,
            ignore_math_only: true,
            partial_translation: true,
            partial_min_words: 4,
            sentence_count: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForbiddenSettings {
    pub enabled: bool,
    pub terms: Vec<String>,
    pub matching: MatchOptions,
    /// Skip a forbidden term in the target when the source contains it too.
    pub allow_if_in_source: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UntranslatableSettings {
    pub enabled: bool,
    pub terms: Vec<String>,
    pub matching: MatchOptions,
    /// Require as many occurrences in the target as in the source.
    pub check_count: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasingSettings {
    pub enabled: bool,
    pub initial_capital: bool,
    pub inner_capital: bool,
    pub mixed_script: bool,
    /// Terms whose exact casing is mandatory in the target ("iPhone", "GitHub").
    pub required_casing: Vec<String>,
}

impl Default for CasingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_capital: true,
            inner_capital: true,
            mixed_script: true,
            required_casing: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingMode {
    #[default]
    Ignore,
    Space,
    NoSpace,
    Nbsp,
}

/// One row of the punctuation spacing grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingRule {
    pub symbols: String,
    pub before: SpacingMode,
    pub after: SpacingMode,
}

impl Default for SpacingRule {
    fn default() -> Self {
        Self {
            symbols: String::new(),
            before: SpacingMode::Ignore,
            after: SpacingMode::Ignore,
        }
    }
}

impl SpacingRule {
    pub fn new(symbols: &str, before: SpacingMode, after: SpacingMode) -> Self {
        Self {
            symbols: symbols.to_string(),
            before,
            after,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunctuationSettings {
    pub enabled: bool,
    pub spacing: Vec<SpacingRule>,
    pub special_signs: Vec<SpacingRule>,
    pub double_punctuation: bool,
    pub bracket_balance: bool,
    pub whitespace_parity: bool,
    pub double_spaces: bool,
}

impl Default for PunctuationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            spacing: vec![
                SpacingRule::new(",.", SpacingMode::NoSpace, SpacingMode::Ignore),
                SpacingRule::new(":;!?", SpacingMode::NoSpace, SpacingMode::Ignore),
            ],
            special_signs: Vec::new(),
            double_punctuation: true,
            bracket_balance: true,
            whitespace_parity: true,
            double_spaces: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSettings {
    pub enabled: bool,
    /// Allowed quote pairs, each written as "open+close" (two chars).
    pub allowed_pairs: Vec<String>,
    pub allowed_apostrophes: String,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_pairs: vec!["\"\"".to_string(), "“”".to_string(), "‘’".to_string()],
            allowed_apostrophes: "'’".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    pub enabled: bool,
    pub units: Vec<String>,
    /// Separator between a number and its unit.
    pub spacing: SpacingMode,
    pub check_units_kept: bool,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            units: ["mm", "cm", "m", "km", "mg", "g", "kg", "ml", "l", "kB", "MB", "GB", "TB", "Hz", "kHz", "MHz", "GHz", "°C", "°F", "%"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            spacing: SpacingMode::Ignore,
            check_units_kept: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberWord {
    pub digits: String,
    pub word: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberSettings {
    pub enabled: bool,
    pub check_values: bool,
    pub check_order: bool,
    pub check_format: bool,
    pub decimal_separator: String,
    pub grouping_separators: Vec<String>,
    pub check_ranges: bool,
    pub range_symbol: String,
    pub range_spacing: SpacingMode,
    /// A source number counts as present when the target spells it out.
    pub number_words: Vec<NumberWord>,
}

impl Default for NumberSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_values: true,
            check_order: false,
            check_format: false,
            decimal_separator: ".".to_string(),
            grouping_separators: vec![",".to_string()],
            check_ranges: false,
            range_symbol: "–".to_string(),
            range_spacing: SpacingMode::NoSpace,
            number_words: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    pub enabled: bool,
    pub check_count: bool,
    pub check_order: bool,
    pub check_spacing: bool,
    pub check_spacing_parity: bool,
    pub check_entities: bool,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_count: true,
            check_order: true,
            check_spacing: true,
            check_spacing_parity: false,
            check_entities: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologySettings {
    pub enabled: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub check_count: bool,
    /// Match terms inside tag-delimited fragments only; a term split by a tag does not count.
    pub respect_tag_boundaries: bool,
    pub reverse_check: bool,
}

impl Default for TerminologySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            case_sensitive: false,
            whole_word: true,
            check_count: false,
            respect_tag_boundaries: false,
            reverse_check: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencySettings {
    pub target_inconsistency: bool,
    pub target_options: NormalizeOptions,
    pub source_inconsistency: bool,
    pub source_options: NormalizeOptions,
    /// Report repetitions as QA issues. The repetition set itself is always computed.
    pub report_repetitions: bool,
}

impl Default for ConsistencySettings {
    fn default() -> Self {
        Self {
            target_inconsistency: true,
            target_options: NormalizeOptions::default(),
            source_inconsistency: true,
            source_options: NormalizeOptions::default(),
            report_repetitions: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCondition {
    #[default]
    BothFound,
    SourceFoundTargetMissing,
    TargetFoundSourceMissing,
    BothMatchRegex,
}

/// User-defined check: a pair of patterns and the condition that makes it report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomCheck {
    pub id: String,
    pub title: String,
    pub enabled: bool,
    pub source_pattern: String,
    pub target_pattern: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub condition: CheckCondition,
    pub severity: crate::ir::Severity,
}

impl Default for CustomCheck {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            enabled: true,
            source_pattern: String::new(),
            target_pattern: String::new(),
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
            condition: CheckCondition::BothFound,
            severity: crate::ir::Severity::Warning,
        }
    }
}
