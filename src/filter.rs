//! Unit selection: scope, status and text query first, then at most one built-in or custom
//! filter. Consistency filters read the sets of a [`ConsistencyReport`] and emit their results
//! cluster by cluster.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consistency::{ConsistencyKind, ConsistencyReport};
use crate::ir::{TranslationUnit, UnitStatus};
use crate::sentinels::{ANY_TAG_LIKE_RE, TAG_TOKEN_RE};
use crate::textutil::strip_tags;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    #[default]
    Literal,
    Regex,
    /// `*` matches any run of characters; the pattern must match the whole text.
    Wildcard,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextQuery {
    pub text: String,
    pub mode: QueryMode,
    pub case_sensitive: bool,
}

impl TextQuery {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// `Ok(None)` when the query is blank and constrains nothing.
    fn compile(&self) -> Result<Option<Regex>, regex::Error> {
        if self.text.is_empty() {
            return Ok(None);
        }
        let pattern = match self.mode {
            QueryMode::Literal => regex::escape(&self.text),
            QueryMode::Regex => self.text.clone(),
            QueryMode::Wildcard => {
                let parts: Vec<String> = self.text.split('*').map(regex::escape).collect();
                format!("^(?s:{})$", parts.join(".*"))
            }
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(!self.case_sensitive)
            .size_limit(1 << 22)
            .build()
            .map(Some)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltInFilter {
    SameAsSource,
    Untranslated,
    HasComment,
    HasInvalidCharacters,
    TargetInconsistency,
    SourceInconsistency,
    Repetitions,
}

impl BuiltInFilter {
    fn consistency_kind(self) -> Option<ConsistencyKind> {
        match self {
            Self::TargetInconsistency => Some(ConsistencyKind::InconsistentTarget),
            Self::SourceInconsistency => Some(ConsistencyKind::InconsistentSource),
            Self::Repetitions => Some(ConsistencyKind::Repetition),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionScope {
    #[default]
    Source,
    Target,
    Comment,
    Status,
    Metadata,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Contains,
    Excludes,
    Equal,
    NotEqual,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCondition {
    pub scope: ConditionScope,
    /// Metadata key; only read when `scope` is `metadata`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub operator: ConditionOperator,
    pub value: String,
}

impl FilterCondition {
    pub fn new(scope: ConditionScope, operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self {
            scope,
            field: None,
            operator,
            value: value.into(),
        }
    }

    fn field_value<'a>(&self, unit: &'a TranslationUnit) -> &'a str {
        match self.scope {
            ConditionScope::Source => &unit.source.text,
            ConditionScope::Target => &unit.target.text,
            ConditionScope::Comment => unit.comment().unwrap_or(""),
            ConditionScope::Status => unit.status.as_str(),
            ConditionScope::Metadata => self
                .field
                .as_deref()
                .and_then(|k| unit.metadata.get(k))
                .map(String::as_str)
                .unwrap_or(""),
        }
    }

    /// Comparisons ignore case.
    pub fn matches(&self, unit: &TranslationUnit) -> bool {
        let field = self.field_value(unit).to_lowercase();
        let value = self.value.to_lowercase();
        match self.operator {
            ConditionOperator::Contains => field.contains(&value),
            ConditionOperator::Excludes => !field.contains(&value),
            ConditionOperator::Equal => field == value,
            ConditionOperator::NotEqual => field != value,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    #[default]
    And,
    Or,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomFilter {
    pub id: String,
    pub name: String,
    pub match_type: MatchType,
    pub conditions: Vec<FilterCondition>,
}

impl CustomFilter {
    /// A filter without conditions lets everything through.
    pub fn matches(&self, unit: &TranslationUnit) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        match self.match_type {
            MatchType::And => self.conditions.iter().all(|c| c.matches(unit)),
            MatchType::Or => self.conditions.iter().any(|c| c.matches(unit)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveFilter {
    #[default]
    None,
    BuiltIn(BuiltInFilter),
    Custom(CustomFilter),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub file_id: Option<String>,
    pub status: Option<UnitStatus>,
    pub source_query: Option<TextQuery>,
    pub target_query: Option<TextQuery>,
    pub filter: ActiveFilter,
}

impl FilterCriteria {
    pub fn for_pair(source_lang: &str, target_lang: &str) -> Self {
        Self {
            source_lang: Some(source_lang.to_string()),
            target_lang: Some(target_lang.to_string()),
            ..Self::default()
        }
    }
}

pub fn has_invalid_characters(text: &str) -> bool {
    let bad_char = text.chars().any(|c| {
        (c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
            || matches!(c, '\u{FFFD}' | '\u{FFFE}' | '\u{FFFF}')
    });
    bad_char
        || ANY_TAG_LIKE_RE
            .find_iter(text)
            .any(|m| !TAG_TOKEN_RE.is_match(m.as_str()))
}

fn builtin_matches(
    filter: BuiltInFilter,
    unit: &TranslationUnit,
    consistency: Option<&ConsistencyReport>,
) -> bool {
    match filter {
        BuiltInFilter::SameAsSource => {
            let tgt = strip_tags(&unit.target.text);
            !tgt.trim().is_empty() && tgt.trim() == strip_tags(&unit.source.text).trim()
        }
        BuiltInFilter::Untranslated => unit.target.text.trim().is_empty(),
        BuiltInFilter::HasComment => unit.comment().is_some(),
        BuiltInFilter::HasInvalidCharacters => {
            has_invalid_characters(&unit.source.text) || has_invalid_characters(&unit.target.text)
        }
        BuiltInFilter::TargetInconsistency
        | BuiltInFilter::SourceInconsistency
        | BuiltInFilter::Repetitions => match (consistency, filter.consistency_kind()) {
            (Some(report), Some(kind)) => report.group_of(unit, kind).is_some(),
            _ => false,
        },
    }
}

fn compile_query(query: Option<&TextQuery>) -> Result<Option<Regex>, ()> {
    match query.map(TextQuery::compile) {
        None => Ok(None),
        Some(Ok(re)) => Ok(re),
        Some(Err(err)) => {
            warn!(error = %err, "invalid search pattern; nothing matches");
            Err(())
        }
    }
}

/// Applies `criteria` to `units`. An invalid query regex yields an empty selection.
pub fn select(
    units: &[TranslationUnit],
    criteria: &FilterCriteria,
    consistency: Option<&ConsistencyReport>,
) -> Vec<TranslationUnit> {
    let (Ok(src_re), Ok(tgt_re)) = (
        compile_query(criteria.source_query.as_ref()),
        compile_query(criteria.target_query.as_ref()),
    ) else {
        return Vec::new();
    };

    let pick = |tu: &&TranslationUnit| -> bool {
        if let Some(lang) = &criteria.source_lang {
            if !tu.source_lang.eq_ignore_ascii_case(lang) {
                return false;
            }
        }
        if let Some(lang) = &criteria.target_lang {
            if !tu.target_lang.eq_ignore_ascii_case(lang) {
                return false;
            }
        }
        if let Some(file) = &criteria.file_id {
            if tu.file_id != *file {
                return false;
            }
        }
        if let Some(status) = criteria.status {
            if tu.status != status {
                return false;
            }
        }
        if let Some(re) = &src_re {
            if !re.is_match(&strip_tags(&tu.source.text)) {
                return false;
            }
        }
        if let Some(re) = &tgt_re {
            if !re.is_match(&strip_tags(&tu.target.text)) {
                return false;
            }
        }
        match &criteria.filter {
            ActiveFilter::None => true,
            ActiveFilter::BuiltIn(f) => builtin_matches(*f, tu, consistency),
            ActiveFilter::Custom(f) => f.matches(tu),
        }
    };
    let selected: Vec<&TranslationUnit> = units.iter().filter(pick).collect();

    let kind = match &criteria.filter {
        ActiveFilter::BuiltIn(f) => f.consistency_kind(),
        _ => None,
    };
    match (kind, consistency) {
        (Some(kind), Some(report)) => clustered(selected, report, kind),
        _ => selected.into_iter().cloned().collect(),
    }
}

/// Units sharing a key are emitted together; clusters appear in the document order of their
/// first member and are internally ordered by document order.
fn clustered(
    mut units: Vec<&TranslationUnit>,
    report: &ConsistencyReport,
    kind: ConsistencyKind,
) -> Vec<TranslationUnit> {
    units.sort_by_key(|u| u.order);
    let mut cluster_of: HashMap<String, usize> = HashMap::new();
    let mut clusters: Vec<Vec<&TranslationUnit>> = Vec::new();
    for u in units {
        let key = report.key_for(u, kind);
        let idx = *cluster_of.entry(key).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[idx].push(u);
    }
    clusters.into_iter().flatten().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::analyze_consistency;
    use crate::settings::ConsistencySettings;

    fn tu(id: &str, order: i64, src: &str, tgt: &str) -> TranslationUnit {
        TranslationUnit::new(id, order, src, tgt, "en", "fr")
    }

    fn ids(units: &[TranslationUnit]) -> Vec<&str> {
        units.iter().map(|u| u.id.as_str()).collect()
    }

    #[test]
    fn custom_and_filter() {
        let units = vec![
            tu("1", 1, "Error in file", ""),
            tu("2", 2, "Error in file", "Erreur"),
            tu("3", 3, "Warning", ""),
        ];
        let criteria = FilterCriteria {
            filter: ActiveFilter::Custom(CustomFilter {
                match_type: MatchType::And,
                conditions: vec![
                    FilterCondition::new(ConditionScope::Status, ConditionOperator::Equal, "empty"),
                    FilterCondition::new(ConditionScope::Source, ConditionOperator::Contains, "Error"),
                ],
                ..CustomFilter::default()
            }),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&select(&units, &criteria, None)), vec!["1"]);
    }

    #[test]
    fn custom_or_and_metadata() {
        let mut a = tu("1", 1, "A", "a");
        a.metadata.insert("changeid".to_string(), "Alice".to_string());
        let units = vec![a, tu("2", 2, "B", "b"), tu("3", 3, "C", "")];
        let criteria = FilterCriteria {
            filter: ActiveFilter::Custom(CustomFilter {
                match_type: MatchType::Or,
                conditions: vec![
                    FilterCondition {
                        field: Some("changeid".to_string()),
                        ..FilterCondition::new(ConditionScope::Metadata, ConditionOperator::Equal, "alice")
                    },
                    FilterCondition::new(ConditionScope::Status, ConditionOperator::Equal, "EMPTY"),
                ],
                ..CustomFilter::default()
            }),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&select(&units, &criteria, None)), vec!["1", "3"]);
    }

    #[test]
    fn query_modes() {
        let units = vec![tu("1", 1, "Save file", "x"), tu("2", 2, "Save <<TAG:1>>all", "y")];
        let mut criteria = FilterCriteria {
            source_query: Some(TextQuery {
                text: "save*".to_string(),
                mode: QueryMode::Wildcard,
                case_sensitive: false,
            }),
            ..FilterCriteria::default()
        };
        assert_eq!(select(&units, &criteria, None).len(), 2);
        criteria.source_query = Some(TextQuery {
            text: "file".to_string(),
            mode: QueryMode::Wildcard,
            case_sensitive: false,
        });
        assert!(select(&units, &criteria, None).is_empty());
        criteria.source_query = Some(TextQuery::literal("save all"));
        assert_eq!(ids(&select(&units, &criteria, None)), vec!["2"]);
        criteria.source_query = Some(TextQuery {
            text: "(".to_string(),
            mode: QueryMode::Regex,
            case_sensitive: false,
        });
        assert!(select(&units, &criteria, None).is_empty());
    }

    #[test]
    fn scope_and_status() {
        let mut de = tu("3", 3, "Open", "Öffnen");
        de.target_lang = "de".to_string();
        let mut other_file = tu("2", 2, "Open", "");
        other_file.file_id = "b.tmx".to_string();
        let mut first = tu("1", 1, "Open", "");
        first.file_id = "a.tmx".to_string();
        let units = vec![first, other_file, de];
        let mut criteria = FilterCriteria::for_pair("en", "FR");
        criteria.status = Some(UnitStatus::Empty);
        assert_eq!(ids(&select(&units, &criteria, None)), vec!["1", "2"]);
        criteria.file_id = Some("a.tmx".to_string());
        assert_eq!(ids(&select(&units, &criteria, None)), vec!["1"]);
    }

    #[test]
    fn builtins() {
        let mut commented = tu("3", 3, "C", "c");
        commented.metadata.insert("comment".to_string(), "check".to_string());
        let units = vec![
            tu("1", 1, "Same", "Same"),
            tu("2", 2, "B", ""),
            commented,
            tu("4", 4, "Bad\u{0007}", "x"),
            tu("5", 5, "Tag <<TAG:bad id>>", "x"),
        ];
        let by = |f| ids(&select(&units, &FilterCriteria { filter: ActiveFilter::BuiltIn(f), ..FilterCriteria::default() }, None))
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        assert_eq!(by(BuiltInFilter::SameAsSource), vec!["1"]);
        assert_eq!(by(BuiltInFilter::Untranslated), vec!["2"]);
        assert_eq!(by(BuiltInFilter::HasComment), vec!["3"]);
        assert_eq!(by(BuiltInFilter::HasInvalidCharacters), vec!["4", "5"]);
        assert!(by(BuiltInFilter::Repetitions).is_empty());
    }

    #[test]
    fn inconsistency_results_are_clustered() {
        let units = vec![
            tu("1", 1, "Open", "Ouvrir"),
            tu("2", 2, "Close", "Fermer"),
            tu("3", 3, "Close", "Clore"),
            tu("4", 4, "Open", "Ouvert"),
        ];
        let report = analyze_consistency(&units, "en", "fr", &ConsistencySettings::default());
        let criteria = FilterCriteria {
            filter: ActiveFilter::BuiltIn(BuiltInFilter::TargetInconsistency),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&select(&units, &criteria, Some(&report))), vec!["1", "4", "2", "3"]);
    }
}
