use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{WorkbenchError, WorkbenchResult};
use crate::ir::Severity;
use crate::settings::{CheckCondition, CustomCheck, QaSettings};
use crate::textutil::{MatchOptions, TermMatcher};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleFlags {
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

/// Check descriptor produced from a natural-language description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRule {
    pub title: String,
    #[serde(default)]
    pub source_pattern: String,
    #[serde(default)]
    pub target_pattern: String,
    #[serde(default)]
    pub condition: CheckCondition,
    #[serde(default)]
    pub flags: RuleFlags,
}

/// Opaque rule generator (typically backed by a language model).
pub trait RuleAssistant {
    fn generate_rule(&self, description: &str) -> anyhow::Result<GeneratedRule>;
}

fn generated_id(rule: &GeneratedRule) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule.title.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(rule.source_pattern.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(rule.target_pattern.as_bytes());
    format!("gen-{}", &hex::encode(hasher.finalize())[..8])
}

fn validate(pattern: &str, opts: MatchOptions) -> WorkbenchResult<()> {
    if pattern.is_empty() {
        return Ok(());
    }
    TermMatcher::new(pattern, opts)
        .map(|_| ())
        .map_err(|e| WorkbenchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

impl TryFrom<GeneratedRule> for CustomCheck {
    type Error = WorkbenchError;

    fn try_from(rule: GeneratedRule) -> Result<Self, Self::Error> {
        if rule.source_pattern.is_empty() && rule.target_pattern.is_empty() {
            return Err(WorkbenchError::Assistant(anyhow::anyhow!(
                "generated rule {:?} has no patterns",
                rule.title
            )));
        }
        let opts = MatchOptions {
            is_regex: rule.flags.is_regex || rule.condition == CheckCondition::BothMatchRegex,
            case_sensitive: rule.flags.case_sensitive,
            whole_word: rule.flags.whole_word,
            diacritic_sensitive: true,
        };
        validate(&rule.source_pattern, opts)?;
        validate(&rule.target_pattern, opts)?;
        Ok(CustomCheck {
            id: generated_id(&rule),
            title: rule.title,
            enabled: true,
            source_pattern: rule.source_pattern,
            target_pattern: rule.target_pattern,
            is_regex: rule.flags.is_regex,
            case_sensitive: rule.flags.case_sensitive,
            whole_word: rule.flags.whole_word,
            condition: rule.condition,
            severity: Severity::Warning,
        })
    }
}

/// Asks `assistant` for a check and appends it to `settings`. Generation failures come back as
/// [`WorkbenchError::Assistant`]; settings are untouched on any error.
pub fn add_generated_check(
    settings: &mut QaSettings,
    assistant: &dyn RuleAssistant,
    description: &str,
) -> WorkbenchResult<CustomCheck> {
    let rule = assistant
        .generate_rule(description)
        .map_err(WorkbenchError::Assistant)?;
    let check = CustomCheck::try_from(rule)?;
    match settings.custom_checks.iter_mut().find(|c| c.id == check.id) {
        Some(existing) => *existing = check.clone(),
        None => settings.custom_checks.push(check.clone()),
    }
    info!(id = %check.id, title = %check.title, "custom check generated");
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<GeneratedRule>);

    impl RuleAssistant for Fixed {
        fn generate_rule(&self, _description: &str) -> anyhow::Result<GeneratedRule> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("model unavailable"))
        }
    }

    fn rule(source: &str, is_regex: bool) -> GeneratedRule {
        GeneratedRule {
            title: "Error must be Erreur".to_string(),
            source_pattern: source.to_string(),
            target_pattern: "Erreur".to_string(),
            condition: CheckCondition::SourceFoundTargetMissing,
            flags: RuleFlags {
                is_regex,
                ..RuleFlags::default()
            },
        }
    }

    #[test]
    fn appends_check() {
        let mut s = QaSettings::default();
        let check = add_generated_check(&mut s, &Fixed(Some(rule("Error", false))), "x").expect("ok");
        assert!(check.id.starts_with("gen-"));
        assert_eq!(s.custom_checks.len(), 1);
        add_generated_check(&mut s, &Fixed(Some(rule("Error", false))), "x").expect("ok");
        assert_eq!(s.custom_checks.len(), 1);
    }

    #[test]
    fn failures_are_surfaced_not_applied() {
        let mut s = QaSettings::default();
        let err = add_generated_check(&mut s, &Fixed(None), "x").expect_err("fails");
        assert_eq!(err.code(), "ASSISTANT_ERROR");
        let err = add_generated_check(&mut s, &Fixed(Some(rule("(", true))), "x").expect_err("fails");
        assert_eq!(err.code(), "INVALID_PATTERN");
        assert!(s.custom_checks.is_empty());
    }

    #[test]
    fn descriptor_from_json() {
        let rule: GeneratedRule = serde_json::from_str(
            r#"{"title":"t","sourcePattern":"a","targetPattern":"b","condition":"both_found","flags":{"isRegex":true}}"#,
        )
        .expect("json");
        assert!(rule.flags.is_regex);
        assert_eq!(rule.condition, CheckCondition::BothFound);
    }
}
