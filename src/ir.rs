use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sentinels::tag_ids_from_text;

pub const META_CREATION_ID: &str = "creationid";
pub const META_CREATION_DATE: &str = "creationdate";
pub const META_CHANGE_ID: &str = "changeid";
pub const META_CHANGE_DATE: &str = "changedate";
pub const META_COMMENT: &str = "comment";

/// TMX-style timestamp used for `creationdate`/`changedate`.
pub const META_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmxTag {
    /// Placeholder token value; `<<TAG:{id}>>` in segment text.
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSegment {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<TmxTag>,
}

impl TranslationSegment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
        }
    }

    pub fn tag(&self, id: &str) -> Option<&TmxTag> {
        self.tags.iter().find(|t| t.id == id)
    }

    /// Token ids in `text` that have no entry in `tags`.
    pub fn undefined_tag_ids(&self) -> Vec<String> {
        tag_ids_from_text(&self.text)
            .into_iter()
            .filter(|id| self.tag(id).is_none())
            .collect()
    }

    /// Tag entries whose token does not occur in `text`.
    pub fn orphan_tags(&self) -> Vec<&TmxTag> {
        let ids = tag_ids_from_text(&self.text);
        self.tags.iter().filter(|t| !ids.contains(&t.id)).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    #[default]
    Empty,
    Translated,
    Approved,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Translated => "translated",
            Self::Approved => "approved",
        }
    }

    pub fn for_target(text: &str) -> Self {
        if text.trim().is_empty() {
            Self::Empty
        } else {
            Self::Translated
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Half-open `[start, end)` range in chars of the tagged segment text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaIssue {
    pub id: String,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub is_ignored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_highlights: Vec<Highlight>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationUnit {
    pub id: String,
    #[serde(default)]
    pub tu_id: String,
    #[serde(default)]
    pub order: i64,
    pub source: TranslationSegment,
    pub target: TranslationSegment,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default)]
    pub qa_issues: Vec<QaIssue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub file_id: String,
}

impl TranslationUnit {
    /// Minimal unit with plain (untagged) text; mostly for hosts and tests.
    pub fn new(
        id: impl Into<String>,
        order: i64,
        source: impl Into<String>,
        target: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let target = TranslationSegment::plain(target);
        let status = UnitStatus::for_target(&target.text);
        Self {
            tu_id: id.clone(),
            id,
            order,
            source: TranslationSegment::plain(source),
            target,
            status,
            qa_issues: Vec::new(),
            metadata: BTreeMap::new(),
            is_locked: false,
            last_modified: None,
            last_modified_by: None,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            project_id: String::new(),
            file_id: String::new(),
        }
    }

    pub fn language_pair(&self) -> (&str, &str) {
        (&self.source_lang, &self.target_lang)
    }

    pub fn in_pair(&self, source_lang: &str, target_lang: &str) -> bool {
        self.source_lang.eq_ignore_ascii_case(source_lang)
            && self.target_lang.eq_ignore_ascii_case(target_lang)
    }

    pub fn comment(&self) -> Option<&str> {
        self.metadata
            .get(META_COMMENT)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Replaces the target text and recomputes the derived status.
    /// Approval is dropped: only an explicit approve marks a unit approved.
    pub fn set_target_text(&mut self, text: impl Into<String>) {
        self.target.text = text.into();
        self.recompute_status();
    }

    pub fn recompute_status(&mut self) {
        self.status = UnitStatus::for_target(&self.target.text);
    }

    pub fn segment(&self, side: Side) -> &TranslationSegment {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    pub fn segment_mut(&mut self, side: Side) -> &mut TranslationSegment {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }

    /// Stamps `lastModified`/`changedate` and, when given, `changeid`.
    pub fn touch(&mut self, change_id: Option<&str>, now: chrono::DateTime<chrono::Utc>) {
        let stamp = now.format(META_DATE_FORMAT).to_string();
        self.metadata
            .insert(META_CHANGE_DATE.to_string(), stamp.clone());
        self.last_modified = Some(stamp);
        if let Some(user) = change_id {
            self.metadata
                .insert(META_CHANGE_ID.to_string(), user.to_string());
            self.last_modified_by = Some(user.to_string());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

/// Which side(s) of a unit an operation applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Source,
    #[default]
    Target,
    Both,
}

impl Scope {
    pub fn sides(self) -> &'static [Side] {
        match self {
            Self::Source => &[Side::Source],
            Self::Target => &[Side::Target],
            Self::Both => &[Side::Source, Side::Target],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_target_text() {
        let mut tu = TranslationUnit::new("1", 0, "Open", "", "en", "fr");
        assert_eq!(tu.status, UnitStatus::Empty);
        tu.set_target_text("Ouvrir");
        assert_eq!(tu.status, UnitStatus::Translated);
        tu.status = UnitStatus::Approved;
        tu.set_target_text("  ");
        assert_eq!(tu.status, UnitStatus::Empty);
    }

    #[test]
    fn undefined_and_orphan_tags() {
        let seg = TranslationSegment {
            text: "Click <<TAG:1>>here<<TAG:2>>".to_string(),
            tags: vec![
                TmxTag {
                    id: "1".to_string(),
                    kind: "bpt".to_string(),
                    content: "<b>".to_string(),
                    index: Some(1),
                },
                TmxTag {
                    id: "9".to_string(),
                    kind: "ph".to_string(),
                    content: "<br/>".to_string(),
                    index: None,
                },
            ],
        };
        assert_eq!(seg.undefined_tag_ids(), vec!["2".to_string()]);
        let orphans: Vec<&str> = seg.orphan_tags().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(orphans, vec!["9"]);
    }

    #[test]
    fn unit_json_uses_camel_case() {
        let tu = TranslationUnit::new("u1", 3, "Save", "Enregistrer", "en", "fr");
        let v = serde_json::to_value(&tu).expect("serialize");
        assert_eq!(v["tuId"], "u1");
        assert_eq!(v["status"], "translated");
        assert_eq!(v["sourceLang"], "en");
        let back: TranslationUnit = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, tu);
    }
}
