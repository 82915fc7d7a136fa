//! Structural sanitation of a corpus, separate from the find/replace chain.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::{BatchRule, CompiledRule};
use crate::ir::{Scope, Side, TmxTag, TranslationUnit, META_CHANGE_ID, META_CREATION_ID};
use crate::sentinels::{is_tag_token, ANY_TAG_LIKE_RE, TAG_TOKEN_RE};
use crate::textutil::strip_tags;

static HSPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("space run regex"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    Keep,
    /// Drop malformed tokens and orphan definitions, borrow missing definitions from the source.
    Repair,
    Strip,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanupOptions {
    pub scope: Scope,
    pub strip_control_chars: bool,
    pub trim_whitespace: bool,
    pub collapse_whitespace: bool,
    pub regex_fix: Option<BatchRule>,
    pub tag_mode: TagMode,
    pub remove_empty: bool,
    pub remove_duplicates: bool,
    pub anonymize_metadata: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            scope: Scope::Both,
            strip_control_chars: true,
            trim_whitespace: true,
            collapse_whitespace: false,
            regex_fix: None,
            tag_mode: TagMode::Keep,
            remove_empty: false,
            remove_duplicates: false,
            anonymize_metadata: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub modified: usize,
    pub deleted: usize,
    pub duplicates_removed: usize,
    pub tags_fixed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CleanupResult {
    pub units: Vec<TranslationUnit>,
    pub report: CleanupReport,
    /// Ids of every unit removed, empty and duplicate alike.
    pub deleted_ids: Vec<String>,
}

fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn clean_text(text: &str, opts: &CleanupOptions, fix: Option<&CompiledRule>) -> String {
    let mut out = text.to_string();
    if opts.strip_control_chars {
        out = strip_control(&out);
    }
    if opts.collapse_whitespace {
        out = HSPACE_RUN_RE.replace_all(&out, " ").into_owned();
    }
    if opts.trim_whitespace {
        out = out.trim().to_string();
    }
    if let Some(rule) = fix {
        out = rule.apply(&out);
    }
    out
}

/// Returns the number of fixes made.
fn repair_tags(unit: &mut TranslationUnit, side: Side) -> usize {
    let mut fixed = 0usize;
    let source_tags: Vec<TmxTag> = unit.source.tags.clone();
    let seg = unit.segment_mut(side);

    let malformed = ANY_TAG_LIKE_RE
        .find_iter(&seg.text)
        .filter(|m| !is_tag_token(m.as_str()))
        .count();
    if malformed > 0 {
        seg.text = ANY_TAG_LIKE_RE
            .replace_all(&seg.text, |c: &regex::Captures<'_>| {
                if is_tag_token(&c[0]) {
                    c[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();
        fixed += malformed;
    }

    let mut drop_ids: HashSet<String> = HashSet::new();
    for id in seg.undefined_tag_ids() {
        match source_tags.iter().find(|t| t.id == id) {
            Some(def) if side == Side::Target => {
                seg.tags.push(def.clone());
                fixed += 1;
            }
            _ => {
                drop_ids.insert(id);
            }
        }
    }
    if !drop_ids.is_empty() {
        seg.text = TAG_TOKEN_RE
            .replace_all(&seg.text, |c: &regex::Captures<'_>| {
                if drop_ids.contains(&c[1]) {
                    fixed += 1;
                    String::new()
                } else {
                    c[0].to_string()
                }
            })
            .into_owned();
    }

    let orphans: HashSet<String> = seg.orphan_tags().iter().map(|t| t.id.clone()).collect();
    let before = seg.tags.len();
    seg.tags.retain(|t| !orphans.contains(&t.id));
    fixed += before - seg.tags.len();
    fixed
}

fn strip_all_tags(unit: &mut TranslationUnit, side: Side) -> usize {
    let seg = unit.segment_mut(side);
    let n = ANY_TAG_LIKE_RE.find_iter(&seg.text).count();
    if n == 0 && seg.tags.is_empty() {
        return 0;
    }
    seg.text = ANY_TAG_LIKE_RE.replace_all(&seg.text, "").into_owned();
    seg.tags.clear();
    n.max(1)
}

fn anonymize(unit: &mut TranslationUnit) {
    unit.metadata.remove(META_CREATION_ID);
    unit.metadata.remove(META_CHANGE_ID);
    unit.last_modified_by = None;
}

/// Sanitizes `units`. Locked units are left exactly as they are and never deleted.
pub fn run_cleanup(units: &[TranslationUnit], opts: &CleanupOptions) -> CleanupResult {
    let fix = opts.regex_fix.as_ref().filter(|r| !r.find.is_empty()).and_then(|r| match r.compile() {
        Ok(c) => Some(c),
        Err(err) => {
            warn!(error = %err, "skipping cleanup regex fix");
            None
        }
    });

    let mut report = CleanupReport::default();
    let mut out: Vec<TranslationUnit> = Vec::with_capacity(units.len());
    let mut deleted_ids = Vec::new();
    let mut seen: HashSet<(String, String, String, String)> = HashSet::new();

    for tu in units {
        if tu.is_locked {
            out.push(tu.clone());
            continue;
        }
        let mut next = tu.clone();
        for side in opts.scope.sides() {
            let seg = next.segment_mut(*side);
            seg.text = clean_text(&seg.text, opts, fix.as_ref());
            report.tags_fixed += match opts.tag_mode {
                TagMode::Keep => 0,
                TagMode::Repair => repair_tags(&mut next, *side),
                TagMode::Strip => strip_all_tags(&mut next, *side),
            };
        }
        if opts.anonymize_metadata {
            anonymize(&mut next);
        }
        if next.target.text != tu.target.text {
            next.recompute_status();
        }
        if next.source != tu.source || next.target != tu.target {
            next.qa_issues.clear();
        }

        if opts.remove_empty && strip_tags(&next.source.text).trim().is_empty() {
            report.deleted += 1;
            deleted_ids.push(next.id);
            continue;
        }
        if opts.remove_duplicates {
            let key = (
                next.source_lang.to_ascii_lowercase(),
                next.target_lang.to_ascii_lowercase(),
                next.source.text.clone(),
                next.target.text.clone(),
            );
            if !seen.insert(key) {
                report.duplicates_removed += 1;
                deleted_ids.push(next.id);
                continue;
            }
        }
        if next != *tu {
            report.modified += 1;
        }
        out.push(next);
    }

    info!(
        modified = report.modified,
        deleted = report.deleted,
        duplicates = report.duplicates_removed,
        tags_fixed = report.tags_fixed,
        "cleanup finished"
    );
    CleanupResult {
        units: out,
        report,
        deleted_ids,
    }
}
