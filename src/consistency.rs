//! Consistency analysis over one language pair.
//!
//! The output is sets of normalized keys, not unit ids; a unit is attributed to a group by
//! normalizing its own text with the same options and testing membership.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::ir::TranslationUnit;
use crate::normalize::{normalize, NormalizeOptions};
use crate::settings::ConsistencySettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyKind {
    /// One source, several translations. Keyed by normalized source.
    InconsistentTarget,
    /// One translation, several sources. Keyed by normalized target.
    InconsistentSource,
    /// Source seen more than once. Keyed by normalized source.
    Repetition,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub source_lang: String,
    pub target_lang: String,
    pub repetitions: BTreeSet<String>,
    pub inconsistent_targets: BTreeSet<String>,
    pub inconsistent_sources: BTreeSet<String>,
    #[serde(skip)]
    target_options: NormalizeOptions,
    #[serde(skip)]
    source_options: NormalizeOptions,
}

impl ConsistencyReport {
    pub fn is_empty(&self) -> bool {
        self.repetitions.is_empty()
            && self.inconsistent_targets.is_empty()
            && self.inconsistent_sources.is_empty()
    }

    pub fn keys(&self, kind: ConsistencyKind) -> &BTreeSet<String> {
        match kind {
            ConsistencyKind::InconsistentTarget => &self.inconsistent_targets,
            ConsistencyKind::InconsistentSource => &self.inconsistent_sources,
            ConsistencyKind::Repetition => &self.repetitions,
        }
    }

    /// The key `unit` is grouped under for `kind`, computed with the options of the last run.
    pub fn key_for(&self, unit: &TranslationUnit, kind: ConsistencyKind) -> String {
        match kind {
            ConsistencyKind::InconsistentTarget | ConsistencyKind::Repetition => {
                normalize(&unit.source.text, &self.target_options, &unit.source_lang)
            }
            ConsistencyKind::InconsistentSource => {
                normalize(&unit.target.text, &self.source_options, &unit.target_lang)
            }
        }
    }

    /// Group key when `unit` belongs to a flagged group of `kind`.
    pub fn group_of(&self, unit: &TranslationUnit, kind: ConsistencyKind) -> Option<String> {
        if !unit.in_pair(&self.source_lang, &self.target_lang) {
            return None;
        }
        let set = self.keys(kind);
        if set.is_empty() {
            return None;
        }
        if kind == ConsistencyKind::InconsistentSource && unit.target.text.trim().is_empty() {
            return None;
        }
        let key = self.key_for(unit, kind);
        set.contains(&key).then_some(key)
    }
}

/// Builds both maps in one pass over the units of the given pair.
///
/// Units with an empty source are ignored; units with an empty target count as repetitions but
/// take no part in either inconsistency map.
pub fn analyze_consistency(
    units: &[TranslationUnit],
    source_lang: &str,
    target_lang: &str,
    settings: &ConsistencySettings,
) -> ConsistencyReport {
    let t_opts = settings.target_options;
    let s_opts = settings.source_options;

    let mut src_to_tgt: HashMap<String, HashSet<String>> = HashMap::new();
    let mut tgt_to_src: HashMap<String, HashSet<String>> = HashMap::new();
    let mut src_count: HashMap<String, usize> = HashMap::new();

    for tu in units.iter().filter(|u| u.in_pair(source_lang, target_lang)) {
        let src_key = normalize(&tu.source.text, &t_opts, &tu.source_lang);
        if src_key.is_empty() {
            continue;
        }
        *src_count.entry(src_key.clone()).or_insert(0) += 1;
        if tu.target.text.trim().is_empty() {
            continue;
        }
        if settings.target_inconsistency {
            let tgt_key = normalize(&tu.target.text, &t_opts, &tu.target_lang);
            src_to_tgt.entry(src_key).or_default().insert(tgt_key);
        }
        if settings.source_inconsistency {
            let tgt_key = normalize(&tu.target.text, &s_opts, &tu.target_lang);
            let src_key = normalize(&tu.source.text, &s_opts, &tu.source_lang);
            tgt_to_src.entry(tgt_key).or_default().insert(src_key);
        }
    }

    let inconsistent_targets: BTreeSet<String> = src_to_tgt
        .into_iter()
        .filter(|(_, tgts)| tgts.len() > 1)
        .map(|(k, _)| k)
        .collect();
    let inconsistent_sources: BTreeSet<String> = tgt_to_src
        .into_iter()
        .filter(|(k, srcs)| !k.is_empty() && srcs.len() > 1)
        .map(|(k, _)| k)
        .collect();
    let repetitions: BTreeSet<String> = src_count
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .map(|(k, _)| k)
        .collect();

    debug!(
        pair = %format!("{source_lang}->{target_lang}"),
        repetitions = repetitions.len(),
        inconsistent_targets = inconsistent_targets.len(),
        inconsistent_sources = inconsistent_sources.len(),
        "consistency analyzed"
    );

    ConsistencyReport {
        source_lang: source_lang.to_string(),
        target_lang: target_lang.to_string(),
        repetitions,
        inconsistent_targets,
        inconsistent_sources,
        target_options: t_opts,
        source_options: s_opts,
    }
}

/// Consistency kept current on every edit; cheap enough (one O(n) pass) to run live.
pub trait LiveConsistency {
    fn consistency(&self) -> &ConsistencyReport;
    fn refresh_consistency(&mut self) -> &ConsistencyReport;
}
