//! Chained find/replace over a working set of units, executed in fixed-size chunks.
//!
//! A job owns the [`BatchGuard`] for its whole life, so at most one job exists per lock. The
//! host drives it with [`BatchJob::step`]; control returns after every chunk. Chunks already
//! processed stay applied if the host abandons the job.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{WorkbenchError, WorkbenchResult};
use crate::ir::{Scope, Side, TranslationUnit, META_CHANGE_ID};
use crate::progress::{percent, ProgressSink};
use crate::textutil::{MatchOptions, TermMatcher};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchRule {
    pub find: String,
    pub replace: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub diacritic_sensitive: bool,
}

impl Default for BatchRule {
    fn default() -> Self {
        Self {
            find: String::new(),
            replace: String::new(),
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
            diacritic_sensitive: true,
        }
    }
}

impl BatchRule {
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            ..Self::default()
        }
    }

    pub fn regex(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            is_regex: true,
            ..Self::literal(find, replace)
        }
    }

    /// Regex rules run as written apart from the case flag; whole-word wrapping and diacritic
    /// folding apply to literal rules only.
    pub fn compile(&self) -> Result<CompiledRule, WorkbenchError> {
        let opts = MatchOptions {
            is_regex: self.is_regex,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word && !self.is_regex,
            diacritic_sensitive: self.diacritic_sensitive || self.is_regex,
        };
        let matcher = TermMatcher::new(&self.find, opts).map_err(|e| WorkbenchError::InvalidPattern {
            pattern: self.find.clone(),
            reason: e.to_string(),
        })?;
        Ok(CompiledRule {
            matcher,
            replace: self.replace.clone(),
            expand: self.is_regex,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CompiledRule {
    matcher: TermMatcher,
    replace: String,
    expand: bool,
}

impl CompiledRule {
    pub fn apply(&self, text: &str) -> String {
        self.matcher.replace_all(text, &self.replace, self.expand)
    }
}

/// Compiles the chain in order; empty or invalid rules are logged and dropped.
pub fn compile_rules(rules: &[BatchRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter(|r| !r.find.is_empty())
        .filter_map(|r| match r.compile() {
            Ok(c) => Some(c),
            Err(err) => {
                warn!(error = %err, "skipping batch rule");
                None
            }
        })
        .collect()
}

pub fn apply_chain(text: &str, rules: &[CompiledRule]) -> String {
    rules
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetadataUpdates {
    /// Written to `changeid`.
    pub change_id: Option<String>,
    /// Stamp `changedate` and `lastModified` with the job's start time.
    pub set_change_date: bool,
}

impl MetadataUpdates {
    pub fn apply(&self, unit: &mut TranslationUnit, now: DateTime<Utc>) {
        if self.set_change_date {
            unit.touch(self.change_id.as_deref(), now);
        } else if let Some(id) = &self.change_id {
            unit.metadata.insert(META_CHANGE_ID.to_string(), id.clone());
            unit.last_modified_by = Some(id.clone());
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    pub scope: Scope,
    pub only_filtered: bool,
    pub rules: Vec<BatchRule>,
    pub metadata_updates: MetadataUpdates,
}

/// Runs the chain over the sides in `scope`. `None` when nothing changed.
pub fn transform_unit(
    unit: &TranslationUnit,
    rules: &[CompiledRule],
    scope: Scope,
) -> Option<TranslationUnit> {
    let mut next: Option<TranslationUnit> = None;
    for side in scope.sides() {
        let before = &unit.segment(*side).text;
        let after = apply_chain(before, rules);
        if after != *before {
            let tu = next.get_or_insert_with(|| unit.clone());
            tu.segment_mut(*side).text = after;
            if *side == Side::Target {
                tu.recompute_status();
            }
        }
    }
    next
}

/// Indices of the units a job touches. With `only_filtered`, `filtered` lists the unit ids
/// currently selected by the host; no selection means an empty working set.
pub fn working_set(
    units: &[TranslationUnit],
    config: &BatchConfig,
    filtered: Option<&[String]>,
) -> Vec<usize> {
    let allowed: Option<HashSet<&str>> = match (config.only_filtered, filtered) {
        (true, Some(ids)) => Some(ids.iter().map(String::as_str).collect()),
        (true, None) => {
            warn!("batch limited to filtered units but no selection was given");
            Some(HashSet::new())
        }
        (false, _) => None,
    };
    units
        .iter()
        .enumerate()
        .filter(|(_, u)| !u.is_locked)
        .filter(|(_, u)| allowed.as_ref().map(|a| a.contains(u.id.as_str())).unwrap_or(true))
        .map(|(i, _)| i)
        .collect()
}

/// Single-job mutual exclusion for batch execution.
#[derive(Clone, Debug, Default)]
pub struct BatchLock {
    busy: Arc<AtomicBool>,
}

impl BatchLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> WorkbenchResult<BatchGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkbenchError::BatchInProgress)?;
        Ok(BatchGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the lock on drop.
#[derive(Debug)]
pub struct BatchGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    /// Monotonic, 0..=100.
    pub percent: f64,
    /// Units modified so far.
    pub modified: usize,
    pub done: bool,
}

pub struct BatchJob {
    targets: Vec<(usize, String)>,
    rules: Vec<CompiledRule>,
    scope: Scope,
    metadata: MetadataUpdates,
    chunk_size: usize,
    cursor: usize,
    modified: usize,
    modified_ids: Vec<String>,
    started: DateTime<Utc>,
    _guard: BatchGuard,
}

impl BatchJob {
    pub fn new(
        guard: BatchGuard,
        units: &[TranslationUnit],
        config: &BatchConfig,
        filtered: Option<&[String]>,
        chunk_size: usize,
    ) -> Self {
        let targets = working_set(units, config, filtered)
            .into_iter()
            .map(|i| (i, units[i].id.clone()))
            .collect::<Vec<_>>();
        info!(units = targets.len(), rules = config.rules.len(), "batch job started");
        Self {
            targets,
            rules: compile_rules(&config.rules),
            scope: config.scope,
            metadata: config.metadata_updates.clone(),
            chunk_size: chunk_size.max(1),
            cursor: 0,
            modified: 0,
            modified_ids: Vec::new(),
            started: Utc::now(),
            _guard: guard,
        }
    }

    pub fn total(&self) -> usize {
        self.targets.len()
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.targets.len()
    }

    pub fn modified_ids(&self) -> &[String] {
        &self.modified_ids
    }

    fn progress(&self) -> BatchProgress {
        BatchProgress {
            processed: self.cursor,
            total: self.targets.len(),
            percent: percent(self.cursor, self.targets.len()),
            modified: self.modified,
            done: self.is_done(),
        }
    }

    /// Processes the next chunk in place. Modified units get their issue list cleared.
    pub fn step(&mut self, units: &mut [TranslationUnit]) -> BatchProgress {
        let end = (self.cursor + self.chunk_size).min(self.targets.len());
        for (idx, id) in &self.targets[self.cursor..end] {
            // The corpus may have been reshaped between chunks; fall back to a lookup by id.
            let slot = if units.get(*idx).map(|u| &u.id == id).unwrap_or(false) {
                Some(*idx)
            } else {
                units.iter().position(|u| &u.id == id)
            };
            let Some(slot) = slot else { continue };
            if units[slot].is_locked {
                continue;
            }
            if let Some(mut next) = transform_unit(&units[slot], &self.rules, self.scope) {
                next.qa_issues.clear();
                self.metadata.apply(&mut next, self.started);
                units[slot] = next;
                self.modified += 1;
                self.modified_ids.push(id.clone());
            }
        }
        self.cursor = end;
        let p = self.progress();
        debug!(processed = p.processed, total = p.total, modified = p.modified, "batch chunk done");
        if p.done {
            info!(modified = p.modified, "batch job finished");
        }
        p
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub modified: usize,
}

/// Runs a whole job over a copy of `units`, reporting each chunk to `sink`.
pub fn run_batch_transform(
    lock: &BatchLock,
    units: &[TranslationUnit],
    config: &BatchConfig,
    filtered: Option<&[String]>,
    chunk_size: usize,
    sink: &dyn ProgressSink,
) -> WorkbenchResult<(Vec<TranslationUnit>, BatchOutcome)> {
    let guard = lock.try_acquire()?;
    let mut job = BatchJob::new(guard, units, config, filtered, chunk_size);
    let mut out = units.to_vec();
    loop {
        let p = job.step(&mut out);
        sink.progress("batch", p.processed, p.total);
        if p.done {
            return Ok((out, BatchOutcome { modified: p.modified }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::UnitStatus;
    use crate::progress::NoProgress;
    use std::cell::RefCell;

    fn tu(id: &str, src: &str, tgt: &str) -> TranslationUnit {
        TranslationUnit::new(id, 0, src, tgt, "en", "fr")
    }

    fn config(rules: Vec<BatchRule>) -> BatchConfig {
        BatchConfig {
            rules,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn colour_to_color_is_idempotent() {
        let lock = BatchLock::new();
        let units = vec![tu("1", "x", "colour scheme"), tu("2", "y", "other")];
        let cfg = config(vec![BatchRule::literal("colour", "color")]);
        let (once, out) = run_batch_transform(&lock, &units, &cfg, None, 500, &NoProgress).expect("run");
        assert_eq!(once[0].target.text, "color scheme");
        assert_eq!(out.modified, 1);
        let (twice, out) = run_batch_transform(&lock, &once, &cfg, None, 500, &NoProgress).expect("run");
        assert_eq!(out.modified, 0);
        assert_eq!(twice, once);
    }

    #[test]
    fn chain_runs_in_order_with_backrefs() {
        let rules = compile_rules(&[
            BatchRule::regex(r"(\d+)-(\d+)", "$1–$2"),
            BatchRule::literal("pages", "pp."),
            BatchRule::regex("(", "x"),
        ]);
        assert_eq!(rules.len(), 2);
        assert_eq!(apply_chain("pages 3-5", &rules), "pp. 3–5");
    }

    #[test]
    fn literal_options() {
        let mut rule = BatchRule::literal("cat", "dog");
        rule.whole_word = true;
        let c = rule.compile().expect("compile");
        assert_eq!(c.apply("Cat concat cat"), "dog concat dog");
        rule.case_sensitive = true;
        let c = rule.compile().expect("compile");
        assert_eq!(c.apply("Cat concat cat"), "Cat concat dog");
        let literal_dollar = BatchRule::literal("x", "$1").compile().expect("compile");
        assert_eq!(literal_dollar.apply("x"), "$1");
    }

    #[test]
    fn scope_locks_and_status() {
        let lock = BatchLock::new();
        let mut locked = tu("2", "colour", "colour");
        locked.is_locked = true;
        let mut approved = tu("3", "colour", "colour");
        approved.status = UnitStatus::Approved;
        let units = vec![tu("1", "colour", "colour"), locked, approved];
        let cfg = BatchConfig {
            scope: Scope::Both,
            ..config(vec![BatchRule::literal("colour", "color")])
        };
        let (out, res) = run_batch_transform(&lock, &units, &cfg, None, 500, &NoProgress).expect("run");
        assert_eq!(res.modified, 2);
        assert_eq!(out[0].source.text, "color");
        assert_eq!(out[1].target.text, "colour");
        assert_eq!(out[2].status, UnitStatus::Translated);
    }

    #[test]
    fn only_filtered_and_metadata() {
        let lock = BatchLock::new();
        let units = vec![tu("1", "a", "colour"), tu("2", "b", "colour")];
        let cfg = BatchConfig {
            only_filtered: true,
            metadata_updates: MetadataUpdates {
                change_id: Some("bot".to_string()),
                set_change_date: true,
            },
            ..config(vec![BatchRule::literal("colour", "color")])
        };
        let filtered = vec!["2".to_string()];
        let (out, res) =
            run_batch_transform(&lock, &units, &cfg, Some(&filtered), 500, &NoProgress).expect("run");
        assert_eq!(res.modified, 1);
        assert_eq!(out[0].target.text, "colour");
        assert_eq!(out[1].metadata.get("changeid").map(String::as_str), Some("bot"));
        assert!(out[1].metadata.contains_key("changedate"));
    }

    #[test]
    fn only_filtered_without_selection_touches_nothing() {
        let lock = BatchLock::new();
        let units = vec![tu("1", "a", "colour"), tu("2", "b", "colour")];
        let cfg = BatchConfig {
            only_filtered: true,
            ..config(vec![BatchRule::literal("colour", "color")])
        };
        assert!(working_set(&units, &cfg, None).is_empty());
        let (out, res) = run_batch_transform(&lock, &units, &cfg, None, 500, &NoProgress).expect("run");
        assert_eq!(res.modified, 0);
        assert_eq!(out, units);
    }

    #[test]
    fn second_job_is_rejected_while_first_alive() {
        let lock = BatchLock::new();
        let units = vec![tu("1", "a", "b")];
        let guard = lock.try_acquire().expect("first");
        let job = BatchJob::new(guard, &units, &BatchConfig::default(), None, 500);
        assert!(matches!(lock.try_acquire(), Err(WorkbenchError::BatchInProgress)));
        drop(job);
        assert!(!lock.is_busy());
    }

    struct Recorder(RefCell<Vec<(usize, usize)>>);

    impl ProgressSink for Recorder {
        fn progress(&self, _label: &str, current: usize, total: usize) {
            self.0.borrow_mut().push((current, total));
        }
    }

    #[test]
    fn chunked_progress_is_monotonic() {
        let lock = BatchLock::new();
        let units: Vec<_> = (0..1200).map(|i| tu(&i.to_string(), "s", "colour")).collect();
        let cfg = config(vec![BatchRule::literal("colour", "color")]);
        let rec = Recorder(RefCell::new(Vec::new()));
        let (_, res) = run_batch_transform(&lock, &units, &cfg, None, 500, &rec).expect("run");
        assert_eq!(res.modified, 1200);
        assert_eq!(*rec.0.borrow(), vec![(500, 1200), (1000, 1200), (1200, 1200)]);
    }

    #[test]
    fn empty_working_set_completes_immediately() {
        let lock = BatchLock::new();
        let guard = lock.try_acquire().expect("lock");
        let mut units: Vec<TranslationUnit> = Vec::new();
        let mut job = BatchJob::new(guard, &units, &BatchConfig::default(), None, 500);
        let p = job.step(&mut units);
        assert!(p.done);
        assert_eq!(p.percent, 100.0);
    }
}
