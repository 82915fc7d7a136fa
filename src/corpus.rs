//! The corpus with its history, consistency state and persistence wired together.
//!
//! Every content mutation replaces the shared `Arc` (cloning the vector when someone else holds
//! it), so a reader that grabbed [`CorpusService::units`] earlier keeps a consistent view.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::batch::{BatchConfig, BatchJob, BatchLock, BatchOutcome, BatchProgress};
use crate::cleanup::{run_cleanup, CleanupOptions, CleanupReport};
use crate::config::WorkbenchConfig;
use crate::consistency::{analyze_consistency, ConsistencyReport, LiveConsistency};
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::filter::{select, FilterCriteria};
use crate::history::{Corpus, HistoryEntry, HistoryManager};
use crate::ir::{Severity, TranslationUnit, UnitStatus};
use crate::locale::{BuiltinLocales, LocaleRegistry};
use crate::progress::ProgressSink;
use crate::qa::{carry_ignored_state, run_qa, set_issue_ignored, AuditScope, AuditSummary, ManualAudit};
use crate::sentinels::tag_token;
use crate::store::UnitStore;
use crate::terminology::GlossaryTerm;

pub struct CorpusService {
    units: Corpus,
    source_lang: String,
    target_lang: String,
    config: WorkbenchConfig,
    history: HistoryManager,
    consistency: ConsistencyReport,
    consistency_stale: bool,
    batch_lock: BatchLock,
    batch: Option<BatchJob>,
    store: Option<Box<dyn UnitStore>>,
    registry: Box<dyn LocaleRegistry>,
}

impl CorpusService {
    pub fn new(
        units: Vec<TranslationUnit>,
        source_lang: &str,
        target_lang: &str,
        config: WorkbenchConfig,
    ) -> Self {
        let history = HistoryManager::new(config.history.capacity);
        let mut svc = Self {
            units: Arc::new(units),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            config,
            history,
            consistency: ConsistencyReport::default(),
            consistency_stale: true,
            batch_lock: BatchLock::new(),
            batch: None,
            store: None,
            registry: Box::new(BuiltinLocales),
        };
        svc.refresh_consistency();
        svc
    }

    /// Loads every unit of `project_id` from `store` and keeps the store for write-back.
    pub fn load_project(
        store: Box<dyn UnitStore>,
        project_id: &str,
        source_lang: &str,
        target_lang: &str,
        config: WorkbenchConfig,
    ) -> WorkbenchResult<Self> {
        let units = store
            .get_units_by_project(project_id)
            .map_err(WorkbenchError::Persistence)?;
        info!(project = project_id, units = units.len(), "project loaded");
        Ok(Self::new(units, source_lang, target_lang, config).with_store(store))
    }

    pub fn with_store(mut self, store: Box<dyn UnitStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: Box<dyn LocaleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Shared handle on the current corpus; never changes under the caller.
    pub fn units(&self) -> Corpus {
        Arc::clone(&self.units)
    }

    pub fn unit(&self, id: &str) -> Option<&TranslationUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn language_pair(&self) -> (&str, &str) {
        (&self.source_lang, &self.target_lang)
    }

    pub fn set_language_pair(&mut self, source_lang: &str, target_lang: &str) -> &ConsistencyReport {
        self.source_lang = source_lang.to_string();
        self.target_lang = target_lang.to_string();
        self.refresh_consistency()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn index_of(&self, id: &str) -> WorkbenchResult<usize> {
        self.units
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| WorkbenchError::UnitNotFound(id.to_string()))
    }

    fn persist(&self, changed: &[TranslationUnit], deleted: &[String]) -> WorkbenchResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let put = if changed.is_empty() {
            Ok(())
        } else {
            store.put_units(changed)
        };
        let result = put.and_then(|_| {
            if deleted.is_empty() {
                Ok(())
            } else {
                store.delete_units(deleted)
            }
        });
        result.map_err(|err| {
            warn!(error = %format!("{err:#}"), "persisting units failed");
            WorkbenchError::Persistence(err)
        })
    }

    /// Single-unit edit: `f` works on a copy; nothing happens when the copy comes back equal.
    fn edit_unit<F>(&mut self, id: &str, description: &str, allow_locked: bool, f: F) -> WorkbenchResult<bool>
    where
        F: FnOnce(&mut TranslationUnit) -> WorkbenchResult<()>,
    {
        let idx = self.index_of(id)?;
        let current = &self.units[idx];
        if current.is_locked && !allow_locked {
            return Err(WorkbenchError::UnitLocked(id.to_string()));
        }
        let mut next = current.clone();
        f(&mut next)?;
        if next == *current {
            return Ok(false);
        }
        next.touch(self.config.batch.change_id.as_deref(), Utc::now());

        self.history.snapshot(&self.units, description);
        Arc::make_mut(&mut self.units)[idx] = next.clone();
        self.refresh_consistency();
        self.persist(&[next], &[])?;
        Ok(true)
    }

    /// Replaces the target text. Returns `false` when the text was already equal.
    pub fn edit_target(&mut self, id: &str, text: &str) -> WorkbenchResult<bool> {
        self.edit_unit(id, "Edit target", false, |tu| {
            if tu.target.text != text {
                tu.set_target_text(text);
            }
            Ok(())
        })
    }

    pub fn set_locked(&mut self, id: &str, locked: bool) -> WorkbenchResult<bool> {
        let description = if locked { "Lock unit" } else { "Unlock unit" };
        self.edit_unit(id, description, true, |tu| {
            tu.is_locked = locked;
            Ok(())
        })
    }

    pub fn approve(&mut self, id: &str) -> WorkbenchResult<bool> {
        self.edit_unit(id, "Approve", false, |tu| {
            tu.status = UnitStatus::Approved;
            Ok(())
        })
    }

    /// Copies source text and tag definitions into the target.
    pub fn copy_source_to_target(&mut self, id: &str) -> WorkbenchResult<bool> {
        self.edit_unit(id, "Copy source to target", false, |tu| {
            if tu.target != tu.source {
                tu.target = tu.source.clone();
                tu.recompute_status();
            }
            Ok(())
        })
    }

    pub fn clear_target(&mut self, id: &str) -> WorkbenchResult<bool> {
        self.edit_unit(id, "Clear target", false, |tu| {
            if !tu.target.text.is_empty() || !tu.target.tags.is_empty() {
                tu.target.text.clear();
                tu.target.tags.clear();
                tu.recompute_status();
            }
            Ok(())
        })
    }

    /// Inserts the token of source tag `tag_id` into the target at char offset `at` (clamped to
    /// the end), copying the tag definition over when the target lacks it.
    pub fn place_tag(&mut self, id: &str, tag_id: &str, at: usize) -> WorkbenchResult<bool> {
        self.edit_unit(id, "Place tag", false, |tu| {
            let def = tu.source.tag(tag_id).cloned().ok_or_else(|| WorkbenchError::TagNotFound {
                unit: tu.id.clone(),
                tag: tag_id.to_string(),
            })?;
            let byte = tu
                .target
                .text
                .char_indices()
                .nth(at)
                .map(|(b, _)| b)
                .unwrap_or(tu.target.text.len());
            let text = &mut tu.target.text;
            text.insert_str(byte, &tag_token(tag_id));
            if tu.target.tag(tag_id).is_none() {
                tu.target.tags.push(def);
            }
            tu.recompute_status();
            Ok(())
        })
    }

    /// Toggles ignore state on one issue. Not a content change, so history is left alone.
    pub fn toggle_issue_ignored(&mut self, unit_id: &str, issue_id: &str, ignored: bool) -> WorkbenchResult<bool> {
        let idx = self.index_of(unit_id)?;
        if !self.units[idx].qa_issues.iter().any(|i| i.id == issue_id) {
            return Ok(false);
        }
        let by = self.config.batch.change_id.clone();
        let units = Arc::make_mut(&mut self.units);
        set_issue_ignored(&mut units[idx], issue_id, ignored, by.as_deref());
        let changed = units[idx].clone();
        self.persist(&[changed], &[])?;
        Ok(true)
    }

    /// Units `criteria` selects, in display order. Refreshes a stale consistency report first.
    pub fn select(&mut self, criteria: &FilterCriteria) -> Vec<TranslationUnit> {
        if self.consistency_stale {
            self.refresh_consistency();
        }
        select(&self.units, criteria, Some(&self.consistency))
    }

    /// Takes the history snapshot and arms a chunked job. Fails while another job is alive.
    pub fn start_batch(&mut self, config: &BatchConfig, filtered: Option<&[String]>) -> WorkbenchResult<usize> {
        let guard = self.batch_lock.try_acquire()?;
        let mut config = config.clone();
        if config.metadata_updates.change_id.is_none() {
            config.metadata_updates.change_id = self.config.batch.change_id.clone();
        }
        let job = BatchJob::new(guard, &self.units, &config, filtered, self.config.batch.chunk_size);
        let total = job.total();
        self.history.snapshot(&self.units, &format!("Batch transform ({} rules)", config.rules.len()));
        self.batch = Some(job);
        Ok(total)
    }

    pub fn batch_running(&self) -> bool {
        self.batch.is_some()
    }

    /// Runs the next chunk. `None` when no job is armed. Chunks already processed stay committed
    /// whatever happens afterwards; modified units are written to the store when the job ends.
    pub fn step_batch(&mut self) -> WorkbenchResult<Option<BatchProgress>> {
        let Some(job) = self.batch.as_mut() else {
            return Ok(None);
        };
        let progress = job.step(Arc::make_mut(&mut self.units).as_mut_slice());
        if progress.modified > 0 {
            self.consistency_stale = true;
        }
        if !progress.done {
            return Ok(Some(progress));
        }
        let modified: HashSet<String> = self
            .batch
            .take()
            .map(|j| j.modified_ids().iter().cloned().collect())
            .unwrap_or_default();
        let changed: Vec<TranslationUnit> = self
            .units
            .iter()
            .filter(|u| modified.contains(&u.id))
            .cloned()
            .collect();
        self.persist(&changed, &[])?;
        Ok(Some(progress))
    }

    /// Whole batch in one call, reporting each chunk to `sink`.
    pub fn run_batch(
        &mut self,
        config: &BatchConfig,
        filtered: Option<&[String]>,
        sink: &dyn ProgressSink,
    ) -> WorkbenchResult<BatchOutcome> {
        self.start_batch(config, filtered)?;
        loop {
            let Some(p) = self.step_batch()? else {
                return Ok(BatchOutcome { modified: 0 });
            };
            sink.progress("batch", p.processed, p.total);
            if p.done {
                return Ok(BatchOutcome { modified: p.modified });
            }
        }
    }

    pub fn cleanup(&mut self, opts: &CleanupOptions) -> WorkbenchResult<CleanupReport> {
        if self.batch.is_some() {
            return Err(WorkbenchError::BatchInProgress);
        }
        let result = run_cleanup(&self.units, opts);
        if result.units == *self.units {
            return Ok(result.report);
        }
        self.history.snapshot(&self.units, "Cleanup");
        let mut units = result.units;
        let now = Utc::now();
        let mut changed = Vec::new();
        for u in units.iter_mut() {
            if self.unit(&u.id) == Some(&*u) {
                continue;
            }
            // Anonymization removes the editor; do not stamp it back.
            if !opts.anonymize_metadata {
                u.touch(self.config.batch.change_id.as_deref(), now);
            }
            changed.push(u.clone());
        }
        self.units = Arc::new(units);
        self.consistency_stale = true;
        self.persist(&changed, &result.deleted_ids)?;
        Ok(result.report)
    }

    fn replace_corpus(&mut self, restored: Corpus) -> WorkbenchResult<()> {
        let kept: HashSet<&str> = restored.iter().map(|u| u.id.as_str()).collect();
        let deleted: Vec<String> = self
            .units
            .iter()
            .filter(|u| !kept.contains(u.id.as_str()))
            .map(|u| u.id.clone())
            .collect();
        let changed: Vec<TranslationUnit> = restored
            .iter()
            .filter(|u| self.unit(&u.id) != Some(*u))
            .cloned()
            .collect();
        self.units = restored;
        self.refresh_consistency();
        self.persist(&changed, &deleted)
    }

    /// `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> WorkbenchResult<bool> {
        if self.batch.is_some() {
            return Err(WorkbenchError::BatchInProgress);
        }
        match self.history.undo(&self.units) {
            Some(prev) => self.replace_corpus(prev).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> WorkbenchResult<bool> {
        if self.batch.is_some() {
            return Err(WorkbenchError::BatchInProgress);
        }
        match self.history.redo(&self.units) {
            Some(next) => self.replace_corpus(next).map(|_| true),
            None => Ok(false),
        }
    }

    /// Restores history entry `id`, or the newest one.
    pub fn restore(&mut self, id: Option<u64>) -> WorkbenchResult<bool> {
        if self.batch.is_some() {
            return Err(WorkbenchError::BatchInProgress);
        }
        match self.history.restore(id) {
            Some(snapshot) => self.replace_corpus(snapshot).map(|_| true),
            None => Ok(false),
        }
    }
}

impl LiveConsistency for CorpusService {
    fn consistency(&self) -> &ConsistencyReport {
        &self.consistency
    }

    fn refresh_consistency(&mut self) -> &ConsistencyReport {
        self.consistency = analyze_consistency(
            &self.units,
            &self.source_lang,
            &self.target_lang,
            &self.config.qa.consistency,
        );
        self.consistency_stale = false;
        &self.consistency
    }
}

impl ManualAudit for CorpusService {
    fn run_audit(
        &mut self,
        scope: &AuditScope,
        glossary: &[GlossaryTerm],
        keep_ignored: bool,
    ) -> WorkbenchResult<AuditSummary> {
        if self.batch.is_some() {
            return Err(WorkbenchError::BatchInProgress);
        }
        if self.consistency_stale {
            self.refresh_consistency();
        }
        let indices: Vec<usize> = match scope {
            AuditScope::All => (0..self.units.len()).collect(),
            AuditScope::Units(ids) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                self.units
                    .iter()
                    .enumerate()
                    .filter(|(_, u)| wanted.contains(u.id.as_str()))
                    .map(|(i, _)| i)
                    .collect()
            }
        };
        let subset: Vec<TranslationUnit> = indices.iter().map(|&i| self.units[i].clone()).collect();
        let checked = run_qa(
            &subset,
            &self.config.qa,
            self.registry.as_ref(),
            glossary,
            Some(&self.consistency),
        )?;

        let mut summary = AuditSummary {
            units_checked: checked.len(),
            ..AuditSummary::default()
        };
        let units = Arc::make_mut(&mut self.units);
        let mut changed = Vec::with_capacity(checked.len());
        for (&idx, mut fresh) in indices.iter().zip(checked) {
            if keep_ignored {
                summary.ignored_carried += carry_ignored_state(&units[idx].qa_issues, &mut fresh.qa_issues);
            }
            for issue in &fresh.qa_issues {
                summary.issues += 1;
                match issue.severity {
                    Severity::Error => summary.errors += 1,
                    Severity::Warning => summary.warnings += 1,
                    Severity::Info => {}
                }
            }
            units[idx].qa_issues = fresh.qa_issues;
            changed.push(units[idx].clone());
        }
        debug!(
            units = summary.units_checked,
            issues = summary.issues,
            carried = summary.ignored_carried,
            "audit applied"
        );
        self.persist(&changed, &[])?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchRule;
    use crate::filter::{ActiveFilter, BuiltInFilter};
    use crate::ir::{Scope, TmxTag};
    use crate::progress::NoProgress;
    use crate::store::MemoryStore;

    fn tu(id: &str, src: &str, tgt: &str) -> TranslationUnit {
        let mut u = TranslationUnit::new(id, id.parse().unwrap_or(0), src, tgt, "en", "fr");
        u.project_id = "p".to_string();
        u
    }

    fn service(units: Vec<TranslationUnit>) -> CorpusService {
        CorpusService::new(units, "en", "fr", WorkbenchConfig::default())
    }

    struct FailingStore;

    impl UnitStore for FailingStore {
        fn put_units(&self, _units: &[TranslationUnit]) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
        fn get_units_by_project(&self, _project_id: &str) -> anyhow::Result<Vec<TranslationUnit>> {
            Ok(Vec::new())
        }
        fn delete_units(&self, _ids: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct SharedStore(Arc<MemoryStore>);

    impl UnitStore for SharedStore {
        fn put_units(&self, units: &[TranslationUnit]) -> anyhow::Result<()> {
            self.0.put_units(units)
        }
        fn get_units_by_project(&self, project_id: &str) -> anyhow::Result<Vec<TranslationUnit>> {
            self.0.get_units_by_project(project_id)
        }
        fn delete_units(&self, ids: &[String]) -> anyhow::Result<()> {
            self.0.delete_units(ids)
        }
    }

    #[test]
    fn edit_then_undo_redo() {
        let mut svc = service(vec![tu("1", "Open", "Ouvrir")]);
        let before = svc.units();
        assert!(svc.edit_target("1", "Ouvert").expect("edit"));
        assert_eq!(svc.history().len(), 1);
        assert_eq!(before[0].target.text, "Ouvrir");
        assert!(svc.undo().expect("undo"));
        assert_eq!(*svc.units(), *before);
        assert!(svc.redo().expect("redo"));
        assert_eq!(svc.unit("1").map(|u| u.target.text.as_str()), Some("Ouvert"));
        assert!(!svc.redo().expect("redo"));
    }

    #[test]
    fn no_op_edit_takes_no_snapshot() {
        let mut svc = service(vec![tu("1", "Open", "Ouvrir")]);
        assert!(!svc.edit_target("1", "Ouvrir").expect("edit"));
        assert!(!svc.can_undo());
    }

    #[test]
    fn locked_units_reject_edits_but_unlock() {
        let mut svc = service(vec![tu("1", "Open", "Ouvrir")]);
        svc.set_locked("1", true).expect("lock");
        let err = svc.edit_target("1", "x").expect_err("locked");
        assert_eq!(err.code(), "UNIT_LOCKED");
        svc.set_locked("1", false).expect("unlock");
        assert!(svc.edit_target("1", "x").is_ok());
        assert_eq!(svc.history().len(), 3);
        assert_eq!(svc.edit_target("9", "x").expect_err("missing").code(), "UNIT_NOT_FOUND");
    }

    #[test]
    fn approve_copy_clear() {
        let mut svc = service(vec![tu("1", "Open", "")]);
        svc.copy_source_to_target("1").expect("copy");
        assert_eq!(svc.unit("1").map(|u| u.status), Some(UnitStatus::Translated));
        svc.approve("1").expect("approve");
        assert_eq!(svc.unit("1").map(|u| u.status), Some(UnitStatus::Approved));
        svc.edit_target("1", "Ouvrir").expect("edit");
        assert_eq!(svc.unit("1").map(|u| u.status), Some(UnitStatus::Translated));
        svc.clear_target("1").expect("clear");
        assert_eq!(svc.unit("1").map(|u| u.status), Some(UnitStatus::Empty));
        assert_eq!(svc.history().len(), 4);
    }

    #[test]
    fn place_tag_copies_definition() {
        let mut unit = tu("1", "Line<<TAG:1>>break", "Ligne saut");
        unit.source.tags = vec![TmxTag {
            id: "1".to_string(),
            kind: "ph".to_string(),
            content: "<br/>".to_string(),
            index: None,
        }];
        let mut svc = service(vec![unit]);
        svc.place_tag("1", "1", 5).expect("place");
        let placed = svc.unit("1").cloned().expect("unit");
        assert_eq!(placed.target.text, "Ligne<<TAG:1>> saut");
        assert_eq!(placed.target.tags.len(), 1);
        let err = svc.place_tag("1", "7", 0).expect_err("unknown tag");
        assert_eq!(err.code(), "TAG_NOT_FOUND");
        assert_eq!(svc.history().len(), 1);
    }

    #[test]
    fn consistency_follows_edits() {
        let mut svc = service(vec![tu("1", "Open", "Ouvrir"), tu("2", "Open", "Ouvrir")]);
        assert!(svc.consistency().inconsistent_targets.is_empty());
        svc.edit_target("2", "Ouvert").expect("edit");
        assert_eq!(svc.consistency().inconsistent_targets.len(), 1);
        let criteria = FilterCriteria {
            filter: ActiveFilter::BuiltIn(BuiltInFilter::TargetInconsistency),
            ..FilterCriteria::for_pair("en", "fr")
        };
        assert_eq!(svc.select(&criteria).len(), 2);
    }

    #[test]
    fn batch_takes_one_snapshot_and_skips_locked() {
        let mut units: Vec<TranslationUnit> =
            (0..1200).map(|i| tu(&i.to_string(), "Colour", "colour scheme")).collect();
        units[3].is_locked = true;
        let mut svc = service(units);
        let config = BatchConfig {
            scope: Scope::Target,
            rules: vec![BatchRule::literal("colour", "color")],
            ..BatchConfig::default()
        };
        let total = svc.start_batch(&config, None).expect("start");
        assert_eq!(total, 1199);
        assert_eq!(svc.start_batch(&config, None).expect_err("busy").code(), "BATCH_IN_PROGRESS");
        let mut last = 0.0;
        while let Some(p) = svc.step_batch().expect("step") {
            assert!(p.percent >= last);
            last = p.percent;
            if p.done {
                assert_eq!(p.modified, 1199);
                break;
            }
        }
        assert_eq!(last, 100.0);
        assert_eq!(svc.history().len(), 1);
        assert_eq!(svc.unit("3").map(|u| u.target.text.as_str()), Some("colour scheme"));
        let again = svc.run_batch(&config, None, &NoProgress).expect("rerun");
        assert_eq!(again.modified, 0);
    }

    #[test]
    fn cleanup_deletes_from_store() {
        let store = MemoryStore::new();
        store
            .put_units(&[tu("1", "Open", "Ouvrir"), tu("2", " ", "x")])
            .expect("seed");
        let mut svc = CorpusService::load_project(Box::new(store), "p", "en", "fr", WorkbenchConfig::default())
            .expect("load");
        let report = svc
            .cleanup(&CleanupOptions {
                remove_empty: true,
                ..CleanupOptions::default()
            })
            .expect("cleanup");
        assert_eq!(report.deleted, 1);
        assert_eq!(svc.len(), 1);
        assert!(svc.undo().expect("undo"));
        assert_eq!(svc.len(), 2);
    }

    #[test]
    fn restore_rewinds_corpus_and_store() {
        let store = Arc::new(MemoryStore::new());
        let original = vec![
            tu("1", "Open", "Ouvrir"),
            tu("2", " ", "x"),
            tu("3", "Save", "Enregistrer"),
            tu("4", "Open", "Ouvrir"),
        ];
        store.put_units(&original).expect("seed");
        let mut svc = CorpusService::load_project(
            Box::new(SharedStore(Arc::clone(&store))),
            "p",
            "en",
            "fr",
            WorkbenchConfig::default(),
        )
        .expect("load");

        svc.edit_target("4", "Ouvert").expect("edit");
        let first = svc.history()[0].id;
        assert_eq!(svc.consistency().inconsistent_targets.len(), 1);
        svc.cleanup(&CleanupOptions {
            remove_empty: true,
            ..CleanupOptions::default()
        })
        .expect("cleanup");
        assert_eq!(store.len(), 3);

        let config = BatchConfig {
            scope: Scope::Target,
            rules: vec![BatchRule::literal("Enregistrer", "Sauver")],
            ..BatchConfig::default()
        };
        svc.start_batch(&config, None).expect("start");
        assert_eq!(svc.restore(Some(first)).expect_err("busy").code(), "BATCH_IN_PROGRESS");
        while let Some(p) = svc.step_batch().expect("step") {
            if p.done {
                break;
            }
        }
        assert_eq!(svc.unit("3").map(|u| u.target.text.as_str()), Some("Sauver"));
        assert_eq!(svc.history().len(), 3);

        assert!(svc.restore(Some(first)).expect("restore"));
        assert_eq!(*svc.units(), original);
        assert!(!svc.can_redo());
        assert!(!svc.can_undo());
        assert!(svc.consistency().inconsistent_targets.is_empty());
        assert_eq!(store.get_units_by_project("p").expect("read"), original);
        assert!(!svc.restore(Some(first)).expect("gone"));
    }

    #[test]
    fn cleanup_stamps_changed_units() {
        let mut config = WorkbenchConfig::default();
        config.batch.change_id = Some("cleaner".to_string());
        let units = vec![tu("1", " Open ", "Ouvrir"), tu("2", "Save", "Enregistrer")];
        let mut svc = CorpusService::new(units, "en", "fr", config);
        svc.cleanup(&CleanupOptions::default()).expect("cleanup");
        let stamped = svc.unit("1").expect("unit 1");
        assert_eq!(stamped.source.text, "Open");
        assert_eq!(stamped.metadata.get("changeid").map(String::as_str), Some("cleaner"));
        assert!(stamped.metadata.contains_key("changedate"));
        assert!(!svc.unit("2").expect("unit 2").metadata.contains_key("changeid"));

        let mut svc = CorpusService::new(vec![tu("1", " Open ", "Ouvrir")], "en", "fr", svc.config().clone());
        svc.cleanup(&CleanupOptions {
            anonymize_metadata: true,
            ..CleanupOptions::default()
        })
        .expect("cleanup");
        assert!(!svc.unit("1").expect("unit 1").metadata.contains_key("changeid"));
    }

    #[test]
    fn audit_resets_or_keeps_ignore_state() {
        let mut svc = service(vec![tu("1", "Open", ""), tu("2", "Save", "")]);
        let summary = svc.run_audit(&AuditScope::All, &[], false).expect("audit");
        assert!(summary.issues >= 2);
        let issue = svc.unit("1").map(|u| u.qa_issues[0].id.clone()).expect("issue");
        assert!(svc.toggle_issue_ignored("1", &issue, true).expect("toggle"));
        assert!(!svc.can_undo());
        let count = svc.unit("1").map(|u| u.qa_issues.len());

        svc.run_audit(&AuditScope::Units(vec!["2".to_string()]), &[], false).expect("audit");
        assert_eq!(svc.unit("1").map(|u| u.qa_issues.len()), count);
        assert!(svc.unit("1").map(|u| u.qa_issues[0].is_ignored).unwrap_or(false));

        let kept = svc.run_audit(&AuditScope::All, &[], true).expect("audit");
        assert_eq!(kept.ignored_carried, 1);
        svc.run_audit(&AuditScope::All, &[], false).expect("audit");
        assert!(!svc.unit("1").map(|u| u.qa_issues[0].is_ignored).unwrap_or(true));
    }

    #[test]
    fn persistence_failure_after_commit() {
        let mut svc = service(vec![tu("1", "Open", "Ouvrir")]).with_store(Box::new(FailingStore));
        let err = svc.edit_target("1", "Ouvert").expect_err("store fails");
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert_eq!(svc.unit("1").map(|u| u.target.text.as_str()), Some("Ouvert"));
        assert!(svc.can_undo());
    }
}
