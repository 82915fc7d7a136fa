use tm_workbench::batch::{run_batch_transform, BatchConfig, BatchLock, BatchRule};
use tm_workbench::config::{init_default_config, resolve_config, CONFIG_FILE_NAME};
use tm_workbench::consistency::{analyze_consistency, LiveConsistency};
use tm_workbench::filter::{
    select, ActiveFilter, ConditionOperator, ConditionScope, CustomFilter, FilterCondition,
    FilterCriteria, MatchType,
};
use tm_workbench::ir::{Scope, TranslationUnit, UnitStatus};
use tm_workbench::locale::BuiltinLocales;
use tm_workbench::normalize::normalize;
use tm_workbench::progress::NoProgress;
use tm_workbench::qa::{run_qa, set_issue_ignored, AuditScope, ManualAudit};
use tm_workbench::settings::{ConsistencySettings, QaSettings};
use tm_workbench::store::{JsonStore, UnitStore};
use tm_workbench::CorpusService;

fn tu(id: &str, src: &str, tgt: &str) -> TranslationUnit {
    let mut u = TranslationUnit::new(id, id.parse().unwrap_or(0), src, tgt, "en", "fr");
    u.project_id = "demo".to_string();
    u
}

#[test]
fn target_and_source_inconsistency() {
    let settings = ConsistencySettings::default();
    let units = vec![tu("1", "Open", "Ouvrir"), tu("2", "Open", "Ouvert")];
    let report = analyze_consistency(&units, "en", "fr", &settings);
    let key = normalize("Open", &settings.target_options, "en");
    assert!(report.inconsistent_targets.contains(&key));

    let units = vec![tu("1", "A", "X"), tu("2", "B", "X")];
    let report = analyze_consistency(&units, "en", "fr", &settings);
    let key = normalize("X", &settings.source_options, "fr");
    assert!(report.inconsistent_sources.contains(&key));
}

#[test]
fn repetitions_need_two_occurrences() {
    let settings = ConsistencySettings::default();
    let units = vec![
        tu("1", "Cancel", "Annuler"),
        tu("2", "Cancel", ""),
        tu("3", "Cancel", "Abandonner"),
        tu("4", "Close", "Fermer"),
    ];
    let report = analyze_consistency(&units, "en", "fr", &settings);
    assert!(report.repetitions.contains(&normalize("Cancel", &settings.target_options, "en")));
    assert!(!report.repetitions.contains(&normalize("Close", &settings.target_options, "en")));
}

#[test]
fn batch_is_deterministic_and_idempotent() {
    let lock = BatchLock::new();
    let config = BatchConfig {
        scope: Scope::Target,
        rules: vec![BatchRule::literal("colour", "color")],
        ..BatchConfig::default()
    };
    let units = vec![tu("1", "Colour scheme", "colour scheme"), tu("2", "Open", "Ouvrir")];
    let (first, outcome) = run_batch_transform(&lock, &units, &config, None, 500, &NoProgress).expect("first run");
    assert_eq!(first[0].target.text, "color scheme");
    assert_eq!(first[0].source.text, "Colour scheme");
    assert_eq!(outcome.modified, 1);
    let (_, again) = run_batch_transform(&lock, &first, &config, None, 500, &NoProgress).expect("second run");
    assert_eq!(again.modified, 0);
}

#[test]
fn undo_redo_restores_exact_corpus() {
    let mut svc = CorpusService::new(
        vec![tu("1", "Open", "Ouvrir"), tu("2", "Close", "")],
        "en",
        "fr",
        Default::default(),
    );
    let before = svc.units();
    svc.edit_target("2", "Fermer").expect("edit");
    let after = svc.units();
    svc.undo().expect("undo");
    assert_eq!(*svc.units(), *before);
    svc.redo().expect("redo");
    assert_eq!(*svc.units(), *after);
}

#[test]
fn custom_filter_and_composition() {
    let units = vec![
        tu("1", "Error: disk full", ""),
        tu("2", "Error: no network", "Erreur : pas de réseau"),
        tu("3", "Warning", ""),
    ];
    assert_eq!(units[1].status, UnitStatus::Translated);
    let filter = CustomFilter {
        id: "f1".to_string(),
        name: "Empty errors".to_string(),
        match_type: MatchType::And,
        conditions: vec![
            FilterCondition::new(ConditionScope::Status, ConditionOperator::Equal, "empty"),
            FilterCondition::new(ConditionScope::Source, ConditionOperator::Contains, "Error"),
        ],
    };
    let criteria = FilterCriteria {
        filter: ActiveFilter::Custom(filter),
        ..FilterCriteria::for_pair("en", "fr")
    };
    let picked: Vec<String> = select(&units, &criteria, None).into_iter().map(|u| u.id).collect();
    assert_eq!(picked, vec!["1".to_string()]);
}

#[test]
fn ignored_issue_survives_unrelated_audit() {
    let units = vec![tu("1", "Open", ""), tu("2", "Save", "")];
    let mut audited = run_qa(&units, &QaSettings::default(), &BuiltinLocales, &[], None).expect("qa");
    let id = audited[0].qa_issues[0].id.clone();
    assert!(set_issue_ignored(&mut audited[0], &id, true, Some("reviewer")));
    let snapshot = audited[0].qa_issues.clone();

    let mut svc = CorpusService::new(audited, "en", "fr", Default::default());
    svc.run_audit(&AuditScope::Units(vec!["2".to_string()]), &[], false)
        .expect("audit");
    assert_eq!(svc.unit("1").map(|u| u.qa_issues.clone()), Some(snapshot));
}

#[test]
fn json_store_round_trip_through_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonStore::new(dir.path());
    store
        .put_units(&[tu("1", "Open", "Ouvrir"), tu("2", "Open", "Ouvert")])
        .expect("seed");

    let mut svc = CorpusService::load_project(Box::new(JsonStore::new(dir.path())), "demo", "en", "fr", Default::default())
        .expect("load");
    assert_eq!(svc.consistency().inconsistent_targets.len(), 1);
    svc.edit_target("2", "Ouvrir").expect("edit");
    assert!(svc.consistency().inconsistent_targets.is_empty());

    let stored = store.get_units_by_project("demo").expect("reload");
    assert_eq!(stored[1].target.text, "Ouvrir");
}

#[test]
fn config_init_and_resolve() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).expect("mkdir");
    let path = init_default_config(dir.path(), false).expect("init");
    assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));

    let (cfg, found) = resolve_config(Some(path.clone()), &nested).expect("resolve");
    assert_eq!(found, Some(path));
    assert_eq!(cfg.batch.chunk_size, 500);
    assert_eq!(cfg.history.capacity, 50);
}
