use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tm_workbench::batch::BatchConfig;
use tm_workbench::cleanup::{CleanupOptions, TagMode};
use tm_workbench::config::{init_default_config, resolve_config, WorkbenchConfig};
use tm_workbench::consistency::LiveConsistency;
use tm_workbench::filter::{ActiveFilter, BuiltInFilter, FilterCriteria, QueryMode, TextQuery};
use tm_workbench::ir::{TranslationUnit, UnitStatus};
use tm_workbench::progress::ConsoleProgress;
use tm_workbench::qa::{AuditScope, ManualAudit};
use tm_workbench::store::{JsonStore, UnitStore};
use tm_workbench::terminology::{Glossary, GlossaryProvider, GlossaryTerm, TermApplyEvent};
use tm_workbench::CorpusService;

#[derive(Parser, Debug)]
#[command(name = "tm-workbench")]
#[command(about = "Translation memory QA: audits, consistency, filters, batch fixes and cleanup", long_about = None)]
struct Args {
    /// Write a default tm-workbench.toml, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory for --init-config (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: TM_WORKBENCH_CONFIG, then tm-workbench.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Work on a JSON unit store directory instead of a corpus file; changes are written back
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Project inside --store
    #[arg(long, default_value = "default")]
    project: String,

    /// Source language of the active pair (default: first unit's)
    #[arg(long)]
    source_lang: Option<String>,

    /// Target language of the active pair (default: first unit's)
    #[arg(long)]
    target_lang: Option<String>,

    /// No progress lines on stderr
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every enabled QA rule and write the units with their issues
    Audit {
        #[arg(value_name = "JSON")]
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
        /// Glossary as a JSON array of {source, target}
        #[arg(long, value_name = "JSON")]
        glossary: Option<PathBuf>,
        /// Keep ignore decisions for issues that are found again
        #[arg(long)]
        keep_ignored: bool,
    },
    /// Print repetition and inconsistency keys as JSON
    Consistency {
        #[arg(value_name = "JSON")]
        input: Option<PathBuf>,
    },
    /// Print the ids of the units matching a filter
    Filter {
        #[arg(value_name = "JSON")]
        input: Option<PathBuf>,
        /// same_as_source, untranslated, has_comment, has_invalid_characters,
        /// target_inconsistency, source_inconsistency, repetitions
        #[arg(long)]
        builtin: Option<String>,
        /// Full criteria (JSON), overrides the other filter flags
        #[arg(long, value_name = "JSON")]
        criteria: Option<PathBuf>,
        #[arg(long)]
        source_query: Option<String>,
        #[arg(long)]
        target_query: Option<String>,
        /// Treat queries as regular expressions
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        case_sensitive: bool,
        /// empty, translated or approved
        #[arg(long)]
        status: Option<String>,
    },
    /// Apply a find/replace chain (TOML or JSON batch config)
    Batch {
        #[arg(value_name = "JSON")]
        input: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        rules: PathBuf,
        /// Unit ids selected for rules with `onlyFiltered` (repeatable)
        #[arg(long = "only", value_name = "ID")]
        only: Vec<String>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
    },
    /// Structural sanitation
    Cleanup {
        #[arg(value_name = "JSON")]
        input: Option<PathBuf>,
        /// Cleanup options (TOML or JSON); flags below are applied on top
        #[arg(long, value_name = "FILE")]
        options: Option<PathBuf>,
        #[arg(long)]
        collapse_whitespace: bool,
        #[arg(long)]
        remove_empty: bool,
        #[arg(long)]
        remove_duplicates: bool,
        #[arg(long)]
        anonymize: bool,
        /// keep, repair or strip
        #[arg(long)]
        tags: Option<String>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
    },
}

fn read_units(path: &Path) -> anyhow::Result<Vec<TranslationUnit>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read corpus: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse corpus json: {}", path.display()))
}

fn write_units(path: &Path, units: &[TranslationUnit]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(units).context("serialize units")?;
    std::fs::write(path, json).with_context(|| format!("write corpus: {}", path.display()))
}

/// TOML or JSON by extension.
fn read_structured<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read file: {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    if is_toml {
        toml::from_str(&text).with_context(|| format!("parse toml: {}", path.display()))
    } else {
        serde_json::from_str(&text).with_context(|| format!("parse json: {}", path.display()))
    }
}

/// Parses a snake_case enum value the same way the JSON formats spell it.
fn parse_name<T: serde::de::DeserializeOwned>(what: &str, value: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("unknown {what}: {value}"))
}

/// Reads a term list; conflicting duplicates keep their first target.
fn load_glossary(path: &Path) -> anyhow::Result<Vec<GlossaryTerm>> {
    let terms: Vec<GlossaryTerm> = read_structured(path)?;
    let mut glossary = Glossary::new();
    for event in glossary.apply_updates(GLOSSARY_ID, terms) {
        if let TermApplyEvent::Conflict {
            source,
            existing_target,
            proposed_target,
        } = event
        {
            warn!(%source, kept = %existing_target, dropped = %proposed_target, "glossary conflict");
        }
    }
    Ok(glossary.active_terms(&[GLOSSARY_ID.to_string()]))
}

const GLOSSARY_ID: &str = "cli";

struct Session {
    service: CorpusService,
    /// Output file when working on a corpus file; `None` with a store.
    output: Option<PathBuf>,
}

fn open_session(
    args: &Args,
    cfg: WorkbenchConfig,
    input: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> anyhow::Result<Session> {
    let pair = |units: &[TranslationUnit]| -> (String, String) {
        let first = units.first();
        (
            args.source_lang
                .clone()
                .or_else(|| first.map(|u| u.source_lang.clone()))
                .unwrap_or_default(),
            args.target_lang
                .clone()
                .or_else(|| first.map(|u| u.target_lang.clone()))
                .unwrap_or_default(),
        )
    };

    if let Some(dir) = &args.store {
        let store = JsonStore::new(dir);
        let probe = store
            .get_units_by_project(&args.project)
            .with_context(|| format!("load project: {}", args.project))?;
        let (sl, tl) = pair(&probe);
        let service = CorpusService::load_project(Box::new(store), &args.project, &sl, &tl, cfg)
            .context("open store")?;
        return Ok(Session {
            service,
            output: output.cloned(),
        });
    }

    let input = input.context("missing corpus file (or use --store)")?;
    let units = read_units(input)?;
    let (sl, tl) = pair(&units);
    info!(units = units.len(), source_lang = %sl, target_lang = %tl, "corpus loaded");
    Ok(Session {
        service: CorpusService::new(units, &sl, &tl, cfg),
        output: Some(output.cloned().unwrap_or_else(|| input.clone())),
    })
}

fn finish(session: &Session) -> anyhow::Result<()> {
    if let Some(out) = &session.output {
        write_units(out, &session.service.units())?;
        eprintln!("Wrote units: {}", out.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tm_workbench=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let (cfg, cfg_path) = resolve_config(args.config.clone(), &workdir).context("load config")?;
    if let Some(p) = &cfg_path {
        progress.info(format!("config: {}", p.display()));
    }

    let Some(command) = &args.command else {
        eprintln!(
            "USAGE:\n  tm-workbench <audit|consistency|filter|batch|cleanup> <corpus.json>\n\nTIPS:\n  - Run with --help for all options.\n  - Default config search: tm-workbench.toml (upwards), or set TM_WORKBENCH_CONFIG.\n"
        );
        return Ok(());
    };

    match command {
        Command::Audit {
            input,
            output,
            glossary,
            keep_ignored,
        } => {
            let glossary = match glossary {
                Some(p) => load_glossary(p)?,
                None => Vec::new(),
            };
            let mut session = open_session(&args, cfg, input.as_ref(), output.as_ref())?;
            let summary = session
                .service
                .run_audit(&AuditScope::All, &glossary, *keep_ignored)
                .context("run audit")?;
            println!("{}", serde_json::to_string_pretty(&summary).context("serialize summary")?);
            finish(&session)?;
        }
        Command::Consistency { input } => {
            let mut session = open_session(&args, cfg, input.as_ref(), None)?;
            let report = session.service.refresh_consistency();
            println!("{}", serde_json::to_string_pretty(report).context("serialize report")?);
        }
        Command::Filter {
            input,
            builtin,
            criteria,
            source_query,
            target_query,
            regex,
            case_sensitive,
            status,
        } => {
            let mut session = open_session(&args, cfg, input.as_ref(), None)?;
            let criteria: FilterCriteria = match criteria {
                Some(p) => read_structured(p)?,
                None => {
                    let (sl, tl) = session.service.language_pair();
                    let mode = if *regex { QueryMode::Regex } else { QueryMode::Literal };
                    let query = |text: &Option<String>| {
                        text.as_ref().map(|t| TextQuery {
                            text: t.clone(),
                            mode,
                            case_sensitive: *case_sensitive,
                        })
                    };
                    let filter = match builtin {
                        Some(name) => ActiveFilter::BuiltIn(parse_name::<BuiltInFilter>("filter", name)?),
                        None => ActiveFilter::None,
                    };
                    let status = status
                        .as_deref()
                        .map(|s| parse_name::<UnitStatus>("status", s))
                        .transpose()?;
                    FilterCriteria {
                        status,
                        source_query: query(source_query),
                        target_query: query(target_query),
                        filter,
                        ..FilterCriteria::for_pair(sl, tl)
                    }
                }
            };
            for tu in session.service.select(&criteria) {
                println!("{}", tu.id);
            }
        }
        Command::Batch {
            input,
            rules,
            only,
            output,
        } => {
            let config: BatchConfig = read_structured(rules)?;
            let mut session = open_session(&args, cfg, input.as_ref(), output.as_ref())?;
            let filtered = (!only.is_empty()).then_some(only.as_slice());
            let outcome = session
                .service
                .run_batch(&config, filtered, &progress)
                .context("run batch")?;
            progress.info(format!("batch: {} units modified", outcome.modified));
            finish(&session)?;
        }
        Command::Cleanup {
            input,
            options,
            collapse_whitespace,
            remove_empty,
            remove_duplicates,
            anonymize,
            tags,
            output,
        } => {
            let mut opts: CleanupOptions = match options {
                Some(p) => read_structured(p)?,
                None => CleanupOptions::default(),
            };
            opts.collapse_whitespace |= *collapse_whitespace;
            opts.remove_empty |= *remove_empty;
            opts.remove_duplicates |= *remove_duplicates;
            opts.anonymize_metadata |= *anonymize;
            if let Some(mode) = tags {
                opts.tag_mode = parse_name::<TagMode>("tag mode", mode)?;
            }
            let mut session = open_session(&args, cfg, input.as_ref(), output.as_ref())?;
            let report = session.service.cleanup(&opts).context("run cleanup")?;
            println!("{}", serde_json::to_string_pretty(&report).context("serialize report")?);
            finish(&session)?;
        }
    }
    Ok(())
}
