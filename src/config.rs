use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::settings::QaSettings;

pub const CONFIG_FILE_NAME: &str = "tm-workbench.toml";
pub const CONFIG_ENV_VAR: &str = "TM_WORKBENCH_CONFIG";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    #[serde(default)]
    pub qa: QaSettings,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub history: HistorySection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSection {
    /// Units processed between two progress reports.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Written to `changeid` on units an edit, batch or cleanup modifies (not when cleanup
    /// anonymizes metadata).
    #[serde(default)]
    pub change_id: Option<String>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            change_id: None,
        }
    }
}

fn default_chunk_size() -> usize {
    500
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySection {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    50
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, CONFIG_FILE_NAME, 8) {
            return Some(p);
        }
    }
    find_file_upwards(workdir, CONFIG_FILE_NAME, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<WorkbenchConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: WorkbenchConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Explicit path, then the environment variable, then a file found upwards from `workdir`.
/// Without any of these the built-in defaults apply.
pub fn resolve_config(
    explicit: Option<PathBuf>,
    workdir: &Path,
) -> anyhow::Result<(WorkbenchConfig, Option<PathBuf>)> {
    let cfg_file = explicit
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .or_else(|| find_default_config(workdir));
    match cfg_file {
        Some(p) if p.exists() => {
            let cfg = load_config(&p)?;
            Ok((cfg, Some(p)))
        }
        Some(p) => Err(anyhow::anyhow!("config not found: {}", p.display())),
        None => Ok((WorkbenchConfig::default(), None)),
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# tm-workbench configuration.
# Every key is optional; omitted keys keep their built-in defaults.
# Locale presets (quotes, NBSP rules, separators) are layered on top per target language.

[batch]
chunk_size = 500
# change_id = "reviewer"

[history]
capacity = 50

[qa]
enabled = true

[qa.omissions]
empty_target = true
same_as_source = true
ignore_math_only = true
partial_translation = true
partial_min_words = 4
sentence_count = true

[qa.forbidden]
enabled = false
terms = []
allow_if_in_source = false

[qa.untranslatables]
enabled = false
terms = []
check_count = false

[qa.casing]
initial_capital = true
inner_capital = true
mixed_script = true
required_casing = []

[qa.punctuation]
double_punctuation = true
bracket_balance = true
whitespace_parity = true
double_spaces = true

[qa.numbers]
check_values = true
check_order = false
check_format = false
check_ranges = false

[qa.tags]
check_count = true
check_order = true
check_spacing = true
check_entities = true

[qa.terminology]
case_sensitive = false
whole_word = true
check_count = false
respect_tag_boundaries = false
reverse_check = false

[qa.consistency]
target_inconsistency = true
source_inconsistency = true
report_repetitions = false

# [[qa.custom_checks]]
# id = "error-term"
# title = "Error must be translated as Erreur"
# source_pattern = "Error"
# target_pattern = "Erreur"
# condition = "source_found_target_missing"
# severity = "warning"
"#;

/// Writes a commented default config into `dir`. An existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_parses_to_defaults() {
        let cfg: WorkbenchConfig = toml::from_str(DEFAULT_CONFIG_TOML).expect("parse");
        assert_eq!(cfg, WorkbenchConfig::default());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: WorkbenchConfig = toml::from_str("[batch]\nchange_id = \"me\"\n").expect("parse");
        assert_eq!(cfg.batch.chunk_size, 500);
        assert_eq!(cfg.batch.change_id.as_deref(), Some("me"));
        assert_eq!(cfg.history.capacity, 50);
        assert!(cfg.qa.enabled);
    }

    #[test]
    fn init_keeps_existing_file_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(dir.path(), false).expect("init");
        std::fs::write(&path, "[history]\ncapacity = 3\n").expect("write");
        init_default_config(dir.path(), false).expect("init again");
        assert_eq!(load_config(&path).expect("load").history.capacity, 3);
        init_default_config(dir.path(), true).expect("force");
        assert_eq!(load_config(&path).expect("load").history.capacity, 50);
    }

    #[test]
    fn finds_config_in_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        init_default_config(dir.path(), false).expect("init");
        let found = find_file_upwards(&nested, CONFIG_FILE_NAME, 8).expect("found");
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }
}
