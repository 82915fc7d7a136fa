//! Persistence collaborators. The engine only needs these three operations; the storage engine
//! behind them is the host's business.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};

use crate::ir::TranslationUnit;

pub trait UnitStore {
    /// Inserts or replaces units by id.
    fn put_units(&self, units: &[TranslationUnit]) -> anyhow::Result<()>;
    /// Units of a project sorted by `order`.
    fn get_units_by_project(&self, project_id: &str) -> anyhow::Result<Vec<TranslationUnit>>;
    fn delete_units(&self, ids: &[String]) -> anyhow::Result<()>;
}

/// Keyed by project, then unit id.
#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<BTreeMap<String, BTreeMap<String, TranslationUnit>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects
            .lock()
            .map(|p| p.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UnitStore for MemoryStore {
    fn put_units(&self, units: &[TranslationUnit]) -> anyhow::Result<()> {
        let mut projects = self.projects.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        for tu in units {
            projects
                .entry(tu.project_id.clone())
                .or_default()
                .insert(tu.id.clone(), tu.clone());
        }
        Ok(())
    }

    fn get_units_by_project(&self, project_id: &str) -> anyhow::Result<Vec<TranslationUnit>> {
        let projects = self.projects.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let mut units: Vec<TranslationUnit> = projects
            .get(project_id)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        units.sort_by_key(|u| u.order);
        Ok(units)
    }

    fn delete_units(&self, ids: &[String]) -> anyhow::Result<()> {
        let mut projects = self.projects.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        for p in projects.values_mut() {
            for id in ids {
                p.remove(id);
            }
        }
        Ok(())
    }
}

/// One `<project>.json` file (array of units) per project inside `dir`.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        let safe: String = project_id
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        let name = if safe.is_empty() { "default".to_string() } else { safe };
        self.dir.join(format!("{name}.json"))
    }

    fn read_file(path: &Path) -> anyhow::Result<Vec<TranslationUnit>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read units: {}", path.display()))?;
        let units: Vec<TranslationUnit> = serde_json::from_str(&text)
            .with_context(|| format!("parse units json: {}", path.display()))?;
        Ok(units)
    }

    fn write_file(path: &Path, units: &[TranslationUnit]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(units).context("serialize units")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write units: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replace units file: {}", path.display()))?;
        Ok(())
    }

    fn project_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("list store dir: {}", self.dir.display()))?
        {
            let path = entry.context("read store dir entry")?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl UnitStore for JsonStore {
    fn put_units(&self, units: &[TranslationUnit]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create store dir: {}", self.dir.display()))?;
        let mut by_project: BTreeMap<&str, Vec<&TranslationUnit>> = BTreeMap::new();
        for tu in units {
            by_project.entry(tu.project_id.as_str()).or_default().push(tu);
        }
        for (project, incoming) in by_project {
            let path = self.project_path(project);
            let mut existing = Self::read_file(&path)?;
            for tu in incoming {
                match existing.iter_mut().find(|u| u.id == tu.id) {
                    Some(slot) => *slot = tu.clone(),
                    None => existing.push(tu.clone()),
                }
            }
            existing.sort_by_key(|u| u.order);
            Self::write_file(&path, &existing)?;
        }
        Ok(())
    }

    fn get_units_by_project(&self, project_id: &str) -> anyhow::Result<Vec<TranslationUnit>> {
        let mut units = Self::read_file(&self.project_path(project_id))?;
        units.sort_by_key(|u| u.order);
        Ok(units)
    }

    fn delete_units(&self, ids: &[String]) -> anyhow::Result<()> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for path in self.project_files()? {
            let units = Self::read_file(&path)?;
            let before = units.len();
            let kept: Vec<TranslationUnit> = units
                .into_iter()
                .filter(|u| !ids.contains(u.id.as_str()))
                .collect();
            if kept.len() != before {
                Self::write_file(&path, &kept)?;
            }
        }
        Ok(())
    }
}
