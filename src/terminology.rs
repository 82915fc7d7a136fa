use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl GlossaryTerm {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            note: None,
        }
    }
}

/// Supplies the terms of the glossaries currently switched on for a project.
pub trait GlossaryProvider {
    fn active_terms(&self, ids: &[String]) -> Vec<GlossaryTerm>;
}

#[derive(Clone, Debug)]
pub enum TermApplyEvent {
    Added {
        source: String,
        target: String,
    },
    Conflict {
        source: String,
        existing_target: String,
        proposed_target: String,
    },
}

/// In-memory glossaries keyed by id. Within one glossary a source term has one target.
#[derive(Default)]
pub struct Glossary {
    lists: HashMap<String, Vec<GlossaryTerm>>,
}

impl Glossary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.values().map(|l| l.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds terms to glossary `id`. Blank entries are skipped; a second target for a known
    /// source is reported as a conflict and not applied.
    pub fn apply_updates(
        &mut self,
        id: &str,
        updates: impl IntoIterator<Item = GlossaryTerm>,
    ) -> Vec<TermApplyEvent> {
        let list = self.lists.entry(id.to_string()).or_default();
        let mut events = Vec::new();
        for up in updates {
            let source = up.source.trim();
            let target = up.target.trim();
            if source.is_empty() || target.is_empty() {
                continue;
            }
            match list.iter().find(|t| t.source == source) {
                None => {
                    list.push(GlossaryTerm {
                        source: source.to_string(),
                        target: target.to_string(),
                        note: up
                            .note
                            .as_ref()
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty()),
                    });
                    events.push(TermApplyEvent::Added {
                        source: source.to_string(),
                        target: target.to_string(),
                    });
                }
                Some(existing) => {
                    if existing.target != target {
                        events.push(TermApplyEvent::Conflict {
                            source: source.to_string(),
                            existing_target: existing.target.clone(),
                            proposed_target: target.to_string(),
                        });
                    }
                }
            }
        }
        events
    }
}

impl GlossaryProvider for Glossary {
    fn active_terms(&self, ids: &[String]) -> Vec<GlossaryTerm> {
        ids.iter()
            .filter_map(|id| self.lists.get(id))
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_not_applied() {
        let mut g = Glossary::new();
        let ev = g.apply_updates(
            "ui",
            vec![
                GlossaryTerm::new("Save", "Enregistrer"),
                GlossaryTerm::new("Save", "Sauver"),
                GlossaryTerm::new(" ", "x"),
            ],
        );
        assert_eq!(ev.len(), 2);
        assert!(matches!(ev[1], TermApplyEvent::Conflict { .. }));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn active_terms_by_id() {
        let mut g = Glossary::new();
        g.apply_updates("a", vec![GlossaryTerm::new("file", "fichier")]);
        g.apply_updates("b", vec![GlossaryTerm::new("folder", "dossier")]);
        let terms = g.active_terms(&["b".to_string(), "missing".to_string()]);
        assert_eq!(terms, vec![GlossaryTerm::new("folder", "dossier")]);
    }
}
