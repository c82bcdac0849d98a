use crate::document::{TemplateDocument, TemplateKind};
use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use survey_codes::{normalize_set, strip_run_suffix, structural_key, NormalizedSet};

/// Shortest name fragment allowed to satisfy a "contains" lookup
const MIN_CONTAINS_LEN: usize = 3;

/// Where a template came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Project,
    Global,
    Generated,
}

impl TemplateSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Global => "global",
            Self::Generated => "generated",
        }
    }
}

/// Structural signature of a template, computed once at load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSignature {
    codes: Vec<String>,
    normalized: NormalizedSet,
    levels: BTreeMap<String, BTreeSet<String>>,
}

impl TemplateSignature {
    #[must_use]
    pub fn from_document(doc: &TemplateDocument) -> Self {
        let codes: Vec<String> = doc.signature_codes().map(str::to_string).collect();
        let normalized = normalize_set(&codes);
        let levels = doc
            .items
            .iter()
            .filter(|item| !item.definition.is_alias_only())
            .filter_map(|item| {
                let codes = item.definition.level_codes()?;
                Some((structural_key(&item.code), codes))
            })
            .collect();
        Self {
            codes,
            normalized,
            levels,
        }
    }

    /// Item codes as written in the template
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    #[must_use]
    pub const fn normalized(&self) -> &NormalizedSet {
        &self.normalized
    }

    /// Level codes of the item with structural key `key`
    #[must_use]
    pub fn levels(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.levels.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// One indexed template
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub key: String,
    pub kind: TemplateKind,
    pub source: TemplateSource,
    pub path: Option<PathBuf>,
    pub document: TemplateDocument,
    signature: TemplateSignature,
}

impl LibraryEntry {
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        kind: TemplateKind,
        source: TemplateSource,
        document: TemplateDocument,
    ) -> Self {
        let signature = TemplateSignature::from_document(&document);
        Self {
            key: key.into().to_ascii_lowercase(),
            kind,
            source,
            path: None,
            document,
            signature,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn signature(&self) -> &TemplateSignature {
        &self.signature
    }

    /// Lower-cased names this template answers to.
    fn names(&self) -> Vec<String> {
        let study = &self.document.study;
        [
            Some(self.key.clone()),
            study.short_name(),
            study.official_name(),
            study.task_name(),
        ]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
    }
}

/// Canonical item an alias code resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasTarget {
    pub template_key: String,
    pub canonical: String,
}

/// All templates visible to one run, with derived lookup tables.
///
/// Built once and passed by reference to the matcher; never mutated while a
/// match is in progress.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    entries: Vec<LibraryEntry>,
    participants: Option<LibraryEntry>,
    aliases: BTreeMap<String, AliasTarget>,
}

impl LibraryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template. Participants templates go to their own slot, with a
    /// project one taking precedence over a global one.
    pub fn insert(&mut self, entry: LibraryEntry) -> Result<()> {
        if entry.kind == TemplateKind::Participants {
            let replace = self
                .participants
                .as_ref()
                .map_or(true, |current| entry.source < current.source);
            if replace {
                self.participants = Some(entry);
            }
            return Ok(());
        }

        if self
            .entries
            .iter()
            .any(|e| e.key == entry.key && e.source == entry.source)
        {
            return Err(LibraryError::DuplicateTemplate {
                key: entry.key,
                source_tag: entry.source.as_str().to_string(),
            });
        }

        let claims = alias_claims(&entry);
        for (alias, target) in &claims {
            if let Some(existing) = self.aliases.get(alias) {
                if existing.template_key != target.template_key {
                    return Err(LibraryError::AmbiguousAlias {
                        alias: alias.clone(),
                        first: existing.template_key.clone(),
                        second: target.template_key.clone(),
                    });
                }
            }
            // An alias may not shadow an item code of another template.
            if let Some(owner) = self
                .entries
                .iter()
                .find(|e| e.key != entry.key && e.signature.normalized().contains_key(alias))
            {
                return Err(LibraryError::AmbiguousAlias {
                    alias: alias.clone(),
                    first: owner.key.clone(),
                    second: entry.key.clone(),
                });
            }
        }
        for code in entry.signature.normalized().keys() {
            if let Some(existing) = self.aliases.get(code) {
                if existing.template_key != entry.key {
                    return Err(LibraryError::AmbiguousAlias {
                        alias: code.to_string(),
                        first: existing.template_key.clone(),
                        second: entry.key.clone(),
                    });
                }
            }
        }
        for (alias, target) in claims {
            if let Entry::Vacant(slot) = self.aliases.entry(alias) {
                slot.insert(target);
            }
        }

        log::debug!(
            "Indexed {} template '{}' ({} items)",
            entry.source.as_str(),
            entry.key,
            entry.signature.len()
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Register a template generated from an unmatched import.
    pub fn insert_generated(
        &mut self,
        key: &str,
        kind: TemplateKind,
        document: TemplateDocument,
    ) -> Result<&LibraryEntry> {
        self.insert(LibraryEntry::new(
            key,
            kind,
            TemplateSource::Generated,
            document,
        ))?;
        self.entries
            .last()
            .ok_or_else(|| LibraryError::parse(key, "generated template was not indexed"))
    }

    /// Every survey/biometrics template, in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a template by key, preferring project over global over generated.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LibraryEntry> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.key == key)
            .min_by_key(|e| e.source)
    }

    #[must_use]
    pub fn get_from(&self, key: &str, source: TemplateSource) -> Option<&LibraryEntry> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|e| e.key == key && e.source == source)
    }

    #[must_use]
    pub const fn participants(&self) -> Option<&LibraryEntry> {
        self.participants.as_ref()
    }

    /// Canonical item for an alias code, if any template declares one.
    #[must_use]
    pub fn canonical(&self, code: &str) -> Option<&AliasTarget> {
        self.aliases.get(&structural_key(code))
    }

    /// Template keys whose key, short name, official name or task name
    /// equals or contains `label`, or appears in it as a whole word, ignoring
    /// case and run suffixes.
    #[must_use]
    pub fn find_by_name(&self, label: &str) -> Vec<&str> {
        let needle = strip_run_suffix(label.trim()).base.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut keys: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if keys.contains(&entry.key.as_str()) {
                continue;
            }
            if entry.names().iter().any(|name| names_match(name, &needle)) {
                keys.push(entry.key.as_str());
            }
        }
        keys
    }
}

fn names_match(name: &str, needle: &str) -> bool {
    if name == needle {
        return true;
    }
    (needle.len() >= MIN_CONTAINS_LEN && name.contains(needle))
        || (name.len() >= MIN_CONTAINS_LEN && contains_word(needle, name))
}

/// `word` occurs in `haystack` with no letter or digit on either side
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Alias structural keys declared by one template.
fn alias_claims(entry: &LibraryEntry) -> Vec<(String, AliasTarget)> {
    let mut claims = Vec::new();
    for item in &entry.document.items {
        if let Some(canonical) = item.definition.alias_of.as_deref() {
            let canonical = canonical.trim();
            if !canonical.is_empty() {
                claims.push((
                    structural_key(&item.code),
                    AliasTarget {
                        template_key: entry.key.clone(),
                        canonical: canonical.to_string(),
                    },
                ));
            }
        }
        for alias in &item.definition.aliases {
            let key = structural_key(alias);
            if key.is_empty() {
                continue;
            }
            claims.push((
                key,
                AliasTarget {
                    template_key: entry.key.clone(),
                    canonical: item.code.clone(),
                },
            ));
        }
    }
    claims
}
