use crate::config::MatchConfig;
use crate::error::{MatchError, Result};
use crate::import::ImportedGroup;
use crate::result::{Confidence, MatchTarget, TemplateMatch};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use survey_codes::{normalize_set, structural_key, NormalizedSet};
use survey_library::{LibraryEntry, LibraryIndex};

/// Imported group reduced to what the comparison needs
struct PreparedImport {
    normalized: NormalizedSet,
    levels: BTreeMap<String, BTreeSet<String>>,
    runs_detected: usize,
}

/// Matches imported item sets against a [`LibraryIndex`].
///
/// Pure over its inputs: the index is borrowed read-only and every call
/// computes a fresh [`TemplateMatch`].
pub struct MatchEngine<'a> {
    library: &'a LibraryIndex,
    config: MatchConfig,
}

impl<'a> MatchEngine<'a> {
    pub fn new(library: &'a LibraryIndex, config: MatchConfig) -> Self {
        Self { library, config }
    }

    /// Like [`MatchEngine::new`], rejecting inconsistent thresholds
    pub fn try_new(library: &'a LibraryIndex, config: MatchConfig) -> Result<Self> {
        config.validate().map_err(MatchError::invalid_config)?;
        Ok(Self::new(library, config))
    }

    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.config
    }

    #[must_use]
    pub const fn library(&self) -> &'a LibraryIndex {
        self.library
    }

    /// Match bare item codes, optionally with a group label
    pub fn match_items<I, S>(&self, codes: I, label: Option<&str>) -> Option<TemplateMatch>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = ImportedGroup::from_codes(codes);
        group.label = label.map(str::to_string);
        self.match_group(&group)
    }

    /// Best library template for `group`, falling back to the participants
    /// template; `None` when nothing qualifies.
    pub fn match_group(&self, group: &ImportedGroup) -> Option<TemplateMatch> {
        let prepared = self.prepare(group);
        if prepared.normalized.is_empty() {
            log::debug!("'{}' has no visible items", group.display_name());
            return None;
        }

        let name_candidates: BTreeSet<&str> = group
            .names()
            .flat_map(|name| self.library.find_by_name(name))
            .collect();

        let best = self
            .library
            .all()
            .filter_map(|entry| {
                let named = name_candidates.contains(entry.key.as_str());
                self.score_entry(entry, &prepared, named)
            })
            .max_by(rank);

        if let Some(found) = best {
            log::debug!(
                "'{}' matched '{}' ({}, score {:.2})",
                group.display_name(),
                found.template_key,
                found.confidence.as_str(),
                found.score
            );
            return Some(found);
        }

        self.match_participants(group, &prepared)
    }

    fn prepare(&self, group: &ImportedGroup) -> PreparedImport {
        let visible: Vec<_> = group
            .items
            .iter()
            .filter(|item| !self.config.is_hidden(&item.code))
            .collect();

        let runs_detected = normalize_set(visible.iter().map(|item| item.code.as_str())).run_count();

        // Alias codes are compared under their canonical name.
        let canonical: Vec<String> = visible
            .iter()
            .map(|item| {
                self.library
                    .canonical(&item.code)
                    .map_or_else(|| item.code.clone(), |target| target.canonical.clone())
            })
            .collect();

        let mut levels = BTreeMap::new();
        for (item, code) in visible.iter().zip(&canonical) {
            if let Some(map) = &item.levels {
                levels
                    .entry(structural_key(code))
                    .or_insert_with(|| map.keys().map(|k| k.trim().to_string()).collect());
            }
        }

        PreparedImport {
            normalized: normalize_set(&canonical),
            levels,
            runs_detected,
        }
    }

    fn score_entry(
        &self,
        entry: &LibraryEntry,
        prepared: &PreparedImport,
        named: bool,
    ) -> Option<TemplateMatch> {
        let comparison = compare(entry, prepared);
        let ratio = comparison.ratio();
        if ratio < self.config.min_overlap && !named {
            return None;
        }

        let confidence = if comparison.same_coverage() {
            if comparison.levels_match == Some(false) {
                Confidence::High
            } else {
                Confidence::Exact
            }
        } else if ratio > self.config.medium_overlap {
            Confidence::Medium
        } else if ratio >= self.config.min_overlap || named {
            Confidence::Low
        } else {
            return None;
        };

        let score = if named {
            ratio + self.config.name_bonus
        } else {
            ratio
        };

        Some(comparison.into_match(
            MatchTarget::Instrument(entry.key.clone()),
            entry,
            confidence,
            score,
            named,
        ))
    }

    fn match_participants(
        &self,
        group: &ImportedGroup,
        prepared: &PreparedImport,
    ) -> Option<TemplateMatch> {
        let entry = self.library.participants()?;
        let comparison = compare(entry, prepared);
        let ratio = comparison.ratio();
        // A label hint only rescues a group that shares nothing with the template.
        let hinted = comparison.overlap_count == 0
            && group.names().any(|name| self.config.hints_participants(name));

        if ratio < self.config.participants_min_overlap && !hinted {
            return None;
        }

        let confidence = if comparison.same_coverage() {
            if comparison.levels_match == Some(false) {
                Confidence::High
            } else {
                Confidence::Exact
            }
        } else if ratio > self.config.medium_overlap {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        log::debug!(
            "'{}' matched participants template ({}, ratio {ratio:.2})",
            group.display_name(),
            confidence.as_str()
        );
        Some(comparison.into_match(MatchTarget::Participants, entry, confidence, ratio, hinted))
    }
}

/// Candidate order: score, then confidence, then project before global
/// before generated, then key (smaller key wins).
fn rank(a: &TemplateMatch, b: &TemplateMatch) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then(a.confidence.cmp(&b.confidence))
        .then(b.source.cmp(&a.source))
        .then(b.template_key.cmp(&a.template_key))
}

/// Set comparison between one template and the prepared import
struct Comparison {
    overlap_count: usize,
    template_item_count: usize,
    imported_item_count: usize,
    runs_detected: usize,
    only_in_import: Vec<String>,
    only_in_library: Vec<String>,
    levels_match: Option<bool>,
}

fn compare(entry: &LibraryEntry, prepared: &PreparedImport) -> Comparison {
    let template = entry.signature().normalized();
    let imported = &prepared.normalized;

    let mut overlap_count = 0;
    let mut compared_levels = false;
    let mut levels_agree = true;
    let mut only_in_import = Vec::new();
    for (key, base) in imported.iter() {
        if !template.contains_key(key) {
            only_in_import.push(base.to_string());
            continue;
        }
        overlap_count += 1;
        if let (Some(ours), Some(theirs)) = (prepared.levels.get(key), entry.signature().levels(key)) {
            compared_levels = true;
            if ours != theirs {
                levels_agree = false;
            }
        }
    }

    let only_in_library = template
        .iter()
        .filter(|(key, _)| !imported.contains_key(key))
        .map(|(_, base)| base.to_string())
        .collect();

    Comparison {
        overlap_count,
        template_item_count: template.len(),
        imported_item_count: imported.len(),
        runs_detected: prepared.runs_detected,
        only_in_import,
        only_in_library,
        levels_match: compared_levels.then_some(levels_agree),
    }
}

impl Comparison {
    fn ratio(&self) -> f64 {
        let denom = self.imported_item_count.max(self.template_item_count);
        if denom == 0 {
            return 0.0;
        }
        self.overlap_count as f64 / denom as f64
    }

    fn same_coverage(&self) -> bool {
        self.overlap_count > 0 && self.only_in_import.is_empty() && self.only_in_library.is_empty()
    }

    fn into_match(
        self,
        target: MatchTarget,
        entry: &LibraryEntry,
        confidence: Confidence,
        score: f64,
        name_matched: bool,
    ) -> TemplateMatch {
        TemplateMatch {
            target,
            template_key: entry.key.clone(),
            confidence,
            score,
            overlap_count: self.overlap_count,
            template_item_count: self.template_item_count,
            imported_item_count: self.imported_item_count,
            runs_detected: self.runs_detected,
            only_in_import: self.only_in_import,
            only_in_library: self.only_in_library,
            levels_match: self.levels_match,
            source: entry.source,
            name_matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportedItem;
    use pretty_assertions::assert_eq;
    use survey_library::{TemplateDocument, TemplateKind, TemplateSource};

    fn entry(key: &str, source: TemplateSource, raw: &str) -> LibraryEntry {
        LibraryEntry::new(
            key,
            TemplateKind::Survey,
            source,
            TemplateDocument::from_json_str(key, raw).unwrap(),
        )
    }

    fn items(codes: &[&str]) -> String {
        let body: Vec<String> = codes.iter().map(|c| format!("\"{c}\": {{}}")).collect();
        format!("{{{}}}", body.join(", "))
    }

    fn library(entries: Vec<LibraryEntry>) -> LibraryIndex {
        let mut index = LibraryIndex::new();
        for e in entries {
            index.insert(e).unwrap();
        }
        index
    }

    #[test]
    fn identical_sets_are_exact() {
        let lib = library(vec![entry(
            "gad7",
            TemplateSource::Global,
            &items(&["GAD01", "GAD02", "GAD03"]),
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine
            .match_items(["GAD01", "GAD02", "GAD03"], None)
            .unwrap();
        assert_eq!(found.template_key, "gad7");
        assert_eq!(found.confidence, Confidence::Exact);
        assert!(found.only_in_import.is_empty());
        assert!(found.only_in_library.is_empty());
        assert_eq!(found.levels_match, None);
        assert!(!found.is_participants());
    }

    #[test]
    fn export_spelling_and_runs_do_not_break_exactness() {
        let lib = library(vec![entry(
            "gad7",
            TemplateSource::Global,
            &items(&["GAD01", "GAD02"]),
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine
            .match_items(
                ["gad_01_run-1", "gad_02_run-1", "GAD01run02", "GAD02run02"],
                None,
            )
            .unwrap();
        assert_eq!(found.confidence, Confidence::Exact);
        assert_eq!(found.runs_detected, 2);
        assert_eq!(found.imported_item_count, 2);
    }

    #[test]
    fn one_extra_item_is_at_least_low() {
        let lib = library(vec![entry("mini", TemplateSource::Global, &items(&["M1"]))]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine.match_items(["M1", "EXTRA"], None).unwrap();
        assert!(found.confidence >= Confidence::Low);
        assert_eq!(found.only_in_import, vec!["EXTRA".to_string()]);
        assert!(found.only_in_library.is_empty());
    }

    #[test]
    fn partial_coverage_tiers() {
        let lib = library(vec![entry(
            "ten",
            TemplateSource::Global,
            &items(&["T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9", "T10"]),
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());

        let eight = engine
            .match_items(["T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8"], None)
            .unwrap();
        assert_eq!(eight.confidence, Confidence::Medium);
        assert_eq!(eight.only_in_library.len(), 2);

        let six = engine
            .match_items(["T1", "T2", "T3", "T4", "T5", "T6"], None)
            .unwrap();
        assert_eq!(six.confidence, Confidence::Low);

        assert!(engine.match_items(["T1", "T2", "T3"], None).is_none());
    }

    #[test]
    fn name_match_rescues_low_overlap() {
        let lib = library(vec![entry(
            "panas",
            TemplateSource::Global,
            &r#"{"Study": {"ShortName": "PANAS"}, "P1": {}, "P2": {}, "P3": {}, "P4": {}}"#,
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine.match_items(["P1", "X9"], Some("PANAS short")).unwrap();
        assert_eq!(found.confidence, Confidence::Low);
        assert!(found.name_matched);
        assert!((found.score - 0.35).abs() < 1e-9);
    }

    #[test]
    fn differing_levels_downgrade_to_high() {
        let lib = library(vec![entry(
            "phq",
            TemplateSource::Global,
            r#"{"PHQ1": {"Levels": {"0": "not at all", "1": "several days"}}, "PHQ2": {}}"#,
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());

        let same = ImportedGroup {
            items: vec![
                ImportedItem::new("PHQ1").with_levels([("0", "nie"), ("1", "manchmal")]),
                ImportedItem::new("PHQ2"),
            ],
            ..ImportedGroup::default()
        };
        let found = engine.match_group(&same).unwrap();
        assert_eq!(found.confidence, Confidence::Exact);
        assert_eq!(found.levels_match, Some(true));

        let different = ImportedGroup {
            items: vec![
                ImportedItem::new("PHQ1").with_levels([("1", "a"), ("2", "b")]),
                ImportedItem::new("PHQ2"),
            ],
            ..ImportedGroup::default()
        };
        let found = engine.match_group(&different).unwrap();
        assert_eq!(found.confidence, Confidence::High);
        assert_eq!(found.levels_match, Some(false));
    }

    #[test]
    fn best_score_wins_and_project_breaks_ties() {
        let lib = library(vec![
            entry("wide", TemplateSource::Global, &items(&["A", "B", "C", "D"])),
            entry("narrow", TemplateSource::Global, &items(&["A", "B", "C"])),
            entry("narrow", TemplateSource::Project, &items(&["A", "B", "C"])),
        ]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine.match_items(["A", "B", "C"], None).unwrap();
        assert_eq!(found.template_key, "narrow");
        assert_eq!(found.source, TemplateSource::Project);
        assert_eq!(found.confidence, Confidence::Exact);
    }

    #[test]
    fn hidden_items_are_ignored() {
        let lib = library(vec![entry("q", TemplateSource::Global, &items(&["Q1", "Q2"]))]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine
            .match_items(["Q1", "Q2", "_submitdate", "_lastpage"], None)
            .unwrap();
        assert_eq!(found.confidence, Confidence::Exact);
        assert!(engine.match_items(["_submitdate"], None).is_none());
    }

    #[test]
    fn aliases_resolve_to_canonical_items() {
        let lib = library(vec![entry(
            "stai",
            TemplateSource::Global,
            r#"{"STAI1": {"Aliases": ["anx_1"]}, "STAI2": {}}"#,
        )]);
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine.match_items(["ANX-1", "STAI2"], None).unwrap();
        assert_eq!(found.confidence, Confidence::Exact);
    }

    fn with_participants(raw: &str) -> LibraryIndex {
        let mut lib = library(vec![entry("q", TemplateSource::Global, &items(&["Q1", "Q2"]))]);
        lib.insert(LibraryEntry::new(
            "participants",
            TemplateKind::Participants,
            TemplateSource::Global,
            TemplateDocument::from_json_str("participants", raw).unwrap(),
        ))
        .unwrap();
        lib
    }

    #[test]
    fn participants_fallback_by_overlap() {
        let lib = with_participants(&items(&["participant_id", "age", "sex", "handedness"]));
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let found = engine.match_items(["Age", "Sex", "education"], None).unwrap();
        assert!(found.is_participants());
        assert_eq!(found.template_key, "participants");
        assert_eq!(found.confidence, Confidence::Low);
        assert_eq!(found.only_in_import, vec!["education".to_string()]);
    }

    #[test]
    fn participants_fallback_by_label_hint() {
        let lib = with_participants(&items(&[
            "participant_id",
            "age",
            "sex",
            "handedness",
            "education",
        ]));
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        assert!(engine.match_items(["birth_year"], None).is_none());
        let found = engine
            .match_items(["birth_year"], Some("Demographics"))
            .unwrap();
        assert!(found.is_participants());
        assert_eq!(found.overlap_count, 0);
        assert_eq!(found.confidence, Confidence::Low);
    }

    #[test]
    fn label_hint_does_not_rescue_thin_partial_overlap() {
        let lib = with_participants(&items(&["participant_id", "age", "sex", "handedness"]));
        let engine = MatchEngine::new(&lib, MatchConfig::default());
        let mut codes = vec!["age".to_string()];
        codes.extend((1..=9).map(|i| format!("x{i}")));

        assert!(engine
            .match_items(codes.iter().map(String::as_str), Some("Demographics"))
            .is_none());
    }
}
