use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::document::{EntryDocument, RecipeDocument, KIND_BIOMETRICS, KIND_SURVEY};
use crate::expr::Formula;

/// Methods accepted in `Transforms.Derived`
pub const DERIVED_METHODS: &[&str] = &["sum", "mean", "max", "min", "map", "formula"];

/// Methods accepted in `Scores`
pub const SCORE_METHODS: &[&str] = &["sum", "mean", "map", "formula"];

/// Values accepted for a score's `Missing`
pub const MISSING_POLICIES: &[&str] = &["ignore", "require_all"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The recipe cannot be evaluated
    Error,
    /// The recipe runs but probably not as intended
    Warning,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// One problem found by [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// File or task the issue belongs to, filled in by the recipe library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    /// Dotted path to the offending field, e.g. `Scores[1] 'total'`
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    #[must_use]
    pub fn in_recipe(mut self, recipe: impl Into<String>) -> Self {
        self.recipe = Some(recipe.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(recipe) = &self.recipe {
            write!(f, "{recipe}: ")?;
        }
        write!(
            f,
            "{} at {}: {}",
            self.severity.as_str(),
            self.location,
            self.message
        )
    }
}

/// Whether any issue in the list blocks evaluation
#[must_use]
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_error)
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, severity: Severity, location: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            severity,
            recipe: None,
            location: location.into(),
            message: message.into(),
        });
    }

    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, location, message);
    }

    fn warn(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, location, message);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Derived,
    Scores,
}

impl Section {
    const fn path(self) -> &'static str {
        match self {
            Self::Derived => "Transforms.Derived",
            Self::Scores => "Scores",
        }
    }

    const fn methods(self) -> &'static [&'static str] {
        match self {
            Self::Derived => DERIVED_METHODS,
            Self::Scores => SCORE_METHODS,
        }
    }
}

/// Statically check a recipe document.
///
/// Never stops early: every violation is reported so the whole list can be
/// shown at once. Only [`Severity::Error`] issues make a recipe unusable.
#[must_use]
pub fn validate(doc: &RecipeDocument) -> Vec<ValidationIssue> {
    let mut issues = Issues::default();
    let kind = doc.kind();

    match doc.kind.as_deref().map(str::trim) {
        None | Some("") => issues.error("Kind", "is missing"),
        Some(raw) if kind != KIND_SURVEY && kind != KIND_BIOMETRICS => issues.error(
            "Kind",
            format!("must be '{KIND_SURVEY}' or '{KIND_BIOMETRICS}' (got '{raw}')"),
        ),
        Some(_) => {}
    }

    if doc
        .recipe_version
        .as_deref()
        .map_or(true, |v| v.trim().is_empty())
    {
        issues.error("RecipeVersion", "must not be empty");
    }

    check_info_block(doc, &kind, &mut issues);
    check_invert(doc, &mut issues);

    let derived_names = check_section(doc.derived(), Section::Derived, &mut issues);
    check_forward_references(doc.derived(), &mut issues);
    let score_names = check_section(doc.scores(), Section::Scores, &mut issues);

    for name in &score_names {
        if derived_names.contains(name) {
            issues.error(
                format!("Scores '{name}'"),
                format!("name '{name}' is also used by a Derived entry"),
            );
        }
    }

    if doc.scores().is_empty() {
        issues.warn("Scores", "recipe produces no output");
    }

    issues.0
}

fn check_info_block(doc: &RecipeDocument, kind: &str, issues: &mut Issues) {
    let (block, block_name, field, name) = match kind {
        KIND_SURVEY => (
            doc.survey.as_ref(),
            "Survey",
            "TaskName",
            doc.survey.as_ref().and_then(|b| b.task_name.as_deref()),
        ),
        KIND_BIOMETRICS => (
            doc.biometrics.as_ref(),
            "Biometrics",
            "BiometricName",
            doc.biometrics
                .as_ref()
                .and_then(|b| b.biometric_name.as_deref()),
        ),
        _ => return,
    };

    if block.is_none() {
        issues.error(block_name, "block is missing");
    } else if name.map_or(true, |n| n.trim().is_empty()) {
        issues.error(format!("{block_name}.{field}"), "must not be empty");
    }
}

fn check_invert(doc: &RecipeDocument, issues: &mut Issues) {
    let Some(invert) = doc.invert() else {
        return;
    };

    let items = invert.items.as_deref().unwrap_or_default();
    if items.is_empty() {
        issues.error("Transforms.Invert.Items", "must list at least one item");
    } else if items.iter().any(|item| item.trim().is_empty()) {
        issues.error("Transforms.Invert.Items", "contains an empty item code");
    }

    match invert.scale {
        None => issues.error("Transforms.Invert.Scale", "is missing"),
        Some(scale) => match (scale.min, scale.max) {
            (Some(min), Some(max)) if min >= max => issues.error(
                "Transforms.Invert.Scale",
                format!("min ({min}) must be below max ({max})"),
            ),
            (Some(_), Some(_)) => {}
            (min, max) => {
                if min.is_none() {
                    issues.error("Transforms.Invert.Scale.min", "is missing");
                }
                if max.is_none() {
                    issues.error("Transforms.Invert.Scale.max", "is missing");
                }
            }
        },
    }
}

/// Check every entry of one section and return its distinct non-empty names
fn check_section(entries: &[EntryDocument], section: Section, issues: &mut Issues) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for (idx, entry) in entries.iter().enumerate() {
        let name = entry.name();
        let location = if name.is_empty() {
            format!("{}[{idx}]", section.path())
        } else {
            format!("{}[{idx}] '{name}'", section.path())
        };

        if name.is_empty() {
            issues.error(&location, "Name must not be empty");
        } else if names.iter().any(|n| n == name) {
            issues.error(&location, format!("duplicate name '{name}'"));
        } else {
            names.push(name.to_string());
        }

        let method = entry.method();
        if method.is_empty() {
            issues.error(&location, "Method is missing");
        } else if !section.methods().contains(&method.as_str()) {
            issues.error(
                &location,
                format!(
                    "unknown Method '{method}' (allowed: {})",
                    section.methods().join(", ")
                ),
            );
        }

        match method.as_str() {
            "sum" | "mean" | "max" | "min" => {
                if entry.items().is_empty() {
                    issues.error(&location, format!("Method '{method}' needs non-empty Items"));
                }
            }
            "formula" => check_formula(entry, &location, issues),
            "map" => {
                if entry.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
                    issues.error(&location, "Method 'map' needs a Source");
                }
                if entry.mapping.as_ref().map_or(true, |m| m.is_empty()) {
                    issues.error(&location, "Method 'map' needs a non-empty Mapping");
                }
            }
            _ => {}
        }

        if section == Section::Scores {
            if let Some(missing) = entry.missing.as_deref() {
                let missing = missing.trim().to_lowercase();
                if !MISSING_POLICIES.contains(&missing.as_str()) {
                    issues.error(
                        &location,
                        format!(
                            "unknown Missing '{missing}' (allowed: {})",
                            MISSING_POLICIES.join(", ")
                        ),
                    );
                }
            }
        }
    }

    names
}

fn check_formula(entry: &EntryDocument, location: &str, issues: &mut Issues) {
    let Some(source) = entry.formula.as_deref().filter(|f| !f.trim().is_empty()) else {
        issues.error(location, "Method 'formula' needs a Formula");
        return;
    };

    match Formula::parse(source) {
        Err(e) => issues.error(location, format!("Formula does not parse: {e}")),
        Ok(formula) => {
            let items: HashSet<&str> = entry.items().iter().map(String::as_str).collect();
            for placeholder in formula.placeholders() {
                if !items.contains(placeholder) {
                    issues.error(
                        location,
                        format!("Formula placeholder '{{{placeholder}}}' is not listed in Items"),
                    );
                }
            }
        }
    }
}

/// A Derived entry can only see Derived outputs declared before it
fn check_forward_references(entries: &[EntryDocument], issues: &mut Issues) {
    let declared_at: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.name().is_empty())
        .rev()
        .map(|(idx, e)| (e.name(), idx))
        .collect();

    for (idx, entry) in entries.iter().enumerate() {
        let references = entry
            .items()
            .iter()
            .map(String::as_str)
            .chain(entry.source.as_deref());
        let mut reported: HashSet<&str> = HashSet::new();
        for reference in references {
            let Some(&at) = declared_at.get(reference) else {
                continue;
            };
            if at >= idx && reported.insert(reference) {
                issues.warn(
                    format!("Transforms.Derived[{idx}] '{}'", entry.name()),
                    format!(
                        "references Derived '{reference}' declared at or after itself; \
                         the value is read from the row instead"
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(json: &str) -> RecipeDocument {
        RecipeDocument::from_json_str("test", json).unwrap()
    }

    fn messages(issues: &[ValidationIssue]) -> Vec<String> {
        issues.iter().map(ToString::to_string).collect()
    }

    const VALID: &str = r#"{
      "Kind": "survey",
      "RecipeVersion": "1.0",
      "Survey": {"TaskName": "phq9"},
      "Transforms": {
        "Invert": {"Items": ["q2"], "Scale": {"min": 0, "max": 3}},
        "Derived": [
          {"Name": "core", "Method": "sum", "Items": ["q1", "q2"]},
          {"Name": "core_band", "Method": "map", "Source": "core", "Mapping": {"0-3": "low", "4-6": "high"}}
        ]
      },
      "Scores": [
        {"Name": "total", "Method": "mean", "Items": ["q1", "q2"], "Missing": "require_all"},
        {"Name": "weighted", "Method": "formula", "Items": ["q1", "core"], "Formula": "{q1} * 2 + {core}"}
      ]
    }"#;

    #[test]
    fn valid_recipe_has_no_issues() {
        assert_eq!(validate(&doc(VALID)), Vec::new());
    }

    #[test]
    fn duplicate_score_names_are_rejected() {
        let issues = validate(&doc(
            r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "t"},
                "Scores": [
                  {"Name": "total", "Method": "sum", "Items": ["a"]},
                  {"Name": "total", "Method": "mean", "Items": ["b"]}
                ]}"#,
        ));
        assert_eq!(
            messages(&issues),
            vec!["error at Scores[1] 'total': duplicate name 'total'"]
        );
    }

    #[test]
    fn derived_and_score_name_collision_is_rejected() {
        let issues = validate(&doc(
            r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "t"},
                "Transforms": {"Derived": [{"Name": "x", "Method": "sum", "Items": ["a"]}]},
                "Scores": [{"Name": "x", "Method": "sum", "Items": ["a"]}]}"#,
        ));
        assert_eq!(
            messages(&issues),
            vec!["error at Scores 'x': name 'x' is also used by a Derived entry"]
        );
    }

    #[test]
    fn placeholder_missing_from_items_is_flagged() {
        let issues = validate(&doc(
            r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "t"},
                "Scores": [{"Name": "s", "Method": "formula", "Items": ["a"], "Formula": "{a}+{b}"}]}"#,
        ));
        assert_eq!(
            messages(&issues),
            vec!["error at Scores[0] 's': Formula placeholder '{b}' is not listed in Items"]
        );
    }

    #[test]
    fn every_violation_is_reported_in_order() {
        let issues = validate(&doc(
            r#"{"Kind": "questionnaire",
                "Transforms": {
                  "Invert": {"Items": [], "Scale": {"min": 5}},
                  "Derived": [{"Name": "", "Method": "median", "Items": ["a"]}]
                },
                "Scores": [
                  {"Name": "m", "Method": "map", "Missing": "sometimes"},
                  {"Name": "f", "Method": "formula", "Items": ["a"], "Formula": "os.system('x')"},
                  {"Name": "mx", "Method": "max", "Items": ["a"]}
                ]}"#,
        ));
        assert_eq!(
            messages(&issues),
            vec![
                "error at Kind: must be 'survey' or 'biometrics' (got 'questionnaire')",
                "error at RecipeVersion: must not be empty",
                "error at Transforms.Invert.Items: must list at least one item",
                "error at Transforms.Invert.Scale.max: is missing",
                "error at Transforms.Derived[0]: Name must not be empty",
                "error at Transforms.Derived[0]: unknown Method 'median' (allowed: sum, mean, max, min, map, formula)",
                "error at Scores[0] 'm': Method 'map' needs a Source",
                "error at Scores[0] 'm': Method 'map' needs a non-empty Mapping",
                "error at Scores[0] 'm': unknown Missing 'sometimes' (allowed: ignore, require_all)",
                "error at Scores[1] 'f': Formula does not parse: unexpected character 'o' at offset 0",
                "error at Scores[2] 'mx': unknown Method 'max' (allowed: sum, mean, map, formula)",
            ]
        );
    }

    #[test]
    fn oversized_formula_is_an_error_not_a_crash() {
        let formula = format!("{{a}}{}", " + {a}".repeat(100_000));
        let raw = format!(
            r#"{{"Kind": "survey", "RecipeVersion": "1", "Survey": {{"TaskName": "t"}},
                "Scores": [{{"Name": "s", "Method": "formula", "Items": ["a"], "Formula": "{formula}"}}]}}"#
        );
        let issues = validate(&doc(&raw));
        assert_eq!(
            messages(&issues),
            vec!["error at Scores[0] 's': Formula does not parse: formula has more than 512 operators"]
        );
    }

    #[test]
    fn missing_info_block_and_bad_scale() {
        let issues = validate(&doc(
            r#"{"Kind": "biometrics", "RecipeVersion": "2",
                "Transforms": {"Invert": {"Items": ["a"], "Scale": {"min": 5, "max": 1}}},
                "Scores": [{"Name": "s", "Method": "sum", "Items": ["a"]}]}"#,
        ));
        assert_eq!(
            messages(&issues),
            vec![
                "error at Biometrics: block is missing",
                "error at Transforms.Invert.Scale: min (5) must be below max (1)",
            ]
        );
    }

    #[test]
    fn no_scores_is_only_a_warning() {
        let issues = validate(&doc(
            r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "t"}}"#,
        ));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!has_errors(&issues));
        assert_eq!(issues[0].to_string(), "warning at Scores: recipe produces no output");
    }

    #[test]
    fn forward_derived_reference_warns() {
        let issues = validate(&doc(
            r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "t"},
                "Transforms": {"Derived": [
                  {"Name": "early", "Method": "sum", "Items": ["late"]},
                  {"Name": "late", "Method": "sum", "Items": ["a"]}
                ]},
                "Scores": [{"Name": "s", "Method": "sum", "Items": ["early"]}]}"#,
        ));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].location.contains("'early'"));
    }
}
