use log::warn;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use crate::document::{Bounds, EntryDocument, InvertBlock, RecipeDocument, KIND_BIOMETRICS};
use crate::error::{RecipeError, Result};
use crate::expr::Formula;
use crate::validate::{has_errors, validate, Severity, ValidationIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    Survey,
    Biometrics,
}

impl RecipeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::Biometrics => "biometrics",
        }
    }
}

/// Reflection of listed items around the midpoint of their scale
#[derive(Debug, Clone, PartialEq)]
pub struct Inversion {
    pub items: BTreeSet<String>,
    pub min: f64,
    pub max: f64,
}

impl Inversion {
    #[must_use]
    pub fn applies_to(&self, code: &str) -> bool {
        self.items.contains(code)
    }

    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        invert(value, self.min, self.max)
    }
}

/// `max + min - value`; applying it twice returns the input
#[must_use]
pub fn invert(value: f64, min: f64, max: f64) -> f64 {
    max + min - value
}

/// Key of one `Mapping` entry
#[derive(Debug, Clone, PartialEq)]
pub enum MapKey {
    /// `"low-high"`, bounds inclusive
    Range { low: f64, high: f64 },
    Exact(String),
}

impl MapKey {
    /// Read a mapping key. Anything that is not `number-number` is an exact key.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        // Skip a leading sign so "-3-0" splits after the first number
        let split_from = usize::from(trimmed.starts_with('-'));
        if let Some(pos) = trimmed[split_from..].find('-').map(|p| p + split_from) {
            let (low, high) = (trimmed[..pos].trim(), trimmed[pos + 1..].trim());
            if let (Ok(low), Ok(high)) = (low.parse::<f64>(), high.parse::<f64>()) {
                if low <= high {
                    return Self::Range { low, high };
                }
            }
        }
        Self::Exact(trimmed.to_string())
    }

    #[must_use]
    pub fn matches(&self, text: &str, number: Option<f64>) -> bool {
        match self {
            Self::Range { low, high } => number.is_some_and(|n| *low <= n && n <= *high),
            Self::Exact(key) => {
                key == text || matches!((key.parse::<f64>(), number), (Ok(k), Some(n)) if k == n)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreMethod {
    Sum,
    Mean,
    Max,
    Min,
    Map {
        source: String,
        mapping: Vec<(MapKey, Value)>,
    },
    Formula(Formula),
}

impl ScoreMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Min => "min",
            Self::Map { .. } => "map",
            Self::Formula(_) => "formula",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Reduce over whatever resolved
    #[default]
    Ignore,
    /// Any unresolved input makes the score NA
    RequireAll,
}

impl MissingPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::RequireAll => "require_all",
        }
    }
}

/// Intermediate variable available to later Derived entries and to Scores
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVariable {
    pub name: String,
    pub method: ScoreMethod,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDefinition {
    pub name: String,
    pub method: ScoreMethod,
    pub items: Vec<String>,
    pub missing: MissingPolicy,
    pub description: Option<String>,
    pub range: Option<Bounds>,
    pub unit: Option<String>,
}

/// Validated, typed recipe ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub kind: RecipeKind,
    pub version: String,
    /// Task or biometric name as authored
    pub task: String,
    pub invert: Option<Inversion>,
    pub derived: Vec<DerivedVariable>,
    pub scores: Vec<ScoreDefinition>,
}

impl Recipe {
    /// Parse and compile a recipe from JSON text
    pub fn from_json_str(origin: &str, raw: &str) -> Result<Self> {
        let doc = RecipeDocument::from_json_str(origin, raw)?;
        Self::compile(&doc).map_err(|e| match e {
            RecipeError::Invalid { issues } => RecipeError::Invalid {
                issues: issues.into_iter().map(|i| i.in_recipe(origin)).collect(),
            },
            other => other,
        })
    }

    /// Validate a document and build the typed recipe.
    ///
    /// Warnings are logged; any error fails with the complete issue list.
    pub fn compile(doc: &RecipeDocument) -> Result<Self> {
        let issues = validate(doc);
        if has_errors(&issues) {
            return Err(RecipeError::Invalid { issues });
        }
        for issue in issues.iter().filter(|i| i.severity == Severity::Warning) {
            warn!("{issue}");
        }
        Self::build(doc)
    }

    /// Build the typed model from a document that already passed [`validate`]
    pub(crate) fn build(doc: &RecipeDocument) -> Result<Self> {
        let kind = if doc.kind() == KIND_BIOMETRICS {
            RecipeKind::Biometrics
        } else {
            RecipeKind::Survey
        };
        let task = doc
            .task_name()
            .ok_or_else(|| internal("Survey", "task name vanished after validation"))?
            .to_string();

        let invert = doc.invert().map(compile_inversion).transpose()?;

        let derived = doc
            .derived()
            .iter()
            .map(|entry| {
                Ok(DerivedVariable {
                    name: entry.name().to_string(),
                    method: compile_method(entry)?,
                    items: entry.items().to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let scores = doc
            .scores()
            .iter()
            .map(|entry| {
                Ok(ScoreDefinition {
                    name: entry.name().to_string(),
                    method: compile_method(entry)?,
                    items: entry.items().to_vec(),
                    missing: match entry.missing.as_deref().map(|m| m.trim().to_lowercase()) {
                        Some(m) if m == "require_all" => MissingPolicy::RequireAll,
                        _ => MissingPolicy::Ignore,
                    },
                    description: entry.description.clone(),
                    range: entry.range,
                    unit: entry.unit.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kind,
            version: doc.recipe_version.clone().unwrap_or_default(),
            task,
            invert,
            derived,
            scores,
        })
    }

    /// Library key: lower-cased task name
    #[must_use]
    pub fn key(&self) -> String {
        self.task.to_lowercase()
    }

    /// Output column names in declaration order
    pub fn score_names(&self) -> impl Iterator<Item = &str> {
        self.scores.iter().map(|s| s.name.as_str())
    }

    /// JSON description of every score column, written next to the table
    #[must_use]
    pub fn sidecar(&self) -> Value {
        let mut columns = Map::new();
        for score in &self.scores {
            let mut entry = Map::new();
            entry.insert(
                "Description".into(),
                score
                    .description
                    .clone()
                    .map_or_else(|| json!(format!("{} score", score.name)), Value::from),
            );
            entry.insert("Method".into(), json!(score.method.as_str()));
            if let ScoreMethod::Formula(formula) = &score.method {
                entry.insert("Formula".into(), json!(formula.source()));
            }
            if let ScoreMethod::Map { source, .. } = &score.method {
                entry.insert("Source".into(), json!(source));
            }
            if !score.items.is_empty() {
                entry.insert("Items".into(), json!(score.items));
            }
            entry.insert("Missing".into(), json!(score.missing.as_str()));
            if let Some(range) = score.range {
                entry.insert("Range".into(), json!({"min": range.min, "max": range.max}));
            }
            if let Some(unit) = &score.unit {
                entry.insert("Unit".into(), json!(unit));
            }
            columns.insert(score.name.clone(), Value::Object(entry));
        }
        Value::Object(columns)
    }
}

fn internal(location: &str, message: &str) -> RecipeError {
    RecipeError::Invalid {
        issues: vec![ValidationIssue {
            severity: Severity::Error,
            recipe: None,
            location: location.to_string(),
            message: message.to_string(),
        }],
    }
}

fn compile_inversion(block: &InvertBlock) -> Result<Inversion> {
    let scale = block.scale.unwrap_or_default();
    match (scale.min, scale.max) {
        (Some(min), Some(max)) => Ok(Inversion {
            items: block
                .items
                .iter()
                .flatten()
                .cloned()
                .collect(),
            min,
            max,
        }),
        _ => Err(internal("Transforms.Invert.Scale", "bounds vanished after validation")),
    }
}

fn compile_method(entry: &EntryDocument) -> Result<ScoreMethod> {
    let location = entry.name();
    Ok(match entry.method().as_str() {
        "sum" => ScoreMethod::Sum,
        "mean" => ScoreMethod::Mean,
        "max" => ScoreMethod::Max,
        "min" => ScoreMethod::Min,
        "map" => ScoreMethod::Map {
            source: entry.source.as_deref().unwrap_or_default().trim().to_string(),
            mapping: entry
                .mapping
                .iter()
                .flatten()
                .map(|(key, value)| (MapKey::parse(key), value.clone()))
                .collect(),
        },
        "formula" => {
            let source = entry.formula.as_deref().unwrap_or_default();
            let formula =
                Formula::parse(source).map_err(|e| internal(location, &e.to_string()))?;
            ScoreMethod::Formula(formula)
        }
        other => return Err(internal(location, &format!("unknown method '{other}'"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const RECIPE: &str = r#"{
      "Kind": "Survey",
      "RecipeVersion": "1.0",
      "Survey": {"TaskName": "PHQ9"},
      "Transforms": {"Invert": {"Items": ["q2"], "Scale": {"min": 0, "max": 3}}},
      "Scores": [
        {"Name": "total", "Method": "sum", "Items": ["q1", "q2"], "Missing": "require_all",
         "Description": "Sum of all items", "Range": {"min": 0, "max": 6}, "Unit": "points"},
        {"Name": "band", "Method": "map", "Source": "q1", "Mapping": {"0-1": "low", "2-3": "high"}},
        {"Name": "double", "Method": "formula", "Items": ["q1"], "Formula": "{q1} * 2"}
      ]
    }"#;

    #[test]
    fn compiles_typed_model() {
        let recipe = Recipe::from_json_str("phq9.json", RECIPE).unwrap();
        assert_eq!(recipe.kind, RecipeKind::Survey);
        assert_eq!(recipe.key(), "phq9");
        assert_eq!(recipe.score_names().collect::<Vec<_>>(), vec!["total", "band", "double"]);
        assert_eq!(recipe.scores[0].missing, MissingPolicy::RequireAll);
        assert_eq!(recipe.scores[1].missing, MissingPolicy::Ignore);
        assert!(recipe.invert.as_ref().unwrap().applies_to("q2"));
        assert!(matches!(
            &recipe.scores[1].method,
            ScoreMethod::Map { source, mapping } if source == "q1" && mapping.len() == 2
        ));
    }

    #[test]
    fn invalid_recipe_carries_origin_in_issues() {
        let err = Recipe::from_json_str("bad.json", r#"{"Kind": "survey"}"#).unwrap_err();
        let issues = err.issues();
        assert!(issues.len() >= 2);
        assert!(issues
            .iter()
            .all(|i| i.recipe.as_deref() == Some("bad.json")));
        assert!(err.to_string().starts_with("recipe validation failed with"));
    }

    #[test]
    fn map_keys() {
        assert_eq!(MapKey::parse("0-4"), MapKey::Range { low: 0.0, high: 4.0 });
        assert_eq!(MapKey::parse(" 2.5 - 7 "), MapKey::Range { low: 2.5, high: 7.0 });
        assert_eq!(MapKey::parse("-3-0"), MapKey::Range { low: -3.0, high: 0.0 });
        assert_eq!(MapKey::parse("5-1"), MapKey::Exact("5-1".into()));
        assert_eq!(MapKey::parse("yes"), MapKey::Exact("yes".into()));
        assert_eq!(MapKey::parse("2"), MapKey::Exact("2".into()));

        let range = MapKey::parse("0-4");
        assert!(range.matches("4", Some(4.0)));
        assert!(!range.matches("4.5", Some(4.5)));
        assert!(!range.matches("abc", None));
        assert!(MapKey::parse("2").matches("2.0", Some(2.0)));
        assert!(MapKey::parse("yes").matches("yes", None));
    }

    #[test]
    fn sidecar_describes_each_score() {
        let recipe = Recipe::from_json_str("phq9.json", RECIPE).unwrap();
        let sidecar = recipe.sidecar();
        assert_eq!(sidecar["total"]["Description"], "Sum of all items");
        assert_eq!(sidecar["total"]["Range"], json!({"min": 0.0, "max": 6.0}));
        assert_eq!(sidecar["total"]["Unit"], "points");
        assert_eq!(sidecar["band"]["Description"], "band score");
        assert_eq!(sidecar["band"]["Source"], "q1");
        assert_eq!(sidecar["double"]["Formula"], "{q1} * 2");
        let keys: Vec<_> = sidecar.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["total", "band", "double"]);
    }

    proptest! {
        #[test]
        fn inversion_is_an_involution(
            min in -100i32..100,
            width in 1i32..100,
            offset in 0i32..100,
        ) {
            let (min, max) = (f64::from(min), f64::from(min + width));
            let v = min + f64::from(offset % (width + 1));
            prop_assert_eq!(invert(invert(v, min, max), min, max), v);
            prop_assert!(invert(v, min, max) >= min && invert(v, min, max) <= max);
        }
    }
}
