//! Recipe documents as authored, before validation.
//!
//! Every field is optional and strings are kept verbatim so the validator can
//! report exactly what is wrong instead of failing on the first bad field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{RecipeError, Result};

pub const KIND_SURVEY: &str = "survey";
pub const KIND_BIOMETRICS: &str = "biometrics";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecipeDocument {
    #[serde(default)]
    pub kind: Option<String>,

    /// Authored as either a string or a number
    #[serde(default, deserialize_with = "lenient_string")]
    pub recipe_version: Option<String>,

    #[serde(default)]
    pub survey: Option<InfoBlock>,

    #[serde(default)]
    pub biometrics: Option<InfoBlock>,

    #[serde(default)]
    pub transforms: Option<TransformsBlock>,

    #[serde(default)]
    pub scores: Option<Vec<EntryDocument>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoBlock {
    #[serde(default)]
    pub task_name: Option<String>,

    #[serde(default)]
    pub biometric_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransformsBlock {
    #[serde(default)]
    pub invert: Option<InvertBlock>,

    #[serde(default)]
    pub derived: Option<Vec<EntryDocument>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvertBlock {
    #[serde(default)]
    pub items: Option<Vec<String>>,

    #[serde(default)]
    pub scale: Option<Bounds>,
}

/// `{min, max}` pair used by `Invert.Scale` and score `Range`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, alias = "Min")]
    pub min: Option<f64>,

    #[serde(default, alias = "Max")]
    pub max: Option<f64>,
}

/// One `Derived` or `Scores` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryDocument {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub items: Option<Vec<String>>,

    #[serde(default)]
    pub missing: Option<String>,

    #[serde(default)]
    pub formula: Option<String>,

    #[serde(default)]
    pub mapping: Option<Map<String, Value>>,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub range: Option<Bounds>,

    #[serde(default)]
    pub unit: Option<String>,
}

impl EntryDocument {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().map_or("", str::trim)
    }

    /// Lower-cased, trimmed method
    #[must_use]
    pub fn method(&self) -> String {
        self.method
            .as_deref()
            .map(|m| m.trim().to_lowercase())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn items(&self) -> &[String] {
        self.items.as_deref().unwrap_or_default()
    }
}

impl RecipeDocument {
    pub fn from_json_str(origin: &str, raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RecipeError::parse(origin, e.to_string()))
    }

    /// Lower-cased, trimmed kind
    #[must_use]
    pub fn kind(&self) -> String {
        self.kind
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_default()
    }

    /// `Survey.TaskName` or `Biometrics.BiometricName`, whichever the kind calls for
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        let name = match self.kind().as_str() {
            KIND_SURVEY => self.survey.as_ref()?.task_name.as_deref(),
            KIND_BIOMETRICS => self.biometrics.as_ref()?.biometric_name.as_deref(),
            _ => None,
        };
        name.map(str::trim).filter(|n| !n.is_empty())
    }

    #[must_use]
    pub fn invert(&self) -> Option<&InvertBlock> {
        self.transforms.as_ref()?.invert.as_ref()
    }

    #[must_use]
    pub fn derived(&self) -> &[EntryDocument] {
        self.transforms
            .as_ref()
            .and_then(|t| t.derived.as_deref())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn scores(&self) -> &[EntryDocument] {
        self.scores.as_deref().unwrap_or_default()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_full_document() {
        let doc = RecipeDocument::from_json_str(
            "phq9.json",
            r#"{
              "Kind": "Survey",
              "RecipeVersion": 1,
              "Survey": {"TaskName": " PHQ9 "},
              "Transforms": {
                "Invert": {"Items": ["q2"], "Scale": {"min": 0, "max": 3}},
                "Derived": [{"Name": "core", "Method": "sum", "Items": ["q1", "q2"]}]
              },
              "Scores": [
                {"Name": "total", "Method": "Sum", "Items": ["q1"], "Missing": "ignore",
                 "Range": {"Min": 0, "Max": 27}, "Unit": "points"}
              ]
            }"#,
        )
        .unwrap();

        assert_eq!(doc.kind(), "survey");
        assert_eq!(doc.recipe_version.as_deref(), Some("1"));
        assert_eq!(doc.task_name(), Some("PHQ9"));
        assert_eq!(doc.invert().unwrap().scale.unwrap().max, Some(3.0));
        assert_eq!(doc.derived().len(), 1);
        assert_eq!(doc.scores()[0].method(), "sum");
        assert_eq!(doc.scores()[0].range.unwrap().max, Some(27.0));
    }

    #[test]
    fn task_name_follows_kind() {
        let doc = RecipeDocument {
            kind: Some("biometrics".into()),
            survey: Some(InfoBlock {
                task_name: Some("wrong".into()),
                ..InfoBlock::default()
            }),
            ..RecipeDocument::default()
        };
        assert_eq!(doc.task_name(), None);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RecipeDocument::from_json_str("bad.json", "[1, 2").unwrap_err();
        assert!(matches!(err, RecipeError::Parse { ref origin, .. } if origin == "bad.json"));
    }
}
