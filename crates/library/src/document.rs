use crate::error::{LibraryError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Top-level keys that describe the instrument rather than an item.
pub const METADATA_KEYS: &[&str] = &[
    "Study",
    "Technical",
    "Metadata",
    "I18n",
    "Scoring",
    "Normative",
    "References",
    "@context",
    "@type",
];

#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    METADATA_KEYS.contains(&key)
}

/// What kind of instrument a template describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Survey,
    Biometrics,
    Participants,
}

impl TemplateKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::Biometrics => "biometrics",
            Self::Participants => "participants",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "survey" => Some(Self::Survey),
            "biometrics" => Some(Self::Biometrics),
            "participants" => Some(Self::Participants),
            _ => None,
        }
    }
}

/// One item definition inside a template document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemDefinition {
    /// Plain string or a language → text object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,

    /// Response code → label; only the codes take part in comparisons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Map<String, Value>>,

    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_value: Option<f64>,

    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_value: Option<f64>,

    /// Marks this entry as an alias of another item in the same template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,

    /// Codes that other exports use for this item
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl ItemDefinition {
    #[must_use]
    pub fn is_alias_only(&self) -> bool {
        self.alias_of
            .as_deref()
            .is_some_and(|target| !target.trim().is_empty())
    }

    #[must_use]
    pub fn description_text(&self) -> Option<String> {
        self.description.as_ref().and_then(text_of)
    }

    /// Response codes declared in `Levels`, if any.
    #[must_use]
    pub fn level_codes(&self) -> Option<BTreeSet<String>> {
        self.levels
            .as_ref()
            .map(|levels| levels.keys().map(|k| k.trim().to_string()).collect())
    }
}

/// Accept numbers written as JSON numbers or numeric strings.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Text of a plain string, or of the English / first entry of a translation object.
#[must_use]
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(map) => map
            .get("en")
            .and_then(text_of)
            .or_else(|| map.values().find_map(text_of)),
        _ => None,
    }
}

/// Study block fields used for name lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StudyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<Value>,
}

impl StudyInfo {
    #[must_use]
    pub fn short_name(&self) -> Option<String> {
        self.short_name
            .as_ref()
            .and_then(text_of)
            .or_else(|| self.abbreviation.as_ref().and_then(text_of))
    }

    #[must_use]
    pub fn official_name(&self) -> Option<String> {
        self.original_name
            .as_ref()
            .and_then(text_of)
            .or_else(|| self.long_name.as_ref().and_then(text_of))
    }

    #[must_use]
    pub fn task_name(&self) -> Option<String> {
        self.task_name.as_ref().and_then(text_of)
    }
}

/// A named item inside a template, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateItem {
    pub code: String,
    pub definition: ItemDefinition,
}

/// A canonical instrument definition: study metadata plus item definitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateDocument {
    pub study: StudyInfo,
    /// `Technical.Kind`, when the document declares one
    pub declared_kind: Option<TemplateKind>,
    /// Metadata blocks kept verbatim for re-serialization
    pub metadata: Map<String, Value>,
    pub items: Vec<TemplateItem>,
}

impl TemplateDocument {
    pub fn from_json_str(origin: &str, raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| LibraryError::parse(origin, e.to_string()))?;
        Self::from_value(origin, value)
    }

    pub fn from_value(origin: &str, value: Value) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(LibraryError::parse(origin, "top level is not an object"));
        };

        let mut doc = Self::default();
        for (key, value) in root {
            if is_metadata_key(&key) {
                doc.metadata.insert(key, value);
                continue;
            }
            // Scalars at top level (e.g. comments) are not items.
            if !value.is_object() {
                continue;
            }
            let definition: ItemDefinition = serde_json::from_value(value)
                .map_err(|e| LibraryError::parse(origin, format!("item '{key}': {e}")))?;
            doc.items.push(TemplateItem {
                code: key,
                definition,
            });
        }

        if let Some(study) = doc.metadata.get("Study") {
            doc.study = serde_json::from_value(study.clone())
                .map_err(|e| LibraryError::parse(origin, format!("Study: {e}")))?;
        }
        doc.declared_kind = doc
            .metadata
            .get("Technical")
            .and_then(|t| t.get("Kind"))
            .and_then(Value::as_str)
            .and_then(TemplateKind::parse);

        Ok(doc)
    }

    /// Build a skeleton template for an import that matched nothing.
    pub fn generated<I>(name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<Map<String, Value>>)>,
    {
        let study = StudyInfo {
            task_name: Some(Value::String(name.to_string())),
            short_name: Some(Value::String(name.to_string())),
            ..StudyInfo::default()
        };
        let mut metadata = Map::new();
        if let Ok(value) = serde_json::to_value(&study) {
            metadata.insert("Study".to_string(), value);
        }
        let items = items
            .into_iter()
            .map(|(code, levels)| TemplateItem {
                definition: ItemDefinition {
                    description: Some(Value::String(code.clone())),
                    levels,
                    ..ItemDefinition::default()
                },
                code,
            })
            .collect();
        Self {
            study,
            declared_kind: None,
            metadata,
            items,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut root = self.metadata.clone();
        for item in &self.items {
            let value = serde_json::to_value(&item.definition)
                .map_err(|e| LibraryError::parse(&item.code, e.to_string()))?;
            root.insert(item.code.clone(), value);
        }
        Ok(Value::Object(root))
    }

    #[must_use]
    pub fn item(&self, code: &str) -> Option<&ItemDefinition> {
        self.items
            .iter()
            .find(|item| item.code == code)
            .map(|item| &item.definition)
    }

    /// Codes of every non-alias item, in declaration order.
    pub fn signature_codes(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| !item.definition.is_alias_only())
            .map(|item| item.code.as_str())
    }
}
