use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use survey_codes::{strip_run_suffix, structural_key};
use survey_library::TemplateDocument;

/// One item as it arrives from an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedItem {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Map<String, Value>>,
}

impl ImportedItem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            levels: None,
        }
    }

    #[must_use]
    pub fn with_levels<I, K, V>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.levels = Some(
            levels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// A group of imported items (one questionnaire page, one sheet, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportedGroup {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub items: Vec<ImportedItem>,
}

impl ImportedGroup {
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: codes.into_iter().map(ImportedItem::new).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label, short name and long name that are present and non-blank
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.label, &self.short_name, &self.long_name]
            .into_iter()
            .filter_map(|name| name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Best available human name for the group
    #[must_use]
    pub fn display_name(&self) -> String {
        self.names()
            .next()
            .map_or_else(|| "unnamed group".to_string(), str::to_string)
    }

    /// Template skeleton for a group that matched nothing in the library.
    ///
    /// Run suffixes are dropped so repeated administrations collapse into
    /// one item each.
    #[must_use]
    pub fn to_template(&self, hidden_prefix: &str) -> TemplateDocument {
        let name = self
            .short_name
            .clone()
            .unwrap_or_else(|| self.display_name());
        let mut seen = BTreeSet::new();
        let mut items = Vec::new();
        for item in &self.items {
            if !hidden_prefix.is_empty() && item.code.starts_with(hidden_prefix) {
                continue;
            }
            let base = strip_run_suffix(&item.code).base;
            if seen.insert(structural_key(base)) {
                items.push((base.to_string(), item.levels.clone()));
            }
        }
        TemplateDocument::generated(&name, items)
    }
}
