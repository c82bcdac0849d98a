use crate::config::UnmatchedPolicy;
use crate::engine::MatchEngine;
use crate::error::{MatchError, Result};
use crate::import::ImportedGroup;
use crate::result::TemplateMatch;
use serde::Serialize;
use survey_codes::normalize_set;

/// An imported item with no counterpart in the chosen template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub group: String,
    pub item: String,
    pub template_key: Option<String>,
    pub message: String,
}

impl MatchEngine<'_> {
    /// Report imported items left over by `found` under the configured
    /// [`UnmatchedPolicy`].
    ///
    /// With no match at all every visible item is unmatched.
    pub fn check_unmatched(
        &self,
        group: &ImportedGroup,
        found: Option<&TemplateMatch>,
    ) -> Result<Vec<Diagnostic>> {
        let policy = self.config().unmatched_policy;
        if policy == UnmatchedPolicy::Ignore {
            return Ok(Vec::new());
        }

        let items: Vec<String> = match found {
            Some(found) => found.only_in_import.clone(),
            None => normalize_set(
                group
                    .items
                    .iter()
                    .map(|item| item.code.as_str())
                    .filter(|code| !self.config().is_hidden(code)),
            )
            .bases()
            .map(str::to_string)
            .collect(),
        };
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let group_name = group.display_name();
        if policy == UnmatchedPolicy::Error {
            return Err(MatchError::UnmatchedItems {
                group: group_name,
                items,
            });
        }

        let template_key = found.map(|f| f.template_key.clone());
        let diagnostics: Vec<Diagnostic> = items
            .into_iter()
            .map(|item| {
                let message = match &template_key {
                    Some(key) => format!("'{item}' is not part of template '{key}'"),
                    None => format!("'{item}' matched no template"),
                };
                log::warn!("{group_name}: {message}");
                Diagnostic {
                    group: group_name.clone(),
                    item,
                    template_key: template_key.clone(),
                    message,
                }
            })
            .collect();
        Ok(diagnostics)
    }
}
