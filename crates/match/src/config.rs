use serde::{Deserialize, Serialize};

/// What to do with imported items that found no counterpart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Escalate to a fatal error
    Error,
    /// Continue and surface the items in the diagnostics report
    #[default]
    Warn,
    /// Drop silently
    Ignore,
}

/// Thresholds and knobs of the matching engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Item codes starting with this prefix are export bookkeeping, not items
    pub hidden_prefix: String,

    pub unmatched_policy: UnmatchedPolicy,

    /// Added to the overlap ratio of templates whose name matches the group
    pub name_bonus: f64,

    /// Below this ratio a template is only considered when its name matches
    pub min_overlap: f64,

    /// Ratio above which a partial match is `Medium` rather than `Low`
    pub medium_overlap: f64,

    /// Minimum ratio for the participants fallback
    pub participants_min_overlap: f64,

    /// Group-name fragments that hint at demographics
    pub participant_hints: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            hidden_prefix: "_".to_string(),
            unmatched_policy: UnmatchedPolicy::Warn,
            name_bonus: 0.1,
            min_overlap: 0.5,
            medium_overlap: 0.7,
            participants_min_overlap: 0.3,
            participant_hints: [
                "participant",
                "demograph",
                "sociodemo",
                "personal",
                "background",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl MatchConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("name_bonus", self.name_bonus),
            ("min_overlap", self.min_overlap),
            ("medium_overlap", self.medium_overlap),
            ("participants_min_overlap", self.participants_min_overlap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1] (got {value})"));
            }
        }

        if self.min_overlap > self.medium_overlap {
            return Err(format!(
                "min_overlap ({}) cannot exceed medium_overlap ({})",
                self.min_overlap, self.medium_overlap
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn is_hidden(&self, code: &str) -> bool {
        !self.hidden_prefix.is_empty() && code.starts_with(&self.hidden_prefix)
    }

    #[must_use]
    pub fn hints_participants(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.participant_hints
            .iter()
            .map(|hint| hint.trim().to_lowercase())
            .any(|hint| !hint.is_empty() && name.contains(&hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MatchConfig {
            min_overlap: 0.8,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());

        config.min_overlap = 0.5;
        config.name_bonus = 1.5;
        assert!(config.validate().is_err());

        config.name_bonus = 0.1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hidden_prefix_and_hints() {
        let config = MatchConfig::default();
        assert!(config.is_hidden("_submitdate"));
        assert!(!config.is_hidden("q_1"));
        assert!(config.hints_participants("Demographics (baseline)"));
        assert!(!config.hints_participants("PHQ-9"));

        let open = MatchConfig {
            hidden_prefix: String::new(),
            ..MatchConfig::default()
        };
        assert!(!open.is_hidden("_submitdate"));
    }
}
