use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use survey_library::{LibraryRoots, DEFAULT_PARTICIPANTS_FILE};
use survey_match::MatchConfig;
use survey_recipe::EvalOptions;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "survey.toml";

/// Settings file of the `survey` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub library: LibrarySection,
    pub matching: MatchConfig,
    pub scoring: ScoringSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    pub global_root: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
    pub participants_file: String,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            global_root: None,
            project_root: None,
            participants_file: DEFAULT_PARTICIPANTS_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub missing_markers: Vec<String>,
    /// Written for NA cells in TSV output
    pub na_token: String,
    /// Column naming the row identifier in rows input and score output
    pub id_column: String,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            missing_markers: EvalOptions::default().missing_markers,
            na_token: "n/a".to_string(),
            id_column: "participant_id".to_string(),
        }
    }
}

impl SurveyConfig {
    /// Read `explicit`, or `survey.toml` in the working directory when present.
    ///
    /// An explicitly named file must exist. Relative library paths are taken
    /// relative to the file they appear in.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.library.resolve_relative(base);
        }
        config
            .validate()
            .map_err(|msg| anyhow!("Invalid config {}: {msg}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.matching.validate()?;

        if self.scoring.na_token.is_empty() {
            return Err("scoring.na_token cannot be empty".to_string());
        }
        if self.scoring.id_column.trim().is_empty() {
            return Err("scoring.id_column cannot be empty".to_string());
        }
        if self.library.participants_file.trim().is_empty() {
            return Err("library.participants_file cannot be empty".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            missing_markers: self.scoring.missing_markers.clone(),
        }
    }
}

impl LibrarySection {
    fn resolve_relative(&mut self, base: &Path) {
        for root in [&mut self.global_root, &mut self.project_root]
            .into_iter()
            .flatten()
        {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }

    #[must_use]
    pub fn roots(&self) -> LibraryRoots {
        LibraryRoots {
            global: self.global_root.clone(),
            project: self.project_root.clone(),
            participants_file: self.participants_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use survey_match::UnmatchedPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_valid() {
        assert!(SurveyConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.toml");
        fs::write(
            &path,
            r#"
[library]
global_root = "templates"

[matching]
unmatched_policy = "error"
min_overlap = 0.6

[scoring]
na_token = "NA"
"#,
        )
        .unwrap();

        let config = SurveyConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.library.global_root, Some(dir.path().join("templates")));
        assert_eq!(config.library.participants_file, "participants.json");
        assert_eq!(config.matching.unmatched_policy, UnmatchedPolicy::Error);
        assert!((config.matching.min_overlap - 0.6).abs() < f64::EPSILON);
        assert!((config.matching.medium_overlap - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.scoring.na_token, "NA");
        assert_eq!(config.scoring.id_column, "participant_id");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[matching]\nname_bonus = 2.0\n").unwrap();
        let err = SurveyConfig::load(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("name_bonus"), "{err}");

        let mut config = SurveyConfig::default();
        config.scoring.na_token.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(SurveyConfig::load(Some(dir.path().join("nope.toml").as_path())).is_err());
    }
}
