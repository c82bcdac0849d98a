use crate::validate::ValidationIssue;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for recipe operations
pub type Result<T> = std::result::Result<T, RecipeError>;

/// Errors raised while loading or compiling recipes
#[derive(Error, Debug)]
pub enum RecipeError {
    /// A recipe file could not be read
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A recipe document is not valid JSON or has the wrong shape
    #[error("Invalid recipe document {origin}: {message}")]
    Parse { origin: String, message: String },

    /// Static validation found at least one fatal problem
    #[error("{}", render_issues(.issues))]
    Invalid { issues: Vec<ValidationIssue> },

    /// Two recipes in one library share a task key
    #[error("Duplicate recipe for task '{key}' ({first} and {second})")]
    DuplicateTask {
        key: String,
        first: String,
        second: String,
    },

    #[error("No recipe for task '{0}'")]
    UnknownTask(String),

    /// A score table could not be written as TSV
    #[error("TSV error: {0}")]
    Tsv(#[from] csv::Error),
}

impl RecipeError {
    /// Create a parse error
    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create an IO error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Validation issues carried by the error, if any
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Invalid { issues } => issues,
            _ => &[],
        }
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    let fatal = issues.iter().filter(|issue| issue.is_error()).count();
    let mut out = format!("recipe validation failed with {fatal} error(s)");
    for issue in issues {
        out.push_str("\n  ");
        out.push_str(&issue.to_string());
    }
    out
}
