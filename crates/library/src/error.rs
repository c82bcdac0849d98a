use std::path::PathBuf;
use thiserror::Error;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Errors raised while building or querying the template library
#[derive(Error, Debug)]
pub enum LibraryError {
    /// A template file could not be read
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template document is not valid JSON or has the wrong shape
    #[error("Invalid template document {origin}: {message}")]
    Parse { origin: String, message: String },

    /// A library root does not exist or is not a directory
    #[error("Library root not found: {0}")]
    MissingRoot(PathBuf),

    /// One alias code resolves to canonical items of two different templates
    #[error("Ambiguous alias '{alias}': claimed by templates '{first}' and '{second}'")]
    AmbiguousAlias {
        alias: String,
        first: String,
        second: String,
    },

    /// Two documents with the same key were loaded into the same scope
    #[error("Duplicate template '{key}' in {source_tag} library")]
    DuplicateTemplate { key: String, source_tag: String },
}

impl LibraryError {
    /// Create a parse error
    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Whether the error must abort the whole load rather than skip one document
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::AmbiguousAlias { .. } | Self::MissingRoot(_))
    }
}
