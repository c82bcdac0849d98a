use crate::document::{TemplateDocument, TemplateKind};
use crate::error::{LibraryError, Result};
use crate::index::{LibraryEntry, LibraryIndex, TemplateSource};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_PARTICIPANTS_FILE: &str = "participants.json";

const SURVEY_PREFIX: &str = "survey-";
const BIOMETRICS_PREFIX: &str = "biometrics-";

/// Directories that hold template documents
#[derive(Debug, Clone)]
pub struct LibraryRoots {
    pub global: Option<PathBuf>,
    pub project: Option<PathBuf>,
    /// File name of the participants template inside a root
    pub participants_file: String,
}

impl Default for LibraryRoots {
    fn default() -> Self {
        Self {
            global: None,
            project: None,
            participants_file: DEFAULT_PARTICIPANTS_FILE.to_string(),
        }
    }
}

impl LibraryRoots {
    #[must_use]
    pub fn global(root: impl Into<PathBuf>) -> Self {
        Self {
            global: Some(root.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_project(mut self, root: impl Into<PathBuf>) -> Self {
        self.project = Some(root.into());
        self
    }
}

/// A document that was left out of the index
#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a library load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl LibraryIndex {
    /// Load every template under the configured roots.
    ///
    /// Unreadable or malformed documents are skipped and reported; an
    /// ambiguous alias or a missing root aborts the load.
    pub fn load(roots: &LibraryRoots) -> Result<(Self, LoadReport)> {
        let mut index = Self::new();
        let mut report = LoadReport::default();

        let scopes = [
            (roots.global.as_deref(), TemplateSource::Global),
            (roots.project.as_deref(), TemplateSource::Project),
        ];
        for (root, source) in scopes {
            let Some(root) = root else {
                continue;
            };
            if !root.is_dir() {
                return Err(LibraryError::MissingRoot(root.to_path_buf()));
            }
            for path in TemplateScanner::new(root).scan() {
                match load_entry(&path, source, &roots.participants_file)
                    .and_then(|entry| index.insert(entry))
                {
                    Ok(()) => report.loaded += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        log::warn!("Skipping template {}: {e}", path.display());
                        report.skipped.push(SkippedDocument {
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        log::info!(
            "Template library: {} loaded, {} skipped",
            report.loaded,
            report.skipped.len()
        );
        Ok((index, report))
    }
}

fn load_entry(path: &Path, source: TemplateSource, participants_file: &str) -> Result<LibraryEntry> {
    let raw = fs::read_to_string(path).map_err(|err| LibraryError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    let origin = path.display().to_string();
    let document = TemplateDocument::from_json_str(&origin, &raw)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (kind, key) = if file_name.eq_ignore_ascii_case(participants_file) {
        (TemplateKind::Participants, stem)
    } else if let Some(rest) = stem.strip_prefix(SURVEY_PREFIX) {
        (TemplateKind::Survey, rest.to_string())
    } else if let Some(rest) = stem.strip_prefix(BIOMETRICS_PREFIX) {
        (TemplateKind::Biometrics, rest.to_string())
    } else {
        (document.declared_kind.unwrap_or(TemplateKind::Survey), stem)
    };
    if key.is_empty() {
        return Err(LibraryError::parse(origin, "template file name has no key"));
    }

    Ok(LibraryEntry::new(key, kind, source, document).with_path(path))
}

/// Finds template documents below a root
pub struct TemplateScanner {
    root: PathBuf,
}

impl TemplateScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// JSON files below the root, hidden entries excluded, in path order
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
        for result in walker {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let is_json = entry
                        .path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
                    if is_json {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }
        log::debug!("Found {} template files in {}", files.len(), self.root.display());
        files
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
