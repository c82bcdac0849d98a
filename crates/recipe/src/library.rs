use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::document::RecipeDocument;
use crate::error::{RecipeError, Result};
use crate::model::Recipe;
use crate::validate::{has_errors, validate, Severity, ValidationIssue};

/// All recipes of one directory, keyed by lower-cased task name
#[derive(Debug, Clone, Default)]
pub struct RecipeLibrary {
    recipes: BTreeMap<String, Recipe>,
}

/// Outcome of validating a directory without compiling it
#[derive(Debug, Clone, Default)]
pub struct LibraryCheck {
    pub files: usize,
    pub issues: Vec<ValidationIssue>,
}

impl LibraryCheck {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        has_errors(&self.issues)
    }
}

impl RecipeLibrary {
    /// Load, validate and compile every recipe under `dir`.
    ///
    /// All documents are validated before any is compiled. A single fatal
    /// issue anywhere fails the whole load with the complete issue list.
    pub fn load(dir: &Path) -> Result<Self> {
        let documents = read_documents(dir)?;
        let check = check_documents(&documents);
        if check.is_fatal() {
            return Err(RecipeError::Invalid {
                issues: check.issues,
            });
        }
        for issue in &check.issues {
            warn!("{issue}");
        }

        let mut recipes = BTreeMap::new();
        for (path, parsed) in documents {
            let Ok(doc) = parsed else { continue };
            let recipe = build_checked(&doc, &path)?;
            recipes.insert(recipe.key(), recipe);
        }

        info!("Loaded {} recipe(s) from {}", recipes.len(), dir.display());
        Ok(Self { recipes })
    }

    /// Validate every recipe under `dir` and report all issues
    pub fn check(dir: &Path) -> Result<LibraryCheck> {
        let documents = read_documents(dir)?;
        Ok(check_documents(&documents))
    }

    /// Load one explicitly named recipe file; failure to read or parse is fatal
    pub fn load_file(path: &Path) -> Result<Recipe> {
        let raw = fs::read_to_string(path).map_err(|e| RecipeError::io(path, e))?;
        Recipe::from_json_str(&path.display().to_string(), &raw)
    }

    /// Recipe for a task, matched case-insensitively
    pub fn get(&self, task: &str) -> Result<&Recipe> {
        self.recipes
            .get(&task.trim().to_lowercase())
            .ok_or_else(|| RecipeError::UnknownTask(task.to_string()))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

type Parsed = (PathBuf, Result<RecipeDocument>);

fn read_documents(dir: &Path) -> Result<Vec<Parsed>> {
    if !dir.is_dir() {
        return Err(RecipeError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            RecipeError::io(path, std::io::Error::other(e.to_string()))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        debug!("Reading recipe {}", path.display());
        let parsed = fs::read_to_string(path)
            .map_err(|e| RecipeError::io(path, e))
            .and_then(|raw| RecipeDocument::from_json_str(&path.display().to_string(), &raw));
        documents.push((path.to_path_buf(), parsed));
    }
    Ok(documents)
}

fn check_documents(documents: &[Parsed]) -> LibraryCheck {
    let mut issues = Vec::new();
    let mut owners: BTreeMap<String, &Path> = BTreeMap::new();

    for (path, parsed) in documents {
        let origin = path.display().to_string();
        let doc = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                issues.push(file_issue(&origin, e.to_string()));
                continue;
            }
        };

        issues.extend(validate(doc).into_iter().map(|i| i.in_recipe(&origin)));

        if let Some(task) = doc.task_name() {
            let key = task.to_lowercase();
            if let Some(first) = owners.get(&key) {
                let dup = RecipeError::DuplicateTask {
                    key,
                    first: first.display().to_string(),
                    second: origin.clone(),
                };
                issues.push(file_issue(&origin, dup.to_string()));
            } else {
                owners.insert(key, path);
            }
        }
    }

    LibraryCheck {
        files: documents.len(),
        issues,
    }
}

fn file_issue(origin: &str, message: String) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Error,
        recipe: Some(origin.to_string()),
        location: "document".to_string(),
        message,
    }
}

fn build_checked(doc: &RecipeDocument, path: &Path) -> Result<Recipe> {
    Recipe::build(doc).map_err(|e| match e {
        RecipeError::Invalid { issues } => RecipeError::Invalid {
            issues: issues
                .into_iter()
                .map(|i| i.in_recipe(path.display().to_string()))
                .collect(),
        },
        other => other,
    })
}
