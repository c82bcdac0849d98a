//! # Survey Library
//!
//! Index of canonical instrument definitions ("templates") used to recognise
//! imported survey data.
//!
//! ## Architecture
//!
//! ```text
//! global root ──┐
//!               ├──> TemplateScanner (*.json) ──> TemplateDocument
//! project root ─┘                                      │
//!                                                      ├─> TemplateSignature (structural keys, levels)
//!                                                      ├─> alias table (alias key → canonical item)
//!                                                      └─> LibraryIndex (global + project + generated)
//! ```
//!
//! Project templates compete with global ones rather than replacing them;
//! both stay eligible for matching and are tagged with their
//! [`TemplateSource`].

mod document;
mod error;
mod index;
mod loader;

pub use document::{
    is_metadata_key, text_of, ItemDefinition, StudyInfo, TemplateDocument, TemplateItem,
    TemplateKind, METADATA_KEYS,
};
pub use error::{LibraryError, Result};
pub use index::{AliasTarget, LibraryEntry, LibraryIndex, TemplateSignature, TemplateSource};
pub use loader::{LibraryRoots, LoadReport, SkippedDocument, TemplateScanner, DEFAULT_PARTICIPANTS_FILE};
