//! # Survey Match
//!
//! Recognises which library instrument an imported item set belongs to.
//!
//! ## Algorithm
//!
//! ```text
//! ImportedGroup
//!     │
//!     ├──> drop hidden bookkeeping items (reserved prefix)
//!     ├──> resolve aliases, strip runs, mangle → structural keys
//!     ├──> name candidates from label / short / long name
//!     │
//!     ├──> for every library template
//!     │      ├─ overlap ratio = |∩| / max(|import|, |template|)
//!     │      ├─ levels agreement on overlapping items
//!     │      └─ tier: Exact > High > Medium > Low (name match rescues Low)
//!     │
//!     ├──> best by ratio (+ name bonus)
//!     └──> otherwise participants template fallback
//! ```

mod config;
mod diagnostics;
mod engine;
mod error;
mod import;
mod result;

pub use config::{MatchConfig, UnmatchedPolicy};
pub use diagnostics::Diagnostic;
pub use engine::MatchEngine;
pub use error::{MatchError, Result};
pub use import::{ImportedGroup, ImportedItem};
pub use result::{Confidence, MatchReport, MatchTarget, SuggestedAction, TemplateMatch};
