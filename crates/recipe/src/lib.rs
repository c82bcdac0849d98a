//! # Survey Recipe
//!
//! Declarative scoring recipes: static validation and per-subject evaluation.
//!
//! ## Pipeline
//!
//! ```text
//! recipe.json ──> RecipeDocument ──> validate() ──> Recipe (typed)
//!                                        │
//!                                        └─> Vec<ValidationIssue>
//!
//! ResponseRow ──> get_value (missing markers, inversion)
//!                    │
//!                    ├──> Derived, in declaration order
//!                    └──> Scores (missing policy) ──> ScoreTable ──> TSV / JSON
//! ```
//!
//! Formulas run on a small arithmetic-only interpreter ([`Formula`]); recipe
//! text never reaches a general-purpose evaluator.

mod document;
mod error;
mod eval;
mod expr;
mod library;
mod model;
mod table;
mod validate;
mod value;

pub use document::{
    Bounds, EntryDocument, InfoBlock, InvertBlock, RecipeDocument, TransformsBlock,
    KIND_BIOMETRICS, KIND_SURVEY,
};
pub use error::{RecipeError, Result};
pub use eval::{evaluate, Evaluator, ResponseRow};
pub use expr::{BinaryOp, Expr, ExprError, Formula};
pub use library::{LibraryCheck, RecipeLibrary};
pub use model::{
    invert, DerivedVariable, Inversion, MapKey, MissingPolicy, Recipe, RecipeKind,
    ScoreDefinition, ScoreMethod,
};
pub use table::ScoreTable;
pub use validate::{
    has_errors, validate, Severity, ValidationIssue, DERIVED_METHODS, MISSING_POLICIES,
    SCORE_METHODS,
};
pub use value::{format_number, CellValue, EvalOptions, ScoreValue};
