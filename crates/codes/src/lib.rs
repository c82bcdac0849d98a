//! # Survey Codes
//!
//! Canonicalization of item codes coming out of third-party survey exports.
//!
//! Export tools decorate the same questionnaire item in different ways:
//!
//! ```text
//! PANAS01run02      ──┐
//! PANAS01_run-2     ──┼──> base "PANAS01" ──> structural key "panas01"
//! PANAS-01          ──┘
//! ```
//!
//! Run suffixes (repeated administrations) are split off first, then the
//! remaining base is "mangled" (non-alphanumerics dropped, lower-cased) so
//! that codes from tools with restricted alphabets compare equal.
//! Mangled keys are for comparison only and never shown to users.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// `<base>run<2+ digits>`, no separator between `run` and the digits.
static BARE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)run(\d{2,})$").expect("bare run pattern is valid"));

/// `<base>_run-<digits>` with the dash optional.
static DASHED_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)_run-?(\d+)$").expect("dashed run pattern is valid"));

/// Result of splitting a run suffix off an item code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSplit<'a> {
    /// Code with every run suffix removed.
    pub base: &'a str,
    /// Outermost run number, `None` for a single occurrence.
    pub run: Option<u32>,
}

/// Split the run suffix off `code`.
///
/// The bare form is tried before the underscore form. Stacked suffixes
/// (`q1run01_run-2`) are all removed and the outermost one is reported, so
/// stripping an already stripped base never yields another run.
#[must_use]
pub fn strip_run_suffix(code: &str) -> RunSplit<'_> {
    let mut base = code;
    let mut run = None;
    while let Some((stripped, number)) = split_once(base) {
        run.get_or_insert(number);
        base = stripped;
    }
    RunSplit { base, run }
}

fn split_once(code: &str) -> Option<(&str, u32)> {
    for pattern in [&*BARE_RUN, &*DASHED_RUN] {
        let Some(caps) = pattern.captures(code) else {
            continue;
        };
        let (Some(base), Some(digits)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        // Absurdly long digit runs are not run numbers.
        let Ok(number) = digits.as_str().parse::<u32>() else {
            continue;
        };
        return Some((base.as_str(), number));
    }
    None
}

/// Drop every non ASCII-alphanumeric character and lower-case the rest.
#[must_use]
pub fn mangle(code: &str) -> String {
    code.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Comparison key: run suffix removed, then mangled.
#[must_use]
pub fn structural_key(code: &str) -> String {
    mangle(strip_run_suffix(code).base)
}

/// Two codes are structurally equal when their [`structural_key`]s match.
#[must_use]
pub fn structurally_equal(a: &str, b: &str) -> bool {
    structural_key(a) == structural_key(b)
}

/// A set of item codes reduced to structural keys.
///
/// Each key remembers the first base code it was built from so diffs can be
/// reported in the caller's own spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSet {
    entries: BTreeMap<String, String>,
    run_count: usize,
}

impl NormalizedSet {
    /// Number of distinct runs seen, never less than one.
    #[must_use]
    pub const fn run_count(&self) -> usize {
        self.run_count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Structural keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Base codes (run suffix removed, original spelling) in key order.
    pub fn bases(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Base code recorded for `key`.
    #[must_use]
    pub fn base_for(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// `(key, base)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, base)| (key.as_str(), base.as_str()))
    }
}

/// Strip and mangle every code, counting distinct run numbers.
pub fn normalize_set<I, S>(codes: I) -> NormalizedSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = BTreeMap::new();
    let mut runs = BTreeSet::new();
    for code in codes {
        let split = strip_run_suffix(code.as_ref());
        if let Some(run) = split.run {
            runs.insert(run);
        }
        let key = mangle(split.base);
        if key.is_empty() {
            continue;
        }
        if let Entry::Vacant(slot) = entries.entry(key) {
            slot.insert(split.base.to_string());
        }
    }
    NormalizedSet {
        entries,
        run_count: runs.len().max(1),
    }
}
