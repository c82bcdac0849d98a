use serde::{Deserialize, Serialize, Serializer};
use survey_library::TemplateSource;

/// Categorical strength of a match, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Exact,
}

impl Confidence {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Exact => "exact",
        }
    }
}

/// What a caller should do with an imported group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    UseParticipants,
    UseLibrary,
    Review,
    CreateNew,
}

impl SuggestedAction {
    /// Suggestion for a group that matched nothing at all
    #[must_use]
    pub const fn unmatched() -> Self {
        Self::CreateNew
    }
}

/// What the import was matched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTarget {
    Instrument(String),
    Participants,
}

/// Result of matching one imported group. Computed per call, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMatch {
    pub target: MatchTarget,
    /// Library key of the matched template (`participants` for the participants template)
    pub template_key: String,
    pub confidence: Confidence,
    /// Overlap ratio plus the name bonus, used to rank candidates
    pub score: f64,
    pub overlap_count: usize,
    pub template_item_count: usize,
    pub imported_item_count: usize,
    pub runs_detected: usize,
    pub only_in_import: Vec<String>,
    pub only_in_library: Vec<String>,
    /// `None` when no overlapping item had levels on both sides
    pub levels_match: Option<bool>,
    pub source: TemplateSource,
    pub name_matched: bool,
}

impl TemplateMatch {
    #[must_use]
    pub fn is_participants(&self) -> bool {
        matches!(self.target, MatchTarget::Participants)
    }

    #[must_use]
    pub fn overlap_ratio(&self) -> f64 {
        let denom = self.imported_item_count.max(self.template_item_count);
        if denom == 0 {
            return 0.0;
        }
        self.overlap_count as f64 / denom as f64
    }

    #[must_use]
    pub fn suggested_action(&self) -> SuggestedAction {
        if matches!(self.target, MatchTarget::Participants) {
            return SuggestedAction::UseParticipants;
        }
        match self.confidence {
            Confidence::Exact | Confidence::High => SuggestedAction::UseLibrary,
            Confidence::Medium => SuggestedAction::Review,
            Confidence::Low => SuggestedAction::CreateNew,
        }
    }

    #[must_use]
    pub fn report(&self) -> MatchReport<'_> {
        MatchReport {
            template_key: &self.template_key,
            confidence: self.confidence,
            score: self.score,
            overlap_count: self.overlap_count,
            template_item_count: self.template_item_count,
            imported_item_count: self.imported_item_count,
            runs_detected: self.runs_detected,
            only_in_import: &self.only_in_import,
            only_in_library: &self.only_in_library,
            levels_match: self.levels_match,
            is_participants: self.is_participants(),
            source: self.source,
            suggested_action: self.suggested_action(),
        }
    }
}

/// Serialized shape of a [`TemplateMatch`]
#[derive(Debug, Serialize)]
pub struct MatchReport<'a> {
    pub template_key: &'a str,
    pub confidence: Confidence,
    pub score: f64,
    pub overlap_count: usize,
    pub template_item_count: usize,
    pub imported_item_count: usize,
    pub runs_detected: usize,
    pub only_in_import: &'a [String],
    pub only_in_library: &'a [String],
    pub levels_match: Option<bool>,
    pub is_participants: bool,
    pub source: TemplateSource,
    pub suggested_action: SuggestedAction,
}

impl Serialize for TemplateMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.report().serialize(serializer)
    }
}
