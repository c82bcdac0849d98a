use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Raw cell of a response row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Convert a JSON cell. Booleans become 1/0; arrays and objects are kept as text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Number(if *b { 1.0 } else { 0.0 }),
            other => Self::Text(other.to_string()),
        }
    }

    /// Numeric reading, with missing markers and unparsable text as `None`
    #[must_use]
    pub fn as_number(&self, options: &EvalOptions) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) | Self::Missing => None,
            Self::Text(text) => {
                if options.is_missing(text) {
                    return None;
                }
                text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
    }

    /// Text reading used for exact mapping keys
    #[must_use]
    pub fn as_text(&self, options: &EvalOptions) -> Option<String> {
        match self {
            Self::Number(n) if n.is_finite() => Some(format_number(*n)),
            Self::Number(_) | Self::Missing => None,
            Self::Text(text) if options.is_missing(text) => None,
            Self::Text(text) => Some(text.trim().to_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Cell parsing options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    /// Raw texts read as missing, compared case-insensitively after trimming
    pub missing_markers: Vec<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            missing_markers: ["", "n/a", "na", "nan", "null", "none", "."]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl EvalOptions {
    #[must_use]
    pub fn is_missing(&self, raw: &str) -> bool {
        let raw = raw.trim();
        raw.is_empty()
            || self
                .missing_markers
                .iter()
                .any(|marker| marker.trim().eq_ignore_ascii_case(raw))
    }
}

/// One evaluated output cell
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValue {
    Number(f64),
    Text(String),
    /// Not available. Never rendered as `0`.
    Na,
}

impl ScoreValue {
    #[must_use]
    pub const fn is_na(&self) -> bool {
        matches!(self, Self::Na)
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render for a table cell, with `na_token` standing in for NA
    #[must_use]
    pub fn render(&self, na_token: &str) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(text) => text.clone(),
            Self::Na => na_token.to_string(),
        }
    }

    /// Map output value as authored in the recipe
    #[must_use]
    pub fn from_mapping(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(Self::Na, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Number(if *b { 1.0 } else { 0.0 }),
            Value::Null => Self::Na,
            other => Self::Text(other.to_string()),
        }
    }

    pub(crate) fn to_cell(&self) -> CellValue {
        match self {
            Self::Number(n) => CellValue::Number(*n),
            Self::Text(text) => CellValue::Text(text.clone()),
            Self::Na => CellValue::Missing,
        }
    }
}

impl fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("NA"))
    }
}

/// Numbers as numbers, text as strings, NA as `null`
impl Serialize for ScoreValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Na => serializer.serialize_none(),
        }
    }
}

/// Whole numbers lose their trailing `.0`; everything else keeps full precision
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
