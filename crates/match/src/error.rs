use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    /// Imported items had no counterpart and the policy escalates that
    #[error("{} unmatched item(s) in '{group}': {}", items.len(), items.join(", "))]
    UnmatchedItems { group: String, items: Vec<String> },

    #[error("Invalid match configuration: {0}")]
    InvalidConfig(String),
}

impl MatchError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
