use clap::ValueEnum;
use survey_match::UnmatchedPolicy;

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum OutputFormat {
    Tsv,
    Json,
}

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum PolicyFlag {
    Error,
    Warn,
    Ignore,
}

impl PolicyFlag {
    pub(crate) const fn as_domain(self) -> UnmatchedPolicy {
        match self {
            PolicyFlag::Error => UnmatchedPolicy::Error,
            PolicyFlag::Warn => UnmatchedPolicy::Warn,
            PolicyFlag::Ignore => UnmatchedPolicy::Ignore,
        }
    }
}
