use thiserror::Error;

/// Errors surfaced by the engine's public operations.
///
/// Malformed content (bad user regexes, undefined tags) never ends up here; those are skipped
/// or reported as QA issues.
#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("unit is locked: {0}")]
    UnitLocked(String),

    #[error("tag {tag} is not defined in the source of unit {unit}")]
    TagNotFound { unit: String, tag: String },

    #[error("a batch job is already running")]
    BatchInProgress,

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("rule assistant failed: {0:#}")]
    Assistant(#[source] anyhow::Error),

    #[error("invalid settings: {0}")]
    Settings(String),
}

impl WorkbenchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnitNotFound(_) => "UNIT_NOT_FOUND",
            Self::UnitLocked(_) => "UNIT_LOCKED",
            Self::TagNotFound { .. } => "TAG_NOT_FOUND",
            Self::BatchInProgress => "BATCH_IN_PROGRESS",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Assistant(_) => "ASSISTANT_ERROR",
            Self::Settings(_) => "INVALID_SETTINGS",
        }
    }
}

pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
