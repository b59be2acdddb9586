//! Error types shared across the engine.
//!
//! Most session operations never surface these to an end user: guarded
//! transitions are no-ops, source failures fall back to a built-in bank and
//! persistence failures are logged and dropped. The types exist so callers
//! that care can tell the cases apart.

use std::time::Duration;

use thiserror::Error;

/// Session-level precondition failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    /// Operation attempted while the session was active/inactive contrary to its precondition.
    #[error("operation not allowed in the current session state")]
    InvalidState,

    /// Navigation index outside `[0, total)`.
    #[error("question index {index} out of range (total {total})")]
    OutOfRange { index: usize, total: usize },
}

/// Construction-time validation failures for a question.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionError {
    #[error("question has no answer options")]
    NoOptions,

    #[error("duplicate answer option: {0}")]
    DuplicateOption(String),

    #[error("correct answer {0:?} is not one of the options")]
    CorrectAnswerMissing(String),
}

/// Failures while obtaining a question list from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("question source unavailable: {0}")]
    Unavailable(String),

    #[error("question source timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed question payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("question source returned no questions")]
    Empty,

    #[error("unknown quiz type: {0}")]
    UnknownQuizType(String),
}

/// Persistence failures. Callers in the session swallow these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("no writable data directory could be resolved")]
    NoDataDir,

    #[error("invalid quiz name {0:?}: must be a plain file name")]
    InvalidName(String),
}
