//! Errors surfaced by the command line and run sessions.

use plotwatch::PlotwatchError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Plotwatch(#[from] PlotwatchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No snapshot at {0}; run `plotwatch run` first")]
    NoSnapshot(String),

    #[error("{count} rule(s) failed to parse")]
    InvalidRules { count: usize },
}

pub type CliResult<T> = Result<T, CliError>;
