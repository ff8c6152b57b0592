//! Failure surface of a verification run.
//!
//! Only these errors cross the engine boundary. Per-record failures are
//! absorbed by the verifier and show up in the summary counts instead.

use thiserror::Error;

/// Coarse classification handed to whatever layer maps failures to a
/// transport-level response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Browser,
    Render,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Browser => "browser",
            ErrorKind::Render => "render",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Missing columns in input file: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("No rows with a non-empty '{0}' value were found in the input file")]
    NoRecords(String),

    #[error("Key column name cannot be empty")]
    EmptyKeyColumn,

    #[error("Failed to read input file: {0}")]
    MalformedInput(String),

    #[error("Portal login failed: {0}")]
    Authentication(String),

    #[error("Failed to start the portal browser: {0}")]
    BrowserLaunch(String),

    #[error("Failed to generate {artifact}: {reason}")]
    Render { artifact: &'static str, reason: String },
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::MissingColumns(_)
            | VerifyError::NoRecords(_)
            | VerifyError::EmptyKeyColumn
            | VerifyError::MalformedInput(_) => ErrorKind::Validation,
            VerifyError::Authentication(_) => ErrorKind::Authentication,
            VerifyError::BrowserLaunch(_) => ErrorKind::Browser,
            VerifyError::Render { .. } => ErrorKind::Render,
        }
    }
}
