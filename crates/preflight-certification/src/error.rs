//! Error types for certification runs

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while selecting, preparing, or executing checks.
///
/// A check's own pass/fail outcome is never one of these; see
/// [`crate::results::CheckStatus`].
#[derive(Error, Debug)]
pub enum PreflightError {
    /// Policy identifier not in the closed set
    #[error("provided policy {policy} is unknown")]
    UnknownPolicy { policy: String },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File open/read failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed YAML/JSON document
    #[error("{context}: {message}")]
    Parse { context: String, message: String },

    /// Annotations file had zero-length content
    #[error("the annotations file was empty")]
    EmptyAnnotations,

    /// No CSV under `manifests/`
    #[error("unable to find clusterserviceversion file in the bundle image: {}", dir.display())]
    CsvNotFound { dir: PathBuf },

    /// More than one CSV under `manifests/`
    #[error("more than one CSV file detected in bundle: {count} matches under {}", dir.display())]
    AmbiguousCsv { dir: PathBuf, count: usize },

    /// Check list could not be resolved for execution
    #[error("error initializing checks: {0}")]
    Infra(String),

    /// An external collaborator (operator-sdk, registry, Pyxis) failed
    #[error("{context}: {message}")]
    External { context: String, message: String },

    /// The run context was cancelled
    #[error("certification run cancelled")]
    Cancelled,

    /// The run context deadline passed
    #[error("certification run deadline exceeded")]
    DeadlineExceeded,
}

/// Coarse error taxonomy used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Parse,
    Cardinality,
    Infra,
    External,
    Cancelled,
}

impl PreflightError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreflightError::UnknownPolicy { .. } | PreflightError::Config(_) => ErrorKind::Config,
            PreflightError::Io { .. } => ErrorKind::Io,
            PreflightError::Parse { .. } | PreflightError::EmptyAnnotations => ErrorKind::Parse,
            PreflightError::CsvNotFound { .. } | PreflightError::AmbiguousCsv { .. } => {
                ErrorKind::Cardinality
            }
            PreflightError::Infra(_) => ErrorKind::Infra,
            PreflightError::External { .. } => ErrorKind::External,
            PreflightError::Cancelled | PreflightError::DeadlineExceeded => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PreflightError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        PreflightError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn external(context: impl Into<String>, err: &anyhow::Error) -> Self {
        PreflightError::External {
            context: context.into(),
            message: format!("{err:#}"),
        }
    }
}

/// Result type for certification operations
pub type Result<T> = std::result::Result<T, PreflightError>;
