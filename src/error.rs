//! Error handling for provider-git.
//! Defines the error taxonomy shared by the copy engine, the git wrapper
//! and the reconciler.

use std::fmt;
use thiserror::Error;

/// Classification of a failed clone, mapped from the git transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneErrorKind {
    RepositoryNotFound,
    EmptyRemoteRepository,
    AuthenticationRequired,
    AuthorizationFailed,
    Other,
}

impl fmt::Display for CloneErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CloneErrorKind::RepositoryNotFound => "repository not found",
            CloneErrorKind::EmptyRemoteRepository => "remote repository is empty",
            CloneErrorKind::AuthenticationRequired => "authentication required",
            CloneErrorKind::AuthorizationFailed => "authorization failed",
            CloneErrorKind::Other => "transport error",
        };
        f.write_str(msg)
    }
}

/// Custom error types for provider-git operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cloning '{url}' failed: {kind}")]
    CloneFailed {
        url: String,
        kind: CloneErrorKind,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("source '{path}' is not a directory")]
    NotADirectory { path: String },

    #[error("source '{path}' is missing: {source}")]
    SourceMissing {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template syntax error: {0}")]
    TemplateSyntaxError(#[source] mustache::Error),

    #[error("template execution error: {0}")]
    TemplateExecutionError(#[source] mustache::Error),

    #[error("commit failed: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("push to '{remote}' failed: {source}")]
    PushFailed {
        remote: String,
        #[source]
        source: git2::Error,
    },

    #[error("push of '{reference}' rejected by remote: {message}")]
    PushRejected { reference: String, message: String },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("managed resource is missing 'deploymentId' label")]
    MissingDeploymentId,

    #[error("claim not found for deployment: {deployment_id}")]
    ClaimNotFound { deployment_id: String },

    #[error("unexpected status {status} from '{url}': {message}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider '{0}' not implemented yet")]
    ProviderNotImplemented(String),

    #[error("provider API error: {0}")]
    ProviderApi(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the clone classification when this error came from a clone.
    pub fn clone_kind(&self) -> Option<CloneErrorKind> {
        match self {
            Error::CloneFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if the error is likely transient and a later
    /// reconciliation may succeed without any change to the resource.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CloneFailed { kind, .. } => {
                matches!(kind, CloneErrorKind::Other | CloneErrorKind::EmptyRemoteRepository)
            }
            Error::PushFailed { .. } | Error::Http(_) | Error::ConfigUnavailable(_) => true,
            Error::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
