//! Credentials and per-operation transport policy for git network calls.

use std::cell::{Cell, RefCell};
use std::fmt;

use git2::{CertificateCheckStatus, Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use log::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{CloneErrorKind, Error};

/// Username sent alongside a bare token when the URL does not carry one.
const TOKEN_USERNAME: &str = "git";

/// How to authenticate against a git remote.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credential {
    #[default]
    Anonymous,
    /// Access token, sent as the password of an HTTP basic challenge.
    Token(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Token(_) => f.write_str("Token(<redacted>)"),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl Credential {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous)
    }
}

/// Everything a single clone, fetch or push needs to reach a remote.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub credential: Credential,
    /// Accept any server certificate for this operation only.
    pub insecure_skip_tls: bool,
    pub cancel: CancelToken,
}

impl TransportOptions {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            ..Self::default()
        }
    }

    pub fn insecure(mut self, insecure_skip_tls: bool) -> Self {
        self.insecure_skip_tls = insecure_skip_tls;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds libgit2 callbacks bound to these options and to `state`.
    pub(crate) fn callbacks<'a>(&'a self, state: &'a CallbackState) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();

        callbacks.credentials(move |_url, username_from_url, allowed| {
            let attempt = state.credential_requests.get() + 1;
            state.credential_requests.set(attempt);
            if attempt > 1 {
                return Err(git2::Error::from_str("credentials were rejected by the remote"));
            }
            if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Err(git2::Error::from_str("remote does not accept username/password credentials"));
            }
            match &self.credential {
                Credential::Anonymous => Err(git2::Error::from_str("remote requires authentication")),
                Credential::Token(token) => {
                    Cred::userpass_plaintext(username_from_url.unwrap_or(TOKEN_USERNAME), token)
                }
                Credential::Basic { username, password } => Cred::userpass_plaintext(username, password),
            }
        });

        if self.insecure_skip_tls {
            callbacks.certificate_check(|_cert, host| {
                debug!("Skipping certificate verification for {}", host);
                Ok(CertificateCheckStatus::CertificateOk)
            });
        }

        callbacks.transfer_progress(move |_| !self.cancel.is_cancelled());
        callbacks.sideband_progress(move |_| !self.cancel.is_cancelled());

        callbacks.push_update_reference(move |reference, status| {
            if let Some(message) = status {
                warn!("Remote rejected {}: {}", reference, message);
                state
                    .rejected
                    .borrow_mut()
                    .get_or_insert_with(|| (reference.to_string(), message.to_string()));
            }
            Ok(())
        });

        callbacks
    }

    /// Maps a failed clone or connect into a classified [`Error`].
    pub(crate) fn clone_error(&self, url: &str, err: git2::Error, state: &CallbackState) -> Error {
        if self.cancel.is_cancelled() {
            return Error::Cancelled;
        }
        let kind = classify(&err, state, &self.credential);
        debug!("Clone of {} failed ({}): {}", url, kind, err);
        Error::CloneFailed {
            url: url.to_string(),
            kind,
            source: Some(err),
        }
    }
}

/// Bookkeeping shared with the callbacks of one network operation.
#[derive(Debug, Default)]
pub(crate) struct CallbackState {
    credential_requests: Cell<u32>,
    rejected: RefCell<Option<(String, String)>>,
}

impl CallbackState {
    pub(crate) fn take_rejection(&self) -> Option<(String, String)> {
        self.rejected.borrow_mut().take()
    }
}

fn classify(err: &git2::Error, state: &CallbackState, credential: &Credential) -> CloneErrorKind {
    let message = err.message().to_ascii_lowercase();

    if state.credential_requests.get() > 0 && !message.contains("403") {
        return if credential.is_anonymous() {
            CloneErrorKind::AuthenticationRequired
        } else {
            CloneErrorKind::AuthorizationFailed
        };
    }

    match (err.class(), err.code()) {
        (_, ErrorCode::Auth) => return CloneErrorKind::AuthenticationRequired,
        (_, ErrorCode::NotFound) => return CloneErrorKind::RepositoryNotFound,
        // Local and file:// remotes: a missing path or a directory that is
        // not a repository.
        (ErrorClass::Repository, _) => return CloneErrorKind::RepositoryNotFound,
        (ErrorClass::Os, _) if message.contains("failed to resolve path") => {
            return CloneErrorKind::RepositoryNotFound
        }
        _ => {}
    }

    // HTTP transports only report the status code in the message.
    if message.contains("403") {
        CloneErrorKind::AuthorizationFailed
    } else if message.contains("401") {
        CloneErrorKind::AuthenticationRequired
    } else if message.contains("404") || message.contains("repository not found") {
        CloneErrorKind::RepositoryNotFound
    } else {
        CloneErrorKind::Other
    }
}
