//! Error types for connections, remote commands and file transfers.
//!
//! Every failure surfaced by this crate is a [`RemoteError`]. Callers that
//! only care about the category of a failure (for example to tell a bad
//! password apart from a command that exited non-zero) use
//! [`RemoteError::kind`].

use std::fmt;

use thiserror::Error;

/// Exit information reported by the remote side of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit status, when the remote process reported one.
    pub status: Option<u32>,
    /// Signal name, when the remote process was killed by a signal.
    pub signal: Option<String>,
}

impl ExitReport {
    /// True when the remote process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.signal) {
            (Some(status), _) => write!(f, "exit status {status}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => write!(f, "no exit status"),
        }
    }
}

/// Coarse classification of a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or rejected credential.
    Authentication,
    /// Dial, handshake or transport failure.
    Connectivity,
    /// The transport is up but a channel could not be opened or started.
    Session,
    /// The remote command exited non-zero or was killed.
    Command,
    /// Transfer handshake desync or an error reported by the remote sender.
    Protocol,
    /// Short copy or unexpected exit status during a transfer.
    Transfer,
    /// The operation was cancelled through its cancellation token.
    Cancelled,
    /// A prompt pattern failed to compile.
    Pattern,
    /// Invalid host configuration or a malformed JSON document.
    Config,
    /// Local I/O failure.
    Io,
    /// A worker task panicked or was aborted.
    Internal,
}

/// Errors that can occur while talking to remote hosts.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Neither a password nor a private key was configured.
    #[error("no credential for {0}: password and private key are both empty")]
    MissingCredential(String),

    /// The server rejected the credential or the key could not be loaded.
    #[error("authentication failed for {target}: {reason}")]
    Authentication { target: String, reason: String },

    /// The host could not be reached or the transport was lost.
    #[error("cannot reach {target}: {reason}")]
    Connectivity { target: String, reason: String },

    /// A session channel could not be opened or the command was refused.
    #[error("session failure on {target}: {reason}")]
    Session { target: String, reason: String },

    /// The remote command did not exit cleanly.
    #[error("command `{command}` failed on {target}: {exit}")]
    Command {
        target: String,
        command: String,
        exit: ExitReport,
    },

    /// The copy protocol desynchronised or the sender reported an error.
    #[error("transfer protocol error: {0}")]
    Protocol(String),

    /// The payload could not be moved completely.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The operation was cancelled before the remote side finished.
    #[error("operation on {0} was cancelled")]
    Cancelled(String),

    /// A prompt pattern is not a valid regular expression.
    #[error("invalid prompt pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid host description.
    #[error("invalid host configuration: {0}")]
    Config(String),

    /// A JSON document (inventory or recording) could not be read or written.
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// A local I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RemoteError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::MissingCredential(_) | RemoteError::Authentication { .. } => {
                ErrorKind::Authentication
            }
            RemoteError::Connectivity { .. } | RemoteError::RusshError(_) => {
                ErrorKind::Connectivity
            }
            RemoteError::Ssh2Error(err) if is_auth_failure(err) => ErrorKind::Authentication,
            RemoteError::Ssh2Error(_) => ErrorKind::Connectivity,
            RemoteError::Session { .. } => ErrorKind::Session,
            RemoteError::Command { .. } => ErrorKind::Command,
            RemoteError::Protocol(_) => ErrorKind::Protocol,
            RemoteError::Transfer(_) => ErrorKind::Transfer,
            RemoteError::Cancelled(_) => ErrorKind::Cancelled,
            RemoteError::Pattern(_) => ErrorKind::Pattern,
            RemoteError::Config(_) | RemoteError::Json(_) => ErrorKind::Config,
            RemoteError::Io(_) => ErrorKind::Io,
            RemoteError::Join(_) => ErrorKind::Internal,
        }
    }

    /// Exit report of a failed remote command, if this is a command error.
    pub fn exit_report(&self) -> Option<&ExitReport> {
        match self {
            RemoteError::Command { exit, .. } => Some(exit),
            _ => None,
        }
    }

    /// Maps a connect-time library error onto the authentication or
    /// connectivity variant for `target`.
    pub(crate) fn from_connect(target: &str, err: async_ssh2_tokio::Error) -> Self {
        if is_auth_failure(&err) {
            RemoteError::Authentication {
                target: target.to_string(),
                reason: err.to_string(),
            }
        } else {
            RemoteError::Connectivity {
                target: target.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

fn is_auth_failure(err: &async_ssh2_tokio::Error) -> bool {
    matches!(
        err,
        async_ssh2_tokio::Error::PasswordWrong
            | async_ssh2_tokio::Error::KeyAuthFailed
            | async_ssh2_tokio::Error::KeyInvalid(_)
    )
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ExitReport, RemoteError};

    #[test]
    fn exit_report_display_prefers_status() {
        let exit = ExitReport {
            status: Some(2),
            signal: Some("TERM".to_string()),
        };
        assert_eq!(exit.to_string(), "exit status 2");

        let killed = ExitReport {
            status: None,
            signal: Some("KILL".to_string()),
        };
        assert_eq!(killed.to_string(), "killed by signal KILL");
        assert!(!killed.success());
    }

    #[test]
    fn command_error_exposes_exit_report() {
        let err = RemoteError::Command {
            target: "ops@10.0.0.2:22".to_string(),
            command: "false".to_string(),
            exit: ExitReport {
                status: Some(1),
                signal: None,
            },
        };
        assert_eq!(err.kind(), ErrorKind::Command);
        assert_eq!(err.exit_report().and_then(|e| e.status), Some(1));
    }

    #[test]
    fn missing_credential_is_an_authentication_error() {
        let err = RemoteError::MissingCredential("ops@10.0.0.2:22".to_string());
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
