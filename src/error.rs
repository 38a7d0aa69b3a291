//! Error taxonomy for the bouncer.
//!
//! Three families, matching how failures propagate: `LoginError` for
//! policy rejections of the attach path (terminated with a user-visible
//! reason, no retry), `ConnectError` for transient outbound failures
//! (converted to notices plus a scheduled retry), and `StoreError` for
//! property-store problems (the only class that may escalate to process
//! failure).

use std::path::PathBuf;
use thiserror::Error;

/// Policy rejections of the client attach path.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("no such user")]
    UnknownUser,

    #[error("too many failed logins from this address")]
    IpBlocked,

    #[error("host is not on the account's allow list")]
    HostNotAllowed,

    #[error("invalid credentials")]
    BadCredentials,

    #[error("account is locked")]
    Locked { reason: Option<String> },
}

impl LoginError {
    /// Static code for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownUser => "unknown_user",
            Self::IpBlocked => "ip_blocked",
            Self::HostNotAllowed => "host_not_allowed",
            Self::BadCredentials => "bad_credentials",
            Self::Locked { .. } => "locked",
        }
    }

    /// The line sent to the rejected client before the connection closes.
    ///
    /// Deliberately vague for credential-class failures so the attach path
    /// does not leak which check tripped.
    pub fn kill_line(&self) -> String {
        match self {
            Self::UnknownUser | Self::BadCredentials => {
                "*** Unknown user or wrong password.".to_string()
            }
            Self::IpBlocked => "*** Too many failed login attempts.".to_string(),
            Self::HostNotAllowed => "*** You are not allowed to connect from this host.".to_string(),
            Self::Locked { reason: Some(reason) } => {
                format!("*** Your account is suspended. Reason: {reason}")
            }
            Self::Locked { reason: None } => "*** You cannot attach to this user.".to_string(),
        }
    }
}

/// Transient failures while opening an outbound server connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Property-store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_error_codes() {
        assert_eq!(LoginError::UnknownUser.error_code(), "unknown_user");
        assert_eq!(LoginError::IpBlocked.error_code(), "ip_blocked");
        assert_eq!(LoginError::Locked { reason: None }.error_code(), "locked");
    }

    #[test]
    fn credential_failures_share_one_kill_line() {
        // Unknown account and wrong password must be indistinguishable.
        assert_eq!(
            LoginError::UnknownUser.kill_line(),
            LoginError::BadCredentials.kill_line()
        );
    }

    #[test]
    fn suspend_reason_is_surfaced() {
        let err = LoginError::Locked {
            reason: Some("abuse".into()),
        };
        assert!(err.kill_line().contains("abuse"));
    }
}
