//! Error types for the RPZ loader
//!
//! This module defines all error types used throughout the crate.
//!
//! Per-job errors never escape a sync task: they are folded into a
//! [`SyncOutcome`](crate::sync::SyncOutcome) carrying a [`FailureKind`] so
//! callers can branch on the cause without matching strings.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for RPZ loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the RPZ loader
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing zone definition (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote feed unreachable or answered with a non-2xx status
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Local filesystem failure while materializing a zone file
    #[error("Write error: {0}")]
    Write(String),

    /// The authoritative server rejected or could not run a control command
    #[error("Server sync error: {0}")]
    ServerSync(#[from] ServerSyncError),

    /// YAML deserialization errors (configuration files)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Classify this error for outcome reporting
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Fetch(_) => FailureKind::Fetch,
            Self::Write(_) => FailureKind::Write,
            Self::ServerSync(e) => e.failure_kind(),
            Self::Config(_) | Self::Yaml(_) | Self::Other(_) => FailureKind::Other,
        }
    }
}

/// Failure of a nameserver control command
///
/// Every control invocation (zone load, metadata, notify) goes through the
/// same execution primitive and therefore fails in one of these three ways.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerSyncError {
    /// The command did not finish within its budget and was killed
    #[error("{command} timed out after {timeout:?}{}", output_details(.stdout, .stderr))]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    /// The command ran and reported failure
    #[error("{command} exited with code {code}{}", output_details(.stdout, .stderr))]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The command could not be started or waited on
    #[error("{command} failed: {message}")]
    Execution { command: String, message: String },
}

impl ServerSyncError {
    /// Create an execution error
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Classify this error for outcome reporting
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::NonZeroExit { code, .. } => FailureKind::NonZeroExit(*code),
            Self::Execution { .. } => FailureKind::Execution,
        }
    }
}

fn output_details(stdout: &str, stderr: &str) -> String {
    let mut details = String::new();
    if !stdout.is_empty() {
        details.push_str(&format!(" stdout={stdout:?}"));
    }
    if !stderr.is_empty() {
        details.push_str(&format!(" stderr={stderr:?}"));
    }
    details
}

/// Closed enumeration of sync failure causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Remote feed could not be retrieved
    Fetch,
    /// Zone file could not be written
    Write,
    /// Control command exceeded its timeout
    Timeout,
    /// Control command exited with the given code
    NonZeroExit(i32),
    /// Control command could not be run at all
    Execution,
    /// Anything else
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Write => f.write_str("write"),
            Self::Timeout => f.write_str("timeout"),
            Self::NonZeroExit(code) => write!(f, "non_zero_exit({code})"),
            Self::Execution => f.write_str("execution"),
            Self::Other => f.write_str("other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_message_includes_output() {
        let err = ServerSyncError::NonZeroExit {
            command: "pdnsutil zone load rpz /tmp/rpz.zone".to_string(),
            code: 1,
            stdout: String::new(),
            stderr: "zone not found".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "pdnsutil zone load rpz /tmp/rpz.zone exited with code 1 stderr=\"zone not found\""
        );
        assert_eq!(err.failure_kind(), FailureKind::NonZeroExit(1));
    }

    #[test]
    fn test_failure_kind_through_error() {
        let err: Error = ServerSyncError::Timeout {
            command: "pdns_control notify rpz".to_string(),
            timeout: Duration::from_secs(30),
            stdout: String::new(),
            stderr: String::new(),
        }
        .into();

        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert_eq!(Error::fetch("boom").failure_kind(), FailureKind::Fetch);
        assert_eq!(Error::write("disk full").failure_kind(), FailureKind::Write);
    }
}
