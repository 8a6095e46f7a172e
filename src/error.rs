//! Error types for sonar acquisition and replay.
//!
//! All errors implement `std::error::Error` and carry enough context (paths, states,
//! protocol details) to be reported directly to the operator.
//!
//! ## Error Categories
//!
//! - **Open Errors**: the capture sink or the replay file could not be opened. These are
//!   fatal to starting a session.
//! - **Protocol Errors**: a byte stream could not be framed into messages.
//! - **Connection Errors**: transport problems inside the network client. The live source
//!   logs these and keeps trying, they never abort a running session.
//! - **State Errors**: an operation was attempted in the wrong session state.
//!
//! Invalid pings are not errors. They are decoded into a [`Ping`](crate::Ping) whose
//! validity flag is false and are skipped by the pipeline.
//!
//! ```rust
//! use sonarlink::SonarError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
//! let err = SonarError::capture_error(PathBuf::from("/ro/out.oculus"), io_err);
//! assert!(err.is_open_error());
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for sonar operations.
pub type Result<T, E = SonarError> = std::result::Result<T, E>;

/// Main error type for sonar operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SonarError {
    #[error("Capture file error: {path}")]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Replay file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized capture format in {path}: {reason}")]
    UnrecognizedFormat { path: PathBuf, reason: String },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Failed to connect to sonar: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidState { from: SessionState, to: SessionState },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Acquisition thread failed: {reason}")]
    Thread { reason: String },

    #[error("Snapshot file error: {path}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install interrupt handler")]
    Signal(#[source] ctrlc::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SonarError {
    /// Returns whether this error prevented a session from starting because a file
    /// could not be opened.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            SonarError::Capture { .. }
                | SonarError::File { .. }
                | SonarError::UnrecognizedFormat { .. }
        )
    }

    /// Returns whether the network client should retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SonarError::Connection { .. } => true,
            SonarError::Io(_) => true,
            SonarError::Protocol { .. } => true,
            SonarError::Capture { .. } => false,
            SonarError::File { .. } => false,
            SonarError::UnrecognizedFormat { .. } => false,
            SonarError::InvalidState { .. } => false,
            SonarError::InvalidConfig { .. } => false,
            SonarError::Thread { .. } => false,
            SonarError::Snapshot { .. } => false,
            SonarError::Signal(_) => false,
        }
    }

    /// Helper constructor for snapshot write errors with path context.
    pub fn snapshot_error(path: PathBuf, source: std::io::Error) -> Self {
        SonarError::Snapshot { path, source }
    }

    /// Helper constructor for capture sink errors with path context.
    pub fn capture_error(path: PathBuf, source: std::io::Error) -> Self {
        SonarError::Capture { path, source }
    }

    /// Helper constructor for replay file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        SonarError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        SonarError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SonarError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for framing and parsing errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        SonarError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        SonarError::InvalidConfig { reason: reason.into() }
    }
}
