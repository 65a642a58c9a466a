//! Typed error hierarchy for the QC station.
//!
//! - `CatalogError`: invalid test catalog definitions
//! - `SessionError`: illegal mutations of a session record set
//! - `CheckError`: why a single attempt of a check failed (never escapes the runner)
//! - `OrchestratorError`: failures that abort the runner itself

use std::time::Duration;
use thiserror::Error;

use crate::session::TestStatus;

/// Errors raised while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Catalog has no test definitions")]
    Empty,

    #[error("Test '{name}' has an empty id")]
    EmptyId { name: String },

    #[error("Duplicate test id {0}")]
    DuplicateId(String),

    #[error("Test {id} requires {requires}, which is not defined earlier in the catalog")]
    UnknownRequirement { id: String, requires: String },

    #[error("Test {id} has an invalid output pattern: {message}")]
    InvalidPattern { id: String, message: String },
}

/// Errors raised when a session is mutated illegally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session is finalized and can no longer be modified")]
    Finalized,

    #[error("Test {0} is not part of this session")]
    UnknownTest(String),

    #[error("Test {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TestStatus,
        to: TestStatus,
    },

    #[error("Test {running} is still running; cannot start {requested}")]
    AlreadyRunning { running: String, requested: String },
}

/// Why one attempt of a check failed. Converted into a FAIL outcome plus a
/// note at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Command exited with code {exit_code}: {detail}")]
    Command { exit_code: i32, detail: String },

    #[error("Output check failed: {0}")]
    UnexpectedOutput(String),

    #[error("Firmware upload failed: {0}")]
    Upload(String),

    #[error("Operator marked the check as failed")]
    OperatorRejected,
}

impl CheckError {
    /// Connection problems and timeouts, as opposed to a check that ran and failed.
    pub fn is_connection(&self) -> bool {
        matches!(self, CheckError::Connection(_) | CheckError::Timeout(_))
    }
}

/// Errors that stop the session runner.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Operator interaction failed: {0}")]
    Interaction(#[source] anyhow::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to export session for device {device_id}: {source}")]
    ExportFailed {
        device_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
