//! Narrow interfaces between the session runner and the outside world.
//!
//! Real implementations live in `gates`, `remote`, `firmware`, `audit`,
//! `report` and `ui`. Tests drive the runner with scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::aggregate::SessionSummary;
use crate::catalog::{Catalog, CommandSpec, TestDefinition};
use crate::errors::CheckError;
use crate::session::{DeviceInfo, TestExecutionRecord, Verdict};

/// Chooses which catalog tests run in a session.
pub trait Selector {
    fn select(&mut self, catalog: &Catalog) -> Result<HashSet<String>>;
}

/// Supplies the identity of the unit under test. Implementations re-prompt on
/// malformed input instead of returning it.
pub trait DeviceIdProvider {
    fn device_info(&mut self) -> Result<DeviceInfo>;
}

/// Operator verdict for a manual check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualVerdict {
    pub verdict: Verdict,
    pub notes: String,
}

impl ManualVerdict {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            notes: String::new(),
        }
    }

    pub fn fail(notes: &str) -> Self {
        Self {
            verdict: Verdict::Fail,
            notes: notes.to_string(),
        }
    }
}

/// Operator choice after a failed attempt that may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
    Abort,
}

/// Operator choice after a test ended in FAIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Continue,
    Restart,
    Abort,
}

/// Blocking operator prompts. Each call is a suspension point of the runner.
pub trait Interaction {
    /// Show a bench preparation step and wait until the operator is ready.
    fn acknowledge(&mut self, instruction: &str) -> Result<()>;

    /// Ask the operator to judge a check.
    fn present_check(&mut self, definition: &TestDefinition, question: &str)
    -> Result<ManualVerdict>;

    /// Ask whether to retry a failed attempt.
    fn decide_retry(
        &mut self,
        definition: &TestDefinition,
        attempts: u32,
        max_attempts: u32,
        reason: &str,
    ) -> Result<RetryDecision>;

    /// Ask how to proceed after a test failed.
    fn decide_after_failure(
        &mut self,
        definition: &TestDefinition,
        record: &TestExecutionRecord,
    ) -> Result<FailureDecision>;

    /// Plain yes/no question.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Captured result of a command that ran on the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }
}

/// The device could not be reached, or did not answer in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Connection(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<RemoteError> for CheckError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Connection(msg) => CheckError::Connection(msg),
            RemoteError::Timeout(d) => CheckError::Timeout(d),
        }
    }
}

/// Runs commands on the unit under test.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration)
    -> Result<CommandOutput, RemoteError>;
}

/// Result of one firmware upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub success: bool,
    pub message: String,
}

impl UploadReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait FirmwareUploader: Send + Sync {
    async fn upload(&self) -> UploadReport;
}

/// Append-only per-device log. Failures are swallowed by the implementation.
pub trait SessionLog {
    fn append(&self, device_id: &str, line: &str);
}

/// Live status display. Purely informational.
pub trait StatusDisplay {
    fn session_started(&self, device: &DeviceInfo, selected: usize);
    fn test_started(&self, definition: &TestDefinition);
    fn attempt_started(&self, definition: &TestDefinition, attempt: u32, max_attempts: u32);
    fn attempt_failed(&self, definition: &TestDefinition, attempt: u32, reason: &str);
    fn test_finished(&self, definition: &TestDefinition, record: &TestExecutionRecord);
    fn test_skipped(&self, definition: &TestDefinition, reason: &str);
}

/// Writes the durable report for a finalized session.
pub trait Exporter {
    fn write(&self, summary: &SessionSummary) -> Result<()>;
}

/// Powers the device off after a session.
#[async_trait]
pub trait Shutdown: Send + Sync {
    async fn shutdown_remote(&self) -> bool;
}

/// Collaborators that ignore everything, for headless runs and tests.
pub struct Silent;

impl SessionLog for Silent {
    fn append(&self, _device_id: &str, _line: &str) {}
}

impl StatusDisplay for Silent {
    fn session_started(&self, _device: &DeviceInfo, _selected: usize) {}
    fn test_started(&self, _definition: &TestDefinition) {}
    fn attempt_started(&self, _definition: &TestDefinition, _attempt: u32, _max_attempts: u32) {}
    fn attempt_failed(&self, _definition: &TestDefinition, _attempt: u32, _reason: &str) {}
    fn test_finished(&self, _definition: &TestDefinition, _record: &TestExecutionRecord) {}
    fn test_skipped(&self, _definition: &TestDefinition, _reason: &str) {}
}
