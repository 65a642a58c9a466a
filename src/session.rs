//! Session data model: one record per catalog test plus session metadata.
//!
//! A `Session` is owned by the runner for the whole run and handed to the
//! aggregator once all selected tests are done. Every mutator validates the
//! status transition and refuses to touch a finalized session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::aggregate::SessionSummary;
use crate::catalog::Catalog;
use crate::errors::SessionError;

/// Lifecycle status of a single test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    NotRun,
    Running,
    Pass,
    Fail,
    Skipped,
}

impl TestStatus {
    /// Label used in report cells.
    pub fn report_label(self) -> &'static str {
        match self {
            TestStatus::NotRun => "NOT RUN",
            TestStatus::Running => "RUNNING",
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Pass | TestStatus::Fail)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::NotRun => write!(f, "NOT_RUN"),
            TestStatus::Running => write!(f, "RUNNING"),
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one attempt, or an operator's judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl From<Verdict> for TestStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Pass => TestStatus::Pass,
            Verdict::Fail => TestStatus::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Pass => write!(f, "PASS"),
            OverallStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Top-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Selecting,
    RunningTests,
    Finalizing,
    Complete,
    Aborted,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Selecting => "SELECTING",
            SessionState::RunningTests => "RUNNING_TESTS",
            SessionState::Finalizing => "FINALIZING",
            SessionState::Complete => "COMPLETE",
            SessionState::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

/// Identity of the unit under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacture_id: Option<String>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            manufacture_id: None,
        }
    }
}

/// Per-test outcome within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionRecord {
    pub definition_id: String,
    pub name: String,
    pub status: TestStatus,
    pub attempts: u32,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub notes: String,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl TestExecutionRecord {
    fn new(definition_id: &str, name: &str, status: TestStatus) -> Self {
        Self {
            definition_id: definition_id.to_string(),
            name: name.to_string(),
            status,
            attempts: 0,
            duration_secs: 0.0,
            started_at: None,
            ended_at: None,
            notes: String::new(),
            clock: None,
        }
    }

    fn push_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push_str("; ");
        }
        self.notes.push_str(note);
    }

    fn begin(&mut self) {
        self.status = TestStatus::Running;
        self.attempts = 0;
        self.duration_secs = 0.0;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.clock = Some(Instant::now());
    }

    /// Seconds spent RUNNING so far (or in total once terminal).
    pub fn elapsed_secs(&self) -> f64 {
        match (self.status, self.clock) {
            (TestStatus::Running, Some(clock)) => clock.elapsed().as_secs_f64(),
            _ => self.duration_secs,
        }
    }
}

/// One full run of selected tests against one device.
#[derive(Debug, Clone)]
pub struct Session {
    device: DeviceInfo,
    records: Vec<TestExecutionRecord>,
    state: SessionState,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    notes: String,
    clock: Instant,
    pub(crate) summary: Option<SessionSummary>,
}

impl Session {
    /// Create a session with one record per catalog test. Selected tests start
    /// NOT_RUN, everything else is SKIPPED with zero attempts and duration.
    pub fn new(catalog: &Catalog, device: DeviceInfo, selected: &HashSet<String>) -> Self {
        let records = catalog
            .definitions()
            .iter()
            .map(|def| {
                let status = if selected.contains(&def.id) {
                    TestStatus::NotRun
                } else {
                    TestStatus::Skipped
                };
                TestExecutionRecord::new(&def.id, &def.name, status)
            })
            .collect();

        Self {
            device,
            records,
            state: SessionState::Selecting,
            started_at: Utc::now(),
            ended_at: None,
            notes: String::new(),
            clock: Instant::now(),
            summary: None,
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn records(&self) -> &[TestExecutionRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&TestExecutionRecord> {
        self.records.iter().find(|r| r.definition_id == id)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.record(id)
            .is_some_and(|r| r.status != TestStatus::Skipped)
    }

    /// Monotonic seconds since the session was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Id of the record currently RUNNING, if any.
    pub fn running(&self) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.status == TestStatus::Running)
            .map(|r| r.definition_id.as_str())
    }

    /// PASS iff every non-SKIPPED record passed and the session was not aborted.
    pub fn overall_status(&self) -> OverallStatus {
        let all_passed = self
            .records
            .iter()
            .filter(|r| r.status != TestStatus::Skipped)
            .all(|r| r.status == TestStatus::Pass);

        if all_passed && self.state != SessionState::Aborted {
            OverallStatus::Pass
        } else {
            OverallStatus::Fail
        }
    }

    fn ensure_mutable(&self) -> Result<(), SessionError> {
        if self.is_finalized() {
            Err(SessionError::Finalized)
        } else {
            Ok(())
        }
    }

    fn record_mut(&mut self, id: &str) -> Result<&mut TestExecutionRecord, SessionError> {
        self.ensure_mutable()?;
        self.records
            .iter_mut()
            .find(|r| r.definition_id == id)
            .ok_or_else(|| SessionError::UnknownTest(id.to_string()))
    }

    pub fn set_state(&mut self, state: SessionState) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        self.state = state;
        Ok(())
    }

    pub fn add_session_note(&mut self, note: &str) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let note = note.trim();
        if !note.is_empty() {
            if !self.notes.is_empty() {
                self.notes.push(' ');
            }
            self.notes.push_str(note);
        }
        Ok(())
    }

    /// NOT_RUN → RUNNING. Only one record may be RUNNING at a time.
    pub fn start_test(&mut self, id: &str) -> Result<(), SessionError> {
        if let Some(running) = self.running() {
            return Err(SessionError::AlreadyRunning {
                running: running.to_string(),
                requested: id.to_string(),
            });
        }
        let record = self.record_mut(id)?;
        if record.status != TestStatus::NotRun {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: TestStatus::Running,
            });
        }
        record.begin();
        Ok(())
    }

    /// FAIL → RUNNING. Clears attempts, duration and notes of the previous run.
    pub fn restart_test(&mut self, id: &str) -> Result<(), SessionError> {
        if let Some(running) = self.running() {
            return Err(SessionError::AlreadyRunning {
                running: running.to_string(),
                requested: id.to_string(),
            });
        }
        let record = self.record_mut(id)?;
        if record.status != TestStatus::Fail {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: TestStatus::Running,
            });
        }
        record.notes.clear();
        record.begin();
        Ok(())
    }

    /// Count one more attempt on a RUNNING record. Returns the new count.
    pub fn record_attempt(&mut self, id: &str) -> Result<u32, SessionError> {
        let record = self.record_mut(id)?;
        if record.status != TestStatus::Running {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: TestStatus::Running,
            });
        }
        record.attempts += 1;
        Ok(record.attempts)
    }

    pub fn add_note(&mut self, id: &str, note: &str) -> Result<(), SessionError> {
        self.record_mut(id)?.push_note(note);
        Ok(())
    }

    /// RUNNING → PASS/FAIL, stamping end time and duration.
    pub fn complete_test(&mut self, id: &str, verdict: Verdict) -> Result<(), SessionError> {
        let record = self.record_mut(id)?;
        let to = TestStatus::from(verdict);
        if record.status != TestStatus::Running {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to,
            });
        }
        record.duration_secs = record
            .clock
            .map(|c| c.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        record.ended_at = Some(Utc::now());
        record.status = to;
        record.clock = None;
        Ok(())
    }

    /// Leave a NOT_RUN record untouched apart from a note explaining why.
    pub fn mark_blocked(&mut self, id: &str, reason: &str) -> Result<(), SessionError> {
        let record = self.record_mut(id)?;
        if record.status != TestStatus::NotRun {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: TestStatus::NotRun,
            });
        }
        record.push_note(reason);
        Ok(())
    }

    pub(crate) fn stamp_end(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;

    fn selection(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn make_session(ids: &[&str]) -> Session {
        Session::new(&default_catalog(), DeviceInfo::new("42"), &selection(ids))
    }

    #[test]
    fn test_one_record_per_catalog_entry() {
        let session = make_session(&["T01"]);
        assert_eq!(session.records().len(), default_catalog().len());
        assert_eq!(session.record("T01").unwrap().status, TestStatus::NotRun);
        for record in session.records().iter().filter(|r| r.definition_id != "T01") {
            assert_eq!(record.status, TestStatus::Skipped);
            assert_eq!(record.attempts, 0);
            assert_eq!(record.duration_secs, 0.0);
        }
    }

    #[test]
    fn test_happy_transition() {
        let mut session = make_session(&["T02"]);
        session.start_test("T02").unwrap();
        assert_eq!(session.running(), Some("T02"));
        assert_eq!(session.record_attempt("T02").unwrap(), 1);
        session.complete_test("T02", Verdict::Pass).unwrap();

        let record = session.record("T02").unwrap();
        assert_eq!(record.status, TestStatus::Pass);
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_some());
        assert!(record.duration_secs >= 0.0);
        assert!(session.running().is_none());
    }

    #[test]
    fn test_only_one_running() {
        let mut session = make_session(&["T02", "T03"]);
        session.start_test("T02").unwrap();
        assert_eq!(
            session.start_test("T03").unwrap_err(),
            SessionError::AlreadyRunning {
                running: "T02".into(),
                requested: "T03".into()
            }
        );
    }

    #[test]
    fn test_skipped_cannot_start() {
        let mut session = make_session(&["T02"]);
        assert!(matches!(
            session.start_test("T03"),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cannot_complete_twice() {
        let mut session = make_session(&["T02"]);
        session.start_test("T02").unwrap();
        session.complete_test("T02", Verdict::Fail).unwrap();
        assert!(session.complete_test("T02", Verdict::Pass).is_err());
        assert!(session.start_test("T02").is_err());
    }

    #[test]
    fn test_restart_resets_attempts_duration_and_notes() {
        let mut session = make_session(&["T09"]);
        session.start_test("T09").unwrap();
        session.record_attempt("T09").unwrap();
        session.record_attempt("T09").unwrap();
        session.add_note("T09", "Connection failed: refused").unwrap();
        session.complete_test("T09", Verdict::Fail).unwrap();

        session.restart_test("T09").unwrap();
        let record = session.record("T09").unwrap();
        assert_eq!(record.status, TestStatus::Running);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.duration_secs, 0.0);
        assert!(record.notes.is_empty());
    }

    #[test]
    fn test_restart_only_from_fail() {
        let mut session = make_session(&["T02"]);
        session.start_test("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();
        assert!(session.restart_test("T02").is_err());
    }

    #[test]
    fn test_notes_are_joined() {
        let mut session = make_session(&["T09"]);
        session.add_note("T09", "first").unwrap();
        session.add_note("T09", "  ").unwrap();
        session.add_note("T09", "second").unwrap();
        assert_eq!(session.record("T09").unwrap().notes, "first; second");
    }

    #[test]
    fn test_overall_status_rules() {
        let mut session = make_session(&["T02", "T03"]);
        session.start_test("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();
        // T03 still NOT_RUN
        assert_eq!(session.overall_status(), OverallStatus::Fail);

        session.start_test("T03").unwrap();
        session.complete_test("T03", Verdict::Pass).unwrap();
        assert_eq!(session.overall_status(), OverallStatus::Pass);

        session.set_state(SessionState::Aborted).unwrap();
        assert_eq!(session.overall_status(), OverallStatus::Fail);
    }

    #[test]
    fn test_all_skipped_is_pass() {
        let session = make_session(&[]);
        assert_eq!(session.overall_status(), OverallStatus::Pass);
    }

    #[test]
    fn test_mark_blocked_keeps_not_run() {
        let mut session = make_session(&["T06"]);
        session.mark_blocked("T06", "blocked: requires T05").unwrap();
        let record = session.record("T06").unwrap();
        assert_eq!(record.status, TestStatus::NotRun);
        assert_eq!(record.notes, "blocked: requires T05");
    }

    #[test]
    fn test_unknown_test() {
        let mut session = make_session(&[]);
        assert_eq!(
            session.start_test("T99").unwrap_err(),
            SessionError::UnknownTest("T99".into())
        );
    }
}
