//! Post-run aggregation of a session into an exportable summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{
    DeviceInfo, OverallStatus, Session, SessionState, TestExecutionRecord, TestStatus,
};

/// One failed test in the failure summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub id: String,
    pub name: String,
    pub notes: String,
}

/// Immutable result of a finalized session, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub device: DeviceInfo,
    pub state: SessionState,
    pub overall_status: OverallStatus,
    pub failures: Vec<FailureEntry>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub records: Vec<TestExecutionRecord>,
    #[serde(default)]
    pub notes: String,
}

impl SessionSummary {
    pub fn passed(&self) -> bool {
        self.overall_status == OverallStatus::Pass
    }

    /// `T09(USB MicroPython Detection), T13(SD Card Detection)` or `None`.
    pub fn failed_tests_display(&self) -> String {
        if self.failures.is_empty() {
            return "None".to_string();
        }
        self.failures
            .iter()
            .map(|f| format!("{}({})", f.id, f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// Finalize the session and return its summary.
    ///
    /// The first call closes the session (COMPLETE, or ABORTED if the operator
    /// aborted) and freezes it. Later calls return the same summary unchanged.
    pub fn finalize(session: &mut Session) -> SessionSummary {
        if let Some(summary) = &session.summary {
            return summary.clone();
        }

        if session.state() != SessionState::Aborted {
            // Transitions on an unfinalized session cannot fail.
            let _ = session.set_state(SessionState::Finalizing);
            let _ = session.set_state(SessionState::Complete);
        }
        session.stamp_end();

        let failures = session
            .records()
            .iter()
            .filter(|r| r.status == TestStatus::Fail)
            .map(|r| FailureEntry {
                id: r.definition_id.clone(),
                name: r.name.clone(),
                notes: r.notes.clone(),
            })
            .collect();

        let summary = SessionSummary {
            device: session.device().clone(),
            state: session.state(),
            overall_status: session.overall_status(),
            failures,
            started_at: session.started_at(),
            ended_at: session.ended_at().unwrap_or_else(Utc::now),
            elapsed_secs: session.elapsed_secs(),
            records: session.records().to_vec(),
            notes: session.notes().to_string(),
        };

        session.summary = Some(summary.clone());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;
    use crate::errors::SessionError;
    use crate::session::Verdict;
    use std::collections::HashSet;

    fn make_session(ids: &[&str]) -> Session {
        let selected: HashSet<String> = ids.iter().map(|s| s.to_string()).collect();
        Session::new(&default_catalog(), DeviceInfo::new("7"), &selected)
    }

    #[test]
    fn test_finalize_collects_failures_in_order() {
        let mut session = make_session(&["T02", "T09", "T13"]);
        for (id, verdict) in [
            ("T02", Verdict::Pass),
            ("T09", Verdict::Fail),
            ("T13", Verdict::Fail),
        ] {
            session.start_test(id).unwrap();
            session.record_attempt(id).unwrap();
            if verdict == Verdict::Fail {
                session.add_note(id, "missing").unwrap();
            }
            session.complete_test(id, verdict).unwrap();
        }

        let summary = ResultAggregator::finalize(&mut session);
        assert_eq!(summary.overall_status, OverallStatus::Fail);
        assert_eq!(summary.state, SessionState::Complete);
        let ids: Vec<&str> = summary.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["T09", "T13"]);
        assert_eq!(summary.failures[0].notes, "missing");
        assert_eq!(
            summary.failed_tests_display(),
            "T09(USB MicroPython Detection), T13(SD Card Detection)"
        );
        assert_eq!(summary.records.len(), default_catalog().len());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut session = make_session(&["T02"]);
        session.start_test("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();

        let first = ResultAggregator::finalize(&mut session);
        let second = ResultAggregator::finalize(&mut session);
        assert_eq!(first, second);
        assert!(first.passed());
        assert_eq!(first.failed_tests_display(), "None");
    }

    #[test]
    fn test_finalized_session_is_immutable() {
        let mut session = make_session(&["T02"]);
        ResultAggregator::finalize(&mut session);
        assert_eq!(
            session.start_test("T02").unwrap_err(),
            SessionError::Finalized
        );
        assert_eq!(
            session.add_session_note("late").unwrap_err(),
            SessionError::Finalized
        );
    }

    #[test]
    fn test_aborted_session_stays_aborted() {
        let mut session = make_session(&["T02"]);
        session.set_state(SessionState::Aborted).unwrap();
        let summary = ResultAggregator::finalize(&mut session);
        assert_eq!(summary.state, SessionState::Aborted);
        assert_eq!(summary.overall_status, OverallStatus::Fail);
    }

    #[test]
    fn test_summary_counts() {
        let mut session = make_session(&["T02", "T03"]);
        session.start_test("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();
        let summary = ResultAggregator::finalize(&mut session);
        assert_eq!(summary.count(TestStatus::Pass), 1);
        assert_eq!(summary.count(TestStatus::NotRun), 1);
        assert_eq!(summary.count(TestStatus::Skipped), default_catalog().len() - 2);
    }
}
