//! One device from selection to exported summary.

use std::collections::HashSet;
use std::time::Duration;

use crate::aggregate::{ResultAggregator, SessionSummary};
use crate::catalog::Catalog;
use crate::errors::OrchestratorError;
use crate::retry::RetryPolicy;
use crate::session::{DeviceInfo, Session, SessionState, Verdict};

use super::collaborators::Exporter;
use super::runner::{Collaborators, SessionRunner};

/// What a station needs to test one device.
pub struct DeviceRun<'a> {
    pub catalog: &'a Catalog,
    pub policy: RetryPolicy,
    pub command_timeout: Duration,
    pub device: DeviceInfo,
    pub selected: HashSet<String>,
}

/// Run, finalize and export a session for one device.
///
/// If the runner stops on an infrastructure error (for example the terminal
/// went away), the in-flight test is failed, the session is aborted with a
/// note, and the summary is still exported before the error is returned.
pub async fn run_device_session<'a>(
    run: DeviceRun<'a>,
    io: Collaborators<'a>,
    exporter: &dyn Exporter,
) -> Result<SessionSummary, OrchestratorError> {
    let mut session = Session::new(run.catalog, run.device, &run.selected);
    let log = io.log;

    let result = SessionRunner::new(run.catalog, run.policy, io)
        .with_command_timeout(run.command_timeout)
        .run(&mut session)
        .await;

    if let Err(e) = &result {
        tracing::error!(device = session.device_id(), error = %e, "session interrupted");
        interrupt(&mut session, &e.to_string())?;
        log.append(session.device_id(), &format!("Session interrupted: {}", e));
    }

    let summary = ResultAggregator::finalize(&mut session);
    log.append(
        &summary.device.id,
        &format!(
            "Overall: {} - Failed tests: {}",
            summary.overall_status,
            summary.failed_tests_display()
        ),
    );

    exporter
        .write(&summary)
        .map_err(|source| OrchestratorError::ExportFailed {
            device_id: summary.device.id.clone(),
            source,
        })?;
    tracing::info!(
        device = %summary.device.id,
        overall = %summary.overall_status,
        state = %summary.state,
        "session exported"
    );

    result.map(|_| summary)
}

fn interrupt(session: &mut Session, reason: &str) -> Result<(), OrchestratorError> {
    if let Some(running) = session.running().map(str::to_string) {
        session.add_note(&running, &format!("Interrupted: {}", reason))?;
        session.complete_test(&running, Verdict::Fail)?;
    }
    session.add_session_note(&format!("Test interrupted: {}", reason))?;
    session.set_state(SessionState::Aborted)?;
    Ok(())
}
