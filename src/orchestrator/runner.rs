use std::collections::HashSet;
use std::time::Duration;

use crate::catalog::{Catalog, Check, CommandSpec, TestDefinition};
use crate::errors::{CheckError, OrchestratorError, SessionError};
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionState, TestStatus, Verdict};

use super::collaborators::{
    FailureDecision, FirmwareUploader, Interaction, RemoteExecutor, RetryDecision, SessionLog,
    StatusDisplay,
};

/// Default per-call timeout for remote commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const NOTE_OUTPUT_CHARS: usize = 100;

/// States a test moves through while it is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Pending,
    Running,
    Evaluating,
    Retry,
    Done,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestPhase::Pending => "PENDING",
            TestPhase::Running => "RUNNING",
            TestPhase::Evaluating => "EVALUATING",
            TestPhase::Retry => "RETRY",
            TestPhase::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

/// How a session run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected test reached a terminal status (or was blocked).
    Completed,
    /// The operator aborted while `test_id` was in flight.
    Aborted { test_id: String },
}

/// Result of one attempt, before the retry policy is consulted.
#[derive(Debug)]
struct Attempt {
    result: Result<(), CheckError>,
    note: Option<String>,
}

impl Attempt {
    fn pass(note: Option<String>) -> Self {
        Self {
            result: Ok(()),
            note,
        }
    }

    fn fail(err: CheckError, note: Option<String>) -> Self {
        Self {
            result: Err(err),
            note,
        }
    }
}

/// How the attempt loop of a single run of a test ended.
enum AttemptsEnd {
    Passed,
    Failed,
    Aborted,
}

/// Where the runner goes after a test.
enum Flow {
    Next,
    Abort,
}

/// Everything the runner talks to while a session is in progress.
pub struct Collaborators<'a> {
    pub interaction: &'a mut dyn Interaction,
    pub remote: &'a dyn RemoteExecutor,
    pub firmware: &'a dyn FirmwareUploader,
    pub log: &'a dyn SessionLog,
    pub display: &'a dyn StatusDisplay,
}

/// Walks the catalog in order and executes every selected test against one session.
///
/// Tests never overlap: every collaborator call is awaited before the next
/// step. Operator abort is honoured only at decision points.
pub struct SessionRunner<'a> {
    catalog: &'a Catalog,
    policy: RetryPolicy,
    command_timeout: Duration,
    io: Collaborators<'a>,
    shown_setups: HashSet<String>,
}

impl<'a> SessionRunner<'a> {
    pub fn new(catalog: &'a Catalog, policy: RetryPolicy, io: Collaborators<'a>) -> Self {
        Self {
            catalog,
            policy,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            io,
            shown_setups: HashSet::new(),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run every selected test of `session` in catalog order.
    pub async fn run(&mut self, session: &mut Session) -> Result<RunOutcome, OrchestratorError> {
        self.shown_setups.clear();
        session.set_state(SessionState::RunningTests)?;

        let selected = session
            .records()
            .iter()
            .filter(|r| r.status != TestStatus::Skipped)
            .count();
        self.io.display.session_started(session.device(), selected);
        self.log(
            session,
            &format!(
                "Session started for device {} ({} of {} tests selected)",
                session.device_id(),
                selected,
                self.catalog.len()
            ),
        );

        let catalog = self.catalog;
        for def in catalog.definitions() {
            if !session.is_selected(&def.id) {
                self.io.display.test_skipped(def, "not selected");
                self.log_test(session, def, "SKIPPED");
                continue;
            }

            if let Some(blocker) = self.unmet_requirement(session, def) {
                let reason = format!("blocked: {} did not pass", blocker);
                session.mark_blocked(&def.id, &reason)?;
                self.io.display.test_skipped(def, &reason);
                self.log_test(session, def, &format!("NOT RUN - {}", reason));
                continue;
            }

            if let Some(setup) = &def.setup {
                if self.shown_setups.insert(setup.clone()) {
                    self.io
                        .interaction
                        .acknowledge(setup)
                        .map_err(OrchestratorError::Interaction)?;
                }
            }

            if let Flow::Abort = self.run_test(session, def).await? {
                session.set_state(SessionState::Aborted)?;
                session.add_session_note(&format!("Session aborted by operator during {}.", def.id))?;
                self.log(session, &format!("Session ABORTED by operator during {}", def.id));
                tracing::warn!(device = session.device_id(), test = %def.id, "session aborted");
                return Ok(RunOutcome::Aborted {
                    test_id: def.id.clone(),
                });
            }
        }

        self.log(session, "All selected tests finished");
        Ok(RunOutcome::Completed)
    }

    /// The id of a selected prerequisite that did not pass, if any.
    fn unmet_requirement(&self, session: &Session, def: &TestDefinition) -> Option<String> {
        let required = def.requires.as_deref()?;
        let record = session.record(required)?;
        match record.status {
            TestStatus::Skipped | TestStatus::Pass => None,
            _ => Some(required.to_string()),
        }
    }

    async fn run_test(
        &mut self,
        session: &mut Session,
        def: &TestDefinition,
    ) -> Result<Flow, OrchestratorError> {
        self.transition(session, def, TestPhase::Pending);
        session.start_test(&def.id)?;
        self.transition(session, def, TestPhase::Running);
        self.io.display.test_started(def);

        loop {
            let end = self.attempt_until_done(session, def).await?;
            let verdict = match end {
                AttemptsEnd::Passed => Verdict::Pass,
                AttemptsEnd::Failed | AttemptsEnd::Aborted => Verdict::Fail,
            };
            session.complete_test(&def.id, verdict)?;
            self.transition(session, def, TestPhase::Done);
            self.finish_line(session, def);

            match end {
                AttemptsEnd::Passed => return Ok(Flow::Next),
                AttemptsEnd::Aborted => return Ok(Flow::Abort),
                AttemptsEnd::Failed => {}
            }

            let record = session
                .record(&def.id)
                .ok_or_else(|| SessionError::UnknownTest(def.id.clone()))?;
            let decision = self
                .io
                .interaction
                .decide_after_failure(def, record)
                .map_err(OrchestratorError::Interaction)?;

            match decision {
                FailureDecision::Continue => {
                    self.log_test(session, def, "operator chose to continue");
                    return Ok(Flow::Next);
                }
                FailureDecision::Abort => {
                    session.add_note(&def.id, "Aborted by operator")?;
                    return Ok(Flow::Abort);
                }
                FailureDecision::Restart => {
                    session.restart_test(&def.id)?;
                    self.log_test(session, def, "RESTART requested by operator");
                    tracing::info!(device = session.device_id(), test = %def.id, "test restarted");
                    self.transition(session, def, TestPhase::Running);
                    self.io.display.test_started(def);
                }
            }
        }
    }

    /// Attempt the check until it passes, the budget is spent, or the operator stops.
    async fn attempt_until_done(
        &mut self,
        session: &mut Session,
        def: &TestDefinition,
    ) -> Result<AttemptsEnd, OrchestratorError> {
        let category = def.category();
        let max_attempts = self.policy.max_attempts(category);

        loop {
            let current = session.record(&def.id).map(|r| r.attempts).unwrap_or(0) + 1;
            self.io.display.attempt_started(def, current, max_attempts);

            let attempt = self.dispatch(def).await?;
            let attempts = session.record_attempt(&def.id)?;
            self.transition(session, def, TestPhase::Evaluating);

            if let Some(note) = &attempt.note {
                session.add_note(&def.id, note)?;
            }

            let err = match attempt.result {
                Ok(()) => return Ok(AttemptsEnd::Passed),
                Err(err) => err,
            };

            let reason = format!("Attempt {}/{}: {}", attempts, max_attempts, err);
            session.add_note(&def.id, &reason)?;
            self.io.display.attempt_failed(def, attempts, &err.to_string());
            self.log_test(session, def, &format!("FAIL - {}", reason));
            tracing::info!(
                device = session.device_id(),
                test = %def.id,
                attempt = attempts,
                connection = err.is_connection(),
                error = %err,
                "attempt failed"
            );

            if !self.policy.should_retry(category, attempts, Verdict::Fail) {
                return Ok(AttemptsEnd::Failed);
            }

            let decision = self
                .io
                .interaction
                .decide_retry(def, attempts, max_attempts, &err.to_string())
                .map_err(OrchestratorError::Interaction)?;

            match decision {
                RetryDecision::Retry => {
                    self.transition(session, def, TestPhase::Retry);
                }
                RetryDecision::GiveUp => {
                    session.add_note(
                        &def.id,
                        &format!("Operator stopped retrying after {} attempts", attempts),
                    )?;
                    return Ok(AttemptsEnd::Failed);
                }
                RetryDecision::Abort => {
                    session.add_note(&def.id, "Aborted by operator")?;
                    return Ok(AttemptsEnd::Aborted);
                }
            }
        }
    }

    /// Run one attempt with the handler for the definition's check kind.
    async fn dispatch(&mut self, def: &TestDefinition) -> Result<Attempt, OrchestratorError> {
        match &def.check {
            Check::Visual { question } | Check::Ui { question } => self.run_manual(def, question),
            Check::Remote(spec) => self.run_remote(def, spec).await,
            Check::Firmware => Ok(self.run_firmware().await),
        }
    }

    fn run_manual(
        &mut self,
        def: &TestDefinition,
        question: &str,
    ) -> Result<Attempt, OrchestratorError> {
        let answer = self
            .io
            .interaction
            .present_check(def, question)
            .map_err(OrchestratorError::Interaction)?;
        let note = Some(answer.notes).filter(|n| !n.trim().is_empty());
        Ok(match answer.verdict {
            Verdict::Pass => Attempt::pass(note),
            Verdict::Fail => Attempt::fail(CheckError::OperatorRejected, note),
        })
    }

    async fn run_remote(
        &mut self,
        def: &TestDefinition,
        spec: &CommandSpec,
    ) -> Result<Attempt, OrchestratorError> {
        let output = match self.io.remote.run(spec, self.command_timeout).await {
            Ok(output) => output,
            Err(err) => return Ok(Attempt::fail(err.into(), None)),
        };

        if output.exit_code != 0 {
            let detail = first_line(if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            });
            return Ok(Attempt::fail(
                CheckError::Command {
                    exit_code: output.exit_code,
                    detail,
                },
                None,
            ));
        }

        if let Some(reason) = spec
            .checks
            .iter()
            .find_map(|check| check.evaluate(&output.stdout, &output.stderr))
        {
            let note = Some(format!(
                "{} output: {}",
                spec.command,
                truncate(&output.stdout, NOTE_OUTPUT_CHARS)
            ));
            return Ok(Attempt::fail(CheckError::UnexpectedOutput(reason), note));
        }

        match &spec.confirm {
            Some(question) => self.run_manual(def, question),
            None => Ok(Attempt::pass(None)),
        }
    }

    async fn run_firmware(&mut self) -> Attempt {
        let report = self.io.firmware.upload().await;
        if report.success {
            Attempt::pass(Some(report.message))
        } else {
            Attempt::fail(CheckError::Upload(report.message), None)
        }
    }

    fn transition(&self, session: &Session, def: &TestDefinition, phase: TestPhase) {
        tracing::debug!(device = session.device_id(), test = %def.id, phase = %phase, "transition");
        if phase != TestPhase::Evaluating && phase != TestPhase::Done {
            self.log_test(session, def, &phase.to_string());
        }
    }

    fn finish_line(&self, session: &Session, def: &TestDefinition) {
        if let Some(record) = session.record(&def.id) {
            self.io.display.test_finished(def, record);
            let mut line = format!(
                "{} - Attempts: {} - Duration: {:.1}s",
                record.status, record.attempts, record.duration_secs
            );
            if !record.notes.is_empty() {
                line.push_str(" - ");
                line.push_str(&record.notes);
            }
            self.log_test(session, def, &line);
            tracing::info!(
                device = session.device_id(),
                test = %def.id,
                status = %record.status,
                attempts = record.attempts,
                duration_secs = record.duration_secs,
                "test finished"
            );
        }
    }

    fn log_test(&self, session: &Session, def: &TestDefinition, message: &str) {
        self.log(session, &format!("{}: {} - {}", def.id, def.name, message));
    }

    fn log(&self, session: &Session, line: &str) {
        self.io.log.append(session.device_id(), line);
    }
}

fn first_line(text: &str) -> String {
    truncate(text.lines().next().unwrap_or("").trim(), NOTE_OUTPUT_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
