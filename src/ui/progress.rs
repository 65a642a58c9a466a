use crate::aggregate::SessionSummary;
use crate::catalog::{Category, TestDefinition};
use crate::orchestrator::StatusDisplay;
use crate::session::{DeviceInfo, OverallStatus, TestExecutionRecord, TestStatus};
use crate::ui::icons::{BLOCKER, CHECK, CLOCK, CROSS, DEVICE, RETRY, SKIP, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a station session, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Test bar: how many selected tests have finished
/// - Attempt bar: spinner with the current test and attempt
///
/// Finished tests are printed above the bars as persistent lines.
pub struct StationUI {
    multi: MultiProgress,
    test_bar: ProgressBar,
    attempt_bar: ProgressBar,
    verbose: bool,
}

impl StationUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let test_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let test_bar = multi.add(ProgressBar::new(0));
        test_bar.set_style(test_style);
        test_bar.set_prefix("  Tests");

        let attempt_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let attempt_bar = multi.add(ProgressBar::new_spinner());
        attempt_bar.set_style(attempt_style);
        attempt_bar.set_prefix("Attempt");

        Self {
            multi,
            test_bar,
            attempt_bar,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to `eprintln!` if the rich UI
    /// is hidden (not a terminal) or fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() || self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_separator(&self) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Clear both bars, e.g. before the post-session prompts.
    pub fn finish(&self) {
        self.attempt_bar.finish_and_clear();
        self.test_bar.finish_and_clear();
    }

    /// Print the final report for a session.
    pub fn print_summary(&self, summary: &SessionSummary) {
        self.finish();
        for line in summary_lines(summary) {
            println!("{}", line);
        }
    }
}

fn format_secs(secs: f64) -> String {
    let secs = secs.round() as u64;
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Render a finalized session as report lines.
pub fn summary_lines(summary: &SessionSummary) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!("{}", style("═".repeat(70)).cyan()),
        format!(
            "{}Device {} summary",
            DEVICE,
            style(&summary.device.id).yellow().bold()
        ),
        format!("{}", style("═".repeat(70)).cyan()),
    ];

    for record in &summary.records {
        let status = match record.status {
            TestStatus::Pass => style(record.status.report_label()).green(),
            TestStatus::Fail => style(record.status.report_label()).red(),
            TestStatus::Skipped => style(record.status.report_label()).dim(),
            _ => style(record.status.report_label()).yellow(),
        };
        let mut line = format!(
            "  {:<4} {:<28} {:<8}",
            record.definition_id, record.name, status
        );
        if record.status != TestStatus::Skipped && record.status != TestStatus::NotRun {
            line.push_str(&format!(
                " {} attempt(s), {}",
                record.attempts,
                format_secs(record.duration_secs)
            ));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!(
        "  {} {} passed, {} failed, {} not run, {} skipped",
        style("Results:").dim(),
        style(summary.count(TestStatus::Pass)).green(),
        style(summary.count(TestStatus::Fail)).red(),
        summary.count(TestStatus::NotRun),
        summary.count(TestStatus::Skipped),
    ));
    lines.push(format!(
        "  {} {}",
        style("Failed tests:").dim(),
        summary.failed_tests_display()
    ));
    lines.push(format!(
        "  {}{}",
        CLOCK,
        format_secs(summary.elapsed_secs)
    ));
    let overall = match summary.overall_status {
        OverallStatus::Pass => format!("{}{}", SPARKLE, style("OVERALL: PASS").green().bold()),
        OverallStatus::Fail => format!("{}{}", CROSS, style("OVERALL: FAIL").red().bold()),
    };
    lines.push(format!("  {} ({})", overall, summary.state));
    if !summary.notes.is_empty() {
        lines.push(format!("  {} {}", style("Notes:").dim(), summary.notes));
    }
    lines.push(String::new());
    lines
}

impl StatusDisplay for StationUI {
    fn session_started(&self, device: &DeviceInfo, selected: usize) {
        self.test_bar.reset();
        self.test_bar.set_length(selected as u64);
        self.test_bar.set_message(format!(
            "device {}",
            style(&device.id).yellow()
        ));
        self.print_line("");
        self.print_separator();
        self.print_line(format!(
            "{}Testing device {} ({} tests selected)",
            DEVICE,
            style(&device.id).yellow().bold(),
            selected
        ));
        self.print_separator();
    }

    fn test_started(&self, definition: &TestDefinition) {
        self.test_bar
            .set_message(format!("{}", style(definition.label()).yellow()));
        self.print_line(format!(
            "{} {}",
            style("▶").green().bold(),
            style(definition.label()).bold()
        ));
    }

    fn attempt_started(&self, definition: &TestDefinition, attempt: u32, max_attempts: u32) {
        self.attempt_bar.set_message(format!(
            "{} {}/{} {}",
            definition.id,
            style(attempt).cyan(),
            max_attempts,
            style(format!("({})", definition.category())).dim()
        ));
        // Manual checks prompt on the terminal; keep the spinner still for them.
        if definition.retry_eligible() || definition.category() == Category::Firmware {
            self.attempt_bar
                .enable_steady_tick(Duration::from_millis(100));
        } else {
            self.attempt_bar.disable_steady_tick();
        }
    }

    fn attempt_failed(&self, definition: &TestDefinition, attempt: u32, reason: &str) {
        self.attempt_bar.disable_steady_tick();
        self.print_line(format!(
            "    {}{} attempt {} failed: {}",
            RETRY,
            definition.id,
            attempt,
            style(reason).red()
        ));
    }

    fn test_finished(&self, definition: &TestDefinition, record: &TestExecutionRecord) {
        self.attempt_bar.disable_steady_tick();
        self.attempt_bar.set_message("");
        let (icon, status) = match record.status {
            TestStatus::Pass => (CHECK, style(record.status.report_label()).green().bold()),
            _ => (CROSS, style(record.status.report_label()).red().bold()),
        };
        self.print_line(format!(
            "  {}{} {} {}",
            icon,
            definition.label(),
            status,
            style(format!("({})", format_secs(record.duration_secs))).dim()
        ));
        if self.verbose && !record.notes.is_empty() {
            self.print_line(format!("    {} {}", style("→").dim(), style(&record.notes).dim()));
        }
        // A restarted test finishes again; only count it once.
        if self.test_bar.position() < self.test_bar.length().unwrap_or(0) {
            self.test_bar.inc(1);
        }
    }

    fn test_skipped(&self, definition: &TestDefinition, reason: &str) {
        if reason.starts_with("blocked") {
            self.print_line(format!(
                "  {}{} {}",
                BLOCKER,
                definition.label(),
                style(reason).yellow()
            ));
            self.test_bar.inc(1);
        } else if self.verbose {
            self.print_line(format!(
                "  {}{} {}",
                SKIP,
                style(definition.label()).dim(),
                style(reason).dim()
            ));
        }
    }
}
