//! Results sheet: one CSV row per finalized session, plus a formatted
//! workbook rebuilt from it.

mod xlsx;

pub use xlsx::{SHEET_NAME, XlsxExporter, status_fill};

use anyhow::{Context, Result, bail};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::aggregate::SessionSummary;
use crate::orchestrator::Exporter;
use crate::session::TestStatus;

/// Appends sessions to a CSV file, writing the header when the file is new.
///
/// Columns: identity and log file, one status column per catalog test, the
/// failure summary, then one duration column per test.
pub struct CsvExporter {
    path: PathBuf,
    log_file: Option<PathBuf>,
}

impl CsvExporter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            log_file: None,
        }
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(summary: &SessionSummary) -> Vec<String> {
        let mut header: Vec<String> = ["Device ID", "Version", "Manufacture ID", "Timestamp", "Log File"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend(
            summary
                .records
                .iter()
                .map(|r| format!("{}: {}", r.definition_id, r.name)),
        );
        header.extend(["Failed Tests", "Overall Pass", "Notes"].iter().map(|s| s.to_string()));
        header.extend(
            summary
                .records
                .iter()
                .map(|r| format!("{} Duration (s)", r.definition_id)),
        );
        header
    }

    pub fn row(&self, summary: &SessionSummary) -> Vec<String> {
        let device = &summary.device;
        let mut row = vec![
            device.id.clone(),
            device.version.clone().unwrap_or_default(),
            device.manufacture_id.clone().unwrap_or_default(),
            summary
                .started_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            self.log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ];
        row.extend(
            summary
                .records
                .iter()
                .map(|r| r.status.report_label().to_string()),
        );
        row.push(summary.failed_tests_display());
        row.push(if summary.passed() { "True" } else { "False" }.to_string());
        row.push(summary.notes.clone());
        row.extend(summary.records.iter().map(|r| match r.status {
            TestStatus::Skipped | TestStatus::NotRun => "0".to_string(),
            _ => format!("{}", r.duration_secs.round() as u64),
        }));
        row
    }

    fn existing_header(&self) -> Result<Option<Vec<String>>> {
        let empty = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if empty {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", self.path.display()))?;
        Ok(Some(headers.iter().map(str::to_string).collect()))
    }

    pub fn append(&self, summary: &SessionSummary) -> Result<()> {
        let header = Self::header(summary);
        let write_header = match self.existing_header()? {
            None => true,
            Some(existing) if existing == header => false,
            Some(_) => bail!(
                "Results file {} was written for a different test catalog; move it aside or set [output] results_csv",
                self.path.display()
            ),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        if write_header {
            writer.write_record(&header)?;
        }
        writer.write_record(self.row(summary))?;
        writer.flush().context("Failed to flush results file")?;
        tracing::debug!(path = %self.path.display(), device = %summary.device.id, "results row appended");
        Ok(())
    }
}

impl Exporter for CsvExporter {
    fn write(&self, summary: &SessionSummary) -> Result<()> {
        self.append(summary)
    }
}

/// Runs every exporter, reporting all failures together.
pub struct ExportSet {
    exporters: Vec<Box<dyn Exporter>>,
}

impl ExportSet {
    pub fn new(exporters: Vec<Box<dyn Exporter>>) -> Self {
        Self { exporters }
    }
}

impl Exporter for ExportSet {
    fn write(&self, summary: &SessionSummary) -> Result<()> {
        let errors: Vec<String> = self
            .exporters
            .iter()
            .filter_map(|e| e.write(summary).err())
            .map(|e| format!("{:#}", e))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            bail!("{}", errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::catalog::default_catalog;
    use crate::session::{DeviceInfo, Session, Verdict};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn summary(device: &str) -> SessionSummary {
        let selected: HashSet<String> =
            ["T02", "T09", "T13"].iter().map(|s| s.to_string()).collect();
        let mut device = DeviceInfo::new(device);
        device.version = Some("v2".into());
        let mut session = Session::new(&default_catalog(), device, &selected);
        session.start_test("T02").unwrap();
        session.record_attempt("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();
        session.start_test("T09").unwrap();
        session.record_attempt("T09").unwrap();
        session.complete_test("T09", Verdict::Fail).unwrap();
        ResultAggregator::finalize(&mut session)
    }

    fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_header_layout() {
        let header = CsvExporter::header(&summary("1"));
        let catalog = default_catalog();
        assert_eq!(header.len(), 5 + catalog.len() + 3 + catalog.len());
        assert_eq!(header[0], "Device ID");
        assert_eq!(header[5], "T01: Firmware Upload");
        assert_eq!(header[5 + catalog.len()], "Failed Tests");
        assert_eq!(header.last().unwrap(), "T14 Duration (s)");
    }

    #[test]
    fn test_row_values() {
        let exporter = CsvExporter::new(Path::new("r.csv")).with_log_file("logs/device_9.txt");
        let summary = summary("9");
        let header = CsvExporter::header(&summary);
        let row = exporter.row(&summary);
        let cell = |name: &str| row[header.iter().position(|h| h == name).unwrap()].clone();

        assert_eq!(cell("Device ID"), "9");
        assert_eq!(cell("Version"), "v2");
        assert_eq!(cell("Manufacture ID"), "");
        assert_eq!(cell("Log File"), "logs/device_9.txt");
        assert_eq!(cell("T01: Firmware Upload"), "SKIPPED");
        assert_eq!(cell("T02: CM5 LED Visual Check"), "PASS");
        assert_eq!(cell("T09: USB MicroPython Detection"), "FAIL");
        assert_eq!(cell("T13: SD Card Detection"), "NOT RUN");
        assert_eq!(cell("Failed Tests"), "T09(USB MicroPython Detection)");
        assert_eq!(cell("Overall Pass"), "False");
        assert_eq!(cell("T13 Duration (s)"), "0");
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/results.csv");
        let exporter = CsvExporter::new(&path);
        exporter.write(&summary("1")).unwrap();
        exporter.write(&summary("2")).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "Device ID");
        assert_eq!(&rows[1][0], "1");
        assert_eq!(&rows[2][0], "2");
    }

    #[test]
    fn test_append_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        let err = CsvExporter::new(&path).append(&summary("1")).unwrap_err();
        assert!(err.to_string().contains("different test catalog"));
    }

    struct Failing;

    impl Exporter for Failing {
        fn write(&self, _summary: &SessionSummary) -> Result<()> {
            bail!("disk full")
        }
    }

    #[test]
    fn test_export_set_runs_all_and_reports_failures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let set = ExportSet::new(vec![Box::new(Failing), Box::new(CsvExporter::new(&path))]);
        let err = set.write(&summary("3")).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(read_rows(&path).len(), 2);
    }
}
