//! Formatted workbook of the results sheet.
//!
//! The CSV is the ledger; the workbook is regenerated from it after every
//! session so the two never disagree. Status cells are colour coded and the
//! log file column links to the device log.

use anyhow::{Context, Result, bail};
use rust_xlsxwriter::{Color, Format, Url, Workbook, Worksheet};
use std::path::{Path, PathBuf};

use crate::aggregate::SessionSummary;
use crate::orchestrator::Exporter;

pub const SHEET_NAME: &str = "Test Results";

const HEADER_FILL: u32 = 0xCCCCCC;
const PASS_FILL: u32 = 0x90EE90;
const FAIL_FILL: u32 = 0xFFB6C1;
const NOT_RUN_FILL: u32 = 0xFFFF99;
const SKIPPED_FILL: u32 = 0xCCCCCC;

/// Background colour for a status cell, by report label.
pub fn status_fill(label: &str) -> Option<u32> {
    match label {
        "PASS" => Some(PASS_FILL),
        "FAIL" => Some(FAIL_FILL),
        "NOT RUN" => Some(NOT_RUN_FILL),
        "SKIPPED" => Some(SKIPPED_FILL),
        _ => None,
    }
}

fn overall_fill(passed: bool) -> u32 {
    if passed { PASS_FILL } else { FAIL_FILL }
}

/// Which columns get special treatment, located by header name.
#[derive(Debug, PartialEq)]
struct Layout {
    log_file: Option<usize>,
    statuses: std::ops::Range<usize>,
    overall: Option<usize>,
}

impl Layout {
    fn from_header(header: &[String]) -> Self {
        let find = |name: &str| header.iter().position(|h| h == name);
        let log_file = find("Log File");
        let failed = find("Failed Tests");
        let statuses = match (log_file, failed) {
            (Some(start), Some(end)) if start < end => start + 1..end,
            _ => 0..0,
        };
        Self {
            log_file,
            statuses,
            overall: find("Overall Pass"),
        }
    }
}

/// Rebuilds an `.xlsx` workbook from the results CSV.
///
/// Runs after the CSV exporter in an [`ExportSet`](super::ExportSet), so the
/// row for the session being exported is already in the ledger.
pub struct XlsxExporter {
    path: PathBuf,
    source: PathBuf,
}

impl XlsxExporter {
    pub fn new(path: &Path, results_csv: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            source: results_csv.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_ledger(&self) -> Result<Vec<Vec<String>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&self.source)
            .with_context(|| format!("Failed to open results file: {}", self.source.display()))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .with_context(|| format!("Failed to read {}", self.source.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Writes `rows` (header first) as a formatted workbook.
    pub fn render(&self, rows: &[Vec<String>]) -> Result<()> {
        let Some((header, body)) = rows.split_first() else {
            bail!("Results file {} has no header", self.source.display());
        };
        let layout = Layout::from_header(header);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        let header_format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(HEADER_FILL));
        for (col, title) in header.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, title, &header_format)?;
        }
        for (index, row) in body.iter().enumerate() {
            write_row(sheet, index as u32 + 1, row, &layout)?;
        }
        sheet.autofit();

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        workbook
            .save(&self.path)
            .with_context(|| format!("Failed to write workbook: {}", self.path.display()))?;
        Ok(())
    }
}

fn write_row(sheet: &mut Worksheet, row_num: u32, row: &[String], layout: &Layout) -> Result<()> {
    for (col, value) in row.iter().enumerate() {
        let col_num = col as u16;
        if layout.statuses.contains(&col)
            && let Some(fill) = status_fill(value)
        {
            let format = Format::new().set_background_color(Color::RGB(fill));
            sheet.write_string_with_format(row_num, col_num, value, &format)?;
        } else if layout.overall == Some(col) {
            let passed = value == "True";
            let format = Format::new().set_background_color(Color::RGB(overall_fill(passed)));
            sheet.write_boolean_with_format(row_num, col_num, passed, &format)?;
        } else if layout.log_file == Some(col) && !value.is_empty() {
            sheet.write_url(row_num, col_num, log_link(value))?;
        } else if let Ok(number) = value.parse::<f64>()
            && header_is_duration(col, layout, row.len())
        {
            sheet.write_number(row_num, col_num, number)?;
        } else {
            sheet.write_string(row_num, col_num, value)?;
        }
    }
    Ok(())
}

/// Durations trail the notes column.
fn header_is_duration(col: usize, layout: &Layout, width: usize) -> bool {
    match layout.overall {
        Some(overall) => col > overall + 1 && col < width,
        None => false,
    }
}

/// Link to the log by absolute path, showing only the file name.
fn log_link(value: &str) -> Url {
    let path = Path::new(value);
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let text = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| value.to_string());
    Url::new(format!("file:///{}", absolute.display().to_string().trim_start_matches('/')))
        .set_text(text)
}

impl Exporter for XlsxExporter {
    fn write(&self, summary: &SessionSummary) -> Result<()> {
        let rows = self.read_ledger()?;
        self.render(&rows)?;
        tracing::debug!(
            path = %self.path.display(),
            device = %summary.device.id,
            sessions = rows.len().saturating_sub(1),
            "results workbook rebuilt"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::catalog::default_catalog;
    use crate::report::{CsvExporter, ExportSet};
    use crate::session::{DeviceInfo, Session, Verdict};
    use calamine::{Data, Reader, Xlsx, open_workbook};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn summary(device: &str, t09: Verdict) -> SessionSummary {
        let selected: HashSet<String> = ["T02", "T09", "T13"].iter().map(|s| s.to_string()).collect();
        let mut session = Session::new(&default_catalog(), DeviceInfo::new(device), &selected);
        session.start_test("T02").unwrap();
        session.record_attempt("T02").unwrap();
        session.complete_test("T02", Verdict::Pass).unwrap();
        session.start_test("T09").unwrap();
        session.record_attempt("T09").unwrap();
        session.complete_test("T09", t09).unwrap();
        ResultAggregator::finalize(&mut session)
    }

    fn text(cell: &Data) -> String {
        match cell {
            Data::String(s) => s.clone(),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::Bool(b) => b.to_string(),
            Data::Empty => String::new(),
            other => format!("{:?}", other),
        }
    }

    fn read_sheet(path: &Path) -> Vec<Vec<Data>> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_status_fills_match_labels() {
        assert_eq!(status_fill("PASS"), Some(0x90EE90));
        assert_eq!(status_fill("FAIL"), Some(0xFFB6C1));
        assert_eq!(status_fill("NOT RUN"), Some(0xFFFF99));
        assert_eq!(status_fill("SKIPPED"), Some(0xCCCCCC));
        assert_eq!(status_fill("RUNNING"), None);
        assert_eq!(overall_fill(false), FAIL_FILL);
    }

    #[test]
    fn test_layout_finds_status_columns() {
        let header = CsvExporter::header(&summary("1", Verdict::Pass));
        let layout = Layout::from_header(&header);
        let catalog = default_catalog();
        assert_eq!(layout.log_file, Some(4));
        assert_eq!(layout.statuses, 5..5 + catalog.len());
        assert_eq!(layout.overall, Some(5 + catalog.len() + 1));
        assert!(header_is_duration(header.len() - 1, &layout, header.len()));
        assert!(!header_is_duration(5, &layout, header.len()));
    }

    #[test]
    fn test_workbook_mirrors_results_ledger() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("results.csv");
        let xlsx_path = dir.path().join("out/results.xlsx");
        let log = dir.path().join("logs/device_5_log.txt");
        let set = ExportSet::new(vec![
            Box::new(CsvExporter::new(&csv_path).with_log_file(&log)),
            Box::new(XlsxExporter::new(&xlsx_path, &csv_path)),
        ]);

        set.write(&summary("5", Verdict::Pass)).unwrap();
        set.write(&summary("6", Verdict::Fail)).unwrap();

        let rows = read_sheet(&xlsx_path);
        assert_eq!(rows.len(), 3);
        let header: Vec<String> = rows[0].iter().map(text).collect();
        let cell = |row: usize, name: &str| {
            text(&rows[row][header.iter().position(|h| h == name).unwrap()])
        };

        assert_eq!(cell(1, "Device ID"), "5");
        assert_eq!(cell(2, "Device ID"), "6");
        assert_eq!(cell(1, "Log File"), "device_5_log.txt");
        assert_eq!(cell(1, "T02: CM5 LED Visual Check"), "PASS");
        assert_eq!(cell(2, "T09: USB MicroPython Detection"), "FAIL");
        assert_eq!(cell(2, "T13: SD Card Detection"), "NOT RUN");
        assert_eq!(cell(2, "T01: Firmware Upload"), "SKIPPED");
        assert_eq!(rows[1][header.iter().position(|h| h == "Overall Pass").unwrap()], Data::Bool(true));
        assert_eq!(rows[2][header.iter().position(|h| h == "Overall Pass").unwrap()], Data::Bool(false));
        assert_eq!(cell(2, "Failed Tests"), "T09(USB MicroPython Detection)");
    }

    #[test]
    fn test_missing_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        let exporter = XlsxExporter::new(&dir.path().join("r.xlsx"), &dir.path().join("none.csv"));
        let err = exporter.write(&summary("1", Verdict::Pass)).unwrap_err();
        assert!(err.to_string().contains("Failed to open results file"));
        assert!(!exporter.path().exists());
    }
}
